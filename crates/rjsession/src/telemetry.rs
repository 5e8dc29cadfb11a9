//! Tracing setup for processes embedding the session.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with RJ_LOG and LOG_FORMAT support.
///
/// `RUST_LOG` wins when set. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directive(std::env::var("RJ_LOG").ok().as_deref()))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn filter_directive(level: Option<&str>) -> String {
    let base_level = match level {
        Some("debug") => "debug",
        Some("trace") => "trace",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    // frame encoding traces are too chatty even at debug
    format!("rjsession={base_level},rjsession::bridge::codec=info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_aliases() {
        assert_eq!(
            filter_directive(Some("warning")),
            "rjsession=warn,rjsession::bridge::codec=info"
        );
        assert!(filter_directive(None).starts_with("rjsession=info"));
        assert!(filter_directive(Some("loud")).starts_with("rjsession=info"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
