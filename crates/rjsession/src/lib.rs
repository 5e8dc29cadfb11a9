//! rjsession: session core for remote R engines.
//!
//! One engine thread runs the interpreter; any number of client slots talk to
//! it through the [`CommandExchange`]. Values cross the wire through the
//! [`ValueCodec`], and the `dbg` module carries the debugger protocol.

pub mod bridge;
pub mod config;
pub mod data;
pub mod dbg;
pub mod error;
pub mod exchange;
pub mod interpreter;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use bridge::codec::MessageCodec;
pub use bridge::protocol::{
    Answer, ClientId, CommandBatch, CommandItem, CommandKind, DataCmd, Message, RequestId,
    Severity, SlotId, Status,
};
pub use config::SessionConfig;
pub use data::{CodecLimits, CodecMode, Value, ValueCodec};
pub use error::{EvalError, ExchangeError, ProtocolError};
pub use exchange::{CommandExchange, EngineState, SessionPlugin};
pub use interpreter::{DebugBackend, EvalContext, ExternalObject, Handle, Interpreter};
pub use session::EngineSession;
pub use telemetry::init_tracing;
pub use transport::serve_slot;
