//! Error types shared across the session layers.
//!
//! None of these cross the exchange boundary raw: the session turns them into
//! [`Status`](crate::bridge::protocol::Status) replies before answering a client.

use thiserror::Error;

use crate::bridge::protocol::{Status, codes};

/// Malformed or unexpected wire content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("unknown {what} tag: {tag:#x}")]
    UnknownTag { what: &'static str, tag: i32 },

    #[error("invalid {what} length: {length}")]
    InvalidLength { what: &'static str, length: i64 },

    #[error("{what} of {count} exceeds the limit of {limit}")]
    LimitExceeded {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// Struct-only stores have no payload and cannot be written in full mode.
    #[error("value carries only its shape and cannot be encoded with data")]
    ShapeOnly,
}

impl ProtocolError {
    pub fn unknown_tag(what: &'static str, tag: impl Into<i32>) -> Self {
        Self::UnknownTag {
            what,
            tag: tag.into(),
        }
    }
}

impl From<ProtocolError> for Status {
    fn from(e: ProtocolError) -> Self {
        Status::error(codes::PROTOCOL, e.to_string())
    }
}

/// Failure raised by the interpreter bridge while serving a request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("{message}")]
    Eval { message: String },

    #[error("invalid reference: {handle:#x}")]
    InvalidReference { handle: u64 },

    #[error("evaluation interrupted")]
    Interrupted,

    #[error("not supported: {what}")]
    NotSupported { what: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl EvalError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval {
            message: message.into(),
        }
    }

    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported { what: what.into() }
    }
}

impl From<EvalError> for Status {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::InvalidReference { .. } => {
                Status::error(codes::INVALID_REFERENCE, e.to_string())
            }
            EvalError::Interrupted => Status::cancel(codes::CANCELLED, e.to_string()),
            EvalError::NotSupported { .. } => Status::error(codes::NOT_SUPPORTED, e.to_string()),
            EvalError::Protocol(inner) => inner.into(),
            EvalError::Parse { .. } | EvalError::Eval { .. } => {
                Status::error(codes::EVAL_FAILED, e.to_string())
            }
        }
    }
}

/// The command exchange could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("failed to start coordinator thread: {message}")]
    Spawn { message: String },
}
