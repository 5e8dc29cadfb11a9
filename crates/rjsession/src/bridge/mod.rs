//! Client bridge for the engine session.
//!
//! # Architecture
//!
//! - **protocol**: Message types (Message, CommandBatch, CommandItem, Status)
//! - **codec**: length-delimited binary framing for AsyncRead/AsyncWrite

pub mod codec;
pub mod protocol;
