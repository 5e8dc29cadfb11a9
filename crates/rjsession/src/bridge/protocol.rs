//! Wire protocol between the engine session and its clients.
//!
//! Every frame carries one [`Message`]. Command batches move [`CommandItem`]s
//! in both directions: client requests (eval, assign, debug) travel to the
//! engine, engine questions (console read, UI callbacks) travel to the client,
//! and each answered item goes back carrying the request id it answers.

use serde::{Deserialize, Serialize};

use crate::data::io::{WireFormat, WireReader, WireWriter};
use crate::data::{CodecMode, Value, ValueCodec};
use crate::dbg::{DbgCommand, DbgReply};
use crate::error::ProtocolError;

/// Logical client channel. Slot 0 is the primary console slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u32);

impl SlotId {
    pub const PRIMARY: SlotId = SlotId(0);

    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_primary(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// Pairs an answer with the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u32);

impl RequestId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one attachment of a client to a slot.
///
/// UUID v4 so a stale client that reconnects late can never be mistaken for
/// the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Severity {
    Ok = 0,
    Info = 1,
    Warning = 2,
    Error = 4,
    Cancel = 8,
}

impl Severity {
    fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            0 => Self::Ok,
            1 => Self::Info,
            2 => Self::Warning,
            4 => Self::Error,
            8 => Self::Cancel,
            other => return Err(ProtocolError::unknown_tag("severity", other)),
        })
    }
}

/// Status codes carried in [`Status::code`].
pub mod codes {
    pub const OK: i32 = 0;
    pub const STOPPED: i32 = 0x11;
    pub const DISCONNECTED: i32 = 0x12;
    pub const PROTOCOL: i32 = 0x21;
    pub const EVAL_FAILED: i32 = 0x22;
    pub const INVALID_REFERENCE: i32 = 0x23;
    pub const UNANSWERED: i32 = 0x24;
    pub const CANCELLED: i32 = 0x25;
    pub const NOT_SUPPORTED: i32 = 0x26;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub severity: Severity,
    pub code: i32,
    pub message: Option<String>,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            severity: Severity::Ok,
            code: codes::OK,
            message: None,
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: Some(message.into()),
        }
    }

    pub fn warning(code: i32, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: Some(message.into()),
        }
    }

    pub fn cancel(code: i32, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Cancel,
            code,
            message: Some(message.into()),
        }
    }

    pub fn stopped() -> Self {
        Self::error(codes::STOPPED, "session stopped")
    }

    pub fn disconnected() -> Self {
        Self::warning(codes::DISCONNECTED, "no client attached")
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({:#x})", self.severity, self.code)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl WireFormat for Status {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_u8(self.severity as u8);
        w.write_i32(self.code);
        w.write_opt_str(self.message.as_deref());
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            severity: Severity::from_code(r.read_u8()?)?,
            code: r.read_i32()?,
            message: r.read_opt_str()?,
        })
    }
}

/// Data request from a client to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DataCmd {
    /// Evaluate for side effects only.
    EvalVoid { expr: String },
    EvalData { expr: String },
    /// Evaluate and return only the shape of the result.
    EvalStruct { expr: String },
    ResolveData { handle: u64 },
    ResolveStruct { handle: u64 },
    AssignData { target: String, value: Value },
}

mod data_op {
    pub const EVAL_VOID: u8 = 0x01;
    pub const EVAL_DATA: u8 = 0x02;
    pub const EVAL_STRUCT: u8 = 0x03;
    pub const RESOLVE_DATA: u8 = 0x04;
    pub const RESOLVE_STRUCT: u8 = 0x05;
    pub const ASSIGN_DATA: u8 = 0x06;
}

impl DataCmd {
    fn write(&self, codec: &ValueCodec, w: &mut WireWriter) -> Result<(), ProtocolError> {
        match self {
            Self::EvalVoid { expr } => {
                w.write_u8(data_op::EVAL_VOID);
                w.write_str(expr);
            }
            Self::EvalData { expr } => {
                w.write_u8(data_op::EVAL_DATA);
                w.write_str(expr);
            }
            Self::EvalStruct { expr } => {
                w.write_u8(data_op::EVAL_STRUCT);
                w.write_str(expr);
            }
            Self::ResolveData { handle } => {
                w.write_u8(data_op::RESOLVE_DATA);
                w.write_u64(*handle);
            }
            Self::ResolveStruct { handle } => {
                w.write_u8(data_op::RESOLVE_STRUCT);
                w.write_u64(*handle);
            }
            Self::AssignData { target, value } => {
                w.write_u8(data_op::ASSIGN_DATA);
                w.write_str(target);
                codec.write(w, value, CodecMode::Full)?;
            }
        }
        Ok(())
    }

    fn read(codec: &ValueCodec, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(match r.read_u8()? {
            data_op::EVAL_VOID => Self::EvalVoid { expr: r.read_str()? },
            data_op::EVAL_DATA => Self::EvalData { expr: r.read_str()? },
            data_op::EVAL_STRUCT => Self::EvalStruct { expr: r.read_str()? },
            data_op::RESOLVE_DATA => Self::ResolveData {
                handle: r.read_u64()?,
            },
            data_op::RESOLVE_STRUCT => Self::ResolveStruct {
                handle: r.read_u64()?,
            },
            data_op::ASSIGN_DATA => Self::AssignData {
                target: r.read_str()?,
                value: codec.read(r)?,
            },
            other => return Err(ProtocolError::unknown_tag("data op", other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    ConsoleRead { prompt: String, add_to_history: bool },
    ConsoleWriteOut { text: String },
    ConsoleWriteErr { text: String },
    ConsoleMessage { text: String },
    Data(DataCmd),
    /// Engine callback into the client UI, e.g. `showHelp` or `chooseFile`.
    ExtUi {
        name: String,
        arg: Option<Value>,
        wait: bool,
    },
    Debug(DbgCommand),
}

mod kind {
    pub const CONSOLE_READ: u8 = 0x01;
    pub const CONSOLE_WRITE_OUT: u8 = 0x02;
    pub const CONSOLE_WRITE_ERR: u8 = 0x03;
    pub const CONSOLE_MESSAGE: u8 = 0x04;
    pub const DATA: u8 = 0x10;
    pub const EXT_UI: u8 = 0x20;
    pub const DEBUG: u8 = 0x30;
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConsoleRead { .. } => "console_read",
            Self::ConsoleWriteOut { .. } => "console_write_out",
            Self::ConsoleWriteErr { .. } => "console_write_err",
            Self::ConsoleMessage { .. } => "console_message",
            Self::Data(_) => "data",
            Self::ExtUi { .. } => "ext_ui",
            Self::Debug(_) => "debug",
        }
    }

    fn write(&self, codec: &ValueCodec, w: &mut WireWriter) -> Result<(), ProtocolError> {
        match self {
            Self::ConsoleRead {
                prompt,
                add_to_history,
            } => {
                w.write_u8(kind::CONSOLE_READ);
                w.write_str(prompt);
                w.write_bool(*add_to_history);
            }
            Self::ConsoleWriteOut { text } => {
                w.write_u8(kind::CONSOLE_WRITE_OUT);
                w.write_str(text);
            }
            Self::ConsoleWriteErr { text } => {
                w.write_u8(kind::CONSOLE_WRITE_ERR);
                w.write_str(text);
            }
            Self::ConsoleMessage { text } => {
                w.write_u8(kind::CONSOLE_MESSAGE);
                w.write_str(text);
            }
            Self::Data(cmd) => {
                w.write_u8(kind::DATA);
                cmd.write(codec, w)?;
            }
            Self::ExtUi { name, arg, wait } => {
                w.write_u8(kind::EXT_UI);
                w.write_str(name);
                w.write_bool(*wait);
                match arg {
                    Some(arg) => {
                        w.write_bool(true);
                        codec.write(w, arg, CodecMode::Full)?;
                    }
                    None => w.write_bool(false),
                }
            }
            Self::Debug(cmd) => {
                w.write_u8(kind::DEBUG);
                cmd.write_to(w);
            }
        }
        Ok(())
    }

    fn read(codec: &ValueCodec, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(match r.read_u8()? {
            kind::CONSOLE_READ => Self::ConsoleRead {
                prompt: r.read_str()?,
                add_to_history: r.read_bool()?,
            },
            kind::CONSOLE_WRITE_OUT => Self::ConsoleWriteOut { text: r.read_str()? },
            kind::CONSOLE_WRITE_ERR => Self::ConsoleWriteErr { text: r.read_str()? },
            kind::CONSOLE_MESSAGE => Self::ConsoleMessage { text: r.read_str()? },
            kind::DATA => Self::Data(DataCmd::read(codec, r)?),
            kind::EXT_UI => {
                let name = r.read_str()?;
                let wait = r.read_bool()?;
                let arg = if r.read_bool()? {
                    Some(codec.read(r)?)
                } else {
                    None
                };
                Self::ExtUi { name, arg, wait }
            }
            kind::DEBUG => Self::Debug(DbgCommand::read_from(r)?),
            other => return Err(ProtocolError::unknown_tag("command kind", other)),
        })
    }
}

/// Reply carried back in an answered [`CommandItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Done,
    /// A value, shape-only when its stores carry no payload.
    Value(Value),
    Text(String),
    Debug(DbgReply),
    Status(Status),
}

mod answer {
    pub const NONE: u8 = 0x00;
    pub const DONE: u8 = 0x01;
    pub const VALUE: u8 = 0x02;
    pub const TEXT: u8 = 0x03;
    pub const DEBUG: u8 = 0x04;
    pub const STATUS: u8 = 0x05;
}

impl Answer {
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Status(status) => Some(status),
            _ => None,
        }
    }

    fn write(
        answer: Option<&Self>,
        codec: &ValueCodec,
        w: &mut WireWriter,
    ) -> Result<(), ProtocolError> {
        match answer {
            None => w.write_u8(answer::NONE),
            Some(Self::Done) => w.write_u8(answer::DONE),
            Some(Self::Value(value)) => {
                w.write_u8(answer::VALUE);
                let mode = if value.has_shape_stores() {
                    CodecMode::StructOnly
                } else {
                    CodecMode::Full
                };
                codec.write(w, value, mode)?;
            }
            Some(Self::Text(text)) => {
                w.write_u8(answer::TEXT);
                w.write_str(text);
            }
            Some(Self::Debug(reply)) => {
                w.write_u8(answer::DEBUG);
                reply.write_to(w);
            }
            Some(Self::Status(status)) => {
                w.write_u8(answer::STATUS);
                status.write_to(w);
            }
        }
        Ok(())
    }

    fn read(codec: &ValueCodec, r: &mut WireReader<'_>) -> Result<Option<Self>, ProtocolError> {
        Ok(Some(match r.read_u8()? {
            answer::NONE => return Ok(None),
            answer::DONE => Self::Done,
            answer::VALUE => Self::Value(codec.read(r)?),
            answer::TEXT => Self::Text(r.read_str()?),
            answer::DEBUG => Self::Debug(DbgReply::read_from(r)?),
            answer::STATUS => Self::Status(Status::read_from(r)?),
            other => return Err(ProtocolError::unknown_tag("answer", other)),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandItem {
    pub slot: SlotId,
    /// Absent for notifications that expect no answer.
    pub request_id: Option<RequestId>,
    pub kind: CommandKind,
    pub answer: Option<Answer>,
}

impl CommandItem {
    pub fn new(slot: SlotId, kind: CommandKind) -> Self {
        Self {
            slot,
            request_id: None,
            kind,
            answer: None,
        }
    }

    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Consumes the item and returns it carrying `answer`.
    pub fn answered(mut self, answer: Answer) -> Self {
        self.answer = Some(answer);
        self
    }

    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }

    fn write(&self, codec: &ValueCodec, w: &mut WireWriter) -> Result<(), ProtocolError> {
        w.write_u32(self.slot.0);
        w.write_i32(self.request_id.map_or(-1, |id| id.0 as i32));
        self.kind.write(codec, w)?;
        Answer::write(self.answer.as_ref(), codec, w)
    }

    fn read(codec: &ValueCodec, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let slot = SlotId(r.read_u32()?);
        let request_id = match r.read_i32()? {
            -1 => None,
            id if id >= 0 => Some(RequestId(id as u32)),
            other => {
                return Err(ProtocolError::InvalidLength {
                    what: "request id",
                    length: other.into(),
                });
            }
        };
        Ok(Self {
            slot,
            request_id,
            kind: CommandKind::read(codec, r)?,
            answer: Answer::read(codec, r)?,
        })
    }
}

/// Items delivered to one slot, plus the engine's busy flag at delivery time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandBatch {
    pub busy: bool,
    pub items: Vec<CommandItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ping,
    StatusReply(Status),
    CommandBatch(CommandBatch),
    /// Opaque file payload; the receiver acknowledges by echoing it.
    FileExchange { name: String, data: Vec<u8> },
}

mod message {
    pub const PING: u8 = 0x01;
    pub const STATUS: u8 = 0x02;
    pub const BATCH: u8 = 0x03;
    pub const FILE: u8 = 0x04;
}

impl Message {
    pub fn write(&self, codec: &ValueCodec, w: &mut WireWriter) -> Result<(), ProtocolError> {
        match self {
            Self::Ping => w.write_u8(message::PING),
            Self::StatusReply(status) => {
                w.write_u8(message::STATUS);
                status.write_to(w);
            }
            Self::CommandBatch(batch) => {
                w.write_u8(message::BATCH);
                w.write_bool(batch.busy);
                w.write_len(batch.items.len());
                for item in &batch.items {
                    item.write(codec, w)?;
                }
            }
            Self::FileExchange { name, data } => {
                w.write_u8(message::FILE);
                w.write_str(name);
                w.write_bytes(data);
            }
        }
        Ok(())
    }

    pub fn read(codec: &ValueCodec, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(match r.read_u8()? {
            message::PING => Self::Ping,
            message::STATUS => Self::StatusReply(Status::read_from(r)?),
            message::BATCH => {
                let busy = r.read_bool()?;
                let n = r.read_len("command batch", 10)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(CommandItem::read(codec, r)?);
                }
                Self::CommandBatch(CommandBatch { busy, items })
            }
            message::FILE => Self::FileExchange {
                name: r.read_str()?,
                data: r.read_bytes()?,
            },
            other => return Err(ProtocolError::unknown_tag("message", other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{List, Store};
    use crate::dbg::{CtrlOp, CtrlReport};

    fn reencode(message: &Message) -> Message {
        let codec = ValueCodec::default();
        let mut w = WireWriter::new();
        message.write(&codec, &mut w).unwrap();
        let bytes = w.finish();
        let mut r = WireReader::new(&bytes);
        let out = Message::read(&codec, &mut r).unwrap();
        r.finish().unwrap();
        out
    }

    #[test]
    fn batch_with_mixed_items() {
        let assign = CommandItem::new(
            SlotId::PRIMARY,
            CommandKind::Data(DataCmd::AssignData {
                target: "x".into(),
                value: Value::integer([1, 2, 3]),
            }),
        )
        .with_request_id(RequestId::new(7));
        let read = CommandItem::new(
            SlotId::PRIMARY,
            CommandKind::ConsoleRead {
                prompt: "> ".into(),
                add_to_history: true,
            },
        )
        .with_request_id(RequestId::new(1))
        .answered(Answer::Text("1 + 1".into()));
        let ctrl = CommandItem::new(SlotId::new(2), CommandKind::Debug(DbgCommand::RequestSuspend))
            .answered(Answer::Debug(DbgReply::Ctrl(CtrlReport::executed(
                CtrlOp::Suspend,
                true,
            ))));
        let message = Message::CommandBatch(CommandBatch {
            busy: true,
            items: vec![assign, read, ctrl],
        });
        assert_eq!(reencode(&message), message);
    }

    #[test]
    fn shape_answers_use_struct_mode() {
        let value = Value::List(List::new(vec![Value::integer([1, 2])])).to_struct();
        let item = CommandItem::new(
            SlotId::PRIMARY,
            CommandKind::Data(DataCmd::EvalStruct {
                expr: "list(1:2)".into(),
            }),
        )
        .answered(Answer::Value(value.clone()));
        let message = Message::CommandBatch(CommandBatch {
            busy: false,
            items: vec![item],
        });
        let Message::CommandBatch(batch) = reencode(&message) else {
            panic!("expected a batch");
        };
        let Some(Answer::Value(decoded)) = &batch.items[0].answer else {
            panic!("expected a value answer");
        };
        assert_eq!(decoded, &value);
        assert!(matches!(
            decoded,
            Value::List(l) if matches!(l.elements[0].store(), Some(Store::Struct(_)))
        ));
    }

    #[test]
    fn file_exchange_and_status() {
        for message in [
            Message::Ping,
            Message::StatusReply(Status::error(codes::PROTOCOL, "bad tag")),
            Message::FileExchange {
                name: "plot.png".into(),
                data: vec![0x89, b'P', b'N', b'G'],
            },
        ] {
            assert_eq!(reencode(&message), message);
        }
    }

    #[test]
    fn negative_request_id_other_than_none_is_rejected() {
        let codec = ValueCodec::default();
        let mut w = WireWriter::new();
        w.write_u8(message::BATCH);
        w.write_bool(false);
        w.write_len(1);
        w.write_u32(0);
        w.write_i32(-5);
        let bytes = w.finish();
        assert!(Message::read(&codec, &mut WireReader::new(&bytes)).is_err());
    }

    #[test]
    fn status_snapshot() {
        insta::assert_json_snapshot!(Status::stopped(), @r###"
        {
          "severity": "error",
          "code": 17,
          "message": "session stopped"
        }
        "###);
    }
}
