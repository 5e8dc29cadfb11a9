//! Step control requests and their reports.

use serde::{Deserialize, Serialize};

use crate::data::io::{WireFormat, WireReader, WireWriter};
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CtrlOp {
    Resume = 0x01,
    StepInto = 0x02,
    StepOver = 0x03,
    StepReturn = 0x04,
    Suspend = 0x05,
}

impl CtrlOp {
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            0x01 => Self::Resume,
            0x02 => Self::StepInto,
            0x03 => Self::StepOver,
            0x04 => Self::StepReturn,
            0x05 => Self::Suspend,
            other => return Err(ProtocolError::unknown_tag("control op", other)),
        })
    }
}

/// Target frame of a step return.
///
/// A position is only meaningful against the stack the client last loaded; a
/// handle stays valid for as long as the frame exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FrameRef {
    Position(i32),
    Handle(u64),
}

const FRAME_POSITION: i32 = 1;
const FRAME_HANDLE: i32 = 2;

impl WireFormat for FrameRef {
    fn write_to(&self, w: &mut WireWriter) {
        match *self {
            Self::Position(p) => {
                w.write_i32(FRAME_POSITION);
                w.write_i32(p);
            }
            Self::Handle(h) => {
                w.write_i32(FRAME_HANDLE);
                w.write_u64(h);
            }
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        match r.read_i32()? {
            FRAME_POSITION => Ok(Self::Position(r.read_i32()?)),
            FRAME_HANDLE => Ok(Self::Handle(r.read_u64()?)),
            other => Err(ProtocolError::unknown_tag("frame ref", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DbgRequest {
    Resume,
    StepInto,
    StepOver,
    StepReturn { target: FrameRef },
}

impl DbgRequest {
    pub fn op(&self) -> CtrlOp {
        match self {
            Self::Resume => CtrlOp::Resume,
            Self::StepInto => CtrlOp::StepInto,
            Self::StepOver => CtrlOp::StepOver,
            Self::StepReturn { .. } => CtrlOp::StepReturn,
        }
    }
}

impl WireFormat for DbgRequest {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_u8(self.op() as u8);
        if let Self::StepReturn { target } = self {
            target.write_to(w);
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(match CtrlOp::from_code(r.read_u8()?)? {
            CtrlOp::Resume => Self::Resume,
            CtrlOp::StepInto => Self::StepInto,
            CtrlOp::StepOver => Self::StepOver,
            CtrlOp::StepReturn => Self::StepReturn {
                target: FrameRef::read_from(r)?,
            },
            CtrlOp::Suspend => return Err(ProtocolError::unknown_tag("debug request", CtrlOp::Suspend as u8)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CtrlOutcome {
    Executed,
    /// The engine was not in a state where the op makes sense.
    NotApplicable,
    NotSupported,
}

const REQUEST_EXECUTED: i32 = 0x0100_0000;
const ENGINE_SUSPENDED: i32 = 0x0200_0000;
const REQUEST_NOT_SUPPORTED: i32 = 0x0400_0000;

/// Reply to a step-control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtrlReport {
    pub op: CtrlOp,
    pub outcome: CtrlOutcome,
    /// Engine state after handling the request.
    pub suspended: bool,
}

impl CtrlReport {
    pub fn executed(op: CtrlOp, suspended: bool) -> Self {
        Self {
            op,
            outcome: CtrlOutcome::Executed,
            suspended,
        }
    }

    pub fn not_applicable(op: CtrlOp, suspended: bool) -> Self {
        Self {
            op,
            outcome: CtrlOutcome::NotApplicable,
            suspended,
        }
    }

    pub fn not_supported(op: CtrlOp, suspended: bool) -> Self {
        Self {
            op,
            outcome: CtrlOutcome::NotSupported,
            suspended,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.outcome == CtrlOutcome::Executed
    }

    fn code(&self) -> i32 {
        let mut code = self.op as i32;
        code |= match self.outcome {
            CtrlOutcome::Executed => REQUEST_EXECUTED,
            CtrlOutcome::NotApplicable => 0,
            CtrlOutcome::NotSupported => REQUEST_NOT_SUPPORTED,
        };
        if self.suspended {
            code |= ENGINE_SUSPENDED;
        }
        code
    }
}

impl WireFormat for CtrlReport {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_i32(self.code());
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let code = r.read_i32()?;
        let outcome = if code & REQUEST_EXECUTED != 0 {
            CtrlOutcome::Executed
        } else if code & REQUEST_NOT_SUPPORTED != 0 {
            CtrlOutcome::NotSupported
        } else {
            CtrlOutcome::NotApplicable
        };
        Ok(Self {
            op: CtrlOp::from_code((code & 0xff) as u8)?,
            outcome,
            suspended: code & ENGINE_SUSPENDED != 0,
        })
    }
}
