//! Debug commands carried in command items, and their replies.

use serde::{Deserialize, Serialize};

use super::callstack::CallStack;
use super::frame::{
    DbgEnablement, DbgFilterState, FrameContext, FrameContextDetailRequest, SetDebugReport,
    SetDebugRequest,
};
use super::install::{
    FlagTracepointInstallationRequest, TracepointInstallationReport, TracepointInstallationRequest,
};
use super::request::{CtrlReport, DbgRequest};
use super::tracepoint::{TracepointEvent, TracepointStatesUpdate};
use crate::data::io::{WireFormat, WireReader, WireWriter};
use crate::error::ProtocolError;

mod op {
    pub const LOAD_FRAME_LIST: u8 = 0x01;
    pub const LOAD_FRAME_CONTEXT: u8 = 0x02;
    pub const SET_DEBUG: u8 = 0x03;
    pub const REQUEST_SUSPEND: u8 = 0x04;
    pub const INSTALL_TP_POSITIONS: u8 = 0x05;
    pub const INSTALL_TP_FLAGS: u8 = 0x06;
    pub const CONTROL: u8 = 0x07;
    pub const SET_ENABLEMENT: u8 = 0x08;
    pub const RESET_FILTER_STATE: u8 = 0x09;
    pub const UPDATE_TP_STATES: u8 = 0x0A;
    pub const NOTIFY_TP_EVENT: u8 = 0x11;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum DbgCommand {
    LoadFrameList,
    LoadFrameContext(FrameContextDetailRequest),
    SetDebug(SetDebugRequest),
    RequestSuspend,
    Control(DbgRequest),
    InstallTracepoints(TracepointInstallationRequest),
    InstallFlagTracepoints(FlagTracepointInstallationRequest),
    UpdateTracepointStates(TracepointStatesUpdate),
    SetEnablement(DbgEnablement),
    ResetFilterState(DbgFilterState),
    /// Engine to client only.
    NotifyTracepointEvent(TracepointEvent),
}

impl DbgCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadFrameList => "load_frame_list",
            Self::LoadFrameContext(_) => "load_frame_context",
            Self::SetDebug(_) => "set_debug",
            Self::RequestSuspend => "request_suspend",
            Self::Control(_) => "control",
            Self::InstallTracepoints(_) => "install_tracepoints",
            Self::InstallFlagTracepoints(_) => "install_flag_tracepoints",
            Self::UpdateTracepointStates(_) => "update_tracepoint_states",
            Self::SetEnablement(_) => "set_enablement",
            Self::ResetFilterState(_) => "reset_filter_state",
            Self::NotifyTracepointEvent(_) => "notify_tracepoint_event",
        }
    }
}

impl WireFormat for DbgCommand {
    fn write_to(&self, w: &mut WireWriter) {
        match self {
            Self::LoadFrameList => w.write_u8(op::LOAD_FRAME_LIST),
            Self::LoadFrameContext(r) => {
                w.write_u8(op::LOAD_FRAME_CONTEXT);
                r.write_to(w);
            }
            Self::SetDebug(r) => {
                w.write_u8(op::SET_DEBUG);
                r.write_to(w);
            }
            Self::RequestSuspend => w.write_u8(op::REQUEST_SUSPEND),
            Self::Control(r) => {
                w.write_u8(op::CONTROL);
                r.write_to(w);
            }
            Self::InstallTracepoints(r) => {
                w.write_u8(op::INSTALL_TP_POSITIONS);
                r.write_to(w);
            }
            Self::InstallFlagTracepoints(r) => {
                w.write_u8(op::INSTALL_TP_FLAGS);
                r.write_to(w);
            }
            Self::UpdateTracepointStates(r) => {
                w.write_u8(op::UPDATE_TP_STATES);
                r.write_to(w);
            }
            Self::SetEnablement(r) => {
                w.write_u8(op::SET_ENABLEMENT);
                r.write_to(w);
            }
            Self::ResetFilterState(r) => {
                w.write_u8(op::RESET_FILTER_STATE);
                r.write_to(w);
            }
            Self::NotifyTracepointEvent(r) => {
                w.write_u8(op::NOTIFY_TP_EVENT);
                r.write_to(w);
            }
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(match r.read_u8()? {
            op::LOAD_FRAME_LIST => Self::LoadFrameList,
            op::LOAD_FRAME_CONTEXT => Self::LoadFrameContext(WireFormat::read_from(r)?),
            op::SET_DEBUG => Self::SetDebug(WireFormat::read_from(r)?),
            op::REQUEST_SUSPEND => Self::RequestSuspend,
            op::CONTROL => Self::Control(WireFormat::read_from(r)?),
            op::INSTALL_TP_POSITIONS => Self::InstallTracepoints(WireFormat::read_from(r)?),
            op::INSTALL_TP_FLAGS => Self::InstallFlagTracepoints(WireFormat::read_from(r)?),
            op::UPDATE_TP_STATES => Self::UpdateTracepointStates(WireFormat::read_from(r)?),
            op::SET_ENABLEMENT => Self::SetEnablement(WireFormat::read_from(r)?),
            op::RESET_FILTER_STATE => Self::ResetFilterState(WireFormat::read_from(r)?),
            op::NOTIFY_TP_EVENT => Self::NotifyTracepointEvent(WireFormat::read_from(r)?),
            other => return Err(ProtocolError::unknown_tag("debug op", other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DbgReply {
    CallStack(CallStack),
    FrameContext(FrameContext),
    SetDebug(SetDebugReport),
    Ctrl(CtrlReport),
    Installation(TracepointInstallationReport),
}

const REPLY_CALL_STACK: u8 = 1;
const REPLY_FRAME_CONTEXT: u8 = 2;
const REPLY_SET_DEBUG: u8 = 3;
const REPLY_CTRL: u8 = 4;
const REPLY_INSTALLATION: u8 = 5;

impl WireFormat for DbgReply {
    fn write_to(&self, w: &mut WireWriter) {
        match self {
            Self::CallStack(v) => {
                w.write_u8(REPLY_CALL_STACK);
                v.write_to(w);
            }
            Self::FrameContext(v) => {
                w.write_u8(REPLY_FRAME_CONTEXT);
                v.write_to(w);
            }
            Self::SetDebug(v) => {
                w.write_u8(REPLY_SET_DEBUG);
                v.write_to(w);
            }
            Self::Ctrl(v) => {
                w.write_u8(REPLY_CTRL);
                v.write_to(w);
            }
            Self::Installation(v) => {
                w.write_u8(REPLY_INSTALLATION);
                v.write_to(w);
            }
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(match r.read_u8()? {
            REPLY_CALL_STACK => Self::CallStack(WireFormat::read_from(r)?),
            REPLY_FRAME_CONTEXT => Self::FrameContext(WireFormat::read_from(r)?),
            REPLY_SET_DEBUG => Self::SetDebug(WireFormat::read_from(r)?),
            REPLY_CTRL => Self::Ctrl(WireFormat::read_from(r)?),
            REPLY_INSTALLATION => Self::Installation(WireFormat::read_from(r)?),
            other => return Err(ProtocolError::unknown_tag("debug reply", other)),
        })
    }
}
