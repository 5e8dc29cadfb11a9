//! Debugger protocol: tracepoints, call stacks and step control.

pub mod callstack;
pub mod command;
pub mod controller;
pub mod frame;
pub mod install;
pub mod manager;
pub mod request;
pub mod srcref;
pub mod tracepoint;

pub use callstack::{CallStack, Frame};
pub use command::{DbgCommand, DbgReply};
pub use controller::DebugController;
pub use frame::{
    DbgEnablement, DbgFilterState, DebugTarget, FrameContext, FrameContextDetailRequest,
    SetDebugReport, SetDebugRequest, SourceType,
};
pub use install::{
    ElementTracepointPositions, FlagTracepoint, FlagTracepointInstallationRequest, InstallationResult,
    SrcfileData, TracepointInstallationReport, TracepointInstallationRequest,
};
pub use manager::TracepointManager;
pub use request::{CtrlOp, CtrlOutcome, CtrlReport, DbgRequest, FrameRef};
pub use srcref::Srcref;
pub use tracepoint::{
    TracepointEvent, TracepointEventKind, TracepointPosition, TracepointState,
    TracepointStatesUpdate, TracepointType,
};
