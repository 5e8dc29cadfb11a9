//! Serves debug commands against the interpreter's debug backend.

use tracing::{debug, info};

use super::callstack::{CallStack, FLAG_NOSTEPPING, Frame};
use super::command::{DbgCommand, DbgReply};
use super::frame::{DbgEnablement, DbgFilterState, SetDebugReport};
use super::manager::TracepointManager;
use super::request::{CtrlOp, CtrlReport, DbgRequest, FrameRef};
use crate::error::EvalError;
use crate::interpreter::{DebugBackend, Interpreter};

/// Debugger state that outlives a single command.
///
/// Keeps the stack the client last loaded, since frame positions in requests
/// refer to that snapshot.
#[derive(Debug, Default)]
pub struct DebugController {
    last_stack: Option<CallStack>,
    enablement: DbgEnablement,
    filter: DbgFilterState,
    tracepoints: TracepointManager,
}

impl DebugController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enablement(&self) -> DbgEnablement {
        self.enablement
    }

    pub fn filter_state(&self) -> DbgFilterState {
        self.filter
    }

    pub fn tracepoints(&self) -> &TracepointManager {
        &self.tracepoints
    }

    pub fn tracepoints_mut(&mut self) -> &mut TracepointManager {
        &mut self.tracepoints
    }

    /// `Ok(None)` for commands that only change state.
    pub fn handle(
        &mut self,
        command: &DbgCommand,
        interp: &mut dyn Interpreter,
    ) -> Result<Option<DbgReply>, EvalError> {
        debug!(op = command.name(), "Handling debug command");
        match command {
            DbgCommand::LoadFrameList => {
                let stack = CallStack::classify(backend(interp)?.call_stack()?);
                self.last_stack = Some(stack.clone());
                Ok(Some(DbgReply::CallStack(stack)))
            }
            DbgCommand::LoadFrameContext(request) => {
                let backend = backend(interp)?;
                let frame = match self.last_stack.as_ref() {
                    Some(stack) => stack.by_position(request.position).cloned(),
                    None => CallStack::classify(backend.call_stack()?)
                        .by_position(request.position)
                        .cloned(),
                };
                let frame = frame.ok_or_else(|| {
                    EvalError::eval(format!("no frame at position {}", request.position))
                })?;
                Ok(Some(DbgReply::FrameContext(backend.frame_context(&frame)?)))
            }
            DbgCommand::SetDebug(request) => {
                let changed = backend(interp)?.set_debug(request)?;
                Ok(Some(DbgReply::SetDebug(SetDebugReport { changed })))
            }
            DbgCommand::RequestSuspend => Ok(Some(DbgReply::Ctrl(self.suspend(interp)))),
            DbgCommand::Control(request) => Ok(Some(DbgReply::Ctrl(self.control(request, interp)))),
            DbgCommand::InstallTracepoints(request) => {
                let backend = backend(interp)?;
                let report = self.tracepoints.install(request, |path, element, position| {
                    backend.locate_tracepoint(path, element, position)
                });
                Ok(Some(DbgReply::Installation(report)))
            }
            DbgCommand::InstallFlagTracepoints(request) => Ok(Some(DbgReply::Installation(
                self.tracepoints.install_flags(request),
            ))),
            DbgCommand::UpdateTracepointStates(update) => {
                self.tracepoints.apply_update(update);
                Ok(None)
            }
            DbgCommand::SetEnablement(enablement) => {
                info!(
                    breakpoints_enabled = enablement.breakpoints_enabled,
                    "Breakpoint enablement changed"
                );
                self.enablement = *enablement;
                self.tracepoints
                    .set_breakpoints_enabled(enablement.breakpoints_enabled);
                Ok(None)
            }
            DbgCommand::ResetFilterState(filter) => {
                self.filter = *filter;
                Ok(None)
            }
            DbgCommand::NotifyTracepointEvent(_) => Err(EvalError::not_supported(
                "tracepoint events are sent by the engine",
            )),
        }
    }

    fn suspend(&mut self, interp: &mut dyn Interpreter) -> CtrlReport {
        let Some(backend) = interp.debugger() else {
            return CtrlReport::not_supported(CtrlOp::Suspend, false);
        };
        if backend.is_suspended() {
            return CtrlReport::not_applicable(CtrlOp::Suspend, true);
        }
        if backend.request_suspend() {
            CtrlReport::executed(CtrlOp::Suspend, backend.is_suspended())
        } else {
            CtrlReport::not_applicable(CtrlOp::Suspend, backend.is_suspended())
        }
    }

    fn control(&mut self, request: &DbgRequest, interp: &mut dyn Interpreter) -> CtrlReport {
        let op = request.op();
        let Some(backend) = interp.debugger() else {
            return CtrlReport::not_supported(op, false);
        };
        if !backend.is_suspended() {
            return CtrlReport::not_applicable(op, false);
        }

        let target = match request {
            DbgRequest::StepReturn { target } => match self.resolve_target(*target, backend) {
                Some(handle) => Some(handle),
                None => {
                    debug!(?target, "Step return target not found");
                    return CtrlReport::not_applicable(op, true);
                }
            },
            _ => None,
        };

        if !backend.exec_ctrl(op, target) {
            return CtrlReport::not_applicable(op, backend.is_suspended());
        }
        // positions of the old snapshot are meaningless once the engine moved on
        self.last_stack = None;
        CtrlReport::executed(op, backend.is_suspended())
    }

    /// Resolves a step-return target to a frame handle.
    fn resolve_target(&self, target: FrameRef, backend: &mut dyn DebugBackend) -> Option<u64> {
        let fresh;
        let (stack, frame) = match target {
            FrameRef::Position(position) => {
                let stack = self.last_stack.as_ref()?;
                (stack, stack.by_position(position)?)
            }
            FrameRef::Handle(handle) => {
                fresh = CallStack::classify(backend.call_stack().ok()?);
                let frame = fresh.by_handle(handle)?;
                (&fresh, frame)
            }
        };
        if !self.filter.step_filter {
            return Some(frame.handle);
        }
        // returning into a filtered frame continues to the next outer one
        let at = stack.frames.iter().position(|f| f.handle == frame.handle)?;
        stack.frames[..=at]
            .iter()
            .rev()
            .find(|f| !is_filtered(f))
            .map(|f| f.handle)
    }
}

fn is_filtered(frame: &Frame) -> bool {
    frame.flags & FLAG_NOSTEPPING != 0
}

fn backend(interp: &mut dyn Interpreter) -> Result<&mut dyn DebugBackend, EvalError> {
    interp
        .debugger()
        .ok_or_else(|| EvalError::not_supported("debugging"))
}
