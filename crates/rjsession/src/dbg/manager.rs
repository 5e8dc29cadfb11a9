//! Engine-side registry of tracepoint states and installations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use super::install::{
    FlagTracepoint, FlagTracepointInstallationRequest, InstallationResult,
    TracepointInstallationReport, TracepointInstallationRequest, resolve_element,
};
use super::tracepoint::{
    FLAG_ENABLED, FLAG_EXPR_EVAL_FAILED, FLAG_EXPR_INVALID, TracepointEvent, TracepointEventKind,
    TracepointPosition, TracepointState, TracepointStatesUpdate, TracepointType,
};
use crate::data::Store;
use crate::error::EvalError;
use crate::interpreter::{EvalContext, ExternalObject, Handle, Interpreter};

#[derive(Debug)]
pub struct TracepointManager {
    states: BTreeMap<(String, i64), TracepointState>,
    installed: HashMap<(String, String), BTreeSet<i64>>,
    flag_tracepoints: BTreeMap<TracepointType, u32>,
    breakpoints_enabled: bool,
}

impl Default for TracepointManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TracepointManager {
    pub fn new() -> Self {
        Self {
            states: BTreeMap::new(),
            installed: HashMap::new(),
            flag_tracepoints: BTreeMap::new(),
            breakpoints_enabled: true,
        }
    }

    pub fn state(&self, file_path: &str, id: i64) -> Option<&TracepointState> {
        self.states.get(&(file_path.to_string(), id))
    }

    pub fn states(&self) -> impl Iterator<Item = &TracepointState> {
        self.states.values()
    }

    pub fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.breakpoints_enabled = enabled;
    }

    pub fn apply_update(&mut self, update: &TracepointStatesUpdate) {
        if update.reset {
            self.states.clear();
        }
        for state in &update.states {
            let key = (state.file_path.clone(), state.id);
            if state.tp_type == TracepointType::Deleted {
                self.states.remove(&key);
                self.uninstall(&state.file_path, state.id);
            } else {
                self.states.insert(key, state.clone());
            }
        }
        debug!(
            reset = update.reset,
            count = update.states.len(),
            total = self.states.len(),
            "Applied tracepoint states"
        );
    }

    /// Installs the requested positions, `locate` resolving each against the live element.
    pub fn install(
        &mut self,
        request: &TracepointInstallationRequest,
        mut locate: impl FnMut(&str, &str, &TracepointPosition) -> bool,
    ) -> TracepointInstallationReport {
        let mut results = Vec::new();
        for element in &request.elements {
            let path = element.srcfile.key().to_string();
            let key = (path.clone(), element.element_id.clone());
            let installed = self.installed.entry(key).or_default();
            let states = &self.states;
            results.extend(resolve_element(
                installed,
                &element.positions,
                |position| locate(&path, &element.element_id, position),
                |id| {
                    states
                        .get(&(path.clone(), id))
                        .is_some_and(TracepointState::is_enabled)
                },
            ));
        }
        TracepointInstallationReport { results }
    }

    pub fn install_flags(
        &mut self,
        request: &FlagTracepointInstallationRequest,
    ) -> TracepointInstallationReport {
        let results = request
            .tracepoints
            .iter()
            .map(|&FlagTracepoint { tp_type, flags }| {
                if tp_type != TracepointType::ExceptionBreakpoint {
                    InstallationResult::NotFound
                } else if flags & FLAG_ENABLED == 0 {
                    self.flag_tracepoints.remove(&tp_type);
                    InstallationResult::FoundButWasUnset
                } else if self.flag_tracepoints.insert(tp_type, flags) == Some(flags) {
                    InstallationResult::FoundUnchanged
                } else {
                    InstallationResult::FoundAndSet
                }
            })
            .collect();
        TracepointInstallationReport { results }
    }

    /// Flags of an installed flag tracepoint, if any.
    pub fn flag_tracepoint(&self, tp_type: TracepointType) -> Option<u32> {
        self.flag_tracepoints.get(&tp_type).copied()
    }

    pub fn is_installed(&self, file_path: &str, element_id: &str, id: i64) -> bool {
        self.installed
            .get(&(file_path.to_string(), element_id.to_string()))
            .is_some_and(|ids| ids.contains(&id))
    }

    /// Decides whether an installed tracepoint fires at this point of execution.
    ///
    /// The guard expression, if any, is evaluated in `envir`. A guard that fails
    /// to parse or evaluate still fires so the user sees the problem, and the
    /// failure is recorded in the state flags.
    pub fn check_hit(
        &mut self,
        file_path: &str,
        element_id: &str,
        id: i64,
        interp: &mut dyn Interpreter,
        envir: Option<Handle>,
        ctx: &mut dyn EvalContext,
    ) -> Option<TracepointEvent> {
        if !self.is_installed(file_path, element_id, id) {
            return None;
        }
        let key = (file_path.to_string(), id);
        let state = self.states.get_mut(&key)?;
        if !state.is_enabled() || (state.tp_type.is_breakpoint() && !self.breakpoints_enabled) {
            return None;
        }

        let mut message = None;
        if let Some(expr) = state.expr.clone() {
            match eval_guard(interp, &expr, envir, ctx) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    warn!(file_path, id, error = %e, "Tracepoint condition failed");
                    state.flags |= match e {
                        EvalError::Parse { .. } => FLAG_EXPR_INVALID,
                        _ => FLAG_EXPR_EVAL_FAILED,
                    };
                    message = Some(e.to_string());
                }
            }
        }

        let event = TracepointEvent {
            kind: TracepointEventKind::AboutToHit,
            tp_type: state.tp_type,
            file_path: Some(state.file_path.clone()),
            id,
            label: state.element_label.clone(),
            flags: state.flags,
            message,
        };
        if state.is_temporary() {
            self.states.remove(&key);
            self.uninstall(file_path, id);
        }
        Some(event)
    }

    fn uninstall(&mut self, file_path: &str, id: i64) {
        for ((path, _), ids) in self.installed.iter_mut() {
            if path == file_path {
                ids.remove(&id);
            }
        }
    }
}

fn eval_guard(
    interp: &mut dyn Interpreter,
    expr: &str,
    envir: Option<Handle>,
    ctx: &mut dyn EvalContext,
) -> Result<bool, EvalError> {
    let parsed = interp.parse(expr)?;
    let result = interp.eval(parsed, envir, ctx)?;
    match interp.inspect_type(result)? {
        ExternalObject::Vector {
            store: Store::Logical(values),
            ..
        } => Ok(values.first() == Some(&Some(true))),
        _ => Err(EvalError::eval(format!(
            "condition `{expr}` did not evaluate to a logical value"
        ))),
    }
}
