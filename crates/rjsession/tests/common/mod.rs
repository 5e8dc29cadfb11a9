//! Scripted interpreter and client helpers shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rjsession::data::coerce;
use rjsession::dbg::{CtrlOp, Frame, FrameContext, SetDebugRequest, TracepointPosition};
use rjsession::{
    ClientId, CommandBatch, CommandExchange, CommandItem, DebugBackend, EvalContext, EvalError,
    ExternalObject, Handle, Interpreter, SessionConfig, SlotId, Value,
};

pub fn test_config() -> SessionConfig {
    SessionConfig::new().with_idle_interval(Duration::from_millis(5))
}

/// A tiny expression language, just enough to drive the session:
/// `cat("text")`, `stop("msg")`, `sum(name)`, `TRUE`, `FALSE`, integer
/// literals like `3L`, variable names, and `repeat` which spins until
/// interrupted.
#[derive(Default)]
pub struct ScriptedInterpreter {
    objects: HashMap<u64, Value>,
    exprs: HashMap<u64, String>,
    globals: HashMap<String, u64>,
    /// Variables visible in a frame environment, keyed by its handle.
    pub frames: HashMap<u64, HashMap<String, Value>>,
    next: u64,
    pub debug: Option<ScriptedDebugger>,
    /// Interrupted by `repeat` after its first safe point.
    pub interrupt_via: Option<Arc<CommandExchange>>,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debugger(debug: ScriptedDebugger) -> Self {
        Self {
            debug: Some(debug),
            ..Self::default()
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name).and_then(|h| self.objects.get(h))
    }

    fn alloc(&mut self, value: Value) -> Handle {
        self.next += 1;
        self.objects.insert(self.next, value);
        Handle::new(self.next)
    }

    fn lookup(&self, name: &str, envir: Option<Handle>) -> Result<Value, EvalError> {
        if let Some(env) = envir.and_then(|h| self.frames.get(&h.get()))
            && let Some(value) = env.get(name)
        {
            return Ok(value.clone());
        }
        self.global(name)
            .cloned()
            .ok_or_else(|| EvalError::eval(format!("object '{name}' not found")))
    }
}

fn string_arg<'a>(text: &'a str, fun: &str) -> Option<&'a str> {
    text.strip_prefix(fun)?
        .strip_prefix("(\"")?
        .strip_suffix("\")")
}

impl Interpreter for ScriptedInterpreter {
    fn parse(&mut self, text: &str) -> Result<Handle, EvalError> {
        let text = text.trim();
        if text.matches('(').count() != text.matches(')').count() {
            return Err(EvalError::parse(format!("unexpected end of input: {text}")));
        }
        self.next += 1;
        self.exprs.insert(self.next, text.to_string());
        Ok(Handle::new(self.next))
    }

    fn eval(
        &mut self,
        expr: Handle,
        envir: Option<Handle>,
        ctx: &mut dyn EvalContext,
    ) -> Result<Handle, EvalError> {
        if ctx.is_interrupted() {
            return Err(EvalError::Interrupted);
        }
        let text = self
            .exprs
            .get(&expr.get())
            .cloned()
            .ok_or(EvalError::InvalidReference { handle: expr.get() })?;
        let value = if let Some(out) = string_arg(&text, "cat") {
            ctx.write_out(out);
            Value::Null
        } else if let Some(message) = string_arg(&text, "stop") {
            return Err(EvalError::eval(message));
        } else if let Some(name) = text.strip_prefix("sum(").and_then(|s| s.strip_suffix(')')) {
            let arg = self.lookup(name, envir)?;
            let store = arg
                .store()
                .ok_or_else(|| EvalError::eval("invalid 'type' of argument"))?;
            Value::vector(coerce::sum(store)?)
        } else if text == "repeat" {
            if let Some(exchange) = &self.interrupt_via {
                exchange.interrupt(SlotId::PRIMARY);
            }
            while !ctx.is_interrupted() {
                std::thread::yield_now();
            }
            return Err(EvalError::Interrupted);
        } else if text == "TRUE" || text == "FALSE" {
            Value::vector(rjsession::data::Store::Logical(vec![Some(text == "TRUE")]))
        } else if let Some(n) = text.strip_suffix('L').and_then(|n| n.parse::<i32>().ok()) {
            Value::integer([n])
        } else {
            self.lookup(&text, envir)?
        };
        Ok(self.alloc(value))
    }

    fn assign_by_expression(
        &mut self,
        target: &str,
        value: Handle,
        _ctx: &mut dyn EvalContext,
    ) -> Result<(), EvalError> {
        if !self.objects.contains_key(&value.get()) {
            return Err(EvalError::InvalidReference { handle: value.get() });
        }
        self.globals.insert(target.to_string(), value.get());
        Ok(())
    }

    fn get_attr(&mut self, _obj: Handle, _name: &str) -> Result<Option<Handle>, EvalError> {
        Ok(None)
    }

    fn list_attrs(&mut self, obj: Handle) -> Result<Vec<(String, Handle)>, EvalError> {
        let attrs: Vec<(String, Value)> = self
            .objects
            .get(&obj.get())
            .ok_or(EvalError::InvalidReference { handle: obj.get() })?
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(attrs
            .into_iter()
            .map(|(name, value)| (name, self.alloc(value)))
            .collect())
    }

    fn inspect_type(&mut self, obj: Handle) -> Result<ExternalObject, EvalError> {
        let value = self
            .objects
            .get(&obj.get())
            .ok_or(EvalError::InvalidReference { handle: obj.get() })?;
        Ok(match value {
            Value::Null => ExternalObject::Null,
            Value::Vector(v) => ExternalObject::Vector {
                store: v.store.clone(),
                names: v.names.clone(),
                dim: None,
                dimnames: None,
            },
            other => ExternalObject::Other {
                class_name: other.class_name(),
            },
        })
    }

    fn to_external(&mut self, value: &Value) -> Result<Handle, EvalError> {
        Ok(self.alloc(value.clone()))
    }

    fn debugger(&mut self) -> Option<&mut dyn DebugBackend> {
        self.debug.as_mut().map(|d| d as &mut dyn DebugBackend)
    }
}

/// Debug backend whose stack and suspension state the test sets directly.
#[derive(Debug, Default)]
pub struct ScriptedDebugger {
    pub frames: Vec<Frame>,
    pub suspended: bool,
    pub accept_suspend: bool,
    pub ctrl_log: Vec<(CtrlOp, Option<u64>)>,
    /// `(file path, element id, tracepoint id)` that resolve in the current parse.
    pub live: HashSet<(String, String, i64)>,
    pub debug_flags: HashSet<u64>,
}

impl DebugBackend for ScriptedDebugger {
    fn call_stack(&mut self) -> Result<Vec<Frame>, EvalError> {
        Ok(self.frames.clone())
    }

    fn frame_context(&mut self, frame: &Frame) -> Result<FrameContext, EvalError> {
        Ok(FrameContext {
            position: frame.position,
            call: frame.call.clone(),
            file_name: frame.file_name.clone(),
            file_timestamp: frame.file_timestamp,
            ..FrameContext::default()
        })
    }

    fn set_debug(&mut self, request: &SetDebugRequest) -> Result<bool, EvalError> {
        let key = match request.target {
            rjsession::dbg::DebugTarget::Frame { handle } => handle,
            rjsession::dbg::DebugTarget::Function { position, .. } => position as u64,
        };
        Ok(if request.enable {
            self.debug_flags.insert(key)
        } else {
            self.debug_flags.remove(&key)
        })
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn request_suspend(&mut self) -> bool {
        if self.accept_suspend {
            self.suspended = true;
        }
        self.accept_suspend
    }

    fn exec_ctrl(&mut self, op: CtrlOp, frame: Option<u64>) -> bool {
        self.ctrl_log.push((op, frame));
        if op == CtrlOp::Resume {
            self.suspended = false;
        }
        true
    }

    fn locate_tracepoint(
        &mut self,
        file_path: &str,
        element_id: &str,
        position: &TracepointPosition,
    ) -> bool {
        self.live
            .contains(&(file_path.to_string(), element_id.to_string(), position.id))
    }
}

/// A client attached to one slot, driving it with blocking calls.
pub struct TestClient {
    pub exchange: Arc<CommandExchange>,
    pub slot: SlotId,
    pub id: ClientId,
}

impl TestClient {
    pub fn connect(exchange: &Arc<CommandExchange>, slot: SlotId) -> Self {
        let id = exchange.connect_blocking(slot).unwrap();
        Self {
            exchange: Arc::clone(exchange),
            slot,
            id,
        }
    }

    pub fn poll(&self, items: Vec<CommandItem>) -> CommandBatch {
        self.exchange
            .submit_from_client_blocking(self.slot, self.id, items)
            .unwrap()
    }

    /// Polls until an item matching `pred` shows up, collecting everything seen on the way.
    pub fn poll_until(
        &self,
        items: Vec<CommandItem>,
        pred: impl Fn(&CommandItem) -> bool,
    ) -> Vec<CommandItem> {
        let mut seen = Vec::new();
        let mut next = items;
        loop {
            let batch = self.poll(std::mem::take(&mut next));
            let found = batch.items.iter().any(&pred);
            seen.extend(batch.items);
            if found {
                return seen;
            }
        }
    }

    pub fn disconnect(&self) {
        self.exchange.disconnect(self.slot, self.id);
    }
}
