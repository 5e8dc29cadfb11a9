//! Boundary to the embedded interpreter.
//!
//! The session only talks to the interpreter through [`Interpreter`]; how the
//! adapter reaches the native engine is its own business. Objects are keyed by
//! opaque [`Handle`]s that stay valid until the adapter releases them.

use crate::data::{Names, Store, Value};
use crate::dbg::{CtrlOp, Frame, FrameContext, SetDebugRequest, TracepointPosition};
use crate::error::EvalError;

/// Opaque interpreter object handle. Zero never refers to a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One level of a live object, children left as handles.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalObject {
    Null,
    Missing,
    Vector {
        store: Store,
        names: Option<Names>,
        dim: Option<Vec<i32>>,
        dimnames: Option<Vec<Option<Names>>>,
    },
    List {
        elements: Vec<Handle>,
        names: Option<Names>,
    },
    DataFrame {
        columns: Vec<Handle>,
        column_names: Names,
        row_count: usize,
        row_names: Option<Names>,
    },
    Environment {
        name: String,
        bindings: Vec<(String, Handle)>,
    },
    Function {
        header: String,
    },
    S4Object {
        class_name: String,
        slots: Vec<(String, Handle)>,
    },
    Other {
        class_name: String,
    },
}

/// Callbacks available to the interpreter while it evaluates.
pub trait EvalContext {
    fn write_out(&mut self, text: &str);

    fn write_err(&mut self, text: &str);

    /// Checked at safe points; evaluation should stop with [`EvalError::Interrupted`].
    fn is_interrupted(&self) -> bool;
}

/// The interpreter as seen by the session.
pub trait Interpreter {
    fn parse(&mut self, text: &str) -> Result<Handle, EvalError>;

    /// Evaluates a parsed expression in `envir`, or the global environment.
    fn eval(
        &mut self,
        expr: Handle,
        envir: Option<Handle>,
        ctx: &mut dyn EvalContext,
    ) -> Result<Handle, EvalError>;

    /// Assigns `value` to the target expression, e.g. `x` or `y$a[2]`.
    fn assign_by_expression(
        &mut self,
        target: &str,
        value: Handle,
        ctx: &mut dyn EvalContext,
    ) -> Result<(), EvalError>;

    fn get_attr(&mut self, obj: Handle, name: &str) -> Result<Option<Handle>, EvalError>;

    /// All attributes of `obj` in order, including structural ones such as
    /// `class`, `names` or `dim`.
    fn list_attrs(&mut self, _obj: Handle) -> Result<Vec<(String, Handle)>, EvalError> {
        Ok(Vec::new())
    }

    fn inspect_type(&mut self, obj: Handle) -> Result<ExternalObject, EvalError>;

    fn to_external(&mut self, value: &Value) -> Result<Handle, EvalError>;

    /// Debug support, when the adapter has it.
    fn debugger(&mut self) -> Option<&mut dyn DebugBackend> {
        None
    }
}

/// Engine-side debugging hooks.
pub trait DebugBackend {
    /// Current frames, outermost first, without classification flags.
    fn call_stack(&mut self) -> Result<Vec<Frame>, EvalError>;

    fn frame_context(&mut self, frame: &Frame) -> Result<FrameContext, EvalError>;

    /// Returns whether the debug state actually changed.
    fn set_debug(&mut self, request: &SetDebugRequest) -> Result<bool, EvalError>;

    fn is_suspended(&self) -> bool;

    /// Asks the engine to suspend at the next safe point.
    fn request_suspend(&mut self) -> bool;

    /// Runs a step-control op. `frame` is the target frame handle of a step return.
    fn exec_ctrl(&mut self, op: CtrlOp, frame: Option<u64>) -> bool;

    /// Whether `position` still resolves inside the current parse of the element.
    fn locate_tracepoint(
        &mut self,
        file_path: &str,
        element_id: &str,
        position: &TracepointPosition,
    ) -> bool;
}
