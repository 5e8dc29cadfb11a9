//! Tracepoint identities, positions and state lists.
//!
//! State lists are delta encoded: an entry whose file path or element id
//! repeats the previous entry's writes a null string instead, and a deleted
//! entry stops after its file path.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::srcref::{self, Srcref};
use crate::data::io::{WireFormat, WireReader, WireWriter};
use crate::error::ProtocolError;

pub const FLAG_ENABLED: u32 = 0x0000_0001;
pub const FLAG_TEMPORARY: u32 = 0x0000_0002;
pub const FLAG_MB_ENTRY: u32 = 0x0001_0000;
pub const FLAG_MB_EXIT: u32 = 0x0002_0000;
pub const FLAG_EXPR_INVALID: u32 = 0x0100_0000;
pub const FLAG_EXPR_EVAL_FAILED: u32 = 0x0200_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracepointType {
    FunctionBreakpoint,
    LineBreakpoint,
    TopLevelLineBreakpoint,
    ExceptionBreakpoint,
    Deleted,
}

impl TracepointType {
    pub fn code(self) -> i32 {
        match self {
            Self::FunctionBreakpoint => 0x0000_0001,
            Self::LineBreakpoint => 0x0000_0002,
            Self::TopLevelLineBreakpoint => 0x0000_0004,
            Self::ExceptionBreakpoint => 0x0000_0010,
            Self::Deleted => 0x0100_0000,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, ProtocolError> {
        Ok(match code {
            0x0000_0001 => Self::FunctionBreakpoint,
            0x0000_0002 => Self::LineBreakpoint,
            0x0000_0004 => Self::TopLevelLineBreakpoint,
            0x0000_0010 => Self::ExceptionBreakpoint,
            0x0100_0000 => Self::Deleted,
            other => return Err(ProtocolError::unknown_tag("tracepoint type", other)),
        })
    }

    pub fn is_breakpoint(self) -> bool {
        matches!(
            self,
            Self::FunctionBreakpoint | Self::LineBreakpoint | Self::TopLevelLineBreakpoint
        )
    }
}

impl WireFormat for TracepointType {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_i32(self.code());
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Self::from_code(r.read_i32()?)
    }
}

/// Where a tracepoint sits inside one element, as an index path into its expression tree.
///
/// Ordered depth first: `[1] < [1, 2] < [2]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracepointPosition {
    pub tp_type: TracepointType,
    pub id: i64,
    pub index: Vec<i32>,
    pub srcref: Option<Srcref>,
}

impl TracepointPosition {
    pub fn new(tp_type: TracepointType, id: i64, index: Vec<i32>) -> Self {
        Self {
            tp_type,
            id,
            index,
            srcref: None,
        }
    }
}

impl Ord for TracepointPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        // slice ordering puts a prefix before anything extending it
        self.index
            .cmp(&other.index)
            .then(self.tp_type.cmp(&other.tp_type))
            .then(self.id.cmp(&other.id))
            .then_with(|| self.srcref.map(|s| *s.as_array()).cmp(&other.srcref.map(|s| *s.as_array())))
    }
}

impl PartialOrd for TracepointPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl WireFormat for TracepointPosition {
    fn write_to(&self, w: &mut WireWriter) {
        self.tp_type.write_to(w);
        w.write_i64(self.id);
        w.write_ints(&self.index);
        srcref::write_opt(w, self.srcref.as_ref());
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            tp_type: TracepointType::read_from(r)?,
            id: r.read_i64()?,
            index: r.read_ints()?,
            srcref: srcref::read_opt(r)?,
        })
    }
}

/// Client-side tracepoint settings, synced to the engine in batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracepointState {
    pub tp_type: TracepointType,
    pub id: i64,
    pub file_path: String,
    pub element_id: String,
    pub index: Vec<i32>,
    pub element_label: Option<String>,
    pub flags: u32,
    /// Guard condition; the tracepoint only fires when it evaluates to TRUE.
    pub expr: Option<String>,
}

impl TracepointState {
    pub fn deleted(file_path: impl Into<String>, id: i64) -> Self {
        Self {
            tp_type: TracepointType::Deleted,
            id,
            file_path: file_path.into(),
            element_id: String::new(),
            index: Vec::new(),
            element_label: None,
            flags: 0,
            expr: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tp_type != TracepointType::Deleted && self.flags & FLAG_ENABLED != 0
    }

    pub fn is_temporary(&self) -> bool {
        self.flags & FLAG_TEMPORARY != 0
    }
}

impl Ord for TracepointState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_path
            .cmp(&other.file_path)
            .then_with(|| self.element_id.cmp(&other.element_id))
            .then(self.id.cmp(&other.id))
            .then(self.tp_type.cmp(&other.tp_type))
            .then_with(|| self.index.cmp(&other.index))
            .then(self.flags.cmp(&other.flags))
            .then_with(|| self.element_label.cmp(&other.element_label))
            .then_with(|| self.expr.cmp(&other.expr))
    }
}

impl PartialOrd for TracepointState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn write_state_list(w: &mut WireWriter, states: &[TracepointState]) {
    w.write_len(states.len());
    let mut last_path: Option<&str> = None;
    let mut last_element: Option<&str> = None;
    for state in states {
        state.tp_type.write_to(w);
        w.write_i64(state.id);
        if last_path == Some(state.file_path.as_str()) {
            w.write_opt_str(None);
        } else {
            w.write_str(&state.file_path);
            last_path = Some(state.file_path.as_str());
        }
        if state.tp_type == TracepointType::Deleted {
            continue;
        }
        if last_element == Some(state.element_id.as_str()) {
            w.write_opt_str(None);
        } else {
            w.write_str(&state.element_id);
            last_element = Some(state.element_id.as_str());
        }
        w.write_ints(&state.index);
        w.write_opt_str(state.element_label.as_deref());
        w.write_u32(state.flags);
        w.write_opt_str(state.expr.as_deref());
    }
}

pub fn read_state_list(r: &mut WireReader<'_>) -> Result<Vec<TracepointState>, ProtocolError> {
    let n = r.read_len("tracepoint states", 16)?;
    let mut out = Vec::with_capacity(n);
    let mut last_path: Option<String> = None;
    let mut last_element: Option<String> = None;
    for _ in 0..n {
        let tp_type = TracepointType::read_from(r)?;
        let id = r.read_i64()?;
        let file_path = inherit(r.read_opt_str()?, &mut last_path, "file path")?;
        if tp_type == TracepointType::Deleted {
            out.push(TracepointState::deleted(file_path, id));
            continue;
        }
        let element_id = inherit(r.read_opt_str()?, &mut last_element, "element id")?;
        out.push(TracepointState {
            tp_type,
            id,
            file_path,
            element_id,
            index: r.read_ints()?,
            element_label: r.read_opt_str()?,
            flags: r.read_u32()?,
            expr: r.read_opt_str()?,
        });
    }
    Ok(out)
}

/// Takes the explicit value, or the last seen one when the entry omitted it.
fn inherit(
    value: Option<String>,
    last: &mut Option<String>,
    what: &'static str,
) -> Result<String, ProtocolError> {
    match value {
        Some(v) => {
            *last = Some(v.clone());
            Ok(v)
        }
        None => last.clone().ok_or(ProtocolError::InvalidLength {
            what,
            length: crate::data::io::NULL_LENGTH.into(),
        }),
    }
}

const UPDATE_RESET: i32 = 0x1;

/// Batch of state changes; `reset` drops all engine-side states first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracepointStatesUpdate {
    pub reset: bool,
    pub states: Vec<TracepointState>,
}

impl WireFormat for TracepointStatesUpdate {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_i32(if self.reset { UPDATE_RESET } else { 0 });
        write_state_list(w, &self.states);
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let properties = r.read_i32()?;
        Ok(Self {
            reset: properties & UPDATE_RESET != 0,
            states: read_state_list(r)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracepointEventKind {
    AboutToHit,
}

/// Engine notification that a tracepoint fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracepointEvent {
    pub kind: TracepointEventKind,
    pub tp_type: TracepointType,
    pub file_path: Option<String>,
    pub id: i64,
    pub label: Option<String>,
    pub flags: u32,
    pub message: Option<String>,
}

impl WireFormat for TracepointEvent {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_u8(match self.kind {
            TracepointEventKind::AboutToHit => 0x01,
        });
        self.tp_type.write_to(w);
        w.write_opt_str(self.file_path.as_deref());
        w.write_i64(self.id);
        w.write_opt_str(self.label.as_deref());
        w.write_u32(self.flags);
        w.write_opt_str(self.message.as_deref());
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let kind = match r.read_u8()? {
            0x01 => TracepointEventKind::AboutToHit,
            other => return Err(ProtocolError::unknown_tag("tracepoint event", other)),
        };
        Ok(Self {
            kind,
            tp_type: TracepointType::read_from(r)?,
            file_path: r.read_opt_str()?,
            id: r.read_i64()?,
            label: r.read_opt_str()?,
            flags: r.read_u32()?,
            message: r.read_opt_str()?,
        })
    }
}
