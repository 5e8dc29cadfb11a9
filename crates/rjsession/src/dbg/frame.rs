//! Frame details, debug flags on functions, and global debugger switches.

use serde::{Deserialize, Serialize};

use super::srcref::{self, Srcref};
use crate::data::io::{WireFormat, WireReader, WireWriter};
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameContextDetailRequest {
    pub position: i32,
}

impl WireFormat for FrameContextDetailRequest {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_i32(self.position);
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            position: r.read_i32()?,
        })
    }
}

/// Where the displayed source text of a frame comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum SourceType {
    Lines = 1,
    File = 2,
    SrcfileLines = 3,
    Deparse = 4,
}

impl SourceType {
    fn from_code(code: i32) -> Result<Option<Self>, ProtocolError> {
        Ok(Some(match code {
            0 => return Ok(None),
            1 => Self::Lines,
            2 => Self::File,
            3 => Self::SrcfileLines,
            4 => Self::Deparse,
            other => return Err(ProtocolError::unknown_tag("source type", other)),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameContext {
    pub position: i32,
    pub call: Option<String>,
    pub file_name: Option<String>,
    pub file_timestamp: i64,
    pub file_encoding: Option<String>,
    pub file_path: Option<String>,
    pub source_type: Option<SourceType>,
    pub source_code: Option<String>,
    pub source_srcref: Option<Srcref>,
    pub first_srcref: Option<Srcref>,
    pub last_srcref: Option<Srcref>,
    pub expr_srcref: Option<Srcref>,
}

impl WireFormat for FrameContext {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_i32(self.position);
        w.write_opt_str(self.call.as_deref());
        w.write_opt_str(self.file_name.as_deref());
        w.write_i64(self.file_timestamp);
        w.write_opt_str(self.file_encoding.as_deref());
        w.write_opt_str(self.file_path.as_deref());
        w.write_i32(self.source_type.map_or(0, |t| t as i32));
        w.write_opt_str(self.source_code.as_deref());
        for s in [
            &self.source_srcref,
            &self.first_srcref,
            &self.last_srcref,
            &self.expr_srcref,
        ] {
            srcref::write_opt(w, s.as_ref());
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            position: r.read_i32()?,
            call: r.read_opt_str()?,
            file_name: r.read_opt_str()?,
            file_timestamp: r.read_i64()?,
            file_encoding: r.read_opt_str()?,
            file_path: r.read_opt_str()?,
            source_type: SourceType::from_code(r.read_i32()?)?,
            source_code: r.read_opt_str()?,
            source_srcref: srcref::read_opt(r)?,
            first_srcref: srcref::read_opt(r)?,
            last_srcref: srcref::read_opt(r)?,
            expr_srcref: srcref::read_opt(r)?,
        })
    }
}

/// Function whose debug flag should change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebugTarget {
    /// The function running in the frame with this handle.
    Frame { handle: u64 },
    /// A function by name, looked up from the frame at `position`.
    Function { position: i32, name: String },
}

const SET_DEBUG_FRAME: i32 = 1 << 0;
const SET_DEBUG_FUNCTION: i32 = 1 << 1;
const SET_DEBUG_TEMP: i32 = 1 << 8;
const SET_DEBUG_ENABLED: i32 = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDebugRequest {
    pub target: DebugTarget,
    pub enable: bool,
    /// Debug only the next call (`debugonce`).
    pub temporary: bool,
}

impl WireFormat for SetDebugRequest {
    fn write_to(&self, w: &mut WireWriter) {
        let mut properties = match self.target {
            DebugTarget::Frame { .. } => SET_DEBUG_FRAME,
            DebugTarget::Function { .. } => SET_DEBUG_FUNCTION,
        };
        if self.enable {
            properties |= SET_DEBUG_ENABLED;
        }
        if self.temporary {
            properties |= SET_DEBUG_TEMP;
        }
        w.write_i32(properties);
        match &self.target {
            DebugTarget::Frame { handle } => w.write_u64(*handle),
            DebugTarget::Function { position, name } => {
                w.write_i32(*position);
                w.write_str(name);
            }
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let properties = r.read_i32()?;
        let target = if properties & SET_DEBUG_FRAME != 0 {
            DebugTarget::Frame {
                handle: r.read_u64()?,
            }
        } else if properties & SET_DEBUG_FUNCTION != 0 {
            DebugTarget::Function {
                position: r.read_i32()?,
                name: r.read_str()?,
            }
        } else {
            return Err(ProtocolError::unknown_tag("set debug target", properties & 0xff));
        };
        Ok(Self {
            target,
            enable: properties & SET_DEBUG_ENABLED != 0,
            temporary: properties & SET_DEBUG_TEMP != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDebugReport {
    pub changed: bool,
}

impl WireFormat for SetDebugReport {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_bool(self.changed);
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            changed: r.read_bool()?,
        })
    }
}

const ENABLE_BREAKPOINTS: i32 = 0x1;

/// Global breakpoint switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbgEnablement {
    pub breakpoints_enabled: bool,
}

impl Default for DbgEnablement {
    fn default() -> Self {
        Self {
            breakpoints_enabled: true,
        }
    }
}

impl WireFormat for DbgEnablement {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_i32(if self.breakpoints_enabled {
            ENABLE_BREAKPOINTS
        } else {
            0
        });
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            breakpoints_enabled: r.read_i32()? & ENABLE_BREAKPOINTS != 0,
        })
    }
}

/// Step filter switch; when on, stepping skips frames flagged no-stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbgFilterState {
    pub step_filter: bool,
}

impl WireFormat for DbgFilterState {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_i32(self.step_filter as i32);
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            step_filter: r.read_i32()? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_debug_by_function_keeps_flags() {
        let request = SetDebugRequest {
            target: DebugTarget::Function {
                position: 2,
                name: "f".into(),
            },
            enable: true,
            temporary: true,
        };
        let mut w = WireWriter::new();
        request.write_to(&mut w);
        let bytes = w.finish();
        let decoded = SetDebugRequest::read_from(&mut WireReader::new(&bytes)).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn frame_context_without_source() {
        let ctx = FrameContext {
            position: 1,
            call: Some("f()".into()),
            expr_srcref: Some(Srcref::span(4, 2, 4, 9)),
            ..FrameContext::default()
        };
        let mut w = WireWriter::new();
        ctx.write_to(&mut w);
        let bytes = w.finish();
        let mut r = WireReader::new(&bytes);
        assert_eq!(FrameContext::read_from(&mut r).unwrap(), ctx);
        r.finish().unwrap();
    }

    #[test]
    fn enablement_defaults_on() {
        assert!(DbgEnablement::default().breakpoints_enabled);
        assert!(!DbgFilterState::default().step_filter);
    }
}
