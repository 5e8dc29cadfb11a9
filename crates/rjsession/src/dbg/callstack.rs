//! Call stacks and classification of synthetic wrapper frames.

use serde::{Deserialize, Serialize};

use super::srcref::{self, Srcref};
use crate::data::io::{WireFormat, WireReader, WireWriter};
use crate::error::ProtocolError;

pub const FLAG_TOPFRAME: u32 = 0x0000_1000;
pub const FLAG_NOSTEPPING: u32 = 0x0000_0100;
/// Frame belongs to a `source()` call; the low bits hold its index within the wrapper.
pub const FLAG_SOURCE: u32 = 0x0000_0010;
/// Frame belongs to the console command wrapper.
pub const FLAG_COMMAND: u32 = 0x0000_0020;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Position in the stack, 0 for the outermost frame.
    pub position: i32,
    pub call: Option<String>,
    /// Stable across refreshes while the frame is alive.
    pub handle: u64,
    pub file_name: Option<String>,
    pub file_timestamp: i64,
    pub expr_srcref: Option<Srcref>,
    pub flags: u32,
}

impl Frame {
    pub fn new(position: i32, call: impl Into<String>, handle: u64) -> Self {
        Self {
            position,
            call: Some(call.into()),
            handle,
            file_name: None,
            file_timestamp: 0,
            expr_srcref: None,
            flags: 0,
        }
    }

    pub fn is_top_frame(&self) -> bool {
        self.flags & FLAG_TOPFRAME != 0
    }

    /// The innermost frame of the console command wrapper.
    pub fn is_top_level_command(&self) -> bool {
        self.position == 3 && (self.flags & 0xff) == (FLAG_COMMAND | 2)
    }

    fn call_starts_with(&self, prefix: &str) -> bool {
        self.call.as_deref().is_some_and(|c| c.starts_with(prefix))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallStack {
    pub frames: Vec<Frame>,
}

impl CallStack {
    /// Builds a stack from raw frames, tagging wrapper frames and the top frame.
    pub fn classify(mut frames: Vec<Frame>) -> Self {
        tag_wrappers(&mut frames);
        if let Some(last) = frames.last_mut() {
            last.flags |= FLAG_TOPFRAME;
        }
        Self { frames }
    }

    pub fn by_position(&self, position: i32) -> Option<&Frame> {
        self.frames.iter().find(|f| f.position == position)
    }

    pub fn by_handle(&self, handle: u64) -> Option<&Frame> {
        self.frames.iter().find(|f| f.handle == handle)
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }
}

/// Tags `frames[i..]` with `flag | 0`, `flag | 1`, ... for each matching prefix
/// in order. Returns how many frames matched.
fn tag_run(frames: &mut [Frame], flag: u32, first: u32, prefixes: &[&str]) -> usize {
    let matched = prefixes
        .iter()
        .zip(frames.iter())
        .take_while(|(prefix, frame)| frame.call_starts_with(prefix))
        .count();
    if matched == prefixes.len() {
        for (k, frame) in frames[..matched].iter_mut().enumerate() {
            frame.flags |= flag | (first + k as u32);
        }
    }
    matched
}

fn tag_wrappers(frames: &mut [Frame]) {
    let n = frames.len();
    let mut i = 0;
    while i < n {
        let frame = &frames[i];
        if frame.call_starts_with("source(") {
            if frames.get(i + 1).is_some_and(|f| f.call_starts_with("eval.with.vis(")) {
                tag_run(&mut frames[i..], FLAG_SOURCE, 0, &["source(", "eval.with.vis("]);
                i += 1;
                if tag_run(&mut frames[i + 1..], FLAG_SOURCE, 2, &["eval.with.vis("]) == 1 {
                    i += 1;
                }
            } else if tag_run(&mut frames[i..], FLAG_SOURCE, 0, &["source(", "withVisible(", "eval("])
                == 3
            {
                i += 2;
                if tag_run(&mut frames[i + 1..], FLAG_SOURCE, 3, &["eval("]) == 1 {
                    i += 1;
                }
            }
        } else if frame.call_starts_with("rj:::.statet.evalCommand(")
            || frame.call_starts_with(".statet.evalCommand(")
        {
            frames[i].flags |= FLAG_COMMAND;
            if tag_run(&mut frames[i + 1..], FLAG_COMMAND, 1, &["eval("]) == 1 {
                i += 1;
                if tag_run(&mut frames[i + 1..], FLAG_COMMAND, 2, &["eval("]) == 1 {
                    i += 1;
                }
            }
        }
        i += 1;
    }
}

impl WireFormat for CallStack {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_len(self.frames.len());
        for frame in &self.frames {
            w.write_opt_str(frame.call.as_deref());
            w.write_u64(frame.handle);
            w.write_opt_str(frame.file_name.as_deref());
            w.write_i64(frame.file_timestamp);
            srcref::write_opt(w, frame.expr_srcref.as_ref());
            w.write_u32(frame.flags);
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let n = r.read_len("call stack", 25)?;
        let mut frames = Vec::with_capacity(n);
        for position in 0..n {
            frames.push(Frame {
                position: position as i32,
                call: r.read_opt_str()?,
                handle: r.read_u64()?,
                file_name: r.read_opt_str()?,
                file_timestamp: r.read_i64()?,
                expr_srcref: srcref::read_opt(r)?,
                flags: r.read_u32()?,
            });
        }
        Ok(Self { frames })
    }
}
