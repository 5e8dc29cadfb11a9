//! Source references and their relative arithmetic.
//!
//! A diff anchors a srcref to the begin line of a base srcref. Lines become
//! `1 + line - base_line`; columns and bytes are only kept relative when the
//! matching line delta is 1, otherwise they are NA. Any non-positive delta
//! means the diff cannot be expressed and callers fall back to absolute values.

use serde::{Deserialize, Serialize};

use crate::data::io::{WireFormat, WireReader, WireWriter};
use crate::error::ProtocolError;

pub const BEGIN_LINE: usize = 0;
pub const BEGIN_BYTE: usize = 1;
pub const END_LINE: usize = 2;
pub const END_BYTE: usize = 3;
pub const BEGIN_COLUMN: usize = 4;
pub const END_COLUMN: usize = 5;

pub const NA: i32 = i32::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Srcref([i32; 6]);

impl Srcref {
    pub const fn new(values: [i32; 6]) -> Self {
        Self(values)
    }

    /// Line/column form: begin line and column, end line and column; bytes follow columns.
    pub const fn span(begin_line: i32, begin_col: i32, end_line: i32, end_col: i32) -> Self {
        Self([begin_line, begin_col, end_line, end_col, begin_col, end_col])
    }

    pub const fn get(&self, idx: usize) -> i32 {
        self.0[idx]
    }

    pub fn known(&self, idx: usize) -> Option<i32> {
        let v = self.0[idx];
        (v != NA).then_some(v)
    }

    pub const fn as_array(&self) -> &[i32; 6] {
        &self.0
    }

    /// `rel` relative to the begin of `self`; `None` when a delta would not be positive.
    pub fn diff(&self, rel: &Srcref) -> Option<Srcref> {
        let base_line = self.positive(BEGIN_LINE);
        let mut out = [NA; 6];

        for (line, col, byte) in [
            (BEGIN_LINE, BEGIN_COLUMN, BEGIN_BYTE),
            (END_LINE, END_COLUMN, END_BYTE),
        ] {
            out[line] = delta(base_line, rel.positive(line))?;
            if out[line] == 1 {
                out[col] = delta(self.positive(BEGIN_COLUMN), rel.positive(col))?;
                out[byte] = delta(self.positive(BEGIN_BYTE), rel.positive(byte))?;
            }
        }
        Some(Srcref(out))
    }

    /// Inverse of [`diff`](Self::diff). Fields the diff dropped stay NA.
    pub fn add(&self, diff: &Srcref) -> Srcref {
        let base_line = self.positive(BEGIN_LINE);
        let mut out = [NA; 6];

        for (line, col, byte) in [
            (BEGIN_LINE, BEGIN_COLUMN, BEGIN_BYTE),
            (END_LINE, END_COLUMN, END_BYTE),
        ] {
            out[line] = sum(base_line, diff.positive(line));
            if diff.get(line) == 1 {
                out[col] = sum(self.positive(BEGIN_COLUMN), diff.positive(col));
                out[byte] = sum(self.positive(BEGIN_BYTE), diff.positive(byte));
            }
        }
        Srcref(out)
    }

    fn positive(&self, idx: usize) -> Option<i32> {
        let v = self.0[idx];
        (v > 0).then_some(v)
    }
}

/// `Some(NA)` when either side is unknown, `None` when the delta is not positive.
fn delta(base: Option<i32>, rel: Option<i32>) -> Option<i32> {
    match (base, rel) {
        (Some(b), Some(r)) => (r - b).checked_add(1).filter(|&d| d > 0),
        _ => Some(NA),
    }
}

/// NA when either side is unknown or the position does not fit.
fn sum(base: Option<i32>, diff: Option<i32>) -> i32 {
    match (base, diff) {
        (Some(b), Some(d)) => b.checked_add(d - 1).unwrap_or(NA),
        _ => NA,
    }
}

impl WireFormat for Srcref {
    fn write_to(&self, w: &mut WireWriter) {
        for &v in &self.0 {
            w.write_i32(v);
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let mut out = [NA; 6];
        for v in &mut out {
            *v = r.read_i32()?;
        }
        Ok(Srcref(out))
    }
}

pub(crate) fn write_opt(w: &mut WireWriter, srcref: Option<&Srcref>) {
    match srcref {
        Some(s) => {
            w.write_bool(true);
            s.write_to(w);
        }
        None => w.write_bool(false),
    }
}

pub(crate) fn read_opt(r: &mut WireReader<'_>) -> Result<Option<Srcref>, ProtocolError> {
    if r.read_bool()? {
        Srcref::read_from(r).map(Some)
    } else {
        Ok(None)
    }
}
