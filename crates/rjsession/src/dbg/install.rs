//! Tracepoint installation requests and per-position results.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::srcref::{self, Srcref};
use super::tracepoint::{TracepointPosition, TracepointType};
use crate::data::io::{WireFormat, WireReader, WireWriter};
use crate::error::ProtocolError;

/// Identity of a source file as the client last saw it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SrcfileData {
    pub path: Option<String>,
    pub name: Option<String>,
    /// Modification time in seconds, 0 when unknown.
    pub timestamp: i64,
}

impl SrcfileData {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            name: None,
            timestamp: 0,
        }
    }

    /// Key used to group tracepoints by file: the path, else the name.
    pub fn key(&self) -> &str {
        self.path.as_deref().or(self.name.as_deref()).unwrap_or("")
    }
}

impl WireFormat for SrcfileData {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_opt_str(self.path.as_deref());
        w.write_opt_str(self.name.as_deref());
        w.write_i64(self.timestamp);
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            path: r.read_opt_str()?,
            name: r.read_opt_str()?,
            timestamp: r.read_i64()?,
        })
    }
}

/// Desired tracepoints inside one top-level element of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementTracepointPositions {
    pub srcfile: SrcfileData,
    pub element_id: String,
    pub element_srcref: Option<Srcref>,
    pub positions: Vec<TracepointPosition>,
}

impl WireFormat for ElementTracepointPositions {
    fn write_to(&self, w: &mut WireWriter) {
        self.srcfile.write_to(w);
        w.write_str(&self.element_id);
        srcref::write_opt(w, self.element_srcref.as_ref());
        w.write_len(self.positions.len());
        for position in &self.positions {
            position.write_to(w);
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let srcfile = SrcfileData::read_from(r)?;
        let element_id = r.read_str()?;
        let element_srcref = srcref::read_opt(r)?;
        let n = r.read_len("tracepoint positions", 20)?;
        let mut positions = Vec::with_capacity(n);
        for _ in 0..n {
            positions.push(TracepointPosition::read_from(r)?);
        }
        Ok(Self {
            srcfile,
            element_id,
            element_srcref,
            positions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TracepointInstallationRequest {
    pub elements: Vec<ElementTracepointPositions>,
}

impl WireFormat for TracepointInstallationRequest {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_len(self.elements.len());
        for element in &self.elements {
            element.write_to(w);
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let n = r.read_len("installation elements", 21)?;
        let mut elements = Vec::with_capacity(n);
        for _ in 0..n {
            elements.push(ElementTracepointPositions::read_from(r)?);
        }
        Ok(Self { elements })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum InstallationResult {
    /// The position no longer resolves in the current parse of the element.
    NotFound = 1,
    FoundUnchanged = 2,
    /// Resolved, but the tracepoint is disabled or unknown and was removed.
    FoundButWasUnset = 3,
    FoundAndSet = 4,
}

impl InstallationResult {
    fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            1 => Self::NotFound,
            2 => Self::FoundUnchanged,
            3 => Self::FoundButWasUnset,
            4 => Self::FoundAndSet,
            other => return Err(ProtocolError::unknown_tag("installation result", other)),
        })
    }
}

/// One result per requested position, flattened across elements in request order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TracepointInstallationReport {
    pub results: Vec<InstallationResult>,
}

impl WireFormat for TracepointInstallationReport {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_len(self.results.len());
        for result in &self.results {
            w.write_u8(*result as u8);
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let n = r.read_len("installation results", 1)?;
        let mut results = Vec::with_capacity(n);
        for _ in 0..n {
            results.push(InstallationResult::from_code(r.read_u8()?)?);
        }
        Ok(Self { results })
    }
}

/// A tracepoint that is not bound to a source position, such as an exception breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagTracepoint {
    pub tp_type: TracepointType,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlagTracepointInstallationRequest {
    pub tracepoints: Vec<FlagTracepoint>,
}

impl WireFormat for FlagTracepointInstallationRequest {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_len(self.tracepoints.len());
        for tp in &self.tracepoints {
            tp.tp_type.write_to(w);
            w.write_u32(tp.flags);
        }
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let n = r.read_len("flag tracepoints", 8)?;
        let mut tracepoints = Vec::with_capacity(n);
        for _ in 0..n {
            tracepoints.push(FlagTracepoint {
                tp_type: TracepointType::read_from(r)?,
                flags: r.read_u32()?,
            });
        }
        Ok(Self { tracepoints })
    }
}

/// Re-resolves the requested positions of one element against its live parse.
///
/// `installed` holds the ids currently installed in the element and is left
/// holding exactly the ids that ended up set. Ids installed before but absent
/// from `positions` are dropped.
pub fn resolve_element(
    installed: &mut BTreeSet<i64>,
    positions: &[TracepointPosition],
    mut locate: impl FnMut(&TracepointPosition) -> bool,
    is_enabled: impl Fn(i64) -> bool,
) -> Vec<InstallationResult> {
    let mut now_set = BTreeSet::new();
    let results = positions
        .iter()
        .map(|position| {
            if !locate(position) {
                InstallationResult::NotFound
            } else if !is_enabled(position.id) {
                InstallationResult::FoundButWasUnset
            } else {
                now_set.insert(position.id);
                if installed.contains(&position.id) {
                    InstallationResult::FoundUnchanged
                } else {
                    InstallationResult::FoundAndSet
                }
            }
        })
        .collect();
    *installed = now_set;
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lb(id: i64, index: Vec<i32>) -> TracepointPosition {
        TracepointPosition::new(TracepointType::LineBreakpoint, id, index)
    }

    #[test]
    fn results_follow_request_order() {
        let mut installed = BTreeSet::from([1]);
        let positions = [lb(1, vec![2]), lb(2, vec![3]), lb(3, vec![9])];
        let results = resolve_element(&mut installed, &positions, |p| p.id != 3, |_| true);
        assert_eq!(
            results,
            [
                InstallationResult::FoundUnchanged,
                InstallationResult::FoundAndSet,
                InstallationResult::NotFound
            ]
        );
        assert_eq!(installed, BTreeSet::from([1, 2]));
    }

    #[test]
    fn disabled_positions_are_unset() {
        let mut installed = BTreeSet::from([4, 5]);
        let results = resolve_element(&mut installed, &[lb(4, vec![1])], |_| true, |id| id != 4);
        assert_eq!(results, [InstallationResult::FoundButWasUnset]);
        assert!(installed.is_empty());
    }

    #[test]
    fn request_survives_wire() {
        let request = TracepointInstallationRequest {
            elements: vec![ElementTracepointPositions {
                srcfile: SrcfileData {
                    path: Some("/tmp/a.R".into()),
                    name: Some("a.R".into()),
                    timestamp: 1_700_000_000,
                },
                element_id: "f".into(),
                element_srcref: Some(Srcref::span(1, 1, 5, 1)),
                positions: vec![lb(1, vec![3, 2])],
            }],
        };
        let mut w = WireWriter::new();
        request.write_to(&mut w);
        let bytes = w.finish();
        let mut r = WireReader::new(&bytes);
        assert_eq!(TracepointInstallationRequest::read_from(&mut r).unwrap(), request);
        r.finish().unwrap();
    }

    #[test]
    fn flag_request_survives_wire() {
        let request = FlagTracepointInstallationRequest {
            tracepoints: vec![
                FlagTracepoint {
                    tp_type: TracepointType::ExceptionBreakpoint,
                    flags: 1,
                },
                FlagTracepoint {
                    tp_type: TracepointType::ExceptionBreakpoint,
                    flags: 0,
                },
            ],
        };
        let mut w = WireWriter::new();
        request.write_to(&mut w);
        let bytes = w.finish();
        assert_eq!(bytes.len(), 4 + 2 * 8);
        let mut r = WireReader::new(&bytes);
        assert_eq!(FlagTracepointInstallationRequest::read_from(&mut r).unwrap(), request);
        r.finish().unwrap();
    }

    #[test]
    fn report_snapshot() {
        let report = TracepointInstallationReport {
            results: vec![InstallationResult::FoundAndSet, InstallationResult::NotFound],
        };
        insta::assert_json_snapshot!(report, @r###"
        {
          "results": [
            "found_and_set",
            "not_found"
          ]
        }
        "###);
    }
}
