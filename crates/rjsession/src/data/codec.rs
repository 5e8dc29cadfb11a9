//! Binary codec for [`Value`].
//!
//! Every encoded value starts with a mode byte. In struct-only mode the
//! encoder writes shapes (lengths, dims, names) but no store payload, and the
//! decoder never expects any, so one flag read up front covers the whole tree.
//!
//! Nesting is bounded by [`CodecLimits`]. The encoder degrades anything nested
//! deeper than `max_depth` to a [`Reference`] placeholder and writes oversized
//! environments as references; the decoder rejects input that breaks either
//! bound.

use serde::{Deserialize, Serialize};
use tokio_util::bytes::Bytes;

use super::io::{WireReader, WireWriter};
use super::store::{Complex, Factor, Names, Real, Store, StoreShape, StoreType};
use super::value::{
    Array, Attributes, DataFrame, Environment, Function, List, Reference, S4Object, Value, Vector,
};
use crate::error::{EvalError, ProtocolError};
use crate::interpreter::{ExternalObject, Handle, Interpreter};

mod tag {
    pub const NULL: u8 = 0x01;
    pub const MISSING: u8 = 0x02;
    pub const VECTOR: u8 = 0x10;
    pub const ARRAY: u8 = 0x11;
    pub const LIST: u8 = 0x12;
    pub const DATA_FRAME: u8 = 0x13;
    pub const ENVIRONMENT: u8 = 0x14;
    pub const FUNCTION: u8 = 0x15;
    pub const S4_OBJECT: u8 = 0x16;
    pub const REFERENCE: u8 = 0x17;
    pub const OTHER: u8 = 0x18;

    /// Tags that never nest other values.
    pub fn is_leaf(tag: u8) -> bool {
        matches!(tag, NULL | MISSING | FUNCTION | REFERENCE | OTHER)
    }
}

const OPT_CLASS_NAME: i32 = 1 << 0;
const OPT_NAMES: i32 = 1 << 1;
const OPT_ATTRIBUTES: i32 = 1 << 2;
const OPT_DIMNAMES: i32 = 1 << 3;
const OPT_ROW_NAMES: i32 = 1 << 4;

const LOGICAL_FALSE: u8 = 0;
const LOGICAL_TRUE: u8 = 1;
const LOGICAL_NA: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CodecMode {
    Full = 0,
    StructOnly = 1,
}

impl CodecMode {
    fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            0 => Ok(Self::Full),
            1 => Ok(Self::StructOnly),
            other => Err(ProtocolError::unknown_tag("codec mode", other)),
        }
    }
}

/// Bounds on one encode or decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecLimits {
    pub max_depth: usize,
    pub max_list_length: usize,
    pub max_env_length: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_depth: 128,
            max_list_length: 10_000,
            max_env_length: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValueCodec {
    limits: CodecLimits,
}

impl ValueCodec {
    pub fn new(limits: CodecLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &CodecLimits {
        &self.limits
    }

    pub fn encode(&self, value: &Value, mode: CodecMode) -> Result<Bytes, ProtocolError> {
        let mut w = WireWriter::new();
        self.write(&mut w, value, mode)?;
        Ok(w.finish())
    }

    /// Decodes one value that must span all of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, ProtocolError> {
        let mut r = WireReader::new(bytes);
        let value = self.read(&mut r)?;
        r.finish()?;
        Ok(value)
    }

    /// Writes the mode byte followed by the value tree.
    pub fn write(
        &self,
        w: &mut WireWriter,
        value: &Value,
        mode: CodecMode,
    ) -> Result<(), ProtocolError> {
        w.write_u8(mode as u8);
        ValueWriter {
            limits: &self.limits,
            mode,
            w,
        }
        .value(value, 0)
    }

    pub fn read(&self, r: &mut WireReader<'_>) -> Result<Value, ProtocolError> {
        let mode = CodecMode::from_tag(r.read_u8()?)?;
        ValueReader {
            limits: &self.limits,
            mode,
            r,
        }
        .value(0)
    }

    /// Materializes `value` inside the interpreter.
    pub fn to_external<I: Interpreter + ?Sized>(
        &self,
        interp: &mut I,
        value: &Value,
    ) -> Result<Handle, EvalError> {
        if value.has_shape_stores() {
            return Err(ProtocolError::ShapeOnly.into());
        }
        interp.to_external(value)
    }

    /// Reads a live interpreter object into a [`Value`].
    ///
    /// Objects nested past `max_depth`, lists longer than `max_list_length` and
    /// environments with more than `max_env_length` bindings come back as
    /// [`Reference`] placeholders carrying their handle.
    pub fn from_external<I: Interpreter + ?Sized>(
        &self,
        interp: &mut I,
        handle: Handle,
        struct_only: bool,
    ) -> Result<Value, EvalError> {
        if handle.is_null() {
            return Err(EvalError::InvalidReference { handle: handle.get() });
        }
        ExternalReader {
            limits: &self.limits,
            interp,
            struct_only,
        }
        .value(handle, 0)
    }
}

struct ValueWriter<'a> {
    limits: &'a CodecLimits,
    mode: CodecMode,
    w: &'a mut WireWriter,
}

impl ValueWriter<'_> {
    fn value(&mut self, value: &Value, depth: usize) -> Result<(), ProtocolError> {
        if depth > self.limits.max_depth && !is_leaf_value(value) {
            return self.placeholder(value);
        }
        match value {
            Value::Null => self.w.write_u8(tag::NULL),
            Value::Missing => self.w.write_u8(tag::MISSING),
            Value::Vector(v) => self.vector(v, depth)?,
            Value::Array(a) => self.array(a, depth)?,
            Value::List(l) => self.list(l, depth)?,
            Value::DataFrame(d) => self.data_frame(d, depth)?,
            Value::Environment(e) => {
                if e.bindings.len() > self.limits.max_env_length {
                    return self.placeholder(value);
                }
                self.w.write_u8(tag::ENVIRONMENT);
                self.w.write_u64(e.handle);
                self.w.write_str(&e.name);
                self.pairs(&e.bindings, depth)?;
            }
            Value::Function(f) => {
                self.w.write_u8(tag::FUNCTION);
                self.w.write_str(&f.header);
            }
            Value::S4Object(s) => {
                self.w.write_u8(tag::S4_OBJECT);
                self.w.write_str(&s.class_name);
                self.pairs(&s.slots, depth)?;
            }
            Value::Reference(r) => self.reference(r.handle, r.class_name.as_deref()),
            Value::Other { class_name } => {
                self.w.write_u8(tag::OTHER);
                self.w.write_str(class_name);
            }
        }
        Ok(())
    }

    fn placeholder(&mut self, value: &Value) -> Result<(), ProtocolError> {
        let handle = match value {
            Value::Environment(e) => e.handle,
            _ => 0,
        };
        self.reference(handle, Some(&value.class_name()));
        Ok(())
    }

    fn reference(&mut self, handle: u64, class_name: Option<&str>) {
        self.w.write_u8(tag::REFERENCE);
        self.w.write_u64(handle);
        self.w.write_opt_str(class_name);
    }

    fn options(&mut self, class_name: &Option<String>, mut options: i32) {
        if class_name.is_some() {
            options |= OPT_CLASS_NAME;
        }
        self.w.write_i32(options);
        if let Some(class_name) = class_name {
            self.w.write_str(class_name);
        }
    }

    fn vector(&mut self, v: &Vector, depth: usize) -> Result<(), ProtocolError> {
        self.w.write_u8(tag::VECTOR);
        let options = flag(v.names.is_some(), OPT_NAMES) | flag(v.attributes.is_some(), OPT_ATTRIBUTES);
        self.options(&v.class_name, options);
        self.store(&v.store)?;
        if let Some(names) = &v.names {
            self.w.write_strings(names);
        }
        self.attributes(v.attributes.as_ref(), depth)
    }

    fn array(&mut self, a: &Array, depth: usize) -> Result<(), ProtocolError> {
        self.w.write_u8(tag::ARRAY);
        let options = flag(a.dimnames.is_some(), OPT_DIMNAMES) | flag(a.attributes.is_some(), OPT_ATTRIBUTES);
        self.options(&a.class_name, options);
        self.w.write_ints(&a.dim);
        self.store(&a.store)?;
        if let Some(dimnames) = &a.dimnames {
            self.w.write_len(dimnames.len());
            for names in dimnames {
                self.w.write_opt_strings(names.as_deref());
            }
        }
        self.attributes(a.attributes.as_ref(), depth)
    }

    fn list(&mut self, l: &List, depth: usize) -> Result<(), ProtocolError> {
        self.w.write_u8(tag::LIST);
        let options = flag(l.names.is_some(), OPT_NAMES) | flag(l.attributes.is_some(), OPT_ATTRIBUTES);
        self.options(&l.class_name, options);
        self.w.write_len(l.elements.len());
        for element in &l.elements {
            self.value(element, depth + 1)?;
        }
        if let Some(names) = &l.names {
            self.w.write_strings(names);
        }
        self.attributes(l.attributes.as_ref(), depth)
    }

    fn data_frame(&mut self, d: &DataFrame, depth: usize) -> Result<(), ProtocolError> {
        self.w.write_u8(tag::DATA_FRAME);
        let options = flag(d.row_names.is_some(), OPT_ROW_NAMES) | flag(d.attributes.is_some(), OPT_ATTRIBUTES);
        self.options(&d.class_name, options);
        self.w.write_len(d.columns.len());
        self.w.write_len(d.row_count);
        self.w.write_strings(&d.column_names);
        if let Some(row_names) = &d.row_names {
            self.w.write_strings(row_names);
        }
        for column in &d.columns {
            self.value(column, depth + 1)?;
        }
        self.attributes(d.attributes.as_ref(), depth)
    }

    fn pairs(&mut self, pairs: &[(String, Value)], depth: usize) -> Result<(), ProtocolError> {
        self.w.write_len(pairs.len());
        for (name, value) in pairs {
            self.w.write_str(name);
            self.value(value, depth + 1)?;
        }
        Ok(())
    }

    fn attributes(&mut self, attributes: Option<&Attributes>, depth: usize) -> Result<(), ProtocolError> {
        let Some(attributes) = attributes else {
            return Ok(());
        };
        self.w.write_len(attributes.len());
        for (name, value) in attributes.iter() {
            self.w.write_str(name);
            self.value(value, depth + 1)?;
        }
        Ok(())
    }

    fn store(&mut self, store: &Store) -> Result<(), ProtocolError> {
        self.w.write_u8(store.store_type() as u8);
        if self.mode == CodecMode::StructOnly {
            let Store::Struct(shape) = store.shape() else {
                unreachable!("Store::shape always yields Store::Struct");
            };
            self.w.write_len(shape.length);
            if shape.store_type == StoreType::Factor {
                let (ordered, levels) = shape.factor.unwrap_or((false, 0));
                self.w.write_bool(ordered);
                self.w.write_len(levels);
            }
            return Ok(());
        }
        match store {
            Store::Struct(_) => return Err(ProtocolError::ShapeOnly),
            Store::Logical(v) => {
                self.w.write_len(v.len());
                for b in v {
                    self.w.write_u8(match b {
                        Some(false) => LOGICAL_FALSE,
                        Some(true) => LOGICAL_TRUE,
                        None => LOGICAL_NA,
                    });
                }
            }
            Store::Integer(v) => self.w.write_ints(v),
            Store::Numeric(v) => {
                self.w.write_len(v.len());
                for r in v {
                    self.w.write_u64(r.to_bits());
                }
            }
            Store::Complex(v) => {
                self.w.write_len(v.len());
                for c in v {
                    self.w.write_u64(c.re().to_bits());
                }
                for c in v {
                    self.w.write_u64(c.im().to_bits());
                }
            }
            Store::Character(v) => self.w.write_strings(v),
            Store::Raw(v) => self.w.write_bytes(v),
            Store::Factor(f) => {
                self.w.write_len(f.codes.len());
                self.w.write_bool(f.ordered);
                self.w.write_len(f.levels.len());
                for level in &f.levels {
                    self.w.write_str(level);
                }
                for &code in &f.codes {
                    self.w.write_i32(code);
                }
            }
        }
        Ok(())
    }
}

fn flag(set: bool, bit: i32) -> i32 {
    if set { bit } else { 0 }
}

fn is_leaf_value(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Missing | Value::Function(_) | Value::Reference(_) | Value::Other { .. }
    )
}

struct ValueReader<'a, 'b> {
    limits: &'a CodecLimits,
    mode: CodecMode,
    r: &'a mut WireReader<'b>,
}

impl ValueReader<'_, '_> {
    fn value(&mut self, depth: usize) -> Result<Value, ProtocolError> {
        let t = self.r.read_u8()?;
        if depth > self.limits.max_depth && !tag::is_leaf(t) {
            return Err(ProtocolError::LimitExceeded {
                what: "nesting depth",
                count: depth,
                limit: self.limits.max_depth,
            });
        }
        Ok(match t {
            tag::NULL => Value::Null,
            tag::MISSING => Value::Missing,
            tag::VECTOR => {
                let (options, class_name) = self.options()?;
                let store = self.store()?;
                let names = self.names_if(options & OPT_NAMES != 0)?;
                let attributes = self.attributes(options, depth)?;
                Value::Vector(Vector {
                    class_name,
                    store,
                    names,
                    attributes,
                })
            }
            tag::ARRAY => {
                let (options, class_name) = self.options()?;
                let dim = self.r.read_ints()?;
                let store = self.store()?;
                let dimnames = if options & OPT_DIMNAMES != 0 {
                    let n = self.r.read_len("dimnames", 4)?;
                    Some((0..n).map(|_| self.r.read_opt_strings()).collect::<Result<_, _>>()?)
                } else {
                    None
                };
                let attributes = self.attributes(options, depth)?;
                Value::Array(Array {
                    class_name,
                    store,
                    dim,
                    dimnames,
                    attributes,
                })
            }
            tag::LIST => {
                let (options, class_name) = self.options()?;
                let n = self.count("list length", self.limits.max_list_length)?;
                let elements = (0..n)
                    .map(|_| self.value(depth + 1))
                    .collect::<Result<_, _>>()?;
                let names = self.names_if(options & OPT_NAMES != 0)?;
                let attributes = self.attributes(options, depth)?;
                Value::List(List {
                    class_name,
                    elements,
                    names,
                    attributes,
                })
            }
            tag::DATA_FRAME => {
                let (options, class_name) = self.options()?;
                let n = self.count("data frame columns", self.limits.max_list_length)?;
                let row_count = self.r.read_i32()?;
                let row_count = usize::try_from(row_count).map_err(|_| ProtocolError::InvalidLength {
                    what: "row count",
                    length: row_count.into(),
                })?;
                let column_names = self.r.read_strings()?;
                let row_names = self.names_if(options & OPT_ROW_NAMES != 0)?;
                let columns = (0..n)
                    .map(|_| self.value(depth + 1))
                    .collect::<Result<_, _>>()?;
                let attributes = self.attributes(options, depth)?;
                Value::DataFrame(DataFrame {
                    class_name,
                    columns,
                    column_names,
                    row_count,
                    row_names,
                    attributes,
                })
            }
            tag::ENVIRONMENT => {
                let handle = self.r.read_u64()?;
                let name = self.r.read_str()?;
                let bindings = self.pairs("environment length", self.limits.max_env_length, depth)?;
                Value::Environment(Environment {
                    name,
                    handle,
                    bindings,
                })
            }
            tag::FUNCTION => Value::Function(Function {
                header: self.r.read_str()?,
            }),
            tag::S4_OBJECT => {
                let class_name = self.r.read_str()?;
                let slots = self.pairs("S4 slots", self.limits.max_list_length, depth)?;
                Value::S4Object(S4Object { class_name, slots })
            }
            tag::REFERENCE => Value::Reference(Reference {
                handle: self.r.read_u64()?,
                class_name: self.r.read_opt_str()?,
            }),
            tag::OTHER => Value::Other {
                class_name: self.r.read_str()?,
            },
            other => return Err(ProtocolError::unknown_tag("value", other)),
        })
    }

    fn options(&mut self) -> Result<(i32, Option<String>), ProtocolError> {
        let options = self.r.read_i32()?;
        let class_name = if options & OPT_CLASS_NAME != 0 {
            Some(self.r.read_str()?)
        } else {
            None
        };
        Ok((options, class_name))
    }

    fn count(&mut self, what: &'static str, limit: usize) -> Result<usize, ProtocolError> {
        let count = self.r.read_len(what, 1)?;
        if count > limit {
            return Err(ProtocolError::LimitExceeded { what, count, limit });
        }
        Ok(count)
    }

    fn names_if(&mut self, present: bool) -> Result<Option<Names>, ProtocolError> {
        if present {
            self.r.read_strings().map(Some)
        } else {
            Ok(None)
        }
    }

    fn pairs(
        &mut self,
        what: &'static str,
        limit: usize,
        depth: usize,
    ) -> Result<Vec<(String, Value)>, ProtocolError> {
        let n = self.count(what, limit)?;
        (0..n)
            .map(|_| {
                let name = self.r.read_str()?;
                Ok((name, self.value(depth + 1)?))
            })
            .collect()
    }

    fn attributes(&mut self, options: i32, depth: usize) -> Result<Option<Attributes>, ProtocolError> {
        if options & OPT_ATTRIBUTES == 0 {
            return Ok(None);
        }
        let pairs = self.pairs("attributes", self.limits.max_list_length, depth)?;
        Ok(Some(pairs.into_iter().collect()))
    }

    fn store(&mut self) -> Result<Store, ProtocolError> {
        let t = self.r.read_u8()?;
        let store_type = StoreType::from_tag(t).ok_or(ProtocolError::unknown_tag("store", t))?;
        if self.mode == CodecMode::StructOnly {
            let length = self.r.read_i32()?;
            let length = usize::try_from(length).map_err(|_| ProtocolError::InvalidLength {
                what: "store",
                length: length.into(),
            })?;
            let factor = if store_type == StoreType::Factor {
                let ordered = self.r.read_bool()?;
                Some((ordered, self.r.read_len("factor levels", 0)?))
            } else {
                None
            };
            return Ok(Store::Struct(StoreShape {
                store_type,
                length,
                factor,
            }));
        }
        Ok(match store_type {
            StoreType::Logical => {
                let n = self.r.read_len("logical", 1)?;
                let values = (0..n)
                    .map(|_| match self.r.read_u8()? {
                        LOGICAL_FALSE => Ok(Some(false)),
                        LOGICAL_TRUE => Ok(Some(true)),
                        LOGICAL_NA => Ok(None),
                        other => Err(ProtocolError::unknown_tag("logical", other)),
                    })
                    .collect::<Result<_, _>>()?;
                Store::Logical(values)
            }
            StoreType::Integer => Store::Integer(self.r.read_ints()?),
            StoreType::Numeric => {
                let n = self.r.read_len("numeric", 8)?;
                let values = (0..n)
                    .map(|_| self.r.read_u64().map(Real::from_bits))
                    .collect::<Result<_, _>>()?;
                Store::Numeric(values)
            }
            StoreType::Complex => {
                let n = self.r.read_len("complex", 16)?;
                let re = (0..n)
                    .map(|_| self.r.read_u64().map(Real::from_bits))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut values = Vec::with_capacity(n);
                for re in re {
                    let im = Real::from_bits(self.r.read_u64()?);
                    values.push(Complex::from_parts(re, im));
                }
                Store::Complex(values)
            }
            StoreType::Character => Store::Character(self.r.read_strings()?),
            StoreType::Raw => Store::Raw(self.r.read_bytes()?),
            StoreType::Factor => {
                let n = self.r.read_i32()?;
                let ordered = self.r.read_bool()?;
                let level_count = self.r.read_len("factor levels", 4)?;
                let levels = (0..level_count)
                    .map(|_| self.r.read_str())
                    .collect::<Result<_, _>>()?;
                let n = usize::try_from(n).map_err(|_| ProtocolError::InvalidLength {
                    what: "factor",
                    length: n.into(),
                })?;
                if self.r.remaining() < n.saturating_mul(4) {
                    return Err(ProtocolError::UnexpectedEof {
                        needed: n.saturating_mul(4),
                        remaining: self.r.remaining(),
                    });
                }
                let codes = (0..n)
                    .map(|_| self.r.read_i32())
                    .collect::<Result<_, _>>()?;
                Store::Factor(Factor::new(codes, levels, ordered))
            }
        })
    }
}

/// Attributes mapped onto dedicated value fields by `from_external`.
const STRUCTURAL_ATTRS: &[&str] = &["class", "names", "dim", "dimnames", "row.names", "levels"];

struct ExternalReader<'a, I: ?Sized> {
    limits: &'a CodecLimits,
    interp: &'a mut I,
    struct_only: bool,
}

impl<I: Interpreter + ?Sized> ExternalReader<'_, I> {
    fn value(&mut self, handle: Handle, depth: usize) -> Result<Value, EvalError> {
        if depth > self.limits.max_depth {
            return Ok(Value::reference(handle.get(), None));
        }
        let class_name = self.class_attr(handle)?;
        let attributes = self.extra_attrs(handle, depth)?;
        Ok(match self.interp.inspect_type(handle)? {
            ExternalObject::Null => Value::Null,
            ExternalObject::Missing => Value::Missing,
            ExternalObject::Vector {
                store,
                names,
                dim,
                dimnames,
            } => {
                let store = if self.struct_only { store.shape() } else { store };
                match dim {
                    Some(dim) => Value::Array(Array {
                        class_name,
                        store,
                        dim,
                        dimnames,
                        attributes,
                    }),
                    None => Value::Vector(Vector {
                        class_name,
                        store,
                        names,
                        attributes,
                    }),
                }
            }
            ExternalObject::List { elements, names } => {
                if elements.len() > self.limits.max_list_length {
                    return Ok(Value::reference(handle.get(), Some("list".into())));
                }
                let elements = self.children(&elements, depth)?;
                Value::List(List {
                    class_name,
                    elements,
                    names,
                    attributes,
                })
            }
            ExternalObject::DataFrame {
                columns,
                column_names,
                row_count,
                row_names,
            } => {
                if columns.len() > self.limits.max_list_length {
                    return Ok(Value::reference(handle.get(), Some("data.frame".into())));
                }
                let columns = self.children(&columns, depth)?;
                Value::DataFrame(DataFrame {
                    class_name,
                    columns,
                    column_names,
                    row_count,
                    row_names,
                    attributes,
                })
            }
            ExternalObject::Environment { name, bindings } => {
                if bindings.len() > self.limits.max_env_length {
                    return Ok(Value::reference(handle.get(), Some("environment".into())));
                }
                Value::Environment(Environment {
                    name,
                    handle: handle.get(),
                    bindings: self.pairs(bindings, depth)?,
                })
            }
            ExternalObject::Function { header } => Value::Function(Function { header }),
            ExternalObject::S4Object { class_name, slots } => Value::S4Object(S4Object {
                class_name,
                slots: self.pairs(slots, depth)?,
            }),
            ExternalObject::Other { class_name } => Value::Other { class_name },
        })
    }

    fn children(&mut self, handles: &[Handle], depth: usize) -> Result<Vec<Value>, EvalError> {
        handles.iter().map(|&h| self.value(h, depth + 1)).collect()
    }

    fn pairs(
        &mut self,
        pairs: Vec<(String, Handle)>,
        depth: usize,
    ) -> Result<Vec<(String, Value)>, EvalError> {
        pairs
            .into_iter()
            .map(|(name, h)| Ok((name, self.value(h, depth + 1)?)))
            .collect()
    }

    /// Attributes that the value model does not carry in dedicated fields.
    fn extra_attrs(
        &mut self,
        handle: Handle,
        depth: usize,
    ) -> Result<Option<Attributes>, EvalError> {
        let extra: Vec<_> = self
            .interp
            .list_attrs(handle)?
            .into_iter()
            .filter(|(name, _)| !STRUCTURAL_ATTRS.contains(&name.as_str()))
            .collect();
        if extra.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.pairs(extra, depth)?.into_iter().collect()))
    }

    /// First element of the `class` attribute, when the object carries one.
    fn class_attr(&mut self, handle: Handle) -> Result<Option<String>, EvalError> {
        let Some(attr) = self.interp.get_attr(handle, "class")? else {
            return Ok(None);
        };
        Ok(match self.interp.inspect_type(attr)? {
            ExternalObject::Vector {
                store: Store::Character(names),
                ..
            } => names.into_iter().next().flatten(),
            _ => None,
        })
    }
}
