//! The R value model.
//!
//! Values are immutable once built and freely shared between threads. Every
//! vector-like shape has a struct-only form whose stores are
//! [`Store::Struct`] dummies, used to preview shape without payload.

use super::store::{Names, Store};

/// Ordered attribute map (`names`, `dimnames`, `class` and friends).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes(Vec<(String, Value)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Replaces an existing entry in place, keeping its position.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_struct(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(n, v)| (n.clone(), v.to_struct()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vector {
    /// Overrides the class implied by the store type.
    pub class_name: Option<String>,
    pub store: Store,
    pub names: Option<Names>,
    pub attributes: Option<Attributes>,
}

impl Vector {
    pub fn new(store: Store) -> Self {
        Self {
            class_name: None,
            store,
            names: None,
            attributes: None,
        }
    }

    pub fn with_names(mut self, names: Names) -> Self {
        self.names = Some(names);
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array {
    pub class_name: Option<String>,
    pub store: Store,
    pub dim: Vec<i32>,
    /// One entry per dimension; `None` where that dimension is unnamed.
    pub dimnames: Option<Vec<Option<Names>>>,
    pub attributes: Option<Attributes>,
}

impl Array {
    pub fn new(store: Store, dim: Vec<i32>) -> Self {
        Self {
            class_name: None,
            store,
            dim,
            dimnames: None,
            attributes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List {
    pub class_name: Option<String>,
    pub elements: Vec<Value>,
    pub names: Option<Names>,
    pub attributes: Option<Attributes>,
}

impl List {
    pub fn new(elements: Vec<Value>) -> Self {
        Self {
            class_name: None,
            elements,
            names: None,
            attributes: None,
        }
    }

    pub fn named<S: Into<String>>(entries: impl IntoIterator<Item = (S, Value)>) -> Self {
        let (names, elements): (Names, Vec<Value>) = entries
            .into_iter()
            .map(|(n, v)| (Some(n.into()), v))
            .unzip();
        Self {
            class_name: None,
            elements,
            names: Some(names),
            attributes: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let names = self.names.as_ref()?;
        let idx = names.iter().position(|n| n.as_deref() == Some(name))?;
        self.elements.get(idx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub class_name: Option<String>,
    pub columns: Vec<Value>,
    pub column_names: Names,
    pub row_count: usize,
    /// `None` means the implicit row names `1..=row_count`.
    pub row_names: Option<Names>,
    pub attributes: Option<Attributes>,
}

impl DataFrame {
    pub fn new(columns: Vec<(String, Value)>, row_count: usize) -> Self {
        let (column_names, columns) = columns.into_iter().map(|(n, v)| (Some(n), v)).unzip();
        Self {
            class_name: None,
            columns,
            column_names,
            row_count,
            row_names: None,
            attributes: None,
        }
    }

    pub fn row_name(&self, row: usize) -> Option<String> {
        match &self.row_names {
            Some(names) => names.get(row).cloned().flatten(),
            None => (row < self.row_count).then(|| (row + 1).to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    /// Interpreter handle, so a client can resolve the environment again later.
    pub handle: u64,
    pub bindings: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Deparsed header, e.g. `function (x, ...)`. Bodies never transfer.
    pub header: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S4Object {
    pub class_name: String,
    pub slots: Vec<(String, Value)>,
}

/// Opaque placeholder for an object left behind in the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// 0 never resolves.
    pub handle: u64,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Missing,
    Vector(Vector),
    Array(Array),
    List(List),
    DataFrame(DataFrame),
    Environment(Environment),
    Function(Function),
    S4Object(S4Object),
    Reference(Reference),
    Other { class_name: String },
}

impl Value {
    pub fn vector(store: Store) -> Self {
        Self::Vector(Vector::new(store))
    }

    pub fn integer(values: impl Into<Vec<i32>>) -> Self {
        Self::vector(Store::Integer(values.into()))
    }

    pub fn numeric(values: impl IntoIterator<Item = f64>) -> Self {
        Self::vector(Store::numeric(values))
    }

    pub fn character<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::vector(Store::character(values))
    }

    pub fn reference(handle: u64, class_name: Option<String>) -> Self {
        Self::Reference(Reference { handle, class_name })
    }

    /// R class name as the interpreter would report it.
    pub fn class_name(&self) -> String {
        match self {
            Self::Null => "NULL".into(),
            Self::Missing => "name".into(),
            Self::Vector(v) => v
                .class_name
                .clone()
                .unwrap_or_else(|| v.store.store_type().name().into()),
            Self::Array(a) => a.class_name.clone().unwrap_or_else(|| {
                if a.dim.len() == 2 { "matrix" } else { "array" }.into()
            }),
            Self::List(l) => l.class_name.clone().unwrap_or_else(|| "list".into()),
            Self::DataFrame(d) => d.class_name.clone().unwrap_or_else(|| "data.frame".into()),
            Self::Environment(_) => "environment".into(),
            Self::Function(_) => "function".into(),
            Self::S4Object(s) => s.class_name.clone(),
            Self::Reference(r) => r.class_name.clone().unwrap_or_default(),
            Self::Other { class_name } => class_name.clone(),
        }
    }

    pub fn store(&self) -> Option<&Store> {
        match self {
            Self::Vector(v) => Some(&v.store),
            Self::Array(a) => Some(&a.store),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Self::Vector(v) => v.attributes.as_ref(),
            Self::Array(a) => a.attributes.as_ref(),
            Self::List(l) => l.attributes.as_ref(),
            Self::DataFrame(d) => d.attributes.as_ref(),
            _ => None,
        }
    }

    /// The struct-only form: every store replaced by its shape, recursively.
    pub fn to_struct(&self) -> Value {
        match self {
            Self::Vector(v) => Self::Vector(Vector {
                class_name: v.class_name.clone(),
                store: v.store.shape(),
                names: v.names.clone(),
                attributes: v.attributes.as_ref().map(Attributes::to_struct),
            }),
            Self::Array(a) => Self::Array(Array {
                class_name: a.class_name.clone(),
                store: a.store.shape(),
                dim: a.dim.clone(),
                dimnames: a.dimnames.clone(),
                attributes: a.attributes.as_ref().map(Attributes::to_struct),
            }),
            Self::List(l) => Self::List(List {
                class_name: l.class_name.clone(),
                elements: l.elements.iter().map(Value::to_struct).collect(),
                names: l.names.clone(),
                attributes: l.attributes.as_ref().map(Attributes::to_struct),
            }),
            Self::DataFrame(d) => Self::DataFrame(DataFrame {
                class_name: d.class_name.clone(),
                columns: d.columns.iter().map(Value::to_struct).collect(),
                column_names: d.column_names.clone(),
                row_count: d.row_count,
                row_names: d.row_names.clone(),
                attributes: d.attributes.as_ref().map(Attributes::to_struct),
            }),
            Self::Environment(e) => Self::Environment(Environment {
                name: e.name.clone(),
                handle: e.handle,
                bindings: struct_pairs(&e.bindings),
            }),
            Self::S4Object(s) => Self::S4Object(S4Object {
                class_name: s.class_name.clone(),
                slots: struct_pairs(&s.slots),
            }),
            other => other.clone(),
        }
    }

    /// True when any store in the tree is a payload-free dummy.
    pub fn has_shape_stores(&self) -> bool {
        match self {
            Self::Vector(v) => v.store.is_shape_only() || attrs_have_shapes(&v.attributes),
            Self::Array(a) => a.store.is_shape_only() || attrs_have_shapes(&a.attributes),
            Self::List(l) => {
                l.elements.iter().any(Value::has_shape_stores) || attrs_have_shapes(&l.attributes)
            }
            Self::DataFrame(d) => {
                d.columns.iter().any(Value::has_shape_stores) || attrs_have_shapes(&d.attributes)
            }
            Self::Environment(e) => e.bindings.iter().any(|(_, v)| v.has_shape_stores()),
            Self::S4Object(s) => s.slots.iter().any(|(_, v)| v.has_shape_stores()),
            _ => false,
        }
    }

    /// True when no store in the value carries payload.
    pub fn is_shape_only(&self) -> bool {
        match self {
            Self::Vector(v) => v.store.is_shape_only(),
            Self::Array(a) => a.store.is_shape_only(),
            Self::List(l) => l.elements.iter().all(Value::is_shape_only),
            Self::DataFrame(d) => d.columns.iter().all(Value::is_shape_only),
            Self::Environment(e) => e.bindings.iter().all(|(_, v)| v.is_shape_only()),
            Self::S4Object(s) => s.slots.iter().all(|(_, v)| v.is_shape_only()),
            _ => true,
        }
    }
}

fn attrs_have_shapes(attributes: &Option<Attributes>) -> bool {
    attributes
        .as_ref()
        .is_some_and(|a| a.iter().any(|(_, v)| v.has_shape_stores()))
}

fn struct_pairs(pairs: &[(String, Value)]) -> Vec<(String, Value)> {
    pairs
        .iter()
        .map(|(n, v)| (n.clone(), v.to_struct()))
        .collect()
}
