//! Vector payload stores and their NA sentinels.
//!
//! Numeric NA is a NaN with a reserved low word. Classification always looks at
//! the raw bits: an `is_nan()` check cannot tell NA from an ordinary NaN.

/// Integer NA.
pub const NA_INTEGER: i32 = i32::MIN;

/// Raw bits of the canonical numeric NA.
pub const NA_NUMERIC_BITS: u64 = 0x7FF8_0000_0000_07A2;

/// Low word that marks a NaN as NA.
const NA_LOW_WORD: u64 = 1954;

const EXPONENT_MASK: u64 = 0x7FF0_0000_0000_0000;
const MANTISSA_MASK: u64 = 0x000F_FFFF_FFFF_FFFF;

/// A double that compares by bit pattern, so NA and NaN payloads survive equality.
#[derive(Debug, Clone, Copy)]
pub struct Real(f64);

impl Real {
    pub const NA: Real = Real(f64::from_bits(NA_NUMERIC_BITS));
    pub const NAN: Real = Real(f64::NAN);

    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(f64::from_bits(bits))
    }

    pub const fn to_bits(self) -> u64 {
        self.0.to_bits()
    }

    pub const fn value(self) -> f64 {
        self.0
    }

    fn bits_are_nan(bits: u64) -> bool {
        bits & EXPONENT_MASK == EXPONENT_MASK && bits & MANTISSA_MASK != 0
    }

    /// NA regardless of sign or quiet bit.
    pub fn is_na(self) -> bool {
        let bits = self.to_bits();
        Self::bits_are_nan(bits) && bits & 0xFFFF_FFFF == NA_LOW_WORD
    }

    /// NaN that is not NA.
    pub fn is_nan(self) -> bool {
        let bits = self.to_bits();
        Self::bits_are_nan(bits) && bits & 0xFFFF_FFFF != NA_LOW_WORD
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl PartialEq for Real {
    fn eq(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl Eq for Real {}

impl From<f64> for Real {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

/// Complex number with NA/NaN normalized across both parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Complex {
    re: Real,
    im: Real,
}

impl Complex {
    pub const NA: Complex = Complex {
        re: Real::NA,
        im: Real::NA,
    };

    pub fn new(re: f64, im: f64) -> Self {
        Self::from_parts(Real::new(re), Real::new(im))
    }

    /// Either part NA makes both NA; otherwise either part NaN makes both NaN.
    pub fn from_parts(re: Real, im: Real) -> Self {
        if re.is_na() || im.is_na() {
            Self::NA
        } else if re.is_nan() || im.is_nan() {
            Self {
                re: Real::NAN,
                im: Real::NAN,
            }
        } else {
            Self { re, im }
        }
    }

    pub fn re(&self) -> Real {
        self.re
    }

    pub fn im(&self) -> Real {
        self.im
    }

    pub fn is_na(&self) -> bool {
        self.re.is_na()
    }

    pub fn is_nan(&self) -> bool {
        self.re.is_nan()
    }
}

/// Names of vector elements; `None` entries are NA strings.
pub type Names = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factor {
    /// 1-based codes into `levels`; 0 or [`NA_INTEGER`] mark a missing value.
    pub codes: Vec<i32>,
    pub levels: Vec<String>,
    pub ordered: bool,
}

impl Factor {
    pub fn new(codes: Vec<i32>, levels: Vec<String>, ordered: bool) -> Self {
        Self {
            codes,
            levels,
            ordered,
        }
    }

    pub fn is_missing(&self, idx: usize) -> bool {
        matches!(self.codes.get(idx), Some(&c) if c == 0 || c == NA_INTEGER)
    }

    pub fn label(&self, idx: usize) -> Option<&str> {
        let code = *self.codes.get(idx)?;
        if code <= 0 {
            return None;
        }
        self.levels.get(code as usize - 1).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum StoreType {
    Logical = 1,
    Integer = 2,
    Numeric = 3,
    Complex = 4,
    Character = 5,
    Raw = 6,
    Factor = 10,
}

impl StoreType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Logical,
            2 => Self::Integer,
            3 => Self::Numeric,
            4 => Self::Complex,
            5 => Self::Character,
            6 => Self::Raw,
            10 => Self::Factor,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Logical => "logical",
            Self::Integer => "integer",
            Self::Numeric => "numeric",
            Self::Complex => "complex",
            Self::Character => "character",
            Self::Raw => "raw",
            Self::Factor => "factor",
        }
    }
}

/// Payload-free stand-in for a store: type and length only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreShape {
    pub store_type: StoreType,
    pub length: usize,
    /// `(ordered, level count)` for factors.
    pub factor: Option<(bool, usize)>,
}

impl StoreShape {
    pub const fn dummy(store_type: StoreType) -> Self {
        Self {
            store_type,
            length: 0,
            factor: None,
        }
    }

    pub const fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }
}

pub const LOGICAL_STRUCT: StoreShape = StoreShape::dummy(StoreType::Logical);
pub const INTEGER_STRUCT: StoreShape = StoreShape::dummy(StoreType::Integer);
pub const NUMERIC_STRUCT: StoreShape = StoreShape::dummy(StoreType::Numeric);
pub const COMPLEX_STRUCT: StoreShape = StoreShape::dummy(StoreType::Complex);
pub const CHARACTER_STRUCT: StoreShape = StoreShape::dummy(StoreType::Character);
pub const RAW_STRUCT: StoreShape = StoreShape::dummy(StoreType::Raw);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Store {
    Logical(Vec<Option<bool>>),
    Integer(Vec<i32>),
    Numeric(Vec<Real>),
    Complex(Vec<Complex>),
    Character(Vec<Option<String>>),
    Raw(Vec<u8>),
    Factor(Factor),
    Struct(StoreShape),
}

impl Store {
    pub fn numeric(values: impl IntoIterator<Item = f64>) -> Self {
        Self::Numeric(values.into_iter().map(Real::new).collect())
    }

    pub fn character<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::Character(values.into_iter().map(|s| Some(s.into())).collect())
    }

    pub fn store_type(&self) -> StoreType {
        match self {
            Self::Logical(_) => StoreType::Logical,
            Self::Integer(_) => StoreType::Integer,
            Self::Numeric(_) => StoreType::Numeric,
            Self::Complex(_) => StoreType::Complex,
            Self::Character(_) => StoreType::Character,
            Self::Raw(_) => StoreType::Raw,
            Self::Factor(_) => StoreType::Factor,
            Self::Struct(shape) => shape.store_type,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Logical(v) => v.len(),
            Self::Integer(v) => v.len(),
            Self::Numeric(v) => v.len(),
            Self::Complex(v) => v.len(),
            Self::Character(v) => v.len(),
            Self::Raw(v) => v.len(),
            Self::Factor(f) => f.codes.len(),
            Self::Struct(shape) => shape.length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shape_only(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    pub fn is_na(&self, idx: usize) -> bool {
        match self {
            Self::Logical(v) => matches!(v.get(idx), Some(None)),
            Self::Integer(v) => v.get(idx) == Some(&NA_INTEGER),
            Self::Numeric(v) => v.get(idx).is_some_and(|r| r.is_na()),
            Self::Complex(v) => v.get(idx).is_some_and(|c| c.is_na()),
            Self::Character(v) => matches!(v.get(idx), Some(None)),
            Self::Raw(_) | Self::Struct(_) => false,
            Self::Factor(f) => f.is_missing(idx),
        }
    }

    /// The payload-free counterpart of this store.
    pub fn shape(&self) -> Store {
        let factor = match self {
            Self::Factor(f) => Some((f.ordered, f.levels.len())),
            Self::Struct(shape) => return Self::Struct(*shape),
            _ => None,
        };
        Self::Struct(StoreShape {
            store_type: self.store_type(),
            length: self.len(),
            factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn na_and_nan_are_distinct() {
        assert!(Real::NA.is_na());
        assert!(!Real::NA.is_nan());
        assert!(Real::NAN.is_nan());
        assert!(!Real::NAN.is_na());
        // both are NaN to the float unit
        assert!(Real::NA.value().is_nan());
        assert_ne!(Real::NA, Real::NAN);
    }

    #[test]
    fn negated_na_is_still_na() {
        let neg = Real::new(-Real::NA.value());
        assert!(neg.is_na());
        assert_ne!(neg, Real::NA);
    }

    #[test]
    fn signalling_na_pattern_is_na() {
        assert!(Real::from_bits(0x7FF0_0000_0000_07A2).is_na());
    }

    #[test]
    fn complex_normalizes_na_over_nan() {
        let c = Complex::from_parts(Real::NAN, Real::NA);
        assert!(c.is_na());
        assert!(c.im().is_na());

        let c = Complex::new(1.0, f64::NAN);
        assert!(c.is_nan());
        assert!(c.re().is_nan());

        let c = Complex::new(1.0, -2.0);
        assert_eq!(c.re().value(), 1.0);
        assert_eq!(c.im().value(), -2.0);
    }

    #[test]
    fn factor_labels_and_missing_codes() {
        let f = Factor::new(vec![2, 0, NA_INTEGER, 1], vec!["a".into(), "b".into()], false);
        assert_eq!(f.label(0), Some("b"));
        assert!(f.is_missing(1));
        assert!(f.is_missing(2));
        assert_eq!(f.label(3), Some("a"));
    }

    #[test]
    fn shape_keeps_factor_details() {
        let store = Store::Factor(Factor::new(vec![1, 2, 1], vec!["lo".into(), "hi".into()], true));
        assert_eq!(
            store.shape(),
            Store::Struct(StoreShape {
                store_type: StoreType::Factor,
                length: 3,
                factor: Some((true, 2)),
            })
        );
    }

    #[test]
    fn na_detection_per_store() {
        assert!(Store::Logical(vec![Some(true), None]).is_na(1));
        assert!(Store::Integer(vec![NA_INTEGER]).is_na(0));
        assert!(!Store::Numeric(vec![Real::NAN]).is_na(0));
        assert!(Store::Character(vec![None]).is_na(0));
        assert!(!Store::Character(vec![Some(String::new())]).is_na(0));
    }
}
