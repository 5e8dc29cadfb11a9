//! Type promotion for arithmetic and summaries over vector stores.
//!
//! Follows the interpreter's rules: `Logical < Integer < Numeric < Complex`.
//! Logical operands count as Integer, so `sum` of a logical or integer vector
//! stays Integer and only a Numeric operand widens the result to Numeric.
//! Division always yields at least Numeric. Integer overflow yields NA.

use super::store::{Complex, NA_INTEGER, Real, Store, StoreType};
use crate::error::EvalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

fn rank(t: StoreType) -> Option<u8> {
    match t {
        StoreType::Logical => Some(0),
        StoreType::Integer => Some(1),
        StoreType::Numeric => Some(2),
        StoreType::Complex => Some(3),
        _ => None,
    }
}

/// Result type of arithmetic mixing `a` and `b`.
pub fn promote(a: StoreType, b: StoreType) -> Result<StoreType, EvalError> {
    let (Some(ra), Some(rb)) = (rank(a), rank(b)) else {
        return Err(EvalError::eval(format!(
            "non-numeric argument to binary operator ({}, {})",
            a.name(),
            b.name()
        )));
    };
    Ok(match ra.max(rb) {
        0 | 1 => StoreType::Integer,
        2 => StoreType::Numeric,
        _ => StoreType::Complex,
    })
}

enum Operand {
    Int(Vec<i32>),
    Real(Vec<Real>),
    Cplx(Vec<Complex>),
}

fn as_ints(store: &Store) -> Option<Vec<i32>> {
    match store {
        Store::Logical(v) => Some(
            v.iter()
                .map(|b| b.map_or(NA_INTEGER, |b| b as i32))
                .collect(),
        ),
        Store::Integer(v) => Some(v.clone()),
        _ => None,
    }
}

fn int_to_real(i: i32) -> Real {
    if i == NA_INTEGER {
        Real::NA
    } else {
        Real::new(i.into())
    }
}

fn as_reals(store: &Store) -> Option<Vec<Real>> {
    match store {
        Store::Numeric(v) => Some(v.clone()),
        other => as_ints(other).map(|v| v.into_iter().map(int_to_real).collect()),
    }
}

fn as_complex(store: &Store) -> Option<Vec<Complex>> {
    match store {
        Store::Complex(v) => Some(v.clone()),
        other => as_reals(other).map(|v| {
            v.into_iter()
                .map(|r| Complex::from_parts(r, Real::new(0.0)))
                .collect()
        }),
    }
}

fn operand(store: &Store, target: StoreType) -> Option<Operand> {
    match target {
        StoreType::Integer => as_ints(store).map(Operand::Int),
        StoreType::Numeric => as_reals(store).map(Operand::Real),
        StoreType::Complex => as_complex(store).map(Operand::Cplx),
        _ => None,
    }
}

/// NA dominates NaN, whichever operand it came from.
fn real_result(a: Real, b: Real, value: f64) -> Real {
    if a.is_na() || b.is_na() {
        Real::NA
    } else {
        Real::new(value)
    }
}

fn int_arith(op: ArithOp, a: i32, b: i32) -> i32 {
    if a == NA_INTEGER || b == NA_INTEGER {
        return NA_INTEGER;
    }
    let r = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => unreachable!("integer division is promoted to numeric"),
    };
    match r {
        Some(v) if v != NA_INTEGER => v,
        _ => NA_INTEGER,
    }
}

fn real_arith(op: ArithOp, a: Real, b: Real) -> Real {
    let (x, y) = (a.value(), b.value());
    let v = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
    };
    real_result(a, b, v)
}

fn complex_arith(op: ArithOp, a: Complex, b: Complex) -> Complex {
    if a.is_na() || b.is_na() {
        return Complex::NA;
    }
    let (ar, ai) = (a.re().value(), a.im().value());
    let (br, bi) = (b.re().value(), b.im().value());
    match op {
        ArithOp::Add => Complex::new(ar + br, ai + bi),
        ArithOp::Sub => Complex::new(ar - br, ai - bi),
        ArithOp::Mul => Complex::new(ar * br - ai * bi, ar * bi + ai * br),
        ArithOp::Div => {
            let d = br * br + bi * bi;
            Complex::new((ar * br + ai * bi) / d, (ai * br - ar * bi) / d)
        }
    }
}

/// Recycles the shorter operand, as the interpreter does for vector arithmetic.
fn zip_recycled<T: Copy, R>(a: &[T], b: &[T], f: impl Fn(T, T) -> R) -> Vec<R> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let n = a.len().max(b.len());
    (0..n).map(|i| f(a[i % a.len()], b[i % b.len()])).collect()
}

/// Element-wise `a op b` with promotion and recycling.
pub fn arith(op: ArithOp, a: &Store, b: &Store) -> Result<Store, EvalError> {
    let mut target = promote(a.store_type(), b.store_type())?;
    if op == ArithOp::Div && target == StoreType::Integer {
        target = StoreType::Numeric;
    }
    let (Some(x), Some(y)) = (operand(a, target), operand(b, target)) else {
        return Err(EvalError::eval(format!(
            "invalid operands for '{}'",
            op.symbol()
        )));
    };
    Ok(match (x, y) {
        (Operand::Int(x), Operand::Int(y)) => {
            Store::Integer(zip_recycled(&x, &y, |p, q| int_arith(op, p, q)))
        }
        (Operand::Real(x), Operand::Real(y)) => {
            Store::Numeric(zip_recycled(&x, &y, |p, q| real_arith(op, p, q)))
        }
        (Operand::Cplx(x), Operand::Cplx(y)) => {
            Store::Complex(zip_recycled(&x, &y, |p, q| complex_arith(op, p, q)))
        }
        _ => unreachable!("operands share the promoted type"),
    })
}

/// `sum()` over one store, as a length-one store of the promoted type.
pub fn sum(store: &Store) -> Result<Store, EvalError> {
    match store.store_type() {
        StoreType::Logical | StoreType::Integer => {
            let values = as_ints(store).unwrap_or_default();
            let mut acc: i64 = 0;
            for v in values {
                if v == NA_INTEGER {
                    return Ok(Store::Integer(vec![NA_INTEGER]));
                }
                acc += i64::from(v);
            }
            let total = i32::try_from(acc)
                .ok()
                .filter(|&t| t != NA_INTEGER)
                .unwrap_or(NA_INTEGER);
            Ok(Store::Integer(vec![total]))
        }
        StoreType::Numeric => {
            let values = as_reals(store).unwrap_or_default();
            let mut acc = 0.0;
            let mut saw_nan = false;
            for r in values {
                if r.is_na() {
                    return Ok(Store::Numeric(vec![Real::NA]));
                }
                saw_nan |= r.is_nan();
                acc += r.value();
            }
            Ok(Store::Numeric(vec![if saw_nan {
                Real::NAN
            } else {
                Real::new(acc)
            }]))
        }
        StoreType::Complex => {
            let values = as_complex(store).unwrap_or_default();
            let (mut re, mut im) = (0.0, 0.0);
            for c in values {
                if c.is_na() {
                    return Ok(Store::Complex(vec![Complex::NA]));
                }
                re += c.re().value();
                im += c.im().value();
            }
            Ok(Store::Complex(vec![Complex::new(re, im)]))
        }
        other => Err(EvalError::eval(format!(
            "invalid 'type' ({}) of argument",
            other.name()
        ))),
    }
}
