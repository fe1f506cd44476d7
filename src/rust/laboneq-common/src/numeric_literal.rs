// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use num_complex::Complex64;
use num_traits::cast::ToPrimitive;
use serde::{Serialize, Serializer};

use crate::utils::normalize_f64;

/// A numeric value of a parameter.
///
/// Equality, ordering and hashing are structural: an `Int(1)` is distinct from
/// a `Float(1.0)`, while `0.0` and `-0.0` compare equal.
#[derive(Debug, Clone, Copy)]
pub enum NumericLiteral {
    Int(i64),
    Float(f64),
    Complex(Complex64),
}

impl NumericLiteral {
    fn rank(&self) -> u8 {
        match self {
            NumericLiteral::Int(_) => 0,
            NumericLiteral::Float(_) => 1,
            NumericLiteral::Complex(_) => 2,
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    f64::from_bits(normalize_f64(a)).total_cmp(&f64::from_bits(normalize_f64(b)))
}

impl PartialEq for NumericLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumericLiteral {}

impl PartialOrd for NumericLiteral {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumericLiteral {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NumericLiteral::Int(a), NumericLiteral::Int(b)) => a.cmp(b),
            (NumericLiteral::Float(a), NumericLiteral::Float(b)) => cmp_f64(*a, *b),
            (NumericLiteral::Complex(a), NumericLiteral::Complex(b)) => {
                cmp_f64(a.re, b.re).then_with(|| cmp_f64(a.im, b.im))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for NumericLiteral {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            NumericLiteral::Int(v) => v.hash(state),
            NumericLiteral::Float(v) => normalize_f64(*v).hash(state),
            NumericLiteral::Complex(v) => {
                normalize_f64(v.re).hash(state);
                normalize_f64(v.im).hash(state);
            }
        }
    }
}

/// Complex values serialize to their textual representation, as JSON has
/// no native complex type.
impl Serialize for NumericLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            NumericLiteral::Int(v) => serializer.serialize_i64(*v),
            NumericLiteral::Float(v) => {
                serializer.serialize_f64(f64::from_bits(normalize_f64(*v)))
            }
            NumericLiteral::Complex(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl std::fmt::Display for NumericLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericLiteral::Int(v) => write!(f, "{v}"),
            NumericLiteral::Float(v) => write!(f, "{v:?}"),
            NumericLiteral::Complex(v) => write!(f, "({:?}{:+?}j)", v.re, v.im),
        }
    }
}

impl TryFrom<NumericLiteral> for f64 {
    type Error = &'static str;
    fn try_from(value: NumericLiteral) -> Result<Self, Self::Error> {
        match value {
            NumericLiteral::Int(v) => v
                .to_f64()
                .ok_or("Integer value is too large to convert to f64"),
            NumericLiteral::Float(v) => Ok(v),
            NumericLiteral::Complex(v) => {
                if v.im == 0.0 {
                    Ok(v.re)
                } else {
                    Err("Cannot convert complex to f64")
                }
            }
        }
    }
}

impl From<NumericLiteral> for Complex64 {
    fn from(value: NumericLiteral) -> Complex64 {
        match value {
            NumericLiteral::Int(v) => Complex64::new(v as f64, 0.0),
            NumericLiteral::Float(v) => Complex64::new(v, 0.0),
            NumericLiteral::Complex(v) => v,
        }
    }
}

impl From<f64> for NumericLiteral {
    fn from(value: f64) -> Self {
        NumericLiteral::Float(value)
    }
}

impl From<i64> for NumericLiteral {
    fn from(value: i64) -> Self {
        NumericLiteral::Int(value)
    }
}

impl From<Complex64> for NumericLiteral {
    fn from(value: Complex64) -> Self {
        NumericLiteral::Complex(value)
    }
}
