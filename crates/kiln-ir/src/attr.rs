//! Static node attributes.
//!
//! Attribute equality is exact: floats are compared by bit pattern so that
//! two attributes are equal only when they are indistinguishable.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Attribute map of a node, ordered by key.
pub type Attributes = BTreeMap<String, Attribute>;

/// A compile-time constant attached to a node.
#[derive(Clone, Debug)]
pub enum Attribute {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strs(Vec<String>),
}

impl Attribute {
    /// Returns the string payload, if this is a `Str` attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn float_bits(values: &[f64]) -> impl Iterator<Item = u64> + '_ {
    values.iter().map(|v| v.to_bits())
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Ints(a), Self::Ints(b)) => a == b,
            (Self::Floats(a), Self::Floats(b)) => {
                a.len() == b.len() && float_bits(a).eq(float_bits(b))
            }
            (Self::Strs(a), Self::Strs(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Bool(v) => v.hash(state),
            Self::Str(v) => v.hash(state),
            Self::Ints(v) => v.hash(state),
            Self::Floats(v) => {
                v.len().hash(state);
                for bits in float_bits(v) {
                    bits.hash(state);
                }
            }
            Self::Strs(v) => v.hash(state),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Ints(v) => write_list(f, v),
            Self::Floats(v) => {
                let shown: Vec<String> = v.iter().map(|x| format!("{x:?}")).collect();
                write_list(f, &shown)
            }
            Self::Strs(v) => {
                let shown: Vec<String> = v.iter().map(|s| format!("{s:?}")).collect();
                write_list(f, &shown)
            }
        }
    }
}
