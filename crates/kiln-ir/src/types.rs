//! Value types.

use std::fmt;

/// The static type of a [`Value`](crate::Value).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ValueType {
    /// A tensor. The only type whose storage can be mutated or aliased.
    Tensor,
    /// A 64-bit signed integer scalar.
    Int,
    /// A 64-bit float scalar.
    Float,
    /// A boolean scalar.
    Bool,
    /// An immutable string.
    Str,
}

impl ValueType {
    /// Returns `true` if values of this type may be written in place or
    /// share storage with other values.
    pub fn is_mutable(self) -> bool {
        matches!(self, Self::Tensor)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tensor => "Tensor",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "str",
        })
    }
}
