//! Runtime values
//!
//! A [`Value`] is what one atomic object holds: a scalar or a pointer
//! address.  Compound objects never hold a `Value` directly; their data
//! lives in their atomic leaf subobjects.

use std::fmt;

use crate::types::AtomicType;

/// A memory address.  Address 0 is the null pointer.
pub type Address = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Char(i8),
    Int(i32),
    Double(f64),
    Pointer(Address),
}

impl Value {
    /// The zero value of an atomic type, used by value initialization
    pub fn zero_of(atomic: AtomicType) -> Value {
        match atomic {
            AtomicType::Bool => Value::Bool(false),
            AtomicType::Char => Value::Char(0),
            AtomicType::Int => Value::Int(0),
            AtomicType::Double => Value::Double(0.0),
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Char(c) => c != 0,
            Value::Int(i) => i != 0,
            Value::Double(d) => d != 0.0,
            Value::Pointer(p) => p != 0,
        }
    }

    pub fn as_int(self) -> i32 {
        match self {
            Value::Bool(b) => b as i32,
            Value::Char(c) => c as i32,
            Value::Int(i) => i,
            Value::Double(d) => d as i32,
            Value::Pointer(p) => p as i32,
        }
    }

    pub fn as_double(self) -> f64 {
        match self {
            Value::Bool(b) => b as i32 as f64,
            Value::Char(c) => c as f64,
            Value::Int(i) => i as f64,
            Value::Double(d) => d,
            Value::Pointer(p) => p as f64,
        }
    }

    pub fn as_address(self) -> Address {
        match self {
            Value::Pointer(p) => p,
            other => other.as_int() as Address,
        }
    }

    /// Convert to the representation of the given atomic type
    pub fn convert_to(self, atomic: AtomicType) -> Value {
        match atomic {
            AtomicType::Bool => Value::Bool(self.as_bool()),
            AtomicType::Char => Value::Char(self.as_int() as i8),
            AtomicType::Int => Value::Int(self.as_int()),
            AtomicType::Double => Value::Double(self.as_double()),
        }
    }

    pub fn is_null_pointer(self) -> bool {
        matches!(self, Value::Pointer(0))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => {
                let ch = *c as u8;
                if ch.is_ascii_graphic() || ch == b' ' {
                    write!(f, "'{}'", ch as char)
                } else {
                    write!(f, "'\\x{ch:02x}'")
                }
            }
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Pointer(0) => write!(f, "nullptr"),
            Value::Pointer(p) => write!(f, "{p:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_match_their_types() {
        assert_eq!(Value::zero_of(AtomicType::Int), Value::Int(0));
        assert_eq!(Value::zero_of(AtomicType::Bool), Value::Bool(false));
        assert_eq!(Value::zero_of(AtomicType::Double), Value::Double(0.0));
    }

    #[test]
    fn conversions_truncate_and_widen() {
        assert_eq!(Value::Double(2.9).convert_to(AtomicType::Int), Value::Int(2));
        assert_eq!(Value::Char(65).convert_to(AtomicType::Int), Value::Int(65));
        assert_eq!(Value::Int(0).convert_to(AtomicType::Bool), Value::Bool(false));
    }

    #[test]
    fn null_pointer_is_false() {
        assert!(!Value::Pointer(0).as_bool());
        assert!(Value::Pointer(0x1000).as_bool());
    }
}
