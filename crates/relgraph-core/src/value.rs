//! Dynamic SQL values and positional parameter lists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamically-typed SQL value.
///
/// This enum is what crosses the [`Connection`](crate::Connection) boundary in both
/// directions: bind parameters going out, column values coming back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value
    Bool(bool),

    /// 32-bit signed integer
    Int(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 64-bit floating point
    Double(f64),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
        }
    }

    /// The bind-type tag used when this value is sent as a parameter.
    pub const fn bind_type(&self) -> BindType {
        match self {
            Value::Bool(_) | Value::Int(_) | Value::BigInt(_) => BindType::Integer,
            Value::Double(_) => BindType::Double,
            Value::Null | Value::Text(_) | Value::Bytes(_) => BindType::Text,
        }
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::BigInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One-character bind-type tag paired with each positional parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindType {
    /// `s`
    Text,
    /// `i`
    Integer,
    /// `d`
    Double,
}

impl BindType {
    pub const fn code(self) -> char {
        match self {
            BindType::Text => 's',
            BindType::Integer => 'i',
            BindType::Double => 'd',
        }
    }
}

/// Positional bind values with their parallel type-tag string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<Value>,
    types: String,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value with an explicit tag.
    pub fn push(&mut self, value: Value, bind_type: BindType) {
        self.values.push(value);
        self.types.push(bind_type.code());
    }

    /// Append a value tagged from its own variant.
    pub fn push_value(&mut self, value: Value) {
        let bind_type = value.bind_type();
        self.push(value, bind_type);
    }

    /// Append every parameter of `other`, preserving order.
    pub fn extend(&mut self, other: &Params) {
        self.values.extend(other.values.iter().cloned());
        self.types.push_str(&other.types);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The type-tag string, one character per value (`s`, `i`, `d`).
    pub fn types(&self) -> &str {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<Value> for Params {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut params = Params::new();
        for value in iter {
            params.push_value(value);
        }
        params
    }
}
