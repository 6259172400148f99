//! Scalar field kinds and the conversion between stored and native values.
//!
//! Every scalar field declares a [`ScalarKind`]. Values read from the database are
//! turned into [`ScalarValue`]s by [`ScalarKind::from_storage`]; values written back go
//! through [`ScalarValue::to_storage`]. Temporal kinds are stored as text using the
//! chrono format strings in [`Formats`].

use crate::config::Formats;
use crate::error::{ConfigError, ConversionError, Error, Result};
use crate::value::{BindType, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::fmt::Write as _;
use std::net::IpAddr;
use std::sync::OnceLock;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
const COLOR_PATTERN: &str = r"^#?(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$";

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex> {
    if let Some(regex) = cell.get() {
        return Ok(regex);
    }
    let regex = Regex::new(pattern).map_err(|e| {
        Error::Config(ConfigError {
            message: format!("invalid validation pattern {}: {}", pattern, e),
            source: Some(Box::new(e)),
        })
    })?;
    Ok(cell.get_or_init(|| regex))
}

fn email_regex() -> Result<&'static Regex> {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    compiled(&EMAIL, EMAIL_PATTERN)
}

fn color_regex() -> Result<&'static Regex> {
    static COLOR: OnceLock<Regex> = OnceLock::new();
    compiled(&COLOR, COLOR_PATTERN)
}

/// The value type of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Text,
    Int,
    Float,
    /// Non-negative integer discriminant.
    Enum,
    /// Stored as 0/1.
    Bool,
    Date,
    Time,
    DateTime,
    Email,
    Ip,
    Color,
}

impl ScalarKind {
    pub const fn name(self) -> &'static str {
        match self {
            ScalarKind::Text => "text",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Enum => "enum",
            ScalarKind::Bool => "bool",
            ScalarKind::Date => "date",
            ScalarKind::Time => "time",
            ScalarKind::DateTime => "datetime",
            ScalarKind::Email => "email",
            ScalarKind::Ip => "ip",
            ScalarKind::Color => "color",
        }
    }

    pub const fn is_numeric(self) -> bool {
        matches!(self, ScalarKind::Int | ScalarKind::Float)
    }

    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            ScalarKind::Date | ScalarKind::Time | ScalarKind::DateTime
        )
    }

    /// Kinds that support substring matching.
    pub const fn is_textual(self) -> bool {
        matches!(self, ScalarKind::Text | ScalarKind::Email)
    }

    /// Convert a raw stored value. NULL maps to `None`.
    pub fn from_storage(self, raw: &Value, formats: &Formats) -> Result<Option<ScalarValue>> {
        if raw.is_null() {
            return Ok(None);
        }
        let native = match self {
            ScalarKind::Int => raw.as_i64().map(ScalarValue::Int),
            ScalarKind::Float => raw.as_f64().map(ScalarValue::Float),
            ScalarKind::Bool => raw.as_i64().map(|v| ScalarValue::Bool(v != 0)),
            ScalarKind::Enum => raw.as_i64().map(enum_from_i64).transpose()?,
            _ => None,
        };
        if let Some(value) = native {
            return Ok(Some(value));
        }
        match raw {
            Value::Text(s) => self.parse(s, formats).map(Some),
            other => Err(Error::Conversion(ConversionError {
                expected: self.name(),
                actual: other.type_name().to_string(),
                field: None,
            })),
        }
    }

    /// Parse the canonical string form of a value of this kind.
    ///
    /// Text, email and color pass through unchanged; stored data is trusted.
    pub fn parse(self, s: &str, formats: &Formats) -> Result<ScalarValue> {
        let bad = || {
            Error::Conversion(ConversionError {
                expected: self.name(),
                actual: format!("'{}'", s),
                field: None,
            })
        };
        let value = match self {
            ScalarKind::Text => ScalarValue::Text(s.to_string()),
            ScalarKind::Email => ScalarValue::Email(s.to_string()),
            ScalarKind::Color => ScalarValue::Color(s.to_string()),
            ScalarKind::Int => ScalarValue::Int(s.trim().parse().map_err(|_| bad())?),
            ScalarKind::Float => ScalarValue::Float(s.trim().parse().map_err(|_| bad())?),
            ScalarKind::Enum => enum_from_i64(s.trim().parse().map_err(|_| bad())?)?,
            ScalarKind::Bool => match s.trim() {
                "1" => ScalarValue::Bool(true),
                "0" => ScalarValue::Bool(false),
                _ => return Err(bad()),
            },
            ScalarKind::Date => ScalarValue::Date(
                NaiveDate::parse_from_str(s, &formats.date).map_err(|_| bad())?,
            ),
            ScalarKind::Time => ScalarValue::Time(
                NaiveTime::parse_from_str(s, &formats.time).map_err(|_| bad())?,
            ),
            ScalarKind::DateTime => ScalarValue::DateTime(
                NaiveDateTime::parse_from_str(s, &formats.datetime).map_err(|_| bad())?,
            ),
            ScalarKind::Ip => ScalarValue::Ip(s.trim().parse().map_err(|_| bad())?),
        };
        Ok(value)
    }

    /// Fit a caller-supplied value to this kind, validating where the kind has rules.
    ///
    /// Text is accepted for email, color and ip (and validated); an int is accepted for
    /// float and enum fields.
    pub fn coerce(self, value: ScalarValue) -> Result<ScalarValue> {
        let coerced = match (self, value) {
            (ScalarKind::Email, ScalarValue::Text(s) | ScalarValue::Email(s)) => {
                ScalarValue::email(s)?
            }
            (ScalarKind::Color, ScalarValue::Text(s) | ScalarValue::Color(s)) => {
                ScalarValue::color(s)?
            }
            (ScalarKind::Ip, ScalarValue::Text(s)) => {
                ScalarValue::Ip(s.trim().parse().map_err(|_| {
                    Error::invalid_argument(format!("'{}' is not an IP address", s))
                })?)
            }
            (ScalarKind::Float, ScalarValue::Int(i)) => ScalarValue::Float(i as f64),
            (ScalarKind::Enum, ScalarValue::Int(i)) => enum_from_i64(i)
                .map_err(|_| Error::invalid_argument(format!("enum value {} is negative", i)))?,
            (kind, value) if value.kind() == kind => value,
            (kind, value) => {
                return Err(Error::invalid_argument(format!(
                    "{} value cannot be stored in a {} field",
                    value.kind().name(),
                    kind.name()
                )));
            }
        };
        Ok(coerced)
    }
}

fn enum_from_i64(v: i64) -> Result<ScalarValue> {
    u32::try_from(v).map(ScalarValue::Enum).map_err(|_| {
        Error::Conversion(ConversionError {
            expected: "enum",
            actual: format!("{}", v),
            field: None,
        })
    })
}

/// A native scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Text(String),
    Int(i64),
    Float(f64),
    Enum(u32),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Email(String),
    Ip(IpAddr),
    Color(String),
}

impl ScalarValue {
    /// A validated email address.
    pub fn email(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if email_regex()?.is_match(&s) {
            Ok(ScalarValue::Email(s))
        } else {
            Err(Error::invalid_argument(format!("'{}' is not an email address", s)))
        }
    }

    /// A validated hex color (`#rgb`, `#rrggbb` or `#rrggbbaa`, leading `#` optional).
    pub fn color(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if color_regex()?.is_match(&s) {
            Ok(ScalarValue::Color(s))
        } else {
            Err(Error::invalid_argument(format!("'{}' is not a hex color", s)))
        }
    }

    pub const fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::Text(_) => ScalarKind::Text,
            ScalarValue::Int(_) => ScalarKind::Int,
            ScalarValue::Float(_) => ScalarKind::Float,
            ScalarValue::Enum(_) => ScalarKind::Enum,
            ScalarValue::Bool(_) => ScalarKind::Bool,
            ScalarValue::Date(_) => ScalarKind::Date,
            ScalarValue::Time(_) => ScalarKind::Time,
            ScalarValue::DateTime(_) => ScalarKind::DateTime,
            ScalarValue::Email(_) => ScalarKind::Email,
            ScalarValue::Ip(_) => ScalarKind::Ip,
            ScalarValue::Color(_) => ScalarKind::Color,
        }
    }

    pub const fn bind_type(&self) -> BindType {
        match self {
            ScalarValue::Int(_) | ScalarValue::Enum(_) | ScalarValue::Bool(_) => {
                BindType::Integer
            }
            ScalarValue::Float(_) => BindType::Double,
            _ => BindType::Text,
        }
    }

    /// The representation written to the database.
    pub fn to_storage(&self, formats: &Formats) -> Result<Value> {
        let value = match self {
            ScalarValue::Int(v) => Value::BigInt(*v),
            ScalarValue::Enum(v) => Value::BigInt(i64::from(*v)),
            ScalarValue::Bool(v) => Value::BigInt(i64::from(*v)),
            ScalarValue::Float(v) => Value::Double(*v),
            _ => Value::Text(self.to_string_with(formats)?),
        };
        Ok(value)
    }

    /// The canonical string form; [`ScalarKind::parse`] reverses it.
    pub fn to_string_with(&self, formats: &Formats) -> Result<String> {
        let mut out = String::new();
        let written = match self {
            ScalarValue::Text(s) | ScalarValue::Email(s) | ScalarValue::Color(s) => {
                out.push_str(s);
                Ok(())
            }
            ScalarValue::Int(v) => write!(out, "{}", v),
            ScalarValue::Float(v) => write!(out, "{}", v),
            ScalarValue::Enum(v) => write!(out, "{}", v),
            ScalarValue::Bool(v) => write!(out, "{}", u8::from(*v)),
            ScalarValue::Ip(v) => write!(out, "{}", v),
            ScalarValue::Date(v) => write!(out, "{}", v.format(&formats.date)),
            ScalarValue::Time(v) => write!(out, "{}", v.format(&formats.time)),
            ScalarValue::DateTime(v) => write!(out, "{}", v.format(&formats.datetime)),
        };
        written.map_err(|_| {
            Error::Config(ConfigError {
                message: format!("invalid format string for {} values", self.kind().name()),
                source: None,
            })
        })?;
        Ok(out)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(v) => Some(*v),
            ScalarValue::Enum(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(*v),
            ScalarValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) | ScalarValue::Email(s) | ScalarValue::Color(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int(i64::from(v))
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<NaiveDate> for ScalarValue {
    fn from(v: NaiveDate) -> Self {
        ScalarValue::Date(v)
    }
}

impl From<NaiveTime> for ScalarValue {
    fn from(v: NaiveTime) -> Self {
        ScalarValue::Time(v)
    }
}

impl From<NaiveDateTime> for ScalarValue {
    fn from(v: NaiveDateTime) -> Self {
        ScalarValue::DateTime(v)
    }
}

impl From<IpAddr> for ScalarValue {
    fn from(v: IpAddr) -> Self {
        ScalarValue::Ip(v)
    }
}
