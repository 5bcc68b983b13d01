use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Scalar data types an attribute may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Object,
    Array,
    Mixed,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::String,
        DataType::Integer,
        DataType::Float,
        DataType::Boolean,
        DataType::Date,
        DataType::Object,
        DataType::Array,
        DataType::Mixed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Object => "object",
            DataType::Array => "array",
            DataType::Mixed => "mixed",
        }
    }

    /// Convert an incoming value into this type's canonical representation.
    ///
    /// `Null` passes through untouched; callers treat it as a removal. Dates are normalised
    /// to RFC 3339 in UTC with millisecond precision; integer inputs are epoch seconds.
    pub fn convert(&self, value: Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(value);
        }

        match self {
            DataType::Mixed => Ok(value),
            DataType::String => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(format!("cannot convert {} to string", kind(&other))),
            },
            DataType::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
                Value::Number(n) => n
                    .as_f64()
                    .and_then(integral)
                    .map(Value::from)
                    .ok_or_else(|| format!("cannot convert {} to integer", n)),
                Value::String(s) => parse_integer(s.trim())
                    .map(Value::from)
                    .ok_or_else(|| format!("cannot convert \"{}\" to integer", s)),
                Value::Bool(b) => Ok(Value::from(i64::from(*b))),
                other => Err(format!("cannot convert {} to integer", kind(other))),
            },
            DataType::Float => {
                let float = match &value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                float
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| format!("cannot convert {} to float", kind(&value)))
            }
            DataType::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(Value::Bool(true)),
                    "false" | "0" | "no" | "" => Ok(Value::Bool(false)),
                    _ => Err(format!("cannot convert \"{}\" to boolean", s)),
                },
                other => Err(format!("cannot convert {} to boolean", kind(other))),
            },
            DataType::Date => {
                let parsed = match &value {
                    Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                        .map(|date| date.with_timezone(&Utc))
                        .ok(),
                    Value::Number(n) => n
                        .as_i64()
                        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                    _ => None,
                };
                parsed
                    .map(|date| Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)))
                    .ok_or_else(|| format!("cannot convert {} to date", kind(&value)))
            }
            DataType::Object => match value {
                Value::Object(_) => Ok(value),
                other => Err(format!("cannot convert {} to object", kind(&other))),
            },
            DataType::Array => match value {
                Value::Array(_) => Ok(value),
                scalar => Ok(Value::Array(vec![scalar])),
            },
        }
    }
}

fn parse_integer(input: &str) -> Option<i64> {
    input
        .parse::<i64>()
        .ok()
        .or_else(|| input.parse::<f64>().ok().and_then(integral))
}

/// `f` as an `i64` when it is a whole number in range.
fn integral(f: f64) -> Option<i64> {
    // `i64::MAX as f64` rounds up to 2^63, hence the exclusive upper bound.
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then_some(f as i64)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|data_type| data_type.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Schema description of a scalar attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMetadata {
    pub key: String,
    pub data_type: DataType,
    pub description: Option<String>,
    pub default: Option<Value>,
    /// Computed attributes are derived by the backing store and cannot be set.
    pub computed: bool,
    pub searchable: bool,
    pub serialize: bool,
    pub persist: bool,
}

impl AttributeMetadata {
    pub fn new(key: impl Into<String>, data_type: DataType) -> Self {
        AttributeMetadata {
            key: key.into(),
            data_type,
            description: None,
            default: None,
            computed: false,
            searchable: false,
            serialize: true,
            persist: true,
        }
    }
}
