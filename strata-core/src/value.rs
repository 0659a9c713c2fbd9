//! Dynamic cell values exchanged between entities and drivers.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// A single column value, independent of the backend it travels to.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

/// The declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Timestamp,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// `true` for values that count as "no identity": null, empty text,
    /// zero integers and empty byte strings.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Int(i) => *i == 0,
            Value::Text(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Bool(_) | Value::Float(_) | Value::Timestamp(_) => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Bytes(_) => Some(ValueKind::Bytes),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
        }
    }

    /// Render the value as an inline SQL literal. Text and timestamps are
    /// quoted, numerics stay bare.
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Float(_) => "NULL".to_string(),
            Value::Text(s) => quote_literal(s),
            Value::Timestamp(t) => quote_literal(&t.to_rfc3339()),
            Value::Bytes(b) => format!("X'{}'", hex::encode(b)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Value::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
        }
    }

    /// Convert a JSON scalar back into a `Value`. Nested arrays and objects
    /// are kept as their JSON text.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            other => f.write_str(&other.sql_literal()),
        }
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Decode a hexadecimal string (either case). Returns `None` on odd length
/// or non-hex characters.
pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    hex::decode(s).ok()
}

/// Conversion from a Rust field into a [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Conversion from a [`Value`] into a Rust field.
///
/// Conversions are lenient where the backends disagree on representation:
/// integers accept booleans and integral floats, booleans accept `0`/`1`,
/// timestamps accept RFC 3339 text and epoch seconds.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be stored in an entity column",
    label = "unsupported column type",
    note = "built-in types: integers, f32, f64, bool, String, Vec<u8>, DateTime<Utc>, Uuid, Option<T>. Mark the field `#[entity(skip)]` or `#[entity(flatten)]`."
)]
pub trait FromValue: Sized {
    /// Declared storage kind for columns of this type.
    const KIND: ValueKind;

    fn from_value(value: &Value) -> Option<Self>;
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => T::from_value(v).map(Some),
        }
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl FromValue for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

macro_rules! impl_int_value {
    ($($ty:ty),+) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    match i64::try_from(*self) {
                        Ok(i) => Value::Int(i),
                        Err(_) => Value::Text(self.to_string()),
                    }
                }
            }

            impl FromValue for $ty {
                const KIND: ValueKind = ValueKind::Int;

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::Text(s) => s.trim().parse().ok(),
                        other => <$ty>::try_from(i64::from_value(other)?).ok(),
                    }
                }
            }
        )+
    };
}

impl_int_value!(i8, i16, i32, isize, u8, u16, u32, u64, usize);

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromValue for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: &Value) -> Option<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Text(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "t" => Some(true),
                "false" | "0" | "f" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Text((*self).to_string())
    }
}

impl FromValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Timestamp(t) => Some(t.to_rfc3339()),
            _ => None,
        }
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for Vec<u8> {
    const KIND: ValueKind = ValueKind::Bytes;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            Value::Text(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::Timestamp;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Timestamp(t) => Some(*t),
            Value::Text(s) => parse_timestamp(s),
            Value::Int(secs) => Utc.timestamp_opt(*secs, 0).single(),
            _ => None,
        }
    }
}

/// Parse RFC 3339 text, falling back to the `YYYY-MM-DD HH:MM:SS[.f]` form
/// SQL engines emit for naive timestamps (read as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl ToValue for uuid::Uuid {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl FromValue for uuid::Uuid {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => uuid::Uuid::parse_str(s).ok(),
            Value::Bytes(b) => uuid::Uuid::from_slice(b).ok(),
            _ => None,
        }
    }
}

macro_rules! impl_from_native {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    v.to_value()
                }
            }
        )+
    };
}

impl_from_native!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, String, &str, Vec<u8>, DateTime<Utc>, uuid::Uuid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values() {
        assert!(Value::Null.is_empty());
        assert!(Value::Int(0).is_empty());
        assert!(Value::Text(String::new()).is_empty());
        assert!(!Value::Int(7).is_empty());
        assert!(!Value::Bool(false).is_empty());
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(Value::Text("o'neil".into()).sql_literal(), "'o''neil'");
        assert_eq!(Value::Int(42).sql_literal(), "42");
        assert_eq!(Value::Float(1.5).sql_literal(), "1.5");
        assert_eq!(Value::Null.sql_literal(), "NULL");
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).sql_literal(), "X'dead'");
    }

    #[test]
    fn test_lenient_conversions() {
        assert_eq!(i32::from_value(&Value::Text("12".into())), Some(12));
        assert_eq!(bool::from_value(&Value::Int(1)), Some(true));
        assert_eq!(i64::from_value(&Value::Float(3.0)), Some(3));
        assert_eq!(i64::from_value(&Value::Float(3.5)), None);
        assert_eq!(u8::from_value(&Value::Int(300)), None);
        assert_eq!(Option::<i64>::from_value(&Value::Null), Some(None));
        assert_eq!(String::from_value(&Value::Null), None);
    }

    #[test]
    fn test_timestamp_parsing() {
        let t = parse_timestamp("2024-03-01 10:20:30").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-01T10:20:30+00:00");
        let t = DateTime::<Utc>::from_value(&Value::Text("2024-03-01T10:20:30Z".into())).unwrap();
        assert_eq!(t.timestamp(), 1709288430);
    }

    #[test]
    fn test_hex_roundtrip() {
        assert_eq!(from_hex("DEad01"), Some(vec![0xde, 0xad, 0x01]));
        assert_eq!(from_hex("abc"), None);
        assert_eq!(from_hex("0g"), None);
        assert_eq!(Value::Bytes(vec![0x0f, 0xa0]).sql_literal(), "X'0fa0'");
    }
}
