use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;

/// Logical scalar carried by a row. The remote engine has no boolean type
/// (booleans are bound as 1/0) and no dedicated date/time type (timestamps
/// travel as ISO-8601 text).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Translate a wire value into the logical representation. JSON null is
    /// the foreign null sentinel; booleans are accepted on input only and
    /// normalized to 1/0.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Integer(if *b { 1 } else { 0 }),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Real(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            // Arrays/objects do not occur in tabular responses; keep the
            // raw JSON text rather than lose the value.
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(r) => serde_json::Value::from(*r),
            Value::Text(t) => serde_json::Value::from(t.clone()),
            Value::Blob(b) => serde_json::Value::from(
                b.iter().map(|x| serde_json::Value::from(*x)).collect::<Vec<_>>(),
            ),
        }
    }

    pub fn from_sqlite(v: ValueRef<'_>) -> Value {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(r) => ToSqlOutput::from(*r),
            Value::Text(t) => ToSqlOutput::from(t.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(if b { 1 } else { 0 })
    }
}

impl From<Option<Value>> for Value {
    fn from(v: Option<Value>) -> Self {
        v.unwrap_or(Value::Null)
    }
}

/// Normalize caller-supplied parameters before submission: booleans become
/// 1/0. Values arriving through `From<bool>` are already normalized; this
/// pass also covers params deserialized from wire JSON.
pub fn normalize_bool_params(params: &[serde_json::Value]) -> Vec<Value> {
    params.iter().map(Value::from_json).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_null_becomes_logical_null() {
        assert_eq!(Value::from_json(&serde_json::Value::Null), Value::Null);
    }

    #[test]
    fn booleans_normalize_to_integers() {
        assert_eq!(Value::from_json(&serde_json::json!(true)), Value::Integer(1));
        assert_eq!(Value::from_json(&serde_json::json!(false)), Value::Integer(0));
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(false), Value::Integer(0));
    }

    #[test]
    fn numbers_keep_integer_identity() {
        assert_eq!(Value::from_json(&serde_json::json!(42)), Value::Integer(42));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Real(1.5));
    }

    #[test]
    fn json_round_trip_for_scalars() {
        for v in [
            Value::Null,
            Value::Integer(-3),
            Value::Real(0.25),
            Value::Text("hello".into()),
        ] {
            assert_eq!(Value::from_json(&v.to_json()), v);
        }
    }
}
