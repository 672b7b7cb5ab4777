//! Tagged value union for component inputs and resource outputs
//!
//! Component inputs are dynamically typed: strings, numbers, booleans,
//! lists, nested mappings, or unevaluated `${{ … }}` templates. `Expr` is
//! kept distinct from `String` so the evaluator only fires on values that
//! actually carry a template.

use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Marker that a string value carries an unevaluated template
pub const EXPR_OPEN: &str = "${{";

/// A dynamically typed input or output value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Plain string with no template segments
    String(String),
    /// Unevaluated template string containing at least one `${{ … }}`
    Expr(String),
    /// Ordered list
    List(Vec<Value>),
    /// Ordered mapping
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Wrap a string, tagging it as `Expr` when it contains a template
    pub fn from_string(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.contains(EXPR_OPEN) {
            Value::Expr(s)
        } else {
            Value::String(s)
        }
    }

    /// True for `Expr` values
    pub fn is_expr(&self) -> bool {
        matches!(self, Value::Expr(_))
    }

    /// True for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string content of `String` or `Expr` values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Expr(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean accessor
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer accessor
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float accessor (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// List accessor
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Map accessor
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a nested value by dotted path segments
    pub fn get_path(&self, segments: &[&str]) -> Option<&Value> {
        let mut current = self;
        for segment in segments {
            match current {
                Value::Map(map) => current = map.get(*segment)?,
                Value::List(items) => {
                    let index: usize = segment.parse().ok()?;
                    current = items.get(index)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }

    /// Collect every template string reachable from this value
    pub fn expressions(&self) -> Vec<&str> {
        let mut found = Vec::new();
        self.collect_expressions(&mut found);
        found
    }

    fn collect_expressions<'a>(&'a self, found: &mut Vec<&'a str>) {
        match self {
            Value::Expr(s) => found.push(s),
            Value::List(items) => {
                for item in items {
                    item.collect_expressions(found);
                }
            }
            Value::Map(map) => {
                for item in map.values() {
                    item.collect_expressions(found);
                }
            }
            _ => {}
        }
    }

    /// Truthiness used by hook predicates: null and `false` are falsy,
    /// empty strings are falsy, everything else is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::String(s) | Value::Expr(s) => !s.is_empty(),
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Render a scalar value to its string form; lists and maps use their
    /// JSON encoding
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) | Value::Expr(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from_string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from_string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            // Templates round-trip as their raw string form
            Value::String(s) | Value::Expr(s) => serializer.serialize_str(s),
            Value::List(items) => items.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a null, boolean, number, string, list, or mapping")
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
                Value::deserialize(d)
            }

            fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
                Ok(Value::Bool(b))
            }

            fn visit_i64<E>(self, i: i64) -> Result<Value, E> {
                Ok(Value::Int(i))
            }

            fn visit_u64<E: de::Error>(self, u: u64) -> Result<Value, E> {
                i64::try_from(u)
                    .map(Value::Int)
                    .map_err(|_| E::custom(format!("integer out of range: {u}")))
            }

            fn visit_f64<E>(self, f: f64) -> Result<Value, E> {
                Ok(Value::Float(f))
            }

            fn visit_str<E>(self, s: &str) -> Result<Value, E> {
                Ok(Value::from_string(s))
            }

            fn visit_string<E>(self, s: String) -> Result<Value, E> {
                Ok(Value::from_string(s))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::List(items))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
                let mut map = IndexMap::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_tagging() {
        assert!(Value::from_string("${{ databases.main.host }}").is_expr());
        assert!(!Value::from_string("plain text").is_expr());
        assert!(!Value::from_string("${HOME}").is_expr());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
type: "postgres:16"
replicas: 3
debug: false
host: "${{ databases.main.host }}"
nested:
  url: "postgres://${{ databases.main.host }}:5432"
tags:
  - primary
  - 42
"#;
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let map = value.as_map().unwrap();

        assert_eq!(map.get("type").unwrap().as_str(), Some("postgres:16"));
        assert_eq!(map.get("replicas").unwrap().as_int(), Some(3));
        assert_eq!(map.get("debug").unwrap().as_bool(), Some(false));
        assert!(map.get("host").unwrap().is_expr());
        assert!(map
            .get("nested")
            .unwrap()
            .get_path(&["url"])
            .unwrap()
            .is_expr());

        let tags = map.get("tags").unwrap().as_list().unwrap();
        assert_eq!(tags[0].as_str(), Some("primary"));
        assert_eq!(tags[1].as_int(), Some(42));
    }

    #[test]
    fn test_expr_serializes_as_string() {
        let value = Value::Expr("${{ variables.region }}".to_string());
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"${{ variables.region }}\"");
    }

    #[test]
    fn test_collect_expressions() {
        let yaml = r#"
environment:
  DB_HOST: "${{ databases.main.host }}"
  DB_PORT: "${{ databases.main.port }}"
  STATIC: literal
command:
  - run
  - "--addr=${{ services.api.url }}"
"#;
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let exprs = value.expressions();
        assert_eq!(exprs.len(), 3);
        assert!(exprs.contains(&"${{ databases.main.host }}"));
        assert!(exprs.contains(&"--addr=${{ services.api.url }}"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(Value::from_string("yes").is_truthy());
    }

    #[test]
    fn test_get_path_list_index() {
        let value: Value = serde_yaml::from_str("items:\n  - a\n  - b\n").unwrap();
        assert_eq!(
            value.get_path(&["items", "1"]).unwrap().as_str(),
            Some("b")
        );
        assert!(value.get_path(&["items", "5"]).is_none());
    }
}
