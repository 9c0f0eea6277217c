//! Value tree
//!
//! A resource instance is an [`Object`] mapping field names to a three-state
//! [`Field`]: absent (never mentioned), empty (explicitly present with the
//! zero value) or set. The distinction between the first two drives
//! canonicalization and expansion.

use crate::resource::FieldType;
use std::collections::BTreeMap;
use std::fmt;

/// A concrete field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Integer(i64),
    Double(f64),
    List(Vec<Value>),
    Map(BTreeMap<String, String>),
    Object(Object),
}

/// Presence of a field
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field {
    #[default]
    Absent,
    Empty,
    Set(Value),
}

static ABSENT: Field = Field::Absent;

/// A nested object; missing keys read as [`Field::Absent`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    fields: BTreeMap<String, Field>,
}

impl Value {
    /// True for the type's zero value: `""`, `false`, `0`, empty collections
    /// and objects with nothing present.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Bool(b) => !b,
            Value::Integer(i) => *i == 0,
            Value::Double(d) => *d == 0.0,
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            Value::Object(obj) => obj.is_empty(),
        }
    }

    /// Whether this value has the runtime shape a field type expects
    pub fn conforms(&self, kind: FieldType) -> bool {
        match (kind, self) {
            (FieldType::String | FieldType::Enum, Value::String(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Integer, Value::Integer(_)) => true,
            (FieldType::Double, Value::Double(_) | Value::Integer(_)) => true,
            (FieldType::StringArray, Value::List(items)) => {
                items.iter().all(|v| matches!(v, Value::String(_)))
            }
            (FieldType::IntegerArray, Value::List(items)) => {
                items.iter().all(|v| matches!(v, Value::Integer(_)))
            }
            (FieldType::StringMap, Value::Map(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            (FieldType::ObjectArray, Value::List(items)) => {
                items.iter().all(|v| matches!(v, Value::Object(_)))
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Field {
    pub fn set(value: impl Into<Value>) -> Self {
        Field::Set(value.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// Empty or set
    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    /// Absent, explicitly empty, or set to the zero value
    pub fn is_empty_like(&self) -> bool {
        match self {
            Field::Absent | Field::Empty => true,
            Field::Set(v) => v.is_zero(),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Field::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        self.value().and_then(Value::as_object)
    }
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> &Field {
        self.fields.get(name).unwrap_or(&ABSENT)
    }

    /// Setting a field to [`Field::Absent`] removes it
    pub fn set(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        if field.is_absent() {
            self.fields.remove(&name);
        } else {
            self.fields.insert(name, field);
        }
    }

    /// Builder form of [`Object::set`] for a set value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, Field::Set(value.into()));
        self
    }

    /// Builder form marking a field explicitly empty
    pub fn with_empty(mut self, name: impl Into<String>) -> Self {
        self.set(name, Field::Empty);
        self
    }

    pub fn remove(&mut self, name: &str) -> Field {
        self.fields.remove(name).unwrap_or_default()
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.get(name).value().and_then(Value::as_str)
    }

    /// True when no field is present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Present fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(map: BTreeMap<String, String>) -> Self {
        Value::Map(map)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {:?}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Object(obj) => {
                write!(f, "{{")?;
                for (i, (k, v)) in obj.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Absent => write!(f, "<absent>"),
            Field::Empty => write!(f, "<empty>"),
            Field::Set(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_reads_absent() {
        let obj = Object::new().with("description", "hello");
        assert_eq!(obj.get("labels"), &Field::Absent);
        assert_eq!(obj.str_field("description"), Some("hello"));
    }

    #[test]
    fn test_setting_absent_removes() {
        let mut obj = Object::new().with("suspended", true);
        obj.set("suspended", Field::Absent);
        assert!(obj.is_empty());
    }

    #[test]
    fn test_empty_like() {
        assert!(Field::Absent.is_empty_like());
        assert!(Field::Empty.is_empty_like());
        assert!(Field::set("").is_empty_like());
        assert!(Field::set(Object::new()).is_empty_like());
        assert!(Field::set(false).is_empty_like());
        assert!(!Field::set("x").is_empty_like());
    }

    #[test]
    fn test_conforms() {
        let percentages = Value::List(vec![Value::Integer(25), Value::Integer(50)]);
        assert!(percentages.conforms(FieldType::IntegerArray));
        assert!(!percentages.conforms(FieldType::StringArray));
        assert!(!Value::from("x").conforms(FieldType::Object));
    }
}
