//! Expand / flatten
//!
//! Converts between value trees and camelCase JSON. Expansion omits absent
//! and zero-valued fields but sends an explicitly empty field as the type's
//! zero value. Flattening maps missing or null keys to absent and empty wire
//! values to the empty sentinel.

use super::nest;
use super::value::{Field, Object, Value};
use crate::error::{Error, Result};
use crate::resource::{FieldDef, FieldType, Schema, TypeDef};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    /// Request body: output-only and URL fields are left out
    Request,
    /// Everything, for display
    Full,
}

/// Expand a tree into a JSON object
pub fn expand(schema: &Schema<'_>, tree: &Object, mode: ExpandMode) -> Result<Json> {
    Ok(Json::Object(expand_object(schema, schema.root()?, tree, mode, "")?))
}

fn expand_object(
    schema: &Schema<'_>,
    ty: &TypeDef,
    obj: &Object,
    mode: ExpandMode,
    prefix: &str,
) -> Result<Map<String, Json>> {
    let mut out = Map::new();
    for field in &ty.fields {
        if mode == ExpandMode::Request && (field.output_only || field.url_param) {
            continue;
        }
        let path = nest(prefix, &field.name);
        match obj.get(&field.name) {
            Field::Absent => {}
            Field::Empty => {
                out.insert(field.name.clone(), zero_json(field.kind));
            }
            Field::Set(v) if v.is_zero() => {}
            Field::Set(v) => {
                let json = expand_value(schema, field, v, mode, &path)?;
                if !is_empty_json(&json) {
                    out.insert(field.name.clone(), json);
                }
            }
        }
    }
    Ok(out)
}

fn expand_value(schema: &Schema<'_>, field: &FieldDef, value: &Value, mode: ExpandMode, path: &str) -> Result<Json> {
    if !value.conforms(field.kind) {
        return Err(Error::shape(path, field.kind.describe()));
    }
    Ok(match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) if field.kind == FieldType::Double => Json::from(*i as f64),
        Value::Integer(i) => Json::from(*i),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(Json::Number)
            .ok_or_else(|| Error::shape(path, "finite number"))?,
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), Json::String(v.clone())))
                .collect(),
        ),
        Value::Object(obj) => Json::Object(expand_object(schema, schema.object_type(field)?, obj, mode, path)?),
        Value::List(items) => {
            let nested = if field.kind == FieldType::ObjectArray {
                Some(schema.object_type(field)?)
            } else {
                None
            };
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(match (item, nested) {
                    (Value::Object(obj), Some(ty)) => Json::Object(expand_object(schema, ty, obj, mode, path)?),
                    (Value::String(s), _) => Json::String(s.clone()),
                    (Value::Integer(i), _) => Json::from(*i),
                    _ => return Err(Error::shape(path, field.kind.describe())),
                });
            }
            Json::Array(out)
        }
    })
}

fn zero_json(kind: FieldType) -> Json {
    match kind {
        FieldType::String | FieldType::Enum => Json::String(String::new()),
        FieldType::Boolean => Json::Bool(false),
        FieldType::Integer => Json::from(0),
        FieldType::Double => Json::from(0.0),
        FieldType::StringArray | FieldType::IntegerArray | FieldType::ObjectArray => Json::Array(Vec::new()),
        FieldType::StringMap | FieldType::Object => Json::Object(Map::new()),
    }
}

fn is_empty_json(json: &Json) -> bool {
    match json {
        Json::Object(map) => map.is_empty(),
        Json::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Flatten a JSON object into a tree. An empty top-level object is an error:
/// the server never returns one for an existing resource.
pub fn flatten(schema: &Schema<'_>, json: &Json) -> Result<Object> {
    match json {
        Json::Object(map) if map.is_empty() => Err(Error::shape("<root>", "non-empty object")),
        Json::Object(map) => flatten_object(schema, schema.root()?, map, ""),
        _ => Err(Error::shape("<root>", "object")),
    }
}

fn flatten_object(schema: &Schema<'_>, ty: &TypeDef, map: &Map<String, Json>, prefix: &str) -> Result<Object> {
    let mut obj = Object::new();
    for field in &ty.fields {
        let path = nest(prefix, &field.name);
        let value = match map.get(&field.name) {
            None | Some(Json::Null) => Field::Absent,
            Some(json) => flatten_field(schema, field, json, &path)?,
        };
        obj.set(field.name.as_str(), value);
    }
    Ok(obj)
}

fn flatten_field(schema: &Schema<'_>, field: &FieldDef, json: &Json, path: &str) -> Result<Field> {
    let mismatch = || Error::shape(path, field.kind.describe());
    let value = match (field.kind, json) {
        (FieldType::String | FieldType::Enum, Json::String(s)) => Value::String(s.clone()),
        (FieldType::Boolean, Json::Bool(b)) => Value::Bool(*b),
        (FieldType::Integer, j) => Value::Integer(flatten_int(j).ok_or_else(mismatch)?),
        (FieldType::Double, Json::Number(n)) => Value::Double(n.as_f64().ok_or_else(mismatch)?),
        (FieldType::Double, Json::String(s)) => Value::Double(s.parse().map_err(|_| mismatch())?),
        (FieldType::StringArray, Json::Array(items)) => Value::List(
            items
                .iter()
                .map(|j| j.as_str().map(Value::from).ok_or_else(mismatch))
                .collect::<Result<_>>()?,
        ),
        (FieldType::IntegerArray, Json::Array(items)) => Value::List(
            items
                .iter()
                .map(|j| flatten_int(j).map(Value::Integer).ok_or_else(mismatch))
                .collect::<Result<_>>()?,
        ),
        (FieldType::StringMap, Json::Object(map)) => Value::Map(
            map.iter()
                .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())).ok_or_else(mismatch))
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
        (FieldType::Object, Json::Object(map)) => {
            Value::Object(flatten_object(schema, schema.object_type(field)?, map, path)?)
        }
        (FieldType::ObjectArray, Json::Array(items)) => {
            let nested = schema.object_type(field)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let Json::Object(map) = item else {
                    return Err(mismatch());
                };
                out.push(Value::Object(flatten_object(schema, nested, map, path)?));
            }
            Value::List(out)
        }
        _ => return Err(mismatch()),
    };
    Ok(if value.is_zero() { Field::Empty } else { Field::Set(value) })
}

/// int64 arrives as a JSON number or a decimal string
fn flatten_int(json: &Json) -> Option<i64> {
    match json {
        Json::Number(n) => n.as_i64(),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}
