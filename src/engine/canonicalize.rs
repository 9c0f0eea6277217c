//! Canonicalization
//!
//! Merges a desired tree with the previously observed state so that the
//! differ only reports changes the user actually asked for:
//!
//! - an absent desired field adopts the observed value (server defaults)
//! - a desired value equal to the observed one under the field's equality
//!   adopts the observed literal (short name vs self link)
//! - an explicitly empty desired field is kept as-is
//! - the first set member of a oneof group wins, the others are cleared
//!
//! Canonicalization never fails; it only rewrites values.

use super::equality::values_equal;
use super::oneof;
use super::value::{Field, Object, Value};
use crate::resource::{FieldDef, FieldType, Schema, TypeDef};

/// Canonicalize `desired` against the observed `initial` state, or against
/// nothing when the resource does not exist yet.
pub fn canonicalize(schema: &Schema<'_>, desired: &Object, initial: Option<&Object>) -> Object {
    match schema.root() {
        Ok(root) => canonicalize_object(schema, root, desired, initial),
        Err(e) => {
            tracing::warn!(kind = schema.key, error = %e, "schema has no root type, leaving desired as-is");
            desired.clone()
        }
    }
}

/// Clear oneof members of the observed state that the desired state did not
/// choose, so switching variants is not reported as a both-set conflict.
pub fn canonicalize_initial(schema: &Schema<'_>, initial: &Object, desired: &Object) -> Object {
    match schema.root() {
        Ok(root) => canonicalize_initial_object(schema, root, initial, desired),
        Err(_) => initial.clone(),
    }
}

fn canonicalize_object(
    schema: &Schema<'_>,
    ty: &TypeDef,
    desired: &Object,
    initial: Option<&Object>,
) -> Object {
    let empty = Object::new();
    let initial_obj = initial.unwrap_or(&empty);
    let mut out = Object::new();

    for field in &ty.fields {
        let merged = canonicalize_field(schema, field, desired.get(&field.name), initial_obj.get(&field.name));
        out.set(field.name.as_str(), merged);
    }

    for group in &ty.one_of {
        if let Some(keep) = oneof::chosen(group, desired, &out) {
            oneof::clear_others(group, keep, &mut out);
        }
    }
    out
}

fn canonicalize_field(schema: &Schema<'_>, field: &FieldDef, desired: &Field, initial: &Field) -> Field {
    let value = match desired {
        Field::Absent => return normalize_adopted(schema, field, initial),
        Field::Empty => return Field::Empty,
        Field::Set(v) if v.is_zero() => {
            return if initial.is_absent() {
                desired.clone()
            } else {
                normalize_adopted(schema, field, initial)
            };
        }
        Field::Set(v) => v,
    };

    match (field.kind, value) {
        (FieldType::Object, Value::Object(d)) => {
            let Ok(nested) = schema.object_type(field) else {
                return desired.clone();
            };
            Field::Set(Value::Object(canonicalize_object(schema, nested, d, initial.as_object())))
        }
        (FieldType::ObjectArray, Value::List(items)) => {
            let Ok(nested) = schema.object_type(field) else {
                return desired.clone();
            };
            let initial_items = initial.value().and_then(Value::as_list).unwrap_or(&[]);
            let merged = if items.len() == initial_items.len() {
                items
                    .iter()
                    .zip(initial_items)
                    .map(|(d, i)| canonicalize_element(schema, nested, d, i.as_object()))
                    .collect()
            } else {
                items
                    .iter()
                    .map(|d| canonicalize_element(schema, nested, d, None))
                    .collect()
            };
            Field::Set(Value::List(merged))
        }
        _ => match initial.value() {
            Some(i) if values_equal(field.equality, value, i) => initial.clone(),
            _ => desired.clone(),
        },
    }
}

fn canonicalize_element(schema: &Schema<'_>, ty: &TypeDef, desired: &Value, initial: Option<&Object>) -> Value {
    match desired {
        Value::Object(d) => Value::Object(canonicalize_object(schema, ty, d, initial)),
        other => other.clone(),
    }
}

/// Adopted observed values still get oneof exclusivity applied inside nested
/// objects.
fn normalize_adopted(schema: &Schema<'_>, field: &FieldDef, initial: &Field) -> Field {
    let Field::Set(value) = initial else {
        return initial.clone();
    };
    if !field.kind.is_object() {
        return initial.clone();
    }
    let Ok(nested) = schema.object_type(field) else {
        return initial.clone();
    };
    let empty = Object::new();
    match value {
        Value::Object(obj) => Field::Set(Value::Object(canonicalize_object(schema, nested, &empty, Some(obj)))),
        Value::List(items) => Field::Set(Value::List(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(obj) => Value::Object(canonicalize_object(schema, nested, &empty, Some(obj))),
                    other => other.clone(),
                })
                .collect(),
        )),
        _ => initial.clone(),
    }
}

fn canonicalize_initial_object(schema: &Schema<'_>, ty: &TypeDef, initial: &Object, desired: &Object) -> Object {
    let mut out = initial.clone();

    for field in &ty.fields {
        if !field.kind.is_object() {
            continue;
        }
        let Ok(nested) = schema.object_type(field) else {
            continue;
        };
        let rewritten = match (initial.get(&field.name), desired.get(&field.name)) {
            (Field::Set(Value::Object(i)), d) => {
                let d_obj = d.as_object().cloned().unwrap_or_default();
                Field::Set(Value::Object(canonicalize_initial_object(schema, nested, i, &d_obj)))
            }
            (Field::Set(Value::List(items)), d) => {
                let d_items = d.value().and_then(Value::as_list).unwrap_or(&[]);
                let rewritten = items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| match item {
                        Value::Object(i) => {
                            let d_obj = d_items
                                .get(idx)
                                .and_then(Value::as_object)
                                .filter(|_| d_items.len() == items.len())
                                .cloned()
                                .unwrap_or_default();
                            Value::Object(canonicalize_initial_object(schema, nested, i, &d_obj))
                        }
                        other => other.clone(),
                    })
                    .collect();
                Field::Set(Value::List(rewritten))
            }
            (other, _) => other.clone(),
        };
        out.set(field.name.as_str(), rewritten);
    }

    for group in &ty.one_of {
        if let Some(keep) = oneof::chosen(group, desired, initial) {
            oneof::clear_others(group, keep, &mut out);
        }
    }
    out
}
