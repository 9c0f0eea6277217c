//! Desired-state validation
//!
//! Runs before any network call: required fields, unknown fields, value
//! shapes and mutually exclusive groups.

use super::nest;
use super::oneof;
use super::value::{Field, Object, Value};
use crate::error::{Error, Result};
use crate::resource::{FieldType, Schema, TypeDef};

/// Validate a desired tree against its resource schema
pub fn validate(schema: &Schema<'_>, tree: &Object) -> Result<()> {
    let root = schema.root()?;
    for identity in &schema.resource.identity {
        if tree.get(identity).is_empty_like() {
            return Err(Error::validation(nest("", identity), "required field is missing"));
        }
    }
    validate_object(schema, root, tree, "")
}

fn validate_object(schema: &Schema<'_>, ty: &TypeDef, obj: &Object, prefix: &str) -> Result<()> {
    if let Some((unknown, _)) = obj.iter().find(|(name, _)| ty.field(name).is_none()) {
        return Err(Error::validation(nest(prefix, unknown), "unknown field"));
    }

    for group in &ty.one_of {
        let set = oneof::present(group, obj);
        if set.len() > 1 {
            return Err(Error::validation(
                if prefix.is_empty() { "<root>" } else { prefix },
                format!("only one of [{}] may be set, found [{}]", group.join(", "), set.join(", ")),
            ));
        }
    }

    for field in &ty.fields {
        let path = nest(prefix, &field.name);
        let value = obj.get(&field.name);
        if field.required && value.is_empty_like() {
            return Err(Error::validation(path, "required field is missing"));
        }
        let Field::Set(value) = value else {
            continue;
        };
        if !value.conforms(field.kind) {
            return Err(Error::shape(path, field.kind.describe()));
        }
        match (field.kind, value) {
            (FieldType::Object, Value::Object(nested)) => {
                validate_object(schema, schema.object_type(field)?, nested, &path)?;
            }
            (FieldType::ObjectArray, Value::List(items)) => {
                let nested_ty = schema.object_type(field)?;
                for item in items {
                    if let Value::Object(nested) = item {
                        validate_object(schema, nested_ty, nested, &path)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}
