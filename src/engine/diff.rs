//! Field-level differ
//!
//! Walks two canonicalized trees in schema order and emits one [`FieldDiff`]
//! per field whose sides differ under that field's equality. Nested objects
//! recurse with the parent path as prefix. An object present on one side
//! only is reported once as a whole, unless everything in it is zero. An
//! object present but empty on one side (a cleared oneof parent) is compared
//! field by field against nothing.

use super::equality::fields_equal;
use super::nest;
use super::value::{Field, Object, Value};
use crate::error::{Error, Result};
use crate::resource::{ChangePolicy, Equality, FieldDef, FieldType, Schema, TypeDef};
use std::fmt;

/// One changed field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    /// Dotted PascalCase path, e.g. `SerialPipeline.Stages.TargetId`
    pub path: String,
    /// camelCase name of the top-level field containing the change
    pub root_field: String,
    pub desired: Field,
    pub actual: Field,
    pub policy: ChangePolicy,
    pub output_only: bool,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match &self.policy {
            ChangePolicy::None => "info".to_string(),
            ChangePolicy::Recreate => "recreate".to_string(),
            ChangePolicy::Update(op) => op.clone(),
        };
        write!(f, "{}: {} -> {} [{}]", self.path, self.actual, self.desired, action)
    }
}

struct Scope<'p> {
    prefix: &'p str,
    root_field: Option<&'p str>,
    policy: &'p ChangePolicy,
    output_only: bool,
}

/// Compare `desired` against `actual`. Both trees are required; a missing
/// side means the caller skipped a state transition.
pub fn diff(schema: &Schema<'_>, desired: Option<&Object>, actual: Option<&Object>) -> Result<Vec<FieldDiff>> {
    let (Some(desired), Some(actual)) = (desired, actual) else {
        return Err(Error::Programming(format!(
            "missing {} resource passed to diff",
            schema.key
        )));
    };
    let root = schema.root()?;
    let scope = Scope {
        prefix: "",
        root_field: None,
        policy: &schema.resource.default_policy,
        output_only: false,
    };
    let mut out = Vec::new();
    diff_object(schema, root, desired, actual, &scope, &mut out)?;
    Ok(out)
}

fn diff_object(
    schema: &Schema<'_>,
    ty: &TypeDef,
    desired: &Object,
    actual: &Object,
    scope: &Scope<'_>,
    out: &mut Vec<FieldDiff>,
) -> Result<()> {
    for field in &ty.fields {
        let path = nest(scope.prefix, &field.name);
        let root_field = scope.root_field.unwrap_or(&field.name);
        let output_only = scope.output_only || field.output_only;
        let policy = effective_policy(schema, field, scope);

        let d = desired.get(&field.name);
        let a = actual.get(&field.name);
        check_shape(field, d, &path)?;
        check_shape(field, a, &path)?;
        if d.is_empty_like() && a.is_empty_like() {
            continue;
        }

        let record = || FieldDiff {
            path: path.clone(),
            root_field: root_field.to_string(),
            desired: d.clone(),
            actual: a.clone(),
            policy: policy.clone(),
            output_only,
        };
        let nested_scope = Scope {
            prefix: &path,
            root_field: Some(root_field),
            policy: &policy,
            output_only,
        };

        match field.kind {
            FieldType::Object => {
                let nested = schema.object_type(field)?;
                if !d.is_empty_like() && !a.is_empty_like() {
                    if let (Some(dobj), Some(aobj)) = (d.as_object(), a.as_object()) {
                        diff_object(schema, nested, dobj, aobj, &nested_scope, out)?;
                    }
                    continue;
                }
                // One side is empty: compare against an empty object so that
                // a subtree holding only zero values does not count.
                let empty = Object::new();
                let mut inner = Vec::new();
                diff_object(
                    schema,
                    nested,
                    d.as_object().unwrap_or(&empty),
                    a.as_object().unwrap_or(&empty),
                    &nested_scope,
                    &mut inner,
                )?;
                if inner.is_empty() {
                    continue;
                }
                if d.is_absent() || a.is_absent() {
                    out.push(record());
                } else {
                    out.extend(inner);
                }
            }
            FieldType::ObjectArray => {
                let items = (d.value().and_then(Value::as_list), a.value().and_then(Value::as_list));
                match items {
                    (Some(ds), Some(as_)) if ds.len() == as_.len() => {
                        let nested = schema.object_type(field)?;
                        if field.equality == Equality::Unordered {
                            if !unordered_match(schema, nested, ds, as_, &nested_scope)? {
                                out.push(record());
                            }
                        } else {
                            for (dv, av) in ds.iter().zip(as_) {
                                if let (Value::Object(dobj), Value::Object(aobj)) = (dv, av) {
                                    diff_object(schema, nested, dobj, aobj, &nested_scope, out)?;
                                }
                            }
                        }
                    }
                    _ => out.push(record()),
                }
            }
            _ => {
                if !fields_equal(field, d, a) {
                    out.push(record());
                }
            }
        }
    }
    Ok(())
}

/// Identity fields always recreate; output-only fields are informational
/// unless the schema says otherwise; everything else inherits.
fn effective_policy(schema: &Schema<'_>, field: &FieldDef, scope: &Scope<'_>) -> ChangePolicy {
    if scope.root_field.is_none() && schema.is_identity(&field.name) {
        return ChangePolicy::Recreate;
    }
    match &field.policy {
        Some(policy) => policy.clone(),
        None if field.output_only => ChangePolicy::None,
        None => scope.policy.clone(),
    }
}

fn check_shape(field: &FieldDef, value: &Field, path: &str) -> Result<()> {
    match value {
        Field::Set(v) if !v.conforms(field.kind) => Err(Error::shape(path, field.kind.describe())),
        _ => Ok(()),
    }
}

/// Every desired element has a distinct actual element with no differences
fn unordered_match(
    schema: &Schema<'_>,
    ty: &TypeDef,
    desired: &[Value],
    actual: &[Value],
    scope: &Scope<'_>,
) -> Result<bool> {
    let mut used = vec![false; actual.len()];
    for d in desired {
        let Value::Object(dobj) = d else {
            return Ok(false);
        };
        let mut matched = false;
        for (idx, a) in actual.iter().enumerate() {
            let Value::Object(aobj) = a else {
                continue;
            };
            if used[idx] {
                continue;
            }
            let mut scratch = Vec::new();
            diff_object(schema, ty, dobj, aobj, scope, &mut scratch)?;
            if scratch.is_empty() {
                used[idx] = true;
                matched = true;
                break;
            }
        }
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}
