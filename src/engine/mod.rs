//! Declarative diff engine
//!
//! One generic engine parameterized by a resource [`Schema`](crate::resource::Schema):
//!
//! - [`value`] - three-state value tree
//! - [`validate`] - required fields and mutually exclusive groups
//! - [`canonicalize`] - merge desired with observed state before diffing
//! - [`diff`] - field-by-field comparison
//! - [`classify`] - group diffs into update operations or a recreate
//! - [`marshal`] - expand to and flatten from the JSON wire format

pub mod canonicalize;
pub mod classify;
pub mod diff;
pub mod equality;
pub mod marshal;
mod oneof;
pub mod validate;
pub mod value;

pub use canonicalize::{canonicalize, canonicalize_initial};
pub use classify::{classify, Operation, OperationGroup};
pub use diff::{diff, FieldDiff};
pub use marshal::{expand, flatten, ExpandMode};
pub use validate::validate;
pub use value::{Field, Object, Value};

/// Dotted display path, e.g. `SerialPipeline.Stages.TargetId`
pub(crate) fn nest(prefix: &str, name: &str) -> String {
    let mut chars = name.chars();
    let pascal: String = match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    };
    if prefix.is_empty() {
        pascal
    } else {
        format!("{}.{}", prefix, pascal)
    }
}
