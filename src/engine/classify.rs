//! Operation classifier
//!
//! Groups actionable diffs by the operation their change policy designates.
//! A recreate group dominates: when present it is the only group returned.

use super::diff::FieldDiff;
use crate::resource::ChangePolicy;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Recreate,
    Update(String),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Recreate => write!(f, "recreate"),
            Operation::Update(name) => write!(f, "{}", name),
        }
    }
}

/// An operation plus the diffs that justify calling it
#[derive(Debug, Clone, PartialEq)]
pub struct OperationGroup {
    pub operation: Operation,
    pub diffs: Vec<FieldDiff>,
}

impl OperationGroup {
    pub fn is_recreate(&self) -> bool {
        self.operation == Operation::Recreate
    }

    /// Path of the first triggering field, used in logs and errors
    pub fn first_field(&self) -> &str {
        self.diffs.first().map(|d| d.path.as_str()).unwrap_or("")
    }

    /// Distinct top-level wire names of the changed fields, in first-seen order
    pub fn update_mask(&self) -> Vec<String> {
        let mut mask: Vec<String> = Vec::new();
        for d in &self.diffs {
            if !mask.contains(&d.root_field) {
                mask.push(d.root_field.clone());
            }
        }
        mask
    }
}

/// Classify diffs into operation groups. Informational diffs are dropped.
pub fn classify(diffs: &[FieldDiff]) -> Vec<OperationGroup> {
    let recreate: Vec<FieldDiff> = diffs
        .iter()
        .filter(|d| d.policy == ChangePolicy::Recreate)
        .cloned()
        .collect();
    if !recreate.is_empty() {
        return vec![OperationGroup {
            operation: Operation::Recreate,
            diffs: recreate,
        }];
    }

    let mut groups: Vec<OperationGroup> = Vec::new();
    for d in diffs {
        let ChangePolicy::Update(name) = &d.policy else {
            continue;
        };
        match groups
            .iter_mut()
            .find(|g| matches!(&g.operation, Operation::Update(n) if n == name))
        {
            Some(group) => group.diffs.push(d.clone()),
            None => groups.push(OperationGroup {
                operation: Operation::Update(name.clone()),
                diffs: vec![d.clone()],
            }),
        }
    }
    groups
}
