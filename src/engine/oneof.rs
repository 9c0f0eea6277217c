//! Mutually exclusive field groups
//!
//! Validation and canonicalization both go through these helpers so the
//! "at most one member" rule lives in one place.

use super::value::{Field, Object};

/// Members of `group` present in `obj`, in declaration order
pub(crate) fn present<'g>(group: &'g [String], obj: &Object) -> Vec<&'g str> {
    group
        .iter()
        .filter(|m| obj.get(m).is_present())
        .map(|m| m.as_str())
        .collect()
}

/// The member that wins: first present in `preferred`, else first present in
/// `fallback`.
pub(crate) fn chosen<'g>(group: &'g [String], preferred: &Object, fallback: &Object) -> Option<&'g str> {
    present(group, preferred)
        .first()
        .copied()
        .or_else(|| present(group, fallback).first().copied())
}

/// Clear every member of `group` other than `keep`
pub(crate) fn clear_others(group: &[String], keep: &str, obj: &mut Object) {
    for member in group {
        if member != keep {
            obj.set(member.as_str(), Field::Absent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Vec<String> {
        vec!["canaryDeployment".into(), "customCanaryDeployment".into()]
    }

    #[test]
    fn test_preferred_wins_over_fallback() {
        let desired = Object::new().with("canaryDeployment", Object::new().with("verify", true));
        let initial = Object::new().with("customCanaryDeployment", Object::new());
        assert_eq!(chosen(&group(), &desired, &initial), Some("canaryDeployment"));
        assert_eq!(chosen(&group(), &Object::new(), &initial), Some("customCanaryDeployment"));
        assert_eq!(chosen(&group(), &Object::new(), &Object::new()), None);
    }

    #[test]
    fn test_clear_others() {
        let mut obj = Object::new()
            .with("canaryDeployment", Object::new())
            .with_empty("customCanaryDeployment");
        clear_others(&group(), "canaryDeployment", &mut obj);
        assert!(obj.get("customCanaryDeployment").is_absent());
        assert!(obj.get("canaryDeployment").is_present());
    }
}
