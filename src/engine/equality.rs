//! Field equality
//!
//! Equality is per field and may be weaker than structural equality: a full
//! resource URL equals its short name under `self_link`, lists compare as
//! multisets under `unordered`.

use super::value::{Field, Value};
use crate::resource::{address::self_link_to_name, Equality, FieldDef};
use chrono::DateTime;

/// Compare two fields, treating every empty-like state as equal
pub fn fields_equal(field: &FieldDef, a: &Field, b: &Field) -> bool {
    match (a.is_empty_like(), b.is_empty_like()) {
        (true, true) => true,
        (false, false) => match (a.value(), b.value()) {
            (Some(x), Some(y)) => values_equal(field.equality, x, y),
            _ => false,
        },
        _ => false,
    }
}

/// Compare two scalar or collection values under an equality rule
pub fn values_equal(equality: Equality, a: &Value, b: &Value) -> bool {
    match (equality, a, b) {
        (Equality::Exact, _, _) => a == b,
        (Equality::SelfLink, Value::String(x), Value::String(y)) => {
            self_link_to_name(x) == self_link_to_name(y)
        }
        (Equality::CaseInsensitive, Value::String(x), Value::String(y)) => x.eq_ignore_ascii_case(y),
        (Equality::Timestamp, Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(tx), Ok(ty)) => tx == ty,
                _ => x == y,
            }
        }
        (Equality::Unordered, Value::List(xs), Value::List(ys)) => unordered_eq(xs, ys),
        (_, Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(equality, x, y))
        }
        _ => a == b,
    }
}

fn unordered_eq(xs: &[Value], ys: &[Value]) -> bool {
    if xs.len() != ys.len() {
        return false;
    }
    let mut used = vec![false; ys.len()];
    xs.iter().all(|x| {
        match ys
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && x == *y)
        {
            Some((i, _)) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_link_matches_short_name() {
        let full = Value::from("projects/p/locations/us-central1/deliveryPipelines/web");
        let short = Value::from("web");
        assert!(values_equal(Equality::SelfLink, &full, &short));
        assert!(!values_equal(Equality::Exact, &full, &short));
    }

    #[test]
    fn test_timestamp_compares_instants() {
        let a = Value::from("2024-05-01T10:00:00Z");
        let b = Value::from("2024-05-01T12:00:00+02:00");
        assert!(values_equal(Equality::Timestamp, &a, &b));
    }

    #[test]
    fn test_unordered_lists() {
        let a = Value::List(vec!["RENDER".into(), "DEPLOY".into()]);
        let b = Value::List(vec!["DEPLOY".into(), "RENDER".into()]);
        assert!(values_equal(Equality::Unordered, &a, &b));
        assert!(!values_equal(Equality::Exact, &a, &b));
        let c = Value::List(vec!["DEPLOY".into(), "DEPLOY".into()]);
        assert!(!values_equal(Equality::Unordered, &a, &c));
    }

    #[test]
    fn test_empty_like_fields_are_equal() {
        let field: FieldDef =
            serde_json::from_value(serde_json::json!({"name": "description", "type": "string"})).unwrap();
        assert!(fields_equal(&field, &Field::Absent, &Field::Empty));
        assert!(fields_equal(&field, &Field::set(""), &Field::Absent));
        assert!(!fields_equal(&field, &Field::set("x"), &Field::Absent));
    }
}
