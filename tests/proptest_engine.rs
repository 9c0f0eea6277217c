//! Property-based tests using proptest
//!
//! These tests verify the diff engine's core guarantees (canonicalization,
//! oneof handling, classification and the wire codec) using randomized
//! pipelines.

use gdeploy::engine::{
    canonicalize, canonicalize_initial, classify, diff, expand, flatten, validate, ExpandMode, Field, FieldDiff,
    Object,
};
use gdeploy::resource::{get_registry, ChangePolicy, Schema};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn pipeline_schema() -> Schema<'static> {
    get_registry().schema("clouddeploy.DeliveryPipeline").unwrap()
}

/// Generate a deployment strategy: standard, canary with percentages, or
/// canary with custom phases
fn arb_strategy() -> impl Strategy<Value = Value> {
    let runtime = json!({"kubernetes": {"gatewayServiceMesh": {
        "httpRoute": "route", "service": "svc", "deployment": "dep"
    }}});
    prop_oneof![
        any::<bool>().prop_map(|verify| json!({"standard": {"verify": verify}})),
        prop::collection::vec(1i64..100, 1..4).prop_map({
            let runtime = runtime.clone();
            move |percentages| json!({"canary": {
                "runtimeConfig": runtime.clone(),
                "canaryDeployment": {"percentages": percentages}
            }})
        }),
        prop::collection::vec(("[a-z]{1,8}", 1i64..=100), 1..3).prop_map(move |phases| {
            let phases: Vec<Value> = phases
                .into_iter()
                .map(|(id, pct)| json!({"phaseId": id, "percentage": pct}))
                .collect();
            json!({"canary": {
                "runtimeConfig": runtime.clone(),
                "customCanaryDeployment": {"phaseConfigs": phases}
            }})
        }),
    ]
}

/// Generate a pipeline stage
fn arb_stage() -> impl Strategy<Value = Value> {
    (
        "[a-z][a-z0-9-]{0,15}",                          // targetId
        prop::collection::vec("[a-z]{1,8}", 0..3),       // profiles
        prop::option::of(arb_strategy()),
    )
        .prop_map(|(target, profiles, strategy)| {
            let mut stage = json!({"targetId": target, "profiles": profiles});
            if let Some(strategy) = strategy {
                stage["strategy"] = strategy;
            }
            stage
        })
}

/// Generate a delivery pipeline as it would appear on the wire
fn arb_pipeline() -> impl Strategy<Value = Value> {
    (
        "[a-z][a-z0-9-]{0,20}",                                              // name
        prop::option::of("[a-zA-Z ]{0,30}"),                                 // description
        any::<bool>(),                                                       // suspended
        prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..4),    // labels
        prop::collection::vec(arb_stage(), 0..4),
    )
        .prop_map(|(name, description, suspended, labels, stages)| {
            let mut obj = Map::new();
            obj.insert("project".into(), json!("my-project"));
            obj.insert("location".into(), json!("us-central1"));
            obj.insert("name".into(), json!(name));
            if let Some(d) = description {
                obj.insert("description".into(), json!(d));
            }
            obj.insert("suspended".into(), json!(suspended));
            obj.insert("labels".into(), json!(labels));
            obj.insert("serialPipeline".into(), json!({"stages": stages}));
            Value::Object(obj)
        })
}

fn actionable(diffs: Vec<FieldDiff>) -> Vec<FieldDiff> {
    diffs.into_iter().filter(|d| d.policy != ChangePolicy::None).collect()
}

/// Members of `Strategy` and `Canary` oneof groups present in every stage
fn strategy_members(tree: &Object) -> Vec<usize> {
    let mut counts = Vec::new();
    let Some(stages) = tree
        .get("serialPipeline")
        .as_object()
        .and_then(|sp| sp.get("stages").value())
        .and_then(|v| v.as_list())
    else {
        return counts;
    };
    for stage in stages.iter().filter_map(|s| s.as_object()) {
        let Some(strategy) = stage.get("strategy").as_object() else {
            continue;
        };
        counts.push(["standard", "canary"].iter().filter(|m| strategy.get(m).is_present()).count());
        if let Some(canary) = strategy.get("canary").as_object() {
            counts.push(
                ["canaryDeployment", "customCanaryDeployment"]
                    .iter()
                    .filter(|m| canary.get(m).is_present())
                    .count(),
            );
        }
    }
    counts
}

proptest! {
    /// Generated pipelines pass validation
    #[test]
    fn generated_pipelines_are_valid(json in arb_pipeline()) {
        let schema = pipeline_schema();
        let tree = flatten(&schema, &json).unwrap();
        prop_assert!(validate(&schema, &tree).is_ok());
    }

    /// A resource diffed against itself has no actionable differences
    #[test]
    fn self_diff_is_empty(json in arb_pipeline()) {
        let schema = pipeline_schema();
        let tree = flatten(&schema, &json).unwrap();
        let desired = canonicalize(&schema, &tree, Some(&tree));
        let initial = canonicalize_initial(&schema, &tree, &tree);
        let diffs = actionable(diff(&schema, Some(&desired), Some(&initial)).unwrap());
        prop_assert!(diffs.is_empty(), "{:?}", diffs);
    }

    /// Fields left out of the desired state adopt the live value and never diff
    #[test]
    fn absent_fields_never_diff(json in arb_pipeline()) {
        let schema = pipeline_schema();
        let live = flatten(&schema, &json).unwrap();
        let desired = Object::new()
            .with("project", "my-project")
            .with("location", "us-central1")
            .with("name", live.str_field("name").unwrap_or_default());
        let canonical = canonicalize(&schema, &desired, Some(&live));
        let initial = canonicalize_initial(&schema, &live, &desired);
        let diffs = actionable(diff(&schema, Some(&canonical), Some(&initial)).unwrap());
        prop_assert!(diffs.is_empty(), "{:?}", diffs);
    }

    /// Canonicalization is idempotent
    #[test]
    fn canonicalize_is_idempotent(desired in arb_pipeline(), live in arb_pipeline()) {
        let schema = pipeline_schema();
        let desired = flatten(&schema, &desired).unwrap();
        let live = flatten(&schema, &live).unwrap();
        let once = canonicalize(&schema, &desired, Some(&live));
        let twice = canonicalize(&schema, &once, Some(&live));
        prop_assert_eq!(once, twice);
    }

    /// Canonical trees never carry two members of a oneof group
    #[test]
    fn canonical_trees_respect_oneof(desired in arb_pipeline(), live in arb_pipeline()) {
        let schema = pipeline_schema();
        let desired = flatten(&schema, &desired).unwrap();
        let live = flatten(&schema, &live).unwrap();
        let canonical = canonicalize(&schema, &desired, Some(&live));
        let initial = canonicalize_initial(&schema, &live, &desired);
        for count in strategy_members(&canonical).into_iter().chain(strategy_members(&initial)) {
            prop_assert!(count <= 1);
        }
    }

    /// Flattening an expanded tree gives the tree back
    #[test]
    fn flatten_inverts_expand(json in arb_pipeline()) {
        let schema = pipeline_schema();
        let tree = flatten(&schema, &json).unwrap();
        let wire = expand(&schema, &tree, ExpandMode::Full).unwrap();
        prop_assert_eq!(flatten(&schema, &wire).unwrap(), tree);
    }

    /// Request bodies never carry identity or output-only fields
    #[test]
    fn request_body_omits_url_params(json in arb_pipeline()) {
        let schema = pipeline_schema();
        let tree = flatten(&schema, &json).unwrap().with("uid", "u-1").with("etag", "e-1");
        let body = expand(&schema, &tree, ExpandMode::Request).unwrap();
        for key in ["name", "project", "location", "uid", "etag"] {
            prop_assert!(body.get(key).is_none(), "{} leaked into request body", key);
        }
    }

    /// A recreate diff anywhere means recreate is the only operation
    #[test]
    fn recreate_dominates(policies in prop::collection::vec(0u8..4, 1..12)) {
        let diffs: Vec<FieldDiff> = policies
            .iter()
            .enumerate()
            .map(|(i, p)| FieldDiff {
                path: format!("Field{}", i),
                root_field: format!("field{}", i % 3),
                desired: Field::set("a"),
                actual: Field::set("b"),
                policy: match p {
                    0 => ChangePolicy::None,
                    1 => ChangePolicy::Recreate,
                    2 => ChangePolicy::Update("updateA".into()),
                    _ => ChangePolicy::Update("updateB".into()),
                },
                output_only: false,
            })
            .collect();
        let groups = classify(&diffs);

        if policies.contains(&1) {
            prop_assert_eq!(groups.len(), 1);
            prop_assert!(groups[0].is_recreate());
            prop_assert_eq!(groups[0].diffs.len(), policies.iter().filter(|p| **p == 1).count());
        } else {
            prop_assert!(groups.iter().all(|g| !g.is_recreate()));
            let grouped: usize = groups.iter().map(|g| g.diffs.len()).sum();
            prop_assert_eq!(grouped, policies.iter().filter(|p| **p >= 2).count());
            for group in &groups {
                let mask = group.update_mask();
                let mut deduped = mask.clone();
                deduped.dedup();
                prop_assert_eq!(mask.len(), deduped.len());
            }
        }
    }
}

/// Hand-picked cases around oneof switches
mod oneof_tests {
    use super::*;

    fn pipeline_with_strategy(strategy: Value) -> Object {
        let json = json!({
            "project": "p", "location": "l", "name": "web",
            "serialPipeline": {"stages": [{"targetId": "prod", "strategy": strategy}]}
        });
        flatten(&pipeline_schema(), &json).unwrap()
    }

    /// Switching from standard to canary reports only the canary side
    #[test]
    fn test_standard_to_canary() {
        let schema = pipeline_schema();
        let live = pipeline_with_strategy(json!({"standard": {"verify": true}}));
        let desired = pipeline_with_strategy(json!({"canary": {
            "runtimeConfig": {"cloudRun": {"automaticTrafficControl": true}},
            "canaryDeployment": {"percentages": [50]}
        }}));

        let canonical = canonicalize(&schema, &desired, Some(&live));
        let initial = canonicalize_initial(&schema, &live, &desired);
        let diffs = actionable(diff(&schema, Some(&canonical), Some(&initial)).unwrap());

        assert_eq!(diffs.len(), 1, "{:?}", diffs);
        assert!(diffs[0].path.ends_with("Strategy.Canary"), "{}", diffs[0].path);
        assert_eq!(diffs[0].root_field, "serialPipeline");
    }

    /// A zero default the server leaves out of its response is no change
    #[test]
    fn test_omitted_zero_default_is_no_change() {
        let schema = pipeline_schema();
        let live = pipeline_with_strategy(json!({"standard": {}}));
        let desired = pipeline_with_strategy(json!({"standard": {"verify": false}}));

        let canonical = canonicalize(&schema, &desired, Some(&live));
        let initial = canonicalize_initial(&schema, &live, &desired);
        let diffs = actionable(diff(&schema, Some(&canonical), Some(&initial)).unwrap());

        assert!(diffs.is_empty(), "{:?}", diffs);
    }

    /// Setting both members of a group is rejected before any diffing
    #[test]
    fn test_both_members_rejected() {
        let schema = pipeline_schema();
        let desired = pipeline_with_strategy(json!({
            "standard": {"verify": true},
            "canary": {"canaryDeployment": {"percentages": [50]}}
        }));
        assert!(matches!(
            validate(&schema, &desired),
            Err(gdeploy::Error::Validation { .. })
        ));
    }
}
