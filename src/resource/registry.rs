//! Schema Registry - Load resource schemas from JSON
//!
//! Resource schemas (field descriptors, identity fields, URL templates and
//! update operations) are embedded JSON files compiled into the binary. The
//! registry merges them, checks that every reference resolves, and serves
//! lookups to the engine and the reconcile driver.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Embedded schema JSON files (compiled into the binary)
const SCHEMA_FILES: &[&str] = &[
    include_str!("../schemas/delivery_pipeline.json"),
    include_str!("../schemas/target.json"),
];

/// Semantic type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Enum,
    Boolean,
    Integer,
    Double,
    StringArray,
    IntegerArray,
    StringMap,
    Object,
    ObjectArray,
}

impl FieldType {
    pub fn is_object(self) -> bool {
        matches!(self, FieldType::Object | FieldType::ObjectArray)
    }

    /// Human readable name used in shape errors
    pub fn describe(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Enum => "enum string",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Double => "number",
            FieldType::StringArray => "array of strings",
            FieldType::IntegerArray => "array of integers",
            FieldType::StringMap => "map of strings",
            FieldType::Object => "object",
            FieldType::ObjectArray => "array of objects",
        }
    }
}

/// How two values of a field are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equality {
    #[default]
    Exact,
    /// Full resource URL and short name compare equal
    SelfLink,
    CaseInsensitive,
    /// Lists compare as multisets
    Unordered,
    /// RFC 3339 timestamps compare as instants
    Timestamp,
}

/// What a change to a field requires
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePolicy {
    /// Informational only
    None,
    Recreate,
    /// Handled by the named update operation
    Update(String),
}

/// Field descriptor
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    /// camelCase wire name
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    /// Nested type name for object kinds
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Server-generated, never sent
    #[serde(default)]
    pub output_only: bool,
    /// Carried in the URL, never in a request body
    #[serde(default)]
    pub url_param: bool,
    #[serde(default)]
    pub equality: Equality,
    /// Inherited from the parent field when omitted
    #[serde(default)]
    pub policy: Option<ChangePolicy>,
}

/// Object type: ordered fields plus mutually exclusive groups
#[derive(Debug, Clone, Deserialize)]
pub struct TypeDef {
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub one_of: Vec<Vec<String>>,
}

impl TypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Update operation definition
#[derive(Debug, Clone, Deserialize)]
pub struct OperationDef {
    pub method: String,
    pub url: String,
    /// Send the changed top-level fields as `updateMask`
    #[serde(default)]
    pub update_mask: bool,
    /// Copy the current etag into the request body
    #[serde(default)]
    pub etag: bool,
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub service: String,
    pub base_path: String,
    /// Root type name
    pub root: String,
    /// Fields forming the resource address
    pub identity: Vec<String>,
    /// Change policy of top-level fields without one of their own
    pub default_policy: ChangePolicy,
    pub get_url: String,
    pub list_url: String,
    pub create_url: String,
    pub delete_url: String,
    /// Extra query parameters sent with delete
    #[serde(default)]
    pub delete_params: BTreeMap<String, String>,
    /// Field of the list response holding the items
    pub list_field: String,
    #[serde(default)]
    pub operations: BTreeMap<String, OperationDef>,
}

/// Root structure of schemas/*.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDef>,
    #[serde(default)]
    pub types: BTreeMap<String, TypeDef>,
}

/// Validated collection of resource schemas
#[derive(Debug, Clone, Default)]
pub struct Registry {
    resources: BTreeMap<String, ResourceDef>,
    types: BTreeMap<String, TypeDef>,
}

/// One resource's schema, borrowed from a registry
#[derive(Debug, Clone, Copy)]
pub struct Schema<'a> {
    pub key: &'a str,
    pub resource: &'a ResourceDef,
    types: &'a BTreeMap<String, TypeDef>,
}

impl<'a> Schema<'a> {
    pub fn root(&self) -> Result<&'a TypeDef> {
        self.types
            .get(&self.resource.root)
            .ok_or_else(|| Error::Schema(format!("{}: unknown root type {}", self.key, self.resource.root)))
    }

    pub fn type_def(&self, name: &str) -> Option<&'a TypeDef> {
        self.types.get(name)
    }

    /// Nested type of an object or object-array field
    pub fn object_type(&self, field: &FieldDef) -> Result<&'a TypeDef> {
        field
            .object
            .as_deref()
            .and_then(|name| self.types.get(name))
            .ok_or_else(|| Error::Schema(format!("{}: field {} has no object type", self.key, field.name)))
    }

    pub fn is_identity(&self, name: &str) -> bool {
        self.resource.identity.iter().any(|i| i == name)
    }

    pub fn operation(&self, name: &str) -> Result<&'a OperationDef> {
        self.resource
            .operations
            .get(name)
            .ok_or_else(|| Error::Schema(format!("{}: unknown update operation {}", self.key, name)))
    }
}

impl Registry {
    /// Parse and merge schema documents, then check that they are consistent
    pub fn from_sources(sources: &[&str]) -> Result<Self> {
        let mut registry = Registry::default();
        for content in sources {
            let partial: SchemaFile = serde_json::from_str(content)
                .map_err(|e| Error::Schema(format!("failed to parse schema document: {}", e)))?;
            registry.merge(partial)?;
        }
        registry.check()?;
        Ok(registry)
    }

    fn merge(&mut self, file: SchemaFile) -> Result<()> {
        for (name, def) in file.types {
            if self.types.insert(name.clone(), def).is_some() {
                return Err(Error::Schema(format!("type {} defined twice", name)));
            }
        }
        for (key, def) in file.resources {
            if self.resources.insert(key.clone(), def).is_some() {
                return Err(Error::Schema(format!("resource {} defined twice", key)));
            }
        }
        Ok(())
    }

    /// Every object reference, oneof member, identity field and update
    /// operation must resolve.
    fn check(&self) -> Result<()> {
        for (name, ty) in &self.types {
            for field in &ty.fields {
                match (&field.object, field.kind.is_object()) {
                    (Some(target), true) if self.types.contains_key(target) => {}
                    (Some(target), true) => {
                        return Err(Error::Schema(format!(
                            "{}.{} references unknown type {}",
                            name, field.name, target
                        )))
                    }
                    (None, true) => {
                        return Err(Error::Schema(format!("{}.{} is missing its object type", name, field.name)))
                    }
                    (Some(_), false) => {
                        return Err(Error::Schema(format!(
                            "{}.{} is a scalar but names an object type",
                            name, field.name
                        )))
                    }
                    (None, false) => {}
                }
            }
            for group in &ty.one_of {
                if group.len() < 2 {
                    return Err(Error::Schema(format!("{} has a oneof group with fewer than two members", name)));
                }
                if let Some(missing) = group.iter().find(|m| ty.field(m).is_none()) {
                    return Err(Error::Schema(format!("{} oneof names unknown field {}", name, missing)));
                }
            }
        }

        for (key, resource) in &self.resources {
            let Some(root) = self.types.get(&resource.root) else {
                return Err(Error::Schema(format!("{}: unknown root type {}", key, resource.root)));
            };
            if let Some(missing) = resource.identity.iter().find(|i| root.field(i).is_none()) {
                return Err(Error::Schema(format!("{}: identity field {} not in root type", key, missing)));
            }

            let mut policies = BTreeSet::new();
            policies.insert(resource.default_policy.clone());
            let mut seen = BTreeSet::new();
            self.collect_policies(&resource.root, &mut seen, &mut policies);
            for policy in policies {
                if let ChangePolicy::Update(op) = policy {
                    if !resource.operations.contains_key(&op) {
                        return Err(Error::Schema(format!("{}: unknown update operation {}", key, op)));
                    }
                }
            }
        }
        Ok(())
    }

    fn collect_policies<'s>(
        &'s self,
        type_name: &'s str,
        seen: &mut BTreeSet<&'s str>,
        out: &mut BTreeSet<ChangePolicy>,
    ) {
        if !seen.insert(type_name) {
            return;
        }
        let Some(ty) = self.types.get(type_name) else {
            return;
        };
        for field in &ty.fields {
            if let Some(policy) = &field.policy {
                out.insert(policy.clone());
            }
            if let Some(nested) = &field.object {
                self.collect_policies(nested, seen, out);
            }
        }
    }

    pub fn resource(&self, key: &str) -> Option<&ResourceDef> {
        self.resources.get(key)
    }

    pub fn resource_keys(&self) -> Vec<&str> {
        self.resources.keys().map(|s| s.as_str()).collect()
    }

    pub fn schema<'a>(&'a self, key: &str) -> Result<Schema<'a>> {
        let (key, resource) = self
            .resources
            .get_key_value(key)
            .ok_or_else(|| Error::Schema(format!("unknown resource kind {}", key)))?;
        Ok(Schema {
            key: key.as_str(),
            resource,
            types: &self.types,
        })
    }
}

// ChangePolicy needs an ordering to live in a BTreeSet
impl PartialOrd for ChangePolicy {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChangePolicy {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(p: &ChangePolicy) -> (u8, &str) {
            match p {
                ChangePolicy::None => (0, ""),
                ChangePolicy::Recreate => (1, ""),
                ChangePolicy::Update(name) => (2, name.as_str()),
            }
        }
        rank(self).cmp(&rank(other))
    }
}

/// Global registry loaded from the embedded schemas
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the schema registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        Registry::from_sources(SCHEMA_FILES)
            .unwrap_or_else(|e| panic!("Failed to load embedded schema JSON: {}", e))
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resource(key)
}

/// Get all resource keys
pub fn get_all_resource_keys() -> Vec<&'static str> {
    get_registry().resource_keys()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(
            !registry.resource_keys().is_empty(),
            "Registry should have resources"
        );
    }

    #[test]
    fn test_delivery_pipeline_resource_exists() {
        let resource = get_resource("clouddeploy.DeliveryPipeline");
        assert!(resource.is_some(), "Delivery pipeline resource should exist");

        let resource = resource.unwrap();
        assert_eq!(resource.display_name, "Delivery Pipelines");
        assert_eq!(resource.service, "clouddeploy");
        assert_eq!(resource.identity, vec!["project", "location", "name"]);
    }

    #[test]
    fn test_get_all_resource_keys() {
        let keys = get_all_resource_keys();
        assert!(keys.contains(&"clouddeploy.DeliveryPipeline"));
        assert!(keys.contains(&"clouddeploy.Target"));
    }

    #[test]
    fn test_strategy_oneof_declared() {
        let schema = get_registry().schema("clouddeploy.DeliveryPipeline").unwrap();
        let strategy = schema.type_def("DeliveryPipelineStrategy").unwrap();
        assert_eq!(strategy.one_of, vec![vec!["standard".to_string(), "canary".to_string()]]);
    }

    #[test]
    fn test_unknown_object_reference_rejected() {
        let doc = r#"{"types": {"T": {"fields": [{"name": "a", "type": "object", "object": "Missing"}]}}}"#;
        let err = Registry::from_sources(&[doc]).unwrap_err();
        assert!(err.to_string().contains("unknown type Missing"), "{err}");
    }

    #[test]
    fn test_unknown_update_operation_rejected() {
        let doc = r#"{
            "resources": {"x.Thing": {
                "display_name": "Things", "service": "x", "base_path": "https://x.test/v1/",
                "root": "Thing", "identity": ["name"], "default_policy": {"update": "patchThing"},
                "get_url": "things/{{name}}", "list_url": "things", "create_url": "things",
                "delete_url": "things/{{name}}", "list_field": "things"
            }},
            "types": {"Thing": {"fields": [{"name": "name", "type": "string"}]}}
        }"#;
        let err = Registry::from_sources(&[doc]).unwrap_err();
        assert!(err.to_string().contains("unknown update operation patchThing"), "{err}");
    }

    #[test]
    fn test_oneof_with_unknown_member_rejected() {
        let doc = r#"{"types": {"T": {"fields": [{"name": "a", "type": "string"}], "one_of": [["a", "b"]]}}}"#;
        let err = Registry::from_sources(&[doc]).unwrap_err();
        assert!(err.to_string().contains("unknown field b"), "{err}");
    }

    #[test]
    fn test_change_policy_deserializes() {
        let p: ChangePolicy = serde_json::from_str(r#"{"update": "updateTarget"}"#).unwrap();
        assert_eq!(p, ChangePolicy::Update("updateTarget".into()));
        let p: ChangePolicy = serde_json::from_str(r#""recreate""#).unwrap();
        assert_eq!(p, ChangePolicy::Recreate);
    }
}
