//! Resource addressing
//!
//! Expands `{{param}}` URL templates from a resource's identity fields.
//! Values are reduced to their short name first, so a full self link in the
//! desired state still addresses the right resource.

use crate::engine::Object;
use crate::error::{Error, Result};
use crate::resource::ResourceDef;
use std::collections::BTreeMap;
use url::Url;

/// Last path segment of a self link (`projects/p/locations/l/x/name` -> `name`)
pub fn self_link_to_name(value: &str) -> &str {
    value.trim_end_matches('/').rsplit('/').next().unwrap_or(value)
}

/// Identity parameters of one resource (or of a parent scope for list calls)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    params: BTreeMap<String, String>,
}

impl Address {
    /// Read the identity fields from a tree
    pub fn from_tree(resource: &ResourceDef, tree: &Object) -> Result<Self> {
        let mut params = BTreeMap::new();
        for name in &resource.identity {
            let value = tree
                .str_field(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::validation(name.clone(), "required to address the resource"))?;
            params.insert(name.clone(), self_link_to_name(value).to_string());
        }
        Ok(Self { params })
    }

    /// Parent scope used to list resources
    pub fn parent(project: &str, location: &str) -> Self {
        let mut params = BTreeMap::new();
        params.insert("project".to_string(), self_link_to_name(project).to_string());
        params.insert("location".to_string(), self_link_to_name(location).to_string());
        Self { params }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), self_link_to_name(value).to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Substitute every `{{param}}` in a template; unknown params are an error
    pub fn expand(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::Schema(format!("unterminated parameter in template {}", template)))?;
            let key = &after[..end];
            let value = self
                .get(key)
                .ok_or_else(|| Error::validation(key, format!("needed by URL template {}", template)))?;
            out.push_str(&urlencoding::encode(value));
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Full URL: base path joined with the expanded template
    pub fn url(&self, base: &str, template: &str) -> Result<Url> {
        let path = self.expand(template)?;
        Ok(Url::parse(&format!("{}/{}", base.trim_end_matches('/'), path))?)
    }
}

/// Append query parameters, keeping any already in the URL
pub fn with_query<'a>(mut url: Url, params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Url {
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in params {
            pairs.append_pair(k, v);
        }
    }
    url
}
