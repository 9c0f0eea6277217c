//! Resource Fetcher
//!
//! Reads single resources and pages through list responses.

use super::address::Address;
use super::dispatch::{ApiCall, ResourceClient};
use crate::error::Result;
use serde_json::Value;

/// Default page size for list calls
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Result of paginated fetch
pub struct PaginatedResult {
    pub items: Vec<Value>,
    pub next_token: Option<String>,
}

/// Fetch one resource; not-found is `None`, not an error
pub async fn fetch_resource(client: &ResourceClient<'_>, address: &Address) -> Result<Option<Value>> {
    match client.invoke(address, ApiCall::Get).await {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            tracing::debug!(kind = client.schema.key, "resource not found");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Fetch all resources under a parent (auto-paginate)
pub async fn fetch_resources(client: &ResourceClient<'_>, parent: &Address, page_size: u32) -> Result<Vec<Value>> {
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let result = fetch_resources_paginated(client, parent, page_token.as_deref(), page_size).await?;
        all_items.extend(result.items);

        if result.next_token.is_none() {
            break;
        }
        page_token = result.next_token;
    }

    tracing::debug!(kind = client.schema.key, count = all_items.len(), "listed resources");
    Ok(all_items)
}

/// Fetch one page of resources
pub async fn fetch_resources_paginated(
    client: &ResourceClient<'_>,
    parent: &Address,
    page_token: Option<&str>,
    page_size: u32,
) -> Result<PaginatedResult> {
    let response = client
        .invoke(
            parent,
            ApiCall::List {
                page_token,
                page_size,
            },
        )
        .await?;

    let items = response
        .get(&client.schema.resource.list_field)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let next_token = response
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Ok(PaginatedResult { items, next_token })
}

/// Extract a value from JSON using a dot-notation path
pub fn extract_json_value(item: &Value, path: &str) -> String {
    let mut current = item;

    for part in path.split('.') {
        let next = match part.parse::<usize>() {
            Ok(idx) => current.get(idx),
            Err(_) => current.get(part),
        };
        current = match next {
            Some(v) => v,
            None => return "-".to_string(),
        };
    }

    match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(_) => "[object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_value() {
        let item = json!({
            "name": "projects/p/locations/l/deliveryPipelines/web",
            "serialPipeline": {"stages": [{"targetId": "dev"}, {"targetId": "prod"}]},
            "suspended": true
        });
        assert_eq!(extract_json_value(&item, "serialPipeline.stages.1.targetId"), "prod");
        assert_eq!(extract_json_value(&item, "serialPipeline.stages"), "[2 items]");
        assert_eq!(extract_json_value(&item, "suspended"), "true");
        assert_eq!(extract_json_value(&item, "description"), "-");
    }
}
