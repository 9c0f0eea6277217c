//! API Dispatch
//!
//! Maps abstract resource calls (get, list, create, update, delete) to
//! concrete REST requests using the URL templates and operation table of a
//! resource schema.

use super::address::{with_query, Address};
use super::registry::Schema;
use crate::error::Result;
use crate::gcp::http::{ApiRequest, Method, Transport};
use serde_json::Value;
use std::fmt;

/// A call against one resource kind
#[derive(Debug, Clone)]
pub enum ApiCall<'a> {
    Get,
    List {
        page_token: Option<&'a str>,
        page_size: u32,
    },
    Create {
        body: Value,
    },
    Update {
        operation: &'a str,
        body: Value,
        update_mask: &'a [String],
    },
    Delete,
}

impl fmt::Display for ApiCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiCall::Get => write!(f, "get"),
            ApiCall::List { .. } => write!(f, "list"),
            ApiCall::Create { .. } => write!(f, "create"),
            ApiCall::Update { operation, .. } => write!(f, "{}", operation),
            ApiCall::Delete => write!(f, "delete"),
        }
    }
}

/// Transport plus schema plus base path: everything needed to talk to one
/// resource kind.
#[derive(Clone, Copy)]
pub struct ResourceClient<'a> {
    pub transport: &'a dyn Transport,
    pub schema: Schema<'a>,
    pub base_path: &'a str,
}

impl<'a> ResourceClient<'a> {
    pub fn new(transport: &'a dyn Transport, schema: Schema<'a>, base_path: &'a str) -> Self {
        Self {
            transport,
            schema,
            base_path,
        }
    }

    /// Relative resource name, e.g. `projects/p/locations/l/deliveryPipelines/web`
    pub fn resource_name(&self, address: &Address) -> Result<String> {
        address.expand(&self.schema.resource.get_url)
    }

    /// Build the REST request for a call
    pub fn build_request(&self, address: &Address, call: ApiCall<'_>) -> Result<ApiRequest> {
        let resource = self.schema.resource;
        let request_id = uuid::Uuid::new_v4().to_string();

        let request = match call {
            ApiCall::Get => ApiRequest::get(address.url(self.base_path, &resource.get_url)?.to_string()),
            ApiCall::List {
                page_token,
                page_size,
            } => {
                let size = page_size.to_string();
                let mut params = vec![("pageSize", size.as_str())];
                if let Some(token) = page_token {
                    params.push(("pageToken", token));
                }
                let url = with_query(address.url(self.base_path, &resource.list_url)?, params);
                ApiRequest::get(url.to_string())
            }
            ApiCall::Create { body } => {
                let url = address.url(self.base_path, &resource.create_url)?;
                ApiRequest {
                    method: Method::Post,
                    url: with_query(url, [("requestId", request_id.as_str())]).to_string(),
                    body: Some(body),
                }
            }
            ApiCall::Update {
                operation,
                body,
                update_mask,
            } => {
                let op = self.schema.operation(operation)?;
                let mask = update_mask.join(",");
                let mut params = Vec::new();
                if op.update_mask {
                    params.push(("updateMask", mask.as_str()));
                }
                params.push(("requestId", request_id.as_str()));
                let url = with_query(address.url(self.base_path, &op.url)?, params);
                ApiRequest {
                    method: Method::parse(&op.method)?,
                    url: url.to_string(),
                    body: Some(body),
                }
            }
            ApiCall::Delete => {
                let url = address.url(self.base_path, &resource.delete_url)?;
                let params = resource
                    .delete_params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .chain([("requestId", request_id.as_str())]);
                ApiRequest {
                    method: Method::Delete,
                    url: with_query(url, params).to_string(),
                    body: None,
                }
            }
        };
        Ok(request)
    }

    /// Build and send a call
    pub async fn invoke(&self, address: &Address, call: ApiCall<'_>) -> Result<Value> {
        tracing::debug!("invoke: kind={}, call={}", self.schema.key, call);
        let request = self.build_request(address, call)?;
        self.transport.send(request).await
    }
}
