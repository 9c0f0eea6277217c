//! HTTP utilities for GCP REST API calls
//!
//! [`Transport`] is the seam between the reconcile driver and the network:
//! the driver builds [`ApiRequest`]s, a transport sends them and returns the
//! parsed JSON body. [`GcpHttpClient`] is the reqwest-backed single attempt;
//! retries and auth live in [`GcpClient`](super::client::GcpClient).

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use std::fmt;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and drops control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::Schema(format!("unsupported HTTP method {}", other))),
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One REST call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }
}

/// Sends requests and returns the parsed response body.
/// A 404 must surface as an error for which [`Error::is_not_found`] holds.
pub trait Transport: Send + Sync {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<Value>>;
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gdeploy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Make one request with a bearer token
    pub async fn execute(&self, request: &ApiRequest, token: &str) -> Result<Value> {
        tracing::debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.as_reqwest(), &request.url)
            .bearer_auth(token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(format!("failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            if status.as_u16() == 404 {
                return Err(Error::NotFound(request.url.clone()));
            }
            return Err(Error::Http {
                status: status.as_u16(),
                method: request.method.to_string(),
                url: request.url.clone(),
                message: error_message(&body),
            });
        }

        // Handle empty response
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Pull `error.message` out of a Google API error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .map(|m| sanitize_for_log(&m))
        .unwrap_or_else(|| sanitize_for_log(body))
}

/// Format an error for display on the command line
/// Security: HTTP errors are reduced to a short hint instead of the raw body
pub fn format_gcp_error(error: &Error) -> String {
    match error {
        Error::Http { status: 403, .. } => "Permission denied. Check your GCP IAM permissions.".to_string(),
        Error::Http { status: 401, .. } | Error::Auth(_) => {
            "Authentication failed. Run 'gcloud auth application-default login'.".to_string()
        }
        Error::NotFound(_) => "Resource not found.".to_string(),
        Error::Http { status: 429, .. } => "Rate limit exceeded. Please try again later.".to_string(),
        Error::Http { status: 409, .. } => {
            "Resource conflict. The resource may already exist or be in use.".to_string()
        }
        Error::Http { status: 400, message, .. } => format!("Invalid request: {}", message),
        Error::Http { status, .. } if *status >= 500 => {
            "GCP service temporarily unavailable. Please try again.".to_string()
        }
        other => crate::error::format_err_chain(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.ends_with("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_drops_control_characters() {
        assert_eq!(sanitize_for_log("bad\nbody\t!"), "badbody!");
    }

    #[test]
    fn test_error_message_prefers_google_error() {
        let body = r#"{"error": {"code": 400, "message": "field mask is invalid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(body), "field mask is invalid");
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("patch").unwrap(), Method::Patch);
        assert!(Method::parse("PUT").is_err());
    }

    #[test]
    fn test_format_gcp_error() {
        let err = Error::Http {
            status: 403,
            method: "GET".into(),
            url: "u".into(),
            message: "denied".into(),
        };
        assert_eq!(format_gcp_error(&err), "Permission denied. Check your GCP IAM permissions.");
        assert_eq!(format_gcp_error(&Error::NotFound("u".into())), "Resource not found.");
    }
}
