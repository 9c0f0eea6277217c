//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication,
//! HTTP and transient-error retries behind the [`Transport`] trait.

use super::auth::GcpCredentials;
use super::http::{ApiRequest, GcpHttpClient, Transport};
use super::retry::{retry, RetryPolicy};
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use serde_json::Value;

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub retry: RetryPolicy,
}

impl GcpClient {
    /// Create a client using Application Default Credentials
    pub async fn new(retry: RetryPolicy) -> Result<Self> {
        let credentials = GcpCredentials::new().await?;
        Self::with_credentials(credentials, retry)
    }

    pub fn with_credentials(credentials: GcpCredentials, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            credentials,
            http: GcpHttpClient::new()?,
            retry,
        })
    }

    /// Create a client that sends a fixed access token
    pub fn with_access_token(token: &str, retry: RetryPolicy) -> Result<Self> {
        Self::with_credentials(GcpCredentials::from_access_token(token), retry)
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    /// Send a request, retrying transient failures. A 401 drops the cached
    /// token once so an expired token is refreshed.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value> {
        let mut refreshed = false;
        loop {
            let result = retry(&self.retry, |_| async move {
                let token = self.get_token().await?;
                self.http.execute(request, &token).await
            })
            .await;

            match result {
                Err(Error::Http { status: 401, .. }) if !refreshed => {
                    tracing::debug!("401 from API, refreshing token");
                    self.credentials.invalidate().await;
                    refreshed = true;
                }
                other => return other,
            }
        }
    }
}

impl Transport for GcpClient {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { self.execute(&request).await })
    }
}
