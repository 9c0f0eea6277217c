//! GCP API interaction module
//!
//! This module provides the plumbing between the reconcile engine and Google
//! Cloud REST APIs.
//!
//! # Module Structure
//!
//! - [`auth`] - Credentials (ADC or static token) and gcloud defaults
//! - [`client`] - Authenticated client with transient-error retries
//! - [`http`] - Request type, [`Transport`](http::Transport) trait and reqwest client
//! - [`operation`] - Long-running operation polling
//! - [`retry`] - Backoff policy shared by the above
//!
//! # Example
//!
//! ```ignore
//! use gdeploy::gcp::{client::GcpClient, http::{ApiRequest, Transport}, retry::RetryPolicy};
//!
//! async fn example() -> gdeploy::Result<()> {
//!     let client = GcpClient::new(RetryPolicy::default()).await?;
//!     let pipeline = client
//!         .send(ApiRequest::get("https://clouddeploy.googleapis.com/v1/projects/p/locations/us-central1/deliveryPipelines/web"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod operation;
pub mod retry;
