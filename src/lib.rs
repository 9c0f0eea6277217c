//! Declarative reconciliation of Google Cloud Deploy resources
//!
//! A desired state is described as a schema-typed value tree. The engine
//! compares it with the live resource and drives create, update, recreate
//! or delete calls until the two agree.
//!
//! - [`engine`] - value tree, canonicalizer, differ, classifier, wire codec
//! - [`resource`] - embedded resource schemas and REST dispatch
//! - [`gcp`] - auth, HTTP transport, retries and long-running operations
//! - [`reconcile`] - the driver tying the above together

pub mod config;
pub mod engine;
pub mod error;
pub mod gcp;
pub mod reconcile;
pub mod resource;

pub use error::{Error, Result};
pub use reconcile::{Action, ApplyOptions, ApplyOutcome, Plan, Reconciler, Settings};
