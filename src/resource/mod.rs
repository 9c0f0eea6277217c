//! Resource abstraction layer
//!
//! This module provides a data-driven approach to managing Cloud Deploy
//! resources. Resource schemas are loaded from JSON files at compile time,
//! so a new resource kind is a new schema file, not new code.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and validates resource schemas from embedded JSON
//! - [`address`] - URL template expansion and self-link normalization
//! - [`dispatch`] - Maps get/list/create/update/delete to REST requests
//! - [`fetcher`] - Single-resource reads and paginated listing
//!
//! # Resource Schemas
//!
//! Schemas live under `src/schemas/`:
//! - `delivery_pipeline.json` - `clouddeploy.DeliveryPipeline`
//! - `target.json` - `clouddeploy.Target`

pub mod address;
pub mod dispatch;
pub mod fetcher;
mod registry;

pub use address::Address;
pub use dispatch::{ApiCall, ResourceClient};
pub use fetcher::{extract_json_value, fetch_resource, fetch_resources, fetch_resources_paginated, PaginatedResult};
pub use registry::*;
