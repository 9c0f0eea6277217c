//! Reconciliation driver
//!
//! Drives one resource from its observed state to the desired state:
//!
//! ```text
//! Fetching -> NotFound -> Creating ---------------------------.
//!          -> Found -> Diffing -> NoDiff -> Done              |
//!                              -> Executing -> Polling -> Reconfirming -> Done
//! ```
//!
//! Everything runs sequentially on the caller's task. The first
//! unrecoverable error is returned; there is no partial-success state.

use crate::engine::{
    canonicalize, canonicalize_initial, classify, diff, expand, flatten, validate, ExpandMode, Field, FieldDiff,
    Object, Operation, OperationGroup,
};
use crate::error::{format_err_chain, Error, Result};
use crate::gcp::http::Transport;
use crate::gcp::operation::{Operation as LongRunningOperation, OperationPoller};
use crate::gcp::retry::{retry_if, RetryPolicy};
use crate::resource::address::self_link_to_name;
use crate::resource::{
    fetch_resource, fetch_resources, get_registry, Address, ApiCall, ChangePolicy, Registry, ResourceClient, Schema,
};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Re-reads after a successful delete before giving up on the resource
/// disappearing. Deleted resources can stay visible for a short while.
pub const DELETE_GUARD_RETRIES: u32 = 10;

/// Driver state, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetching,
    NotFound,
    Creating,
    Found,
    Diffing,
    NoDiff,
    Executing,
    Polling,
    Reconfirming,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Fetching => "fetching",
            Phase::NotFound => "not-found",
            Phase::Creating => "creating",
            Phase::Found => "found",
            Phase::Diffing => "diffing",
            Phase::NoDiff => "no-diff",
            Phase::Executing => "executing",
            Phase::Polling => "polling",
            Phase::Reconfirming => "reconfirming",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// What a pass will do (or did)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    NoChange,
    Update,
    Recreate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Create => "create",
            Action::NoChange => "no change",
            Action::Update => "update",
            Action::Recreate => "recreate",
        };
        f.write_str(s)
    }
}

/// Result of the diffing half of a pass
#[derive(Debug, Clone)]
pub struct Plan {
    /// Observed state, `None` when the resource does not exist
    pub current: Option<Object>,
    /// Canonicalized desired state
    pub desired: Object,
    pub diffs: Vec<FieldDiff>,
    pub groups: Vec<OperationGroup>,
}

impl Plan {
    pub fn action(&self) -> Action {
        match (&self.current, self.groups.first()) {
            (None, _) => Action::Create,
            (Some(_), None) => Action::NoChange,
            (Some(_), Some(group)) if group.is_recreate() => Action::Recreate,
            (Some(_), Some(_)) => Action::Update,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Allow delete-then-create when a change cannot be applied in place
    pub allow_recreate: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self { allow_recreate: true }
    }
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub action: Action,
    /// State re-read from the server after the pass
    pub resource: Object,
    /// Actionable differences still present after reconfirming
    pub residual: Vec<FieldDiff>,
}

impl ApplyOutcome {
    pub fn is_converged(&self) -> bool {
        self.residual.is_empty()
    }
}

/// Polling and listing knobs
#[derive(Debug, Clone)]
pub struct Settings {
    pub poll: RetryPolicy,
    pub delete_guard: RetryPolicy,
    pub operation_timeout: Option<Duration>,
    pub page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll: RetryPolicy::polling(),
            delete_guard: RetryPolicy::polling().with_max_attempts(DELETE_GUARD_RETRIES + 1),
            operation_timeout: None,
            page_size: crate::resource::fetcher::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Reconciles resources of one kind
pub struct Reconciler<'r> {
    transport: Arc<dyn Transport>,
    schema: Schema<'r>,
    base_path: String,
    settings: Settings,
}

impl Reconciler<'static> {
    /// Reconciler for a kind from the embedded schemas
    pub fn new(transport: Arc<dyn Transport>, kind: &str) -> Result<Self> {
        Reconciler::with_registry(get_registry(), transport, kind)
    }
}

impl<'r> Reconciler<'r> {
    pub fn with_registry(registry: &'r Registry, transport: Arc<dyn Transport>, kind: &str) -> Result<Self> {
        let schema = registry.schema(kind)?;
        Ok(Self {
            transport,
            schema,
            base_path: schema.resource.base_path.clone(),
            settings: Settings::default(),
        })
    }

    /// Override the API base path (e.g. a regional or test endpoint)
    pub fn with_endpoint(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn schema(&self) -> Schema<'r> {
        self.schema
    }

    fn client(&self) -> ResourceClient<'_> {
        ResourceClient::new(self.transport.as_ref(), self.schema, &self.base_path)
    }

    fn enter(&self, phase: Phase, address: &Address) {
        tracing::debug!(
            kind = self.schema.key,
            name = address.get("name").unwrap_or(""),
            phase = %phase,
            "reconcile phase"
        );
    }

    /// Read the current state of the resource `tree` addresses
    pub async fn get(&self, tree: &Object) -> Result<Option<Object>> {
        let address = Address::from_tree(self.schema.resource, tree)?;
        self.get_at(&address).await
    }

    async fn get_at(&self, address: &Address) -> Result<Option<Object>> {
        let Some(json) = fetch_resource(&self.client(), address).await? else {
            return Ok(None);
        };
        let mut obj = flatten(&self.schema, &json)?;
        self.fill_identity(&mut obj, address);
        Ok(Some(obj))
    }

    /// Responses carry the full resource name but not the parent fields;
    /// identity comes from the address, reduced to short names.
    fn fill_identity(&self, obj: &mut Object, address: &Address) {
        for name in &self.schema.resource.identity {
            let value = match address.get(name) {
                Some(v) => v.to_string(),
                None => match obj.str_field(name) {
                    Some(v) => self_link_to_name(v).to_string(),
                    None => continue,
                },
            };
            obj.set(name.as_str(), Field::set(value));
        }
    }

    /// Validate, fetch, canonicalize, diff and classify without executing
    pub async fn plan(&self, desired: &Object) -> Result<Plan> {
        validate(&self.schema, desired)?;
        let address = Address::from_tree(self.schema.resource, desired)?;
        self.enter(Phase::Fetching, &address);
        let current = self.get_at(&address).await?;
        self.plan_against(desired, current, &address)
    }

    fn plan_against(&self, desired: &Object, current: Option<Object>, address: &Address) -> Result<Plan> {
        let Some(current) = current else {
            self.enter(Phase::NotFound, address);
            return Ok(Plan {
                current: None,
                desired: canonicalize(&self.schema, desired, None),
                diffs: Vec::new(),
                groups: Vec::new(),
            });
        };

        self.enter(Phase::Found, address);
        self.enter(Phase::Diffing, address);
        let canonical_desired = canonicalize(&self.schema, desired, Some(&current));
        let canonical_initial = canonicalize_initial(&self.schema, &current, desired);
        let diffs = diff(&self.schema, Some(&canonical_desired), Some(&canonical_initial))?;
        let groups = classify(&diffs);
        for d in &diffs {
            tracing::debug!(kind = self.schema.key, diff = %d, "field differs");
        }
        Ok(Plan {
            current: Some(current),
            desired: canonical_desired,
            diffs,
            groups,
        })
    }

    /// Converge the resource to `desired`
    pub async fn apply(&self, desired: &Object, options: &ApplyOptions) -> Result<ApplyOutcome> {
        let plan = self.plan(desired).await?;
        let address = Address::from_tree(self.schema.resource, desired)?;
        let action = plan.action();
        tracing::info!(kind = self.schema.key, name = address.get("name").unwrap_or(""), action = %action, "applying");

        match action {
            Action::NoChange => {
                self.enter(Phase::NoDiff, &address);
                let resource = plan
                    .current
                    .ok_or_else(|| Error::Programming("no-change plan without a current resource".to_string()))?;
                self.enter(Phase::Done, &address);
                return Ok(ApplyOutcome {
                    action,
                    resource,
                    residual: Vec::new(),
                });
            }
            Action::Create => {
                self.enter(Phase::Creating, &address);
                self.create(&address, &plan.desired).await?;
            }
            Action::Recreate => {
                let field = plan.groups.first().map(|g| g.first_field()).unwrap_or("").to_string();
                if !options.allow_recreate {
                    return Err(Error::RecreateBlocked { field });
                }
                self.enter(Phase::Executing, &address);
                tracing::warn!(kind = self.schema.key, field = %field, "change requires recreating the resource");
                let fresh = canonicalize(&self.schema, desired, None);
                self.delete_at(&address)
                    .await
                    .map_err(|e| e.in_operation("recreate", &field))?;
                self.create(&address, &fresh)
                    .await
                    .map_err(|e| e.in_operation("recreate", &field))?;
            }
            Action::Update => {
                self.enter(Phase::Executing, &address);
                for group in &plan.groups {
                    self.update(&address, &plan.desired, group)
                        .await
                        .map_err(|e| e.in_operation(&group.operation.to_string(), group.first_field()))?;
                }
            }
        }

        self.enter(Phase::Reconfirming, &address);
        let resource = self
            .get_at(&address)
            .await?
            .ok_or_else(|| Error::NotFound(address.get("name").unwrap_or("").to_string()))?;
        let residual = self.residual(desired, &resource)?;
        if !residual.is_empty() {
            let fields: Vec<&str> = residual.iter().map(|d| d.path.as_str()).collect();
            tracing::warn!(kind = self.schema.key, fields = ?fields, "resource has not converged after apply");
        }
        self.enter(Phase::Done, &address);
        Ok(ApplyOutcome {
            action,
            resource,
            residual,
        })
    }

    /// Actionable diffs between desired and a freshly observed state
    fn residual(&self, desired: &Object, observed: &Object) -> Result<Vec<FieldDiff>> {
        let canonical_desired = canonicalize(&self.schema, desired, Some(observed));
        let canonical_initial = canonicalize_initial(&self.schema, observed, desired);
        Ok(diff(&self.schema, Some(&canonical_desired), Some(&canonical_initial))?
            .into_iter()
            .filter(|d| d.policy != ChangePolicy::None)
            .collect())
    }

    async fn create(&self, address: &Address, tree: &Object) -> Result<()> {
        let body = expand(&self.schema, tree, ExpandMode::Request)?;
        tracing::info!(kind = self.schema.key, name = address.get("name").unwrap_or(""), "creating resource");
        let response = self.client().invoke(address, ApiCall::Create { body }).await?;
        self.wait(address, response).await
    }

    async fn update(&self, address: &Address, desired: &Object, group: &OperationGroup) -> Result<()> {
        let Operation::Update(name) = &group.operation else {
            return Err(Error::Programming("recreate group passed to update".to_string()));
        };
        let op = self.schema.operation(name)?;
        let client = self.client();

        let mut body = expand(&self.schema, desired, ExpandMode::Request)?;
        if let Json::Object(map) = &mut body {
            if op.etag {
                let current = fetch_resource(&client, address)
                    .await?
                    .ok_or_else(|| Error::NotFound(client.resource_name(address).unwrap_or_default()))?;
                match current.get("etag").and_then(|e| e.as_str()) {
                    Some(etag) => {
                        map.insert("etag".to_string(), Json::String(etag.to_string()));
                    }
                    None => tracing::warn!(kind = self.schema.key, "current resource has no etag"),
                }
            }
            map.insert("name".to_string(), Json::String(client.resource_name(address)?));
        }

        let mask = group.update_mask();
        tracing::info!(kind = self.schema.key, operation = %name, fields = ?mask, "updating resource");
        let response = client
            .invoke(
                address,
                ApiCall::Update {
                    operation: name,
                    body,
                    update_mask: &mask,
                },
            )
            .await?;
        self.wait(address, response).await
    }

    async fn wait(&self, address: &Address, response: Json) -> Result<()> {
        let operation = LongRunningOperation::from_response(response)?;
        self.enter(Phase::Polling, address);
        OperationPoller::new(self.transport.as_ref(), &self.base_path, self.settings.poll)
            .with_timeout(self.settings.operation_timeout)
            .wait(operation)
            .await?;
        Ok(())
    }

    /// Delete the resource `tree` addresses. Deleting an absent resource
    /// succeeds.
    pub async fn delete(&self, tree: &Object) -> Result<()> {
        let address = Address::from_tree(self.schema.resource, tree)?;
        self.delete_at(&address).await
    }

    async fn delete_at(&self, address: &Address) -> Result<()> {
        let client = self.client();
        let name = client.resource_name(address)?;

        if fetch_resource(&client, address).await?.is_none() {
            tracing::info!(kind = self.schema.key, name = %name, "resource not found, nothing to delete");
            return Ok(());
        }

        tracing::info!(kind = self.schema.key, name = %name, "deleting resource");
        let response = match client.invoke(address, ApiCall::Delete).await {
            Err(e) if e.is_not_found() => return Ok(()),
            other => other?,
        };
        self.wait(address, response).await?;

        let guard = self.settings.delete_guard;
        retry_if(&guard, Error::is_pending, |attempt| {
            let name = name.clone();
            async move {
                match fetch_resource(&client, address).await? {
                    None => Ok(()),
                    Some(_) if attempt + 1 < guard.max_attempts => Err(Error::OperationNotDone(name)),
                    Some(_) => Err(Error::NotDeleted(name)),
                }
            }
        })
        .await
    }

    /// List every resource of this kind under a project and location
    pub async fn list(&self, project: &str, location: &str) -> Result<Vec<Object>> {
        let parent = Address::parent(project, location);
        let items = fetch_resources(&self.client(), &parent, self.settings.page_size).await?;
        items
            .iter()
            .map(|item| {
                let mut obj = flatten(&self.schema, item)?;
                self.fill_identity(&mut obj, &parent);
                Ok(obj)
            })
            .collect()
    }

    /// Delete every listed resource matching `predicate`. One failure does
    /// not stop the others; all failures are returned together.
    pub async fn delete_all<F>(&self, project: &str, location: &str, predicate: F) -> Result<usize>
    where
        F: Fn(&Object) -> bool,
    {
        let resources = self.list(project, location).await?;
        let mut deleted = 0;
        let mut errors = Vec::new();

        for resource in resources.iter().filter(|r| predicate(r)) {
            let name = resource.str_field("name").unwrap_or("").to_string();
            match self.delete(resource).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(kind = self.schema.key, name = %name, error = %e, "delete failed, continuing");
                    errors.push(format!("{}: {}", name, format_err_chain(&e)));
                }
            }
        }

        if errors.is_empty() {
            Ok(deleted)
        } else {
            Err(Error::DeleteAll { errors })
        }
    }
}
