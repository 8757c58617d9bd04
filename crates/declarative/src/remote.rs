//! Remote API traits and the permission state fetcher.
//!
//! These traits let the reconciler run against any implementation of the
//! remote API: the HTTP client in `grafana-api`, or [`crate::MockRemote`]
//! in tests.

use crate::error::Result;
use crate::grant::Grant;
use crate::token::{CreatedToken, TokenRecord, TokenSpec};
use serde::{Deserialize, Serialize};

/// Organization a remote call is scoped to.
///
/// Passed explicitly into every remote operation. `None` uses the
/// organization the credentials default to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgContext {
    pub org_id: Option<i64>,
}

impl OrgContext {
    /// Context for the credentials' default organization.
    pub fn default_org() -> Self {
        Self { org_id: None }
    }

    /// Context for a specific organization.
    pub fn org(org_id: i64) -> Self {
        Self {
            org_id: Some(org_id),
        }
    }
}

/// Permission state of one data source as reported by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionState {
    pub datasource_id: i64,
    /// Whether the permission subsystem is active for this data source.
    pub enabled: bool,
    /// Current grants, each carrying its remote id.
    pub grants: Vec<Grant>,
}

/// Data-source permission endpoints.
pub trait PermissionRemote: Send + Sync {
    /// Fetch the enabled flag and grants of a data source.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the data source does not exist.
    fn fetch_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<PermissionState>;

    /// Activate the permission subsystem.
    fn enable_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<()>;

    /// Deactivate the permission subsystem.
    fn disable_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<()>;

    /// Add a grant, returning the id the remote assigned to it.
    fn add_grant(&self, org: &OrgContext, datasource_id: i64, grant: &Grant) -> Result<i64>;

    /// Remove a grant by its remote id.
    fn remove_grant(&self, org: &OrgContext, datasource_id: i64, grant_id: i64) -> Result<()>;
}

/// Service-account token endpoints.
pub trait TokenRemote: Send + Sync {
    /// Create a token. The response is the only place the secret appears.
    fn create_token(&self, org: &OrgContext, token: &TokenSpec) -> Result<CreatedToken>;

    /// List every token of a service account. Secrets are never included.
    fn list_tokens(&self, org: &OrgContext, service_account_id: i64) -> Result<Vec<TokenRecord>>;

    /// Delete a token.
    fn delete_token(&self, org: &OrgContext, service_account_id: i64, token_id: i64) -> Result<()>;
}

/// Outcome of fetching a data source's permission state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// Data source exists; here is its current state.
    Found(PermissionState),
    /// Data source no longer exists. Nothing to reconcile; callers should
    /// clear any local record of it.
    NotFound,
}

impl Fetched {
    /// The fetched state, if the data source exists.
    pub fn into_state(self) -> Option<PermissionState> {
        match self {
            Self::Found(state) => Some(state),
            Self::NotFound => None,
        }
    }
}

/// Fetch the current permission state, folding `NotFound` into [`Fetched`].
///
/// Every other error is returned as-is; nothing is retried here.
pub fn fetch<R>(remote: &R, org: &OrgContext, datasource_id: i64) -> Result<Fetched>
where
    R: PermissionRemote + ?Sized,
{
    match remote.fetch_permissions(org, datasource_id) {
        Ok(state) => Ok(Fetched::Found(state)),
        Err(e) if e.is_not_found() => Ok(Fetched::NotFound),
        Err(e) => Err(e),
    }
}
