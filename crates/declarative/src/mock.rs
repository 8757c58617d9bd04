//! In-memory remote for testing without network access.
//!
//! [`MockRemote`] keeps data sources and tokens in memory, records every
//! call in order, and can be told to fail a given kind of call.
//!
//! ```
//! use declarative::{Grant, Intent, MockRemote, NoProgress, OrgContext, Permission, Subject};
//!
//! let mock = MockRemote::new();
//! mock.add_datasource(1, false, vec![]);
//!
//! let desired = vec![Grant::new(Subject::Team(5), Permission::Query)];
//! declarative::reconcile(&mock, &OrgContext::default_org(), 1, &desired, Intent::APPLY, &mut NoProgress)
//!     .unwrap();
//!
//! assert!(mock.datasource(1).unwrap().enabled);
//! ```

use crate::error::{Error, Result};
use crate::grant::Grant;
use crate::remote::{OrgContext, PermissionRemote, PermissionState, TokenRemote};
use crate::token::{CreatedToken, Secret, TokenRecord, TokenSpec};
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Kind of remote call, as recorded by [`MockRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Fetch,
    Enable,
    Disable,
    Add,
    Remove,
    CreateToken,
    ListTokens,
    DeleteToken,
}

#[derive(Debug, Default)]
struct Datasource {
    enabled: bool,
    grants: Vec<Grant>,
}

#[derive(Debug, Default)]
struct Inner {
    datasources: BTreeMap<i64, Datasource>,
    service_accounts: BTreeMap<i64, Vec<TokenRecord>>,
    next_id: i64,
    calls: Vec<Call>,
    orgs: Vec<OrgContext>,
    failures: HashMap<Call, Error>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Record the call and return the injected failure, if any.
    fn record(&mut self, call: Call, org: &OrgContext) -> Result<()> {
        self.calls.push(call);
        self.orgs.push(*org);
        match self.failures.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn datasource_mut(&mut self, id: i64) -> Result<&mut Datasource> {
        self.datasources
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("datasource {id}")))
    }

    /// Grant mutations are rejected while the subsystem is disabled.
    fn enabled_datasource_mut(&mut self, id: i64) -> Result<&mut Datasource> {
        let ds = self.datasource_mut(id)?;
        if !ds.enabled {
            return Err(Error::http(
                format!("permissions are disabled for datasource {id}"),
                Some(400),
            ));
        }
        Ok(ds)
    }

    fn tokens_mut(&mut self, service_account_id: i64) -> Result<&mut Vec<TokenRecord>> {
        self.service_accounts
            .get_mut(&service_account_id)
            .ok_or_else(|| Error::not_found(format!("service account {service_account_id}")))
    }
}

/// Mock remote for tests.
#[derive(Debug, Clone, Default)]
pub struct MockRemote {
    inner: Arc<Mutex<Inner>>,
}

impl MockRemote {
    /// Create a new empty mock remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a data source with the given grants. Ids are assigned here.
    pub fn add_datasource(&self, id: i64, enabled: bool, grants: Vec<Grant>) {
        let mut inner = self.lock();
        let grants = grants
            .into_iter()
            .map(|g| {
                let grant_id = inner.next_id();
                g.with_id(grant_id)
            })
            .collect();
        inner.datasources.insert(id, Datasource { enabled, grants });
    }

    /// Delete a data source, as if it was removed out of band.
    pub fn remove_datasource(&self, id: i64) {
        self.lock().datasources.remove(&id);
    }

    /// Register a service account with no tokens.
    pub fn add_service_account(&self, id: i64) {
        self.lock().service_accounts.entry(id).or_default();
    }

    /// Mark a token as expired.
    pub fn expire_token(&self, service_account_id: i64, token_id: i64) {
        let mut inner = self.lock();
        if let Some(token) = inner
            .service_accounts
            .get_mut(&service_account_id)
            .and_then(|tokens| tokens.iter_mut().find(|t| t.id == token_id))
        {
            token.has_expired = true;
        }
    }

    /// Remove a token out of band.
    pub fn revoke_token(&self, service_account_id: i64, token_id: i64) {
        if let Some(tokens) = self.lock().service_accounts.get_mut(&service_account_id) {
            tokens.retain(|t| t.id != token_id);
        }
    }

    /// Make every call of this kind fail with `error`.
    pub fn fail_on(&self, call: Call, error: Error) {
        self.lock().failures.insert(call, error);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Current state of a data source, bypassing call recording.
    pub fn datasource(&self, id: i64) -> Option<PermissionState> {
        self.lock().datasources.get(&id).map(|ds| PermissionState {
            datasource_id: id,
            enabled: ds.enabled,
            grants: ds.grants.clone(),
        })
    }

    /// Tokens of a service account, bypassing call recording.
    pub fn tokens(&self, service_account_id: i64) -> Vec<TokenRecord> {
        self.lock()
            .service_accounts
            .get(&service_account_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls that changed remote state.
    pub fn mutation_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| !matches!(c, Call::Fetch | Call::ListTokens))
            .count()
    }

    /// Organization context of every call so far, in order.
    pub fn orgs_seen(&self) -> Vec<OrgContext> {
        self.lock().orgs.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        let mut inner = self.lock();
        inner.calls.clear();
        inner.orgs.clear();
    }
}

impl PermissionRemote for MockRemote {
    fn fetch_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<PermissionState> {
        let mut inner = self.lock();
        inner.record(Call::Fetch, org)?;
        let ds = inner.datasource_mut(datasource_id)?;
        Ok(PermissionState {
            datasource_id,
            enabled: ds.enabled,
            grants: ds.grants.clone(),
        })
    }

    fn enable_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<()> {
        let mut inner = self.lock();
        inner.record(Call::Enable, org)?;
        inner.datasource_mut(datasource_id)?.enabled = true;
        Ok(())
    }

    fn disable_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<()> {
        let mut inner = self.lock();
        inner.record(Call::Disable, org)?;
        inner.datasource_mut(datasource_id)?.enabled = false;
        Ok(())
    }

    fn add_grant(&self, org: &OrgContext, datasource_id: i64, grant: &Grant) -> Result<i64> {
        let mut inner = self.lock();
        inner.record(Call::Add, org)?;
        inner.enabled_datasource_mut(datasource_id)?;
        let id = inner.next_id();
        inner
            .enabled_datasource_mut(datasource_id)?
            .grants
            .push(grant.clone().with_id(id));
        Ok(id)
    }

    fn remove_grant(&self, org: &OrgContext, datasource_id: i64, grant_id: i64) -> Result<()> {
        let mut inner = self.lock();
        inner.record(Call::Remove, org)?;
        let ds = inner.enabled_datasource_mut(datasource_id)?;
        let before = ds.grants.len();
        ds.grants.retain(|g| g.id != Some(grant_id));
        if ds.grants.len() == before {
            return Err(Error::not_found(format!("datasource permission {grant_id}")));
        }
        Ok(())
    }
}

impl TokenRemote for MockRemote {
    fn create_token(&self, org: &OrgContext, token: &TokenSpec) -> Result<CreatedToken> {
        let mut inner = self.lock();
        inner.record(Call::CreateToken, org)?;
        inner.tokens_mut(token.service_account_id)?;
        let id = inner.next_id();
        let expiration = token
            .seconds_to_live
            .map(|ttl| Utc::now() + Duration::seconds(ttl as i64));
        inner.tokens_mut(token.service_account_id)?.push(TokenRecord {
            id,
            name: token.name.clone(),
            expiration,
            has_expired: false,
        });
        Ok(CreatedToken {
            id,
            name: token.name.clone(),
            secret: Secret::new(format!("glsa_mock_{id}")),
        })
    }

    fn list_tokens(&self, org: &OrgContext, service_account_id: i64) -> Result<Vec<TokenRecord>> {
        let mut inner = self.lock();
        inner.record(Call::ListTokens, org)?;
        Ok(inner.tokens_mut(service_account_id)?.clone())
    }

    fn delete_token(&self, org: &OrgContext, service_account_id: i64, token_id: i64) -> Result<()> {
        let mut inner = self.lock();
        inner.record(Call::DeleteToken, org)?;
        let tokens = inner.tokens_mut(service_account_id)?;
        let before = tokens.len();
        tokens.retain(|t| t.id != token_id);
        if tokens.len() == before {
            return Err(Error::not_found(format!("service account token {token_id}")));
        }
        Ok(())
    }
}
