//! Blocking Grafana HTTP API client.
//!
//! [`GrafanaClient`] implements [`PermissionRemote`] and [`TokenRemote`] over
//! the Grafana HTTP API. Every call sends the organization from its
//! [`OrgContext`] as the `X-Grafana-Org-Id` header; the client itself holds
//! no organization.

use crate::wire::{
    AddPermissionPayload, AddPermissionResponse, CreateTokenPayload, CreateTokenResponse,
    DatasourcePermissionsResponse, TokenListEntry,
};
use declarative::{
    CreatedToken, Error, Grant, OrgContext, PermissionRemote, PermissionState, Result,
    TokenRecord, TokenRemote, TokenSpec,
};
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ORG_HEADER: &str = "X-Grafana-Org-Id";
const USER_AGENT: &str = concat!("grantsync/", env!("CARGO_PKG_VERSION"));

/// Grafana HTTP API client.
///
/// # Example
///
/// ```no_run
/// use declarative::{OrgContext, PermissionRemote};
/// use grafana_api::GrafanaClient;
///
/// let client = GrafanaClient::new("http://localhost:3000", Some("glsa_token".into()));
/// let state = client.fetch_permissions(&OrgContext::default_org(), 1).unwrap();
/// println!("{} grants", state.grants.len());
/// ```
pub struct GrafanaClient {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Grafana base URL, without trailing slash.
    base_url: String,
    /// Bearer token (service-account token or API key).
    token: Option<String>,
}

impl GrafanaClient {
    /// Create a client with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    #[must_use]
    pub fn with_timeout(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn permissions_url(&self, datasource_id: i64) -> String {
        format!("{}/api/datasources/{}/permissions", self.base_url, datasource_id)
    }

    fn permission_url(&self, datasource_id: i64, permission_id: i64) -> String {
        format!(
            "{}/api/datasources/{}/permissions/{}",
            self.base_url, datasource_id, permission_id
        )
    }

    fn toggle_url(&self, datasource_id: i64, enable: bool) -> String {
        let action = if enable {
            "enable-permissions"
        } else {
            "disable-permissions"
        };
        format!("{}/api/datasources/{}/{}", self.base_url, datasource_id, action)
    }

    fn tokens_url(&self, service_account_id: i64) -> String {
        format!(
            "{}/api/serviceaccounts/{}/tokens",
            self.base_url, service_account_id
        )
    }

    fn token_url(&self, service_account_id: i64, token_id: i64) -> String {
        format!(
            "{}/api/serviceaccounts/{}/tokens/{}",
            self.base_url, service_account_id, token_id
        )
    }

    /// Add auth, org and content headers to a request.
    fn prepare<B>(&self, request: ureq::RequestBuilder<B>, org: &OrgContext) -> ureq::RequestBuilder<B> {
        let mut request = request
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(org_id) = org.org_id {
            request = request.header(ORG_HEADER, org_id.to_string());
        }
        request
    }

    fn toggle(&self, org: &OrgContext, datasource_id: i64, enable: bool) -> Result<()> {
        let request = self.agent.post(&self.toggle_url(datasource_id, enable));
        self.prepare(request, org)
            .send_empty()
            .map_err(|e| classify(e, &format!("datasource {datasource_id}")))?;
        Ok(())
    }
}

/// Map a ureq error onto the reconciliation taxonomy.
///
/// A 404 becomes `NotFound`; anything else is a transient HTTP error.
fn classify(err: ureq::Error, resource: &str) -> Error {
    match err {
        ureq::Error::StatusCode(404) => Error::not_found(resource),
        ureq::Error::StatusCode(code) => Error::http(format!("HTTP {code} for {resource}"), Some(code)),
        other => Error::http(other.to_string(), None),
    }
}

fn decode(err: ureq::Error) -> Error {
    Error::InvalidResponse(err.to_string())
}

impl PermissionRemote for GrafanaClient {
    fn fetch_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<PermissionState> {
        let resource = format!("datasource {datasource_id}");
        let request = self.agent.get(&self.permissions_url(datasource_id));

        let response: DatasourcePermissionsResponse = self
            .prepare(request, org)
            .call()
            .map_err(|e| classify(e, &resource))?
            .body_mut()
            .read_json()
            .map_err(decode)?;

        response.into_state(datasource_id)
    }

    fn enable_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<()> {
        self.toggle(org, datasource_id, true)
    }

    fn disable_permissions(&self, org: &OrgContext, datasource_id: i64) -> Result<()> {
        self.toggle(org, datasource_id, false)
    }

    fn add_grant(&self, org: &OrgContext, datasource_id: i64, grant: &Grant) -> Result<i64> {
        let request = self.agent.post(&self.permissions_url(datasource_id));

        let response: AddPermissionResponse = self
            .prepare(request, org)
            .send_json(AddPermissionPayload::from(grant))
            .map_err(|e| classify(e, &format!("datasource {datasource_id}")))?
            .body_mut()
            .read_json()
            .map_err(decode)?;

        Ok(response.permission_id)
    }

    fn remove_grant(&self, org: &OrgContext, datasource_id: i64, grant_id: i64) -> Result<()> {
        let request = self.agent.delete(&self.permission_url(datasource_id, grant_id));
        self.prepare(request, org)
            .call()
            .map_err(|e| classify(e, &format!("datasource permission {grant_id}")))?;
        Ok(())
    }
}

impl TokenRemote for GrafanaClient {
    fn create_token(&self, org: &OrgContext, token: &TokenSpec) -> Result<CreatedToken> {
        let request = self.agent.post(&self.tokens_url(token.service_account_id));

        let response: CreateTokenResponse = self
            .prepare(request, org)
            .send_json(CreateTokenPayload::from(token))
            .map_err(|e| classify(e, &format!("service account {}", token.service_account_id)))?
            .body_mut()
            .read_json()
            .map_err(decode)?;

        Ok(response.into())
    }

    fn list_tokens(&self, org: &OrgContext, service_account_id: i64) -> Result<Vec<TokenRecord>> {
        let request = self.agent.get(&self.tokens_url(service_account_id));

        let response: Vec<TokenListEntry> = self
            .prepare(request, org)
            .call()
            .map_err(|e| classify(e, &format!("service account {service_account_id}")))?
            .body_mut()
            .read_json()
            .map_err(decode)?;

        Ok(response.into_iter().map(Into::into).collect())
    }

    fn delete_token(&self, org: &OrgContext, service_account_id: i64, token_id: i64) -> Result<()> {
        let request = self.agent.delete(&self.token_url(service_account_id, token_id));
        self.prepare(request, org)
            .call()
            .map_err(|e| classify(e, &format!("service account token {token_id}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ErrorCategory;

    #[test]
    fn test_permission_urls() {
        let client = GrafanaClient::new("http://localhost:3000/", None);
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(
            client.permissions_url(4),
            "http://localhost:3000/api/datasources/4/permissions"
        );
        assert_eq!(
            client.permission_url(4, 11),
            "http://localhost:3000/api/datasources/4/permissions/11"
        );
        assert_eq!(
            client.toggle_url(4, true),
            "http://localhost:3000/api/datasources/4/enable-permissions"
        );
        assert_eq!(
            client.toggle_url(4, false),
            "http://localhost:3000/api/datasources/4/disable-permissions"
        );
    }

    #[test]
    fn test_token_urls() {
        let client = GrafanaClient::new("https://grafana.example.com", None);
        assert_eq!(
            client.tokens_url(7),
            "https://grafana.example.com/api/serviceaccounts/7/tokens"
        );
        assert_eq!(
            client.token_url(7, 3),
            "https://grafana.example.com/api/serviceaccounts/7/tokens/3"
        );
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify(ureq::Error::StatusCode(404), "datasource 4");
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.to_string(), "datasource 4 not found");
    }

    #[test]
    fn test_classify_other_status() {
        let err = classify(ureq::Error::StatusCode(403), "datasource 4");
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(matches!(err, Error::Http { status: Some(403), .. }));
    }

    #[test]
    fn test_unreachable_server_is_transient() {
        let client =
            GrafanaClient::with_timeout("http://127.0.0.1:1", None, Duration::from_secs(2));
        let err = client
            .fetch_permissions(&OrgContext::default_org(), 1)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);
    }
}
