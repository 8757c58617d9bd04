//! Grafana HTTP API request and response bodies.

use chrono::{DateTime, Utc};
use declarative::{
    CreatedToken, Error, Grant, Permission, PermissionState, Result, Secret, Subject, TokenRecord,
    TokenSpec, normalize_expiration,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Data-source permissions
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DatasourcePermissionsResponse {
    #[serde(default)]
    pub datasource_id: i64,
    pub enabled: bool,
    #[serde(default)]
    pub permissions: Option<Vec<DatasourcePermission>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DatasourcePermission {
    pub id: i64,
    #[serde(default)]
    pub team_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub built_in_role: String,
    pub permission: i64,
}

impl DatasourcePermission {
    fn into_grant(self) -> Result<Grant> {
        let permission = Permission::from_wire(self.permission)?;
        let subject = Subject::from_fields(
            Some(self.team_id),
            Some(self.user_id),
            Some(self.built_in_role.as_str()),
        )
        .map_err(|e| Error::InvalidResponse(format!("datasource permission {}: {e}", self.id)))?;
        Ok(Grant::new(subject, permission).with_id(self.id))
    }
}

impl DatasourcePermissionsResponse {
    /// Convert into the permission state of `datasource_id`.
    pub fn into_state(self, datasource_id: i64) -> Result<PermissionState> {
        let grants = self
            .permissions
            .unwrap_or_default()
            .into_iter()
            .map(DatasourcePermission::into_grant)
            .collect::<Result<Vec<_>>>()?;

        Ok(PermissionState {
            datasource_id: if self.datasource_id > 0 {
                self.datasource_id
            } else {
                datasource_id
            },
            enabled: self.enabled,
            grants,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddPermissionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(rename = "builtinRole", skip_serializing_if = "Option::is_none")]
    pub built_in_role: Option<String>,
    pub permission: i64,
}

impl From<&Grant> for AddPermissionPayload {
    fn from(grant: &Grant) -> Self {
        Self {
            team_id: grant.subject.team_id(),
            user_id: grant.subject.user_id(),
            built_in_role: grant.subject.built_in_role().map(str::to_string),
            permission: grant.permission.wire_value(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddPermissionResponse {
    #[serde(default, alias = "id")]
    pub permission_id: i64,
}

// =============================================================================
// Service-account tokens
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateTokenPayload<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_to_live: Option<u64>,
}

impl<'a> From<&'a TokenSpec> for CreateTokenPayload<'a> {
    fn from(spec: &'a TokenSpec) -> Self {
        Self {
            name: &spec.name,
            seconds_to_live: spec.seconds_to_live,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateTokenResponse {
    pub id: i64,
    pub name: String,
    pub key: String,
}

impl From<CreateTokenResponse> for CreatedToken {
    fn from(r: CreateTokenResponse) -> Self {
        Self {
            id: r.id,
            name: r.name,
            secret: Secret::new(r.key),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenListEntry {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_expired: bool,
}

impl From<TokenListEntry> for TokenRecord {
    fn from(t: TokenListEntry) -> Self {
        Self {
            id: t.id,
            name: t.name,
            expiration: normalize_expiration(t.expiration),
            has_expired: t.has_expired,
        }
    }
}
