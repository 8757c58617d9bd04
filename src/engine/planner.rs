//! Desired state - what the config declares, validated and resolved

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Grant, OrgContext, TokenSpec, grants_from_items};

use crate::config::{GrantsyncConfig, split_org_resource_id};
use crate::state::SyncState;

/// Desired permissions of one data source
#[derive(Debug, Clone)]
pub struct DesiredDatasource {
    /// State key
    pub key: String,
    pub datasource_id: i64,
    pub org: OrgContext,
    pub grants: Vec<Grant>,
}

/// Desired service-account token
#[derive(Debug, Clone)]
pub struct DesiredToken {
    /// State key
    pub key: String,
    /// Service account id as written in the config
    pub service_account_ref: String,
    pub org: OrgContext,
    pub spec: TokenSpec,
}

/// Everything the config declares
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub datasources: Vec<DesiredDatasource>,
    pub tokens: Vec<DesiredToken>,
}

impl DesiredState {
    /// Resolve the config into desired resources.
    ///
    /// Fails on the first invalid permission item, before anything is sent.
    pub fn from_config(config: &GrantsyncConfig) -> Result<Self> {
        let default_org = config.grafana.org_id;

        let datasources = config
            .datasource_permissions
            .iter()
            .map(|ds| -> Result<DesiredDatasource> {
                let grants = grants_from_items(&ds.permissions)
                    .with_context(|| format!("Invalid permissions for datasource {}", ds.datasource_id))?;
                Ok(DesiredDatasource {
                    key: SyncState::datasource_key(ds.datasource_id),
                    datasource_id: ds.datasource_id,
                    org: OrgContext {
                        org_id: ds.org_id.or(default_org),
                    },
                    grants,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let tokens = config
            .service_account_tokens
            .iter()
            .map(|t| -> Result<DesiredToken> {
                let (org_id, service_account_id) = split_org_resource_id(&t.service_account_id)?;
                Ok(DesiredToken {
                    key: t.key(),
                    service_account_ref: t.service_account_id.clone(),
                    org: OrgContext {
                        org_id: org_id.or(default_org),
                    },
                    spec: TokenSpec::new(service_account_id, t.name.clone(), t.seconds_to_live),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Desired state: {} datasources, {} tokens",
            datasources.len(),
            tokens.len()
        );

        Ok(Self {
            datasources,
            tokens,
        })
    }

    pub fn has_datasource(&self, key: &str) -> bool {
        self.datasources.iter().any(|d| d.key == key)
    }

    pub fn has_token(&self, key: &str) -> bool {
        self.tokens.iter().any(|t| t.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Permission, Subject};

    fn config(toml_str: &str) -> GrantsyncConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_org_resolution() {
        let config = config(
            r#"
[grafana]
org_id = 3

[[datasource_permissions]]
datasource_id = 4

[[datasource_permissions]]
datasource_id = 5
org_id = 9

[[service_account_tokens]]
name = "a"
service_account_id = "17"

[[service_account_tokens]]
name = "b"
service_account_id = "2:17"
seconds_to_live = 0
"#,
        );

        let desired = DesiredState::from_config(&config).unwrap();
        assert_eq!(desired.datasources[0].org, OrgContext::org(3));
        assert_eq!(desired.datasources[1].org, OrgContext::org(9));
        assert_eq!(desired.tokens[0].org, OrgContext::org(3));
        assert_eq!(desired.tokens[1].org, OrgContext::org(2));
        assert_eq!(desired.tokens[1].spec.service_account_id, 17);
        assert_eq!(desired.tokens[1].spec.seconds_to_live, None);
        assert!(desired.has_token("2:17/b"));
        assert!(desired.has_datasource("5"));
    }

    #[test]
    fn test_grants_are_parsed() {
        let config = config(
            r#"
[[datasource_permissions]]
datasource_id = 4
permissions = [
  { team_id = 5, permission = "Query" },
  { user_id = 9, permission = "Edit" },
]
"#,
        );

        let desired = DesiredState::from_config(&config).unwrap();
        let grants = &desired.datasources[0].grants;
        assert_eq!(grants[0], Grant::new(Subject::Team(5), Permission::Query));
        assert_eq!(grants[1], Grant::new(Subject::User(9), Permission::Edit));
        assert_eq!(desired.datasources[0].org, OrgContext::default_org());
    }

    #[test]
    fn test_invalid_permission_fails() {
        let config = config(
            r#"
[[datasource_permissions]]
datasource_id = 4
permissions = [{ team_id = 5, permission = "Admin" }]
"#,
        );

        let err = DesiredState::from_config(&config).unwrap_err();
        assert!(format!("{err:#}").contains("unknown datasource permission"));
    }
}
