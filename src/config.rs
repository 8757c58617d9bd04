use anyhow::{Context, Result, bail};
use declarative::GrantItem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("grantsync"))
}

/// Default config file path (~/.config/grantsync/config.toml)
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrantsyncConfig {
    #[serde(default)]
    pub grafana: GrafanaSettings,
    #[serde(default)]
    pub datasource_permissions: Vec<DatasourcePermissionsConfig>,
    #[serde(default)]
    pub service_account_tokens: Vec<ServiceAccountTokenConfig>,
}

/// Connection settings for the Grafana instance
#[derive(Clone, Serialize, Deserialize)]
pub struct GrafanaSettings {
    #[serde(default = "default_url")]
    pub url: String,
    /// Service-account token or API key. Prefer `GRAFANA_AUTH`.
    #[serde(default)]
    pub auth: Option<String>,
    /// Organization used when a resource does not name one
    #[serde(default)]
    pub org_id: Option<i64>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GrafanaSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrafanaSettings")
            .field("url", &self.url)
            .field("auth", &self.auth.as_ref().map(|_| "***"))
            .field("org_id", &self.org_id)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GrafanaSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            auth: None,
            org_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Permissions of one data source. Items omitted here are removed remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourcePermissionsConfig {
    pub datasource_id: i64,
    #[serde(default)]
    pub org_id: Option<i64>,
    #[serde(default)]
    pub permissions: Vec<GrantItem>,
}

/// A service-account token. Any change replaces the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountTokenConfig {
    pub name: String,
    /// `"<id>"` or org-scoped `"<orgID>:<id>"`
    pub service_account_id: String,
    #[serde(default)]
    pub seconds_to_live: Option<u64>,
}

impl ServiceAccountTokenConfig {
    /// State key identifying this token
    pub fn key(&self) -> String {
        token_key(&self.service_account_id, &self.name)
    }
}

/// State key for a token: service account id as written, then name
pub fn token_key(service_account_id: &str, name: &str) -> String {
    format!("{service_account_id}/{name}")
}

/// Split an org-scoped id like `"2:17"` into `(Some(2), 17)`.
/// A bare `"17"` has no org.
pub fn split_org_resource_id(id: &str) -> Result<(Option<i64>, i64)> {
    let id = id.trim();
    match id.split_once(':') {
        Some((org, resource)) => {
            let org = org
                .parse::<i64>()
                .with_context(|| format!("Invalid org id in '{id}'"))?;
            let resource = resource
                .parse::<i64>()
                .with_context(|| format!("Invalid resource id in '{id}'"))?;
            Ok((Some(org), resource))
        }
        None => {
            let resource = id
                .parse::<i64>()
                .with_context(|| format!("Invalid resource id '{id}'"))?;
            Ok((None, resource))
        }
    }
}

impl GrantsyncConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config format: {}", path.display()))?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Structural checks that need no remote call.
    ///
    /// Permission items themselves are validated when desired grants are
    /// built, before anything is sent.
    pub fn validate(&self) -> Result<()> {
        let mut datasources = HashSet::new();
        for ds in &self.datasource_permissions {
            if ds.datasource_id <= 0 {
                bail!("Invalid datasource_id {}", ds.datasource_id);
            }
            if !datasources.insert(ds.datasource_id) {
                bail!(
                    "Datasource {} is declared more than once",
                    ds.datasource_id
                );
            }
        }

        let mut tokens = HashSet::new();
        for token in &self.service_account_tokens {
            split_org_resource_id(&token.service_account_id)?;
            if !tokens.insert(token.key()) {
                bail!(
                    "Token '{}' of service account {} is declared more than once",
                    token.name,
                    token.service_account_id
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[grafana]
url = "https://grafana.example.com"
org_id = 1

[[datasource_permissions]]
datasource_id = 4

[[datasource_permissions.permissions]]
team_id = 5
permission = "Query"

[[datasource_permissions.permissions]]
built_in_role = "Viewer"
permission = "Edit"

[[service_account_tokens]]
name = "ci"
service_account_id = "2:17"
seconds_to_live = 3600
"#;

    #[test]
    fn test_parse_sample() {
        let config: GrantsyncConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.grafana.url, "https://grafana.example.com");
        assert_eq!(config.grafana.timeout_secs, 30);
        assert_eq!(config.datasource_permissions.len(), 1);

        let ds = &config.datasource_permissions[0];
        assert_eq!(ds.datasource_id, 4);
        assert_eq!(ds.permissions.len(), 2);
        assert_eq!(ds.permissions[0].team_id, Some(5));
        assert_eq!(ds.permissions[1].built_in_role.as_deref(), Some("Viewer"));

        let token = &config.service_account_tokens[0];
        assert_eq!(token.key(), "2:17/ci");
        assert_eq!(token.seconds_to_live, Some(3600));
    }

    #[test]
    fn test_debug_hides_auth() {
        let settings = GrafanaSettings {
            auth: Some("glsa_secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("glsa_secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_defaults() {
        let config: GrantsyncConfig = toml::from_str("").unwrap();
        assert_eq!(config.grafana.url, "http://localhost:3000");
        assert!(config.datasource_permissions.is_empty());
        assert!(config.service_account_tokens.is_empty());
    }

    #[test]
    fn test_split_org_resource_id() {
        assert_eq!(split_org_resource_id("17").unwrap(), (None, 17));
        assert_eq!(split_org_resource_id("2:17").unwrap(), (Some(2), 17));
        assert!(split_org_resource_id("abc").is_err());
        assert!(split_org_resource_id("2:").is_err());
    }

    #[test]
    fn test_duplicate_datasource_rejected() {
        let config: GrantsyncConfig = toml::from_str(
            r#"
[[datasource_permissions]]
datasource_id = 4

[[datasource_permissions]]
datasource_id = 4
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_service_account_id_rejected() {
        let config: GrantsyncConfig = toml::from_str(
            r#"
[[service_account_tokens]]
name = "ci"
service_account_id = "one"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = GrantsyncConfig::load(&path).unwrap();
        assert_eq!(config.grafana.org_id, Some(1));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GrantsyncConfig::load(&dir.path().join("nope.toml")).is_err());
    }
}
