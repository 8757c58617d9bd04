use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{GrantItem, PermissionState, TokenRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// What grantsync last applied, keyed the same way as the config
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncState {
    /// Data-source permission records, keyed by datasource id
    #[serde(default)]
    pub datasources: BTreeMap<String, DatasourceRecord>,

    /// Token records, keyed by `<service_account_id>/<name>`
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenState>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// Permissions of one data source as last read back from the remote
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DatasourceRecord {
    pub datasource_id: i64,
    #[serde(default)]
    pub org_id: Option<i64>,
    pub enabled: bool,
    #[serde(default)]
    pub permissions: Vec<GrantItem>,
    pub last_applied: DateTime<Utc>,
}

impl DatasourceRecord {
    pub fn from_state(state: &PermissionState, org_id: Option<i64>) -> Self {
        Self {
            datasource_id: state.datasource_id,
            org_id,
            enabled: state.enabled,
            permissions: state.grants.iter().map(declarative::Grant::to_item).collect(),
            last_applied: Utc::now(),
        }
    }
}

/// A service-account token created by grantsync
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub id: i64,
    pub name: String,
    /// Service account id as written in the config
    pub service_account_id: String,
    #[serde(default)]
    pub org_id: Option<i64>,
    #[serde(default)]
    pub seconds_to_live: Option<u64>,
    /// Secret captured at creation. `None` once it can no longer be known.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_expired: bool,
    pub created_at: DateTime<Utc>,
}

impl TokenState {
    /// Copy the remote's view of expiry onto the record
    pub fn update_from(&mut self, record: &TokenRecord) {
        self.name = record.name.clone();
        self.expiration = record.expiration;
        self.has_expired = record.has_expired;
    }
}

// ============================================================================
// SyncState Implementation
// ============================================================================

impl Default for SyncState {
    fn default() -> Self {
        Self {
            datasources: BTreeMap::new(),
            tokens: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl SyncState {
    /// Get the state directory path (~/.local/state/grantsync)
    pub fn state_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".local").join("state").join("grantsync"))
    }

    /// Get the default state file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::state_dir()?.join("state.toml"))
    }

    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: SyncState = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        write_private(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(path)
    }

    pub fn is_empty(&self) -> bool {
        self.datasources.is_empty() && self.tokens.is_empty()
    }

    // ========================================================================
    // Record Helpers
    // ========================================================================

    pub fn datasource_key(datasource_id: i64) -> String {
        datasource_id.to_string()
    }

    pub fn record_datasource(&mut self, record: DatasourceRecord) {
        self.datasources
            .insert(Self::datasource_key(record.datasource_id), record);
    }

    pub fn forget_datasource(&mut self, key: &str) -> Option<DatasourceRecord> {
        self.datasources.remove(key)
    }

    pub fn record_token(&mut self, key: &str, token: TokenState) {
        self.tokens.insert(key.to_string(), token);
    }

    pub fn forget_token(&mut self, key: &str) -> Option<TokenState> {
        self.tokens.remove(key)
    }
}

/// The state file holds token secrets. It is created owner-only, and an
/// existing file is narrowed to owner-only before anything is written.
#[cfg(unix)]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(content.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Grant, Permission, Subject};

    fn sample_token() -> TokenState {
        TokenState {
            id: 3,
            name: "ci".to_string(),
            service_account_id: "2:17".to_string(),
            org_id: Some(2),
            seconds_to_live: Some(3600),
            key: Some("glsa_secret".to_string()),
            expiration: None,
            has_expired: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = SyncState::load(&dir.path().join("state.toml")).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.toml");

        let mut state = SyncState::default();
        let remote = PermissionState {
            datasource_id: 4,
            enabled: true,
            grants: vec![Grant::new(Subject::Team(5), Permission::Query).with_id(11)],
        };
        state.record_datasource(DatasourceRecord::from_state(&remote, Some(1)));
        state.record_token("2:17/ci", sample_token());
        state.touch(&path).unwrap();

        let loaded = SyncState::load(&path).unwrap();
        assert_eq!(loaded.datasources.len(), 1);
        let record = &loaded.datasources["4"];
        assert!(record.enabled);
        assert_eq!(record.org_id, Some(1));
        assert_eq!(record.permissions[0].team_id, Some(5));
        assert_eq!(loaded.tokens["2:17/ci"].key.as_deref(), Some("glsa_secret"));
    }

    #[cfg(unix)]
    #[test]
    fn test_state_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        SyncState::default().save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_state_file_is_narrowed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "stale").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let mut state = SyncState::default();
        state.record_token("2:17/ci", sample_token());
        state.save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let loaded = SyncState::load(&path).unwrap();
        assert_eq!(loaded.tokens["2:17/ci"].key.as_deref(), Some("glsa_secret"));
    }

    #[test]
    fn test_unknown_secret_round_trips_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let mut state = SyncState::default();
        let mut token = sample_token();
        token.key = None;
        state.record_token("17/ci", token);
        state.save(&path).unwrap();

        let loaded = SyncState::load(&path).unwrap();
        assert_eq!(loaded.tokens["17/ci"].key, None);
    }

    #[test]
    fn test_forget() {
        let mut state = SyncState::default();
        state.record_token("17/ci", sample_token());
        assert!(state.forget_token("17/ci").is_some());
        assert!(state.forget_token("17/ci").is_none());
        assert!(state.forget_datasource("4").is_none());
    }

    #[test]
    fn test_corrupt_state_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "datasources = 5").unwrap();
        assert!(SyncState::load(&path).is_err());
    }
}
