//! Declarative commands
//!
//! - `plan` - Preview what apply would change
//! - `apply` - Make the remote match the config
//! - `refresh` - Re-read recorded resources
//! - `destroy` - Remove everything recorded
//! - `status` - Show recorded resources

use anyhow::{Result, bail};
use colored::Colorize;
use grafana_api::GrafanaClient;
use std::path::PathBuf;
use std::time::Duration;

use crate::Context;
use crate::config::{self, GrantsyncConfig};
use crate::engine::{self, DesiredState, ExecuteOptions, ExecuteSummary};
use crate::state::SyncState;
use crate::ui;

// ============================================================================
// Setup
// ============================================================================

fn config_path(ctx: &Context) -> Result<PathBuf> {
    match &ctx.config_path {
        Some(path) => Ok(config::expand_path(path)),
        None => config::default_config_path(),
    }
}

fn state_path(ctx: &Context) -> Result<PathBuf> {
    match &ctx.state_path {
        Some(path) => Ok(config::expand_path(path)),
        None => SyncState::default_path(),
    }
}

fn load_config(ctx: &Context) -> Result<GrantsyncConfig> {
    GrantsyncConfig::load(&config_path(ctx)?)
}

/// Commands that work from the records alone only need connection settings
fn load_config_or_default(ctx: &Context) -> Result<GrantsyncConfig> {
    let path = config_path(ctx)?;
    if path.exists() {
        GrantsyncConfig::load(&path)
    } else {
        log::debug!("No config at {}, using defaults", path.display());
        Ok(GrantsyncConfig::default())
    }
}

fn client(ctx: &Context, config: &GrantsyncConfig) -> GrafanaClient {
    let url = ctx
        .url
        .clone()
        .unwrap_or_else(|| config.grafana.url.clone());
    let auth = ctx.auth.clone().or_else(|| config.grafana.auth.clone());
    if auth.is_none() {
        log::warn!("No Grafana credentials configured; requests are anonymous");
    }
    log::debug!("Using Grafana at {url}");
    GrafanaClient::with_timeout(url, auth, Duration::from_secs(config.grafana.timeout_secs))
}

fn options(ctx: &Context, yes: bool) -> ExecuteOptions {
    ExecuteOptions {
        yes,
        verbose: ctx.verbose > 0 && !ctx.quiet,
    }
}

fn finish(summary: &ExecuteSummary) -> Result<()> {
    if !summary.is_success() {
        bail!("{} resources failed", summary.failed);
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

pub fn plan(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let desired = DesiredState::from_config(&config)?;
    let state = SyncState::load(&state_path(ctx)?)?;
    let remote = client(ctx, &config);

    let changes = engine::compute_changes(&remote, &desired, &state)?;
    engine::display_changes(&changes);

    let unreadable = changes.unreadable_count();
    if unreadable > 0 {
        bail!("{unreadable} resources could not be read");
    }
    Ok(())
}

pub fn apply(ctx: &Context, yes: bool) -> Result<()> {
    let config = load_config(ctx)?;
    let desired = DesiredState::from_config(&config)?;
    let path = state_path(ctx)?;
    let mut state = SyncState::load(&path)?;
    let remote = client(ctx, &config);

    let changes = engine::compute_changes(&remote, &desired, &state)?;
    let summary = engine::apply(&remote, changes, &mut state, &options(ctx, yes))?;

    if summary.skipped == 0 {
        state.touch(&path)?;
    }
    finish(&summary)
}

pub fn refresh(ctx: &Context) -> Result<()> {
    let config = load_config_or_default(ctx)?;
    let path = state_path(ctx)?;
    let mut state = SyncState::load(&path)?;

    if state.is_empty() {
        ui::info("Nothing recorded");
        return Ok(());
    }

    let remote = client(ctx, &config);
    let summary = engine::refresh(&remote, &mut state)?;
    state.touch(&path)?;

    if !ctx.quiet {
        ui::success(&format!(
            "Refreshed: {} updated, {} gone, {} unchanged",
            summary.modified, summary.removed, summary.no_change
        ));
    }
    finish(&summary)
}

pub fn destroy(ctx: &Context, yes: bool) -> Result<()> {
    let config = load_config_or_default(ctx)?;
    let path = state_path(ctx)?;
    let mut state = SyncState::load(&path)?;
    let state_was_empty = state.is_empty();
    let remote = client(ctx, &config);

    let summary = engine::destroy(&remote, &mut state, &options(ctx, yes))?;
    if summary.skipped == 0 && !state_was_empty {
        state.touch(&path)?;
    }
    finish(&summary)
}

pub fn status(ctx: &Context, show_secrets: bool) -> Result<()> {
    let path = state_path(ctx)?;
    let state = SyncState::load(&path)?;

    ui::header("grantsync status");
    ui::kv("State", &path.display().to_string());
    ui::kv(
        "Updated",
        &state.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    if state.is_empty() {
        ui::info("Nothing recorded");
        return Ok(());
    }

    if !state.datasources.is_empty() {
        ui::section("Data sources");
        for record in state.datasources.values() {
            let flag = if record.enabled {
                "enabled".green()
            } else {
                "disabled".dimmed()
            };
            println!(
                "  {} datasource {} ({}, {} grants)",
                "•".cyan(),
                record.datasource_id,
                flag,
                record.permissions.len()
            );
            if let Some(org) = record.org_id {
                ui::dim(&format!("    org {org}"));
            }
            for item in &record.permissions {
                match declarative::Grant::from_item(item) {
                    Ok(grant) => ui::dim(&format!("    {grant}")),
                    Err(e) => ui::dim(&format!("    (unreadable: {e})")),
                }
            }
        }
    }

    if !state.tokens.is_empty() {
        ui::section("Service-account tokens");
        for (key, token) in &state.tokens {
            let expired = if token.has_expired {
                format!(" {}", "expired".red())
            } else {
                String::new()
            };
            println!("  {} {} (id {}){}", "•".cyan(), key, token.id, expired);

            let expiration = token
                .expiration
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
            ui::dim(&format!("    expires: {expiration}"));

            let secret = match &token.key {
                Some(secret) if show_secrets => secret.clone(),
                Some(secret) => ui::mask_secret(secret),
                None => "(unknown)".to_string(),
            };
            ui::dim(&format!("    key: {secret}"));
        }
    }

    Ok(())
}
