//! Execution engine - applies change sets and keeps the local records current

use anyhow::{Context as AnyhowContext, Result, anyhow};
use chrono::Utc;
use colored::Colorize;
use declarative::{
    Deletion, Fetched, Intent, Outcome, PermissionRemote, PermissionState, Step, StepObserver,
    TokenLookup, TokenRemote,
};

use super::differ::{
    ChangeSet, DatasourceAction, DatasourceChange, Orphan, TokenAction, TokenChange, display_changes,
    token_target,
};
use crate::state::{DatasourceRecord, SyncState, TokenState};

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Skip confirmation prompts
    pub yes: bool,
    /// Print each step as it is applied
    pub verbose: bool,
}

/// Summary of execution results
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Logs every step, and prints it when verbose
struct LogObserver {
    verbose: bool,
}

impl StepObserver for LogObserver {
    fn on_step_start(&mut self, datasource_id: i64, step: &Step) {
        log::debug!("datasource {datasource_id}: {step}");
    }

    fn on_step_complete(&mut self, datasource_id: i64, step: &Step) {
        log::info!("datasource {datasource_id}: {step} done");
        if self.verbose {
            println!("      {} {}", "✓".green(), step);
        }
    }
}

/// Apply a change set, recording every resource that succeeds.
///
/// A failing resource is counted and skipped; the rest still run.
pub fn apply<R>(
    remote: &R,
    changes: ChangeSet,
    state: &mut SyncState,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary>
where
    R: PermissionRemote + TokenRemote + ?Sized,
{
    display_changes(&changes);
    let pending = changes.change_count();

    if pending > 0 && !opts.yes && !confirm_proceed("Apply these changes?")? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: pending,
            ..Default::default()
        });
    }

    let mut summary = ExecuteSummary::default();
    let mut observer = LogObserver {
        verbose: opts.verbose,
    };

    if pending > 0 {
        println!();
        println!("  {} Applying {} changes...", "→".cyan(), pending);
    }

    for change in &changes.datasources {
        let label = format!("datasource {}", change.desired.datasource_id);
        let result = apply_datasource(remote, change, state, &mut observer);
        tally(&mut summary, &label, result);
    }

    for change in &changes.tokens {
        let label = format!("token {}", change.desired.key);
        let result = apply_token(remote, change, state);
        tally(&mut summary, &label, result);
    }

    for orphan in &changes.orphans {
        let label = orphan.label();
        let result = remove_orphan(remote, orphan, state, &mut observer).map(|()| Applied::Removed);
        tally(&mut summary, &label, result);
    }

    if pending > 0 {
        print_summary(&summary);
    }
    Ok(summary)
}

/// Remove every recorded grant set and token, then forget them.
pub fn destroy<R>(remote: &R, state: &mut SyncState, opts: &ExecuteOptions) -> Result<ExecuteSummary>
where
    R: PermissionRemote + TokenRemote + ?Sized,
{
    let orphans: Vec<Orphan> = state
        .datasources
        .iter()
        .map(|(key, record)| Orphan::Datasource {
            key: key.clone(),
            record: record.clone(),
        })
        .chain(state.tokens.iter().map(|(key, record)| Orphan::Token {
            key: key.clone(),
            record: record.clone(),
        }))
        .collect();

    if orphans.is_empty() {
        println!();
        println!("  {} Nothing recorded, nothing to destroy", "✓".green());
        return Ok(ExecuteSummary::default());
    }

    println!();
    println!("  {} The following will be removed:", "⚠".yellow());
    for orphan in &orphans {
        println!("    {} {}", "-".red(), orphan.label());
    }

    if !opts.yes && !confirm_proceed("Destroy these resources?")? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: orphans.len(),
            ..Default::default()
        });
    }

    let mut summary = ExecuteSummary::default();
    let mut observer = LogObserver {
        verbose: opts.verbose,
    };

    for orphan in &orphans {
        let label = orphan.label();
        let result = remove_orphan(remote, orphan, state, &mut observer).map(|()| Applied::Removed);
        tally(&mut summary, &label, result);
    }

    print_summary(&summary);
    Ok(summary)
}

/// Re-read every recorded resource. Records of resources gone remotely are
/// dropped.
pub fn refresh<R>(remote: &R, state: &mut SyncState) -> Result<ExecuteSummary>
where
    R: PermissionRemote + TokenRemote + ?Sized,
{
    let mut summary = ExecuteSummary::default();

    let keys: Vec<String> = state.datasources.keys().cloned().collect();
    for key in keys {
        let result = refresh_datasource(remote, &key, state);
        tally(&mut summary, &format!("datasource {key}"), result);
    }

    let keys: Vec<String> = state.tokens.keys().cloned().collect();
    for key in keys {
        let result = refresh_token(remote, &key, state);
        tally(&mut summary, &format!("token {key}"), result);
    }

    Ok(summary)
}

// ============================================================================
// Per-resource operations
// ============================================================================

enum Applied {
    Created,
    Modified,
    Removed,
    NoChange,
}

fn tally(summary: &mut ExecuteSummary, label: &str, result: Result<Applied>) {
    match result {
        Ok(Applied::Created) => summary.created += 1,
        Ok(Applied::Modified) => summary.modified += 1,
        Ok(Applied::Removed) => summary.removed += 1,
        Ok(Applied::NoChange) => summary.no_change += 1,
        Err(e) => {
            log::error!("{label}: {e:#}");
            println!("    {} {}: {:#}", "✗".red(), label, e);
            if let Some(category) = e.downcast_ref::<declarative::Error>().map(declarative::Error::category) {
                println!("      {}", category.advice().dimmed());
            }
            summary.failed += 1;
        }
    }
}

fn apply_datasource<R>(
    remote: &R,
    change: &DatasourceChange,
    state: &mut SyncState,
    observer: &mut LogObserver,
) -> Result<Applied>
where
    R: PermissionRemote + ?Sized,
{
    let desired = &change.desired;
    let id = desired.datasource_id;

    let plan = match &change.action {
        DatasourceAction::Missing => return Err(anyhow!("datasource {id} not found")),
        DatasourceAction::Unreadable(reason) => {
            return Err(anyhow!("could not read datasource {id}: {reason}"));
        }
        DatasourceAction::Reconcile(plan) => plan,
    };

    let known = state.datasources.contains_key(&desired.key);

    if plan.is_empty() {
        let current = PermissionState {
            datasource_id: id,
            enabled: plan.final_enabled(),
            grants: plan.kept.clone(),
        };
        state.record_datasource(DatasourceRecord::from_state(&current, desired.org.org_id));
        return Ok(if known {
            Applied::NoChange
        } else {
            Applied::Created
        });
    }

    println!("    {} datasource {}", "→".cyan(), id);
    let outcome = declarative::reconcile(
        remote,
        &desired.org,
        id,
        &desired.grants,
        Intent::APPLY,
        observer,
    )?;
    if let Outcome::Applied(report) = &outcome {
        log::info!(
            "datasource {id}: {} steps applied, {} grants",
            report.steps_applied,
            report.grants().len()
        );
    }

    match declarative::fetch(remote, &desired.org, id)? {
        Fetched::Found(current) => {
            state.record_datasource(DatasourceRecord::from_state(&current, desired.org.org_id));
        }
        Fetched::NotFound => return Err(anyhow!("datasource {id} disappeared after apply")),
    }

    Ok(if known {
        Applied::Modified
    } else {
        Applied::Created
    })
}

fn apply_token<R>(remote: &R, change: &TokenChange, state: &mut SyncState) -> Result<Applied>
where
    R: TokenRemote + ?Sized,
{
    let desired = &change.desired;

    match &change.action {
        TokenAction::Keep => return Ok(Applied::NoChange),
        TokenAction::Unreadable(reason) => {
            return Err(anyhow!("could not read token {}: {reason}", desired.key));
        }
        TokenAction::Replace => {
            if let Some(existing) = &change.existing {
                let (org, service_account_id) = token_target(existing)?;
                let deletion = declarative::token::delete(remote, &org, service_account_id, existing.id)
                    .with_context(|| format!("Failed to delete token {}", existing.id))?;
                if deletion == Deletion::AlreadyGone {
                    log::warn!("token {} was already gone", existing.id);
                }
            }
            state.forget_token(&desired.key);
        }
        TokenAction::Create | TokenAction::Recreate => {
            state.forget_token(&desired.key);
        }
    }

    println!("    {} token {}", "→".cyan(), desired.key);
    let created = declarative::token::create(remote, &desired.org, &desired.spec)
        .with_context(|| format!("Failed to create token '{}'", desired.spec.name))?;

    let mut record = TokenState {
        id: created.id,
        name: created.name,
        service_account_id: desired.service_account_ref.clone(),
        org_id: desired.org.org_id,
        seconds_to_live: desired.spec.seconds_to_live,
        key: Some(created.secret.into_inner()),
        expiration: None,
        has_expired: false,
        created_at: Utc::now(),
    };

    // The secret is stored now; a failed read-back only loses the expiry.
    match declarative::token::read(remote, &desired.org, desired.spec.service_account_id, record.id) {
        Ok(TokenLookup::Present(listed)) => record.update_from(&listed),
        Ok(TokenLookup::Absent) => log::warn!("token {} not listed after creation", record.id),
        Err(e) => log::warn!("Could not read back token {}: {e}", record.id),
    }
    state.record_token(&desired.key, record);

    Ok(match change.action {
        TokenAction::Replace => Applied::Modified,
        _ => Applied::Created,
    })
}

fn remove_orphan<R>(
    remote: &R,
    orphan: &Orphan,
    state: &mut SyncState,
    observer: &mut LogObserver,
) -> Result<()>
where
    R: PermissionRemote + TokenRemote + ?Sized,
{
    match orphan {
        Orphan::Datasource { key, record } => {
            println!("    {} datasource {}", "→".cyan(), record.datasource_id);
            let org = declarative::OrgContext {
                org_id: record.org_id,
            };
            let outcome = declarative::reconcile(
                remote,
                &org,
                record.datasource_id,
                &[],
                Intent::REMOVE,
                observer,
            )?;
            if outcome == Outcome::Gone {
                log::warn!("datasource {} is already gone", record.datasource_id);
            }
            state.forget_datasource(key);
        }
        Orphan::Token { key, record } => {
            println!("    {} token {}", "→".cyan(), key);
            let (org, service_account_id) = token_target(record)?;
            let deletion = declarative::token::delete(remote, &org, service_account_id, record.id)?;
            if deletion == Deletion::AlreadyGone {
                log::warn!("token {} is already gone", record.id);
            }
            state.forget_token(key);
        }
    }
    Ok(())
}

fn refresh_datasource<R>(remote: &R, key: &str, state: &mut SyncState) -> Result<Applied>
where
    R: PermissionRemote + ?Sized,
{
    let Some(record) = state.datasources.get(key).cloned() else {
        return Ok(Applied::NoChange);
    };
    let org = declarative::OrgContext {
        org_id: record.org_id,
    };

    match declarative::fetch(remote, &org, record.datasource_id)? {
        Fetched::Found(current) => {
            let mut updated = DatasourceRecord::from_state(&current, record.org_id);
            if updated.enabled == record.enabled && updated.permissions == record.permissions {
                return Ok(Applied::NoChange);
            }
            updated.last_applied = record.last_applied;
            state.record_datasource(updated);
            Ok(Applied::Modified)
        }
        Fetched::NotFound => {
            log::warn!("datasource {} no longer exists", record.datasource_id);
            state.forget_datasource(key);
            Ok(Applied::Removed)
        }
    }
}

fn refresh_token<R>(remote: &R, key: &str, state: &mut SyncState) -> Result<Applied>
where
    R: TokenRemote + ?Sized,
{
    let Some(record) = state.tokens.get(key).cloned() else {
        return Ok(Applied::NoChange);
    };
    let (org, service_account_id) = token_target(&record)?;

    match declarative::token::read(remote, &org, service_account_id, record.id)? {
        TokenLookup::Present(listed) => {
            let mut updated = record.clone();
            updated.update_from(&listed);
            if updated == record {
                return Ok(Applied::NoChange);
            }
            state.record_token(key, updated);
            Ok(Applied::Modified)
        }
        TokenLookup::Absent => {
            log::warn!("token {} no longer exists", record.id);
            state.forget_token(key);
            Ok(Applied::Removed)
        }
    }
}

/// Confirm with user
fn confirm_proceed(prompt: &str) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new().with_prompt(prompt).default(false).interact()?;

    Ok(confirmed)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Done", "✓".green().bold());
    } else {
        println!("  {} Finished with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrantsyncConfig;
    use crate::engine::differ::compute_changes;
    use crate::engine::planner::DesiredState;
    use declarative::{
        Call, Error, Grant, GrantItem, MockRemote, OrgContext, Permission, Subject, same_grants,
    };

    const YES: ExecuteOptions = ExecuteOptions {
        yes: true,
        verbose: false,
    };

    fn desired(toml_str: &str) -> DesiredState {
        let config: GrantsyncConfig = toml::from_str(toml_str).unwrap();
        DesiredState::from_config(&config).unwrap()
    }

    fn run_apply(remote: &MockRemote, desired: &DesiredState, state: &mut SyncState) -> ExecuteSummary {
        let changes = compute_changes(remote, desired, state).unwrap();
        apply(remote, changes, state, &YES).unwrap()
    }

    const TEAM_QUERY: &str = r#"
[[datasource_permissions]]
datasource_id = 4
permissions = [{ team_id = 5, permission = "Query" }]
"#;

    #[test]
    fn test_apply_enables_and_records() {
        let remote = MockRemote::new();
        remote.add_datasource(4, false, vec![]);
        let mut state = SyncState::default();

        let summary = run_apply(&remote, &desired(TEAM_QUERY), &mut state);
        assert_eq!(summary.created, 1);
        assert!(summary.is_success());

        let ds = remote.datasource(4).unwrap();
        assert!(ds.enabled);
        assert_eq!(ds.grants, vec![Grant::new(Subject::Team(5), Permission::Query)]);

        let record = &state.datasources["4"];
        assert!(record.enabled);
        assert_eq!(
            record.permissions,
            vec![GrantItem {
                team_id: Some(5),
                permission: "Query".to_string(),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_second_apply_is_noop() {
        let remote = MockRemote::new();
        remote.add_datasource(4, false, vec![]);
        let mut state = SyncState::default();
        let desired = desired(TEAM_QUERY);

        run_apply(&remote, &desired, &mut state);
        let mutations = remote.mutation_count();

        let summary = run_apply(&remote, &desired, &mut state);
        assert_eq!(summary.total_changes(), 0);
        assert_eq!(summary.no_change, 1);
        assert_eq!(remote.mutation_count(), mutations);
    }

    #[test]
    fn test_apply_records_matching_datasource_without_mutations() {
        let remote = MockRemote::new();
        remote.add_datasource(
            4,
            true,
            vec![Grant::new(Subject::Team(5), Permission::Query)],
        );
        let mut state = SyncState::default();

        let summary = run_apply(&remote, &desired(TEAM_QUERY), &mut state);
        assert_eq!(summary.created, 1);
        assert_eq!(remote.mutation_count(), 0);
        assert!(state.datasources["4"].enabled);
    }

    #[test]
    fn test_apply_converges_changed_permission() {
        let remote = MockRemote::new();
        remote.add_datasource(
            4,
            true,
            vec![
                Grant::new(Subject::Team(5), Permission::Edit),
                Grant::new(Subject::User(9), Permission::Query),
            ],
        );
        let mut state = SyncState::default();

        run_apply(&remote, &desired(TEAM_QUERY), &mut state);

        let ds = remote.datasource(4).unwrap();
        assert!(same_grants(
            &ds.grants,
            &[Grant::new(Subject::Team(5), Permission::Query)]
        ));
    }

    #[test]
    fn test_apply_missing_datasource_fails_but_continues() {
        let remote = MockRemote::new();
        remote.add_service_account(17);
        let mut state = SyncState::default();

        let desired = desired(
            r#"
[[datasource_permissions]]
datasource_id = 4

[[service_account_tokens]]
name = "ci"
service_account_id = "17"
"#,
        );

        let summary = run_apply(&remote, &desired, &mut state);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
        assert!(state.datasources.is_empty());
        assert!(state.tokens.contains_key("17/ci"));
    }

    #[test]
    fn test_apply_transient_failure_keeps_old_record() {
        let remote = MockRemote::new();
        remote.add_datasource(4, true, vec![]);
        let mut state = SyncState::default();
        let desired = desired(TEAM_QUERY);

        let changes = compute_changes(&remote, &desired, &state).unwrap();
        remote.fail_on(Call::Add, Error::http("HTTP 500", Some(500)));
        let summary = apply(&remote, changes, &mut state, &YES).unwrap();

        assert_eq!(summary.failed, 1);
        assert!(state.datasources.is_empty());

        remote.clear_failures();
        let summary = run_apply(&remote, &desired, &mut state);
        assert!(summary.is_success());
        assert!(state.datasources.contains_key("4"));
    }

    #[test]
    fn test_failed_token_read_does_not_block_datasources() {
        let remote = MockRemote::new();
        remote.add_datasource(4, false, vec![]);
        remote.add_service_account(17);
        let mut state = SyncState::default();

        run_apply(
            &remote,
            &desired(
                r#"
[[datasource_permissions]]
datasource_id = 4
permissions = [{ team_id = 5, permission = "Query" }]

[[service_account_tokens]]
name = "ci"
service_account_id = "17"
"#,
            ),
            &mut state,
        );
        let token = state.tokens["17/ci"].clone();

        remote.fail_on(Call::ListTokens, Error::http("HTTP 502", Some(502)));
        let summary = run_apply(
            &remote,
            &desired(
                r#"
[[datasource_permissions]]
datasource_id = 4
permissions = [{ team_id = 5, permission = "Edit" }]

[[service_account_tokens]]
name = "ci"
service_account_id = "17"
"#,
            ),
            &mut state,
        );

        assert_eq!(summary.modified, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            remote.datasource(4).unwrap().grants,
            vec![Grant::new(Subject::Team(5), Permission::Edit)]
        );
        assert_eq!(state.datasources["4"].permissions[0].permission, "Edit");
        assert_eq!(state.tokens["17/ci"], token);
        assert_eq!(remote.tokens(17).len(), 1);
    }

    #[test]
    fn test_token_secret_stored_once() {
        let remote = MockRemote::new();
        remote.add_service_account(17);
        let mut state = SyncState::default();
        let desired = desired(
            r#"
[[service_account_tokens]]
name = "ci"
service_account_id = "17"
seconds_to_live = 3600
"#,
        );

        run_apply(&remote, &desired, &mut state);
        let record = state.tokens["17/ci"].clone();
        assert_eq!(record.key, Some(format!("glsa_mock_{}", record.id)));
        assert!(record.expiration.is_some());

        let summary = run_apply(&remote, &desired, &mut state);
        assert_eq!(summary.no_change, 1);
        assert_eq!(state.tokens["17/ci"], record);
    }

    #[test]
    fn test_token_replaced_on_ttl_change() {
        let remote = MockRemote::new();
        remote.add_service_account(17);
        let mut state = SyncState::default();

        run_apply(
            &remote,
            &desired(
                r#"
[[service_account_tokens]]
name = "ci"
service_account_id = "17"
"#,
            ),
            &mut state,
        );
        let old_id = state.tokens["17/ci"].id;

        let summary = run_apply(
            &remote,
            &desired(
                r#"
[[service_account_tokens]]
name = "ci"
service_account_id = "17"
seconds_to_live = 60
"#,
            ),
            &mut state,
        );

        assert_eq!(summary.modified, 1);
        let tokens = remote.tokens(17);
        assert_eq!(tokens.len(), 1);
        assert_ne!(tokens[0].id, old_id);
        assert_eq!(state.tokens["17/ci"].id, tokens[0].id);
    }

    #[test]
    fn test_token_recreated_when_revoked() {
        let remote = MockRemote::new();
        remote.add_service_account(17);
        let mut state = SyncState::default();
        let desired = desired(
            r#"
[[service_account_tokens]]
name = "ci"
service_account_id = "17"
"#,
        );

        run_apply(&remote, &desired, &mut state);
        let old_id = state.tokens["17/ci"].id;
        remote.revoke_token(17, old_id);

        let summary = run_apply(&remote, &desired, &mut state);
        assert_eq!(summary.created, 1);
        assert_ne!(state.tokens["17/ci"].id, old_id);
    }

    #[test]
    fn test_apply_removes_unconfigured_records() {
        let remote = MockRemote::new();
        remote.add_datasource(4, false, vec![]);
        remote.add_service_account(17);
        let mut state = SyncState::default();

        run_apply(
            &remote,
            &desired(
                r#"
[[datasource_permissions]]
datasource_id = 4
permissions = [{ team_id = 5, permission = "Query" }]

[[service_account_tokens]]
name = "ci"
service_account_id = "17"
"#,
            ),
            &mut state,
        );

        let summary = run_apply(&remote, &DesiredState::default(), &mut state);
        assert_eq!(summary.removed, 2);
        assert!(state.is_empty());

        let ds = remote.datasource(4).unwrap();
        assert!(!ds.enabled);
        assert!(ds.grants.is_empty());
        assert!(remote.tokens(17).is_empty());
    }

    #[test]
    fn test_destroy_tolerates_gone_resources() {
        let remote = MockRemote::new();
        remote.add_datasource(4, false, vec![]);
        remote.add_service_account(17);
        let mut state = SyncState::default();

        run_apply(
            &remote,
            &desired(
                r#"
[[datasource_permissions]]
datasource_id = 4
permissions = [{ team_id = 5, permission = "Query" }]

[[service_account_tokens]]
name = "ci"
service_account_id = "17"
"#,
            ),
            &mut state,
        );

        remote.remove_datasource(4);
        remote.revoke_token(17, state.tokens["17/ci"].id);

        let summary = destroy(&remote, &mut state, &YES).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.removed, 2);
        assert!(state.is_empty());
    }

    #[test]
    fn test_destroy_empty_state() {
        let remote = MockRemote::new();
        let mut state = SyncState::default();
        assert_eq!(
            destroy(&remote, &mut state, &YES).unwrap(),
            ExecuteSummary::default()
        );
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_refresh_drops_gone_and_updates_changed() {
        let remote = MockRemote::new();
        remote.add_datasource(4, false, vec![]);
        remote.add_datasource(6, false, vec![]);
        remote.add_service_account(17);
        let mut state = SyncState::default();

        run_apply(
            &remote,
            &desired(
                r#"
[[datasource_permissions]]
datasource_id = 4
permissions = [{ team_id = 5, permission = "Query" }]

[[datasource_permissions]]
datasource_id = 6

[[service_account_tokens]]
name = "ci"
service_account_id = "17"
"#,
            ),
            &mut state,
        );

        remote.remove_datasource(6);
        let token_id = state.tokens["17/ci"].id;
        remote.expire_token(17, token_id);

        let summary = refresh(&remote, &mut state).unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.no_change, 1);
        assert!(!state.datasources.contains_key("6"));
        assert!(state.tokens["17/ci"].has_expired);
        assert!(state.tokens["17/ci"].key.is_some());
    }

    #[test]
    fn test_refresh_passes_recorded_org() {
        let remote = MockRemote::new();
        remote.add_datasource(4, true, vec![]);
        let mut state = SyncState::default();
        state.record_datasource(DatasourceRecord {
            datasource_id: 4,
            org_id: Some(7),
            enabled: true,
            permissions: vec![],
            last_applied: Utc::now(),
        });

        refresh(&remote, &mut state).unwrap();
        assert_eq!(remote.orgs_seen(), vec![OrgContext::org(7)]);
    }
}
