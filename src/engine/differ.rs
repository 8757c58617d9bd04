//! Change computation and display

use anyhow::Result;
use colored::Colorize;
use declarative::{OrgContext, PermissionRemote, Plan, Step, TokenLookup, TokenRemote};

use super::planner::{DesiredDatasource, DesiredState, DesiredToken};
use crate::config::split_org_resource_id;
use crate::state::{DatasourceRecord, SyncState, TokenState};

/// What happens to one configured data source
#[derive(Debug, Clone)]
pub enum DatasourceAction {
    Reconcile(Plan),
    /// The data source does not exist remotely
    Missing,
    /// Reading the current state failed
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct DatasourceChange {
    pub desired: DesiredDatasource,
    pub action: DatasourceAction,
}

impl DatasourceChange {
    pub fn is_noop(&self) -> bool {
        matches!(&self.action, DatasourceAction::Reconcile(plan) if plan.is_empty())
    }
}

/// What happens to one configured token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenAction {
    /// Never created
    Create,
    /// Recorded, but deleted remotely
    Recreate,
    /// Declaration changed; delete and create
    Replace,
    Keep,
    /// Listing the service account's tokens failed
    Unreadable(String),
}

impl TokenAction {
    fn symbol(&self) -> colored::ColoredString {
        match self {
            Self::Create | Self::Recreate => "+".green(),
            Self::Replace => "~".yellow(),
            Self::Keep => "○".dimmed(),
            Self::Unreadable(_) => "✗".red(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Create => "(will create)",
            Self::Recreate => "(gone remotely, will create)",
            Self::Replace => "(changed, will replace)",
            Self::Keep => "(no change)",
            Self::Unreadable(_) => "(could not read)",
        }
    }

    fn is_change(&self) -> bool {
        !matches!(self, Self::Keep | Self::Unreadable(_))
    }
}

#[derive(Debug, Clone)]
pub struct TokenChange {
    pub desired: DesiredToken,
    pub action: TokenAction,
    pub existing: Option<TokenState>,
}

/// A recorded resource that the config no longer declares
#[derive(Debug, Clone)]
pub enum Orphan {
    Datasource { key: String, record: DatasourceRecord },
    Token { key: String, record: TokenState },
}

impl Orphan {
    pub fn label(&self) -> String {
        match self {
            Self::Datasource { record, .. } => format!("datasource {}", record.datasource_id),
            Self::Token { record, .. } => format!(
                "token '{}' of service account {}",
                record.name, record.service_account_id
            ),
        }
    }
}

/// Every change apply would make
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub datasources: Vec<DatasourceChange>,
    pub tokens: Vec<TokenChange>,
    pub orphans: Vec<Orphan>,
}

impl ChangeSet {
    /// Number of resources that would change
    pub fn change_count(&self) -> usize {
        self.datasources
            .iter()
            .filter(|d| matches!(&d.action, DatasourceAction::Reconcile(plan) if !plan.is_empty()))
            .count()
            + self.tokens.iter().filter(|t| t.action.is_change()).count()
            + self.orphans.len()
    }

    /// Number of configured resources whose current state could not be read
    pub fn unreadable_count(&self) -> usize {
        self.datasources
            .iter()
            .filter(|d| matches!(d.action, DatasourceAction::Unreadable(_)))
            .count()
            + self
                .tokens
                .iter()
                .filter(|t| matches!(t.action, TokenAction::Unreadable(_)))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }
}

/// Compare the desired state with the remote and the local records.
///
/// Only reads from the remote. A failed read is recorded on that resource
/// and the others are still planned.
pub fn compute_changes<R>(remote: &R, desired: &DesiredState, state: &SyncState) -> Result<ChangeSet>
where
    R: PermissionRemote + TokenRemote + ?Sized,
{
    let mut changes = ChangeSet::default();

    for ds in &desired.datasources {
        let plan = declarative::plan(
            remote,
            &ds.org,
            ds.datasource_id,
            &ds.grants,
            declarative::Intent::APPLY,
        );

        let action = match plan {
            Ok(Some(plan)) => DatasourceAction::Reconcile(plan),
            Ok(None) => DatasourceAction::Missing,
            Err(e) => {
                log::warn!("Failed to read datasource {}: {e}", ds.datasource_id);
                DatasourceAction::Unreadable(e.to_string())
            }
        };
        changes.datasources.push(DatasourceChange {
            desired: ds.clone(),
            action,
        });
    }

    for token in &desired.tokens {
        let existing = state.tokens.get(&token.key).cloned();
        let action = match &existing {
            None => TokenAction::Create,
            Some(record)
                if record.seconds_to_live.filter(|t| *t > 0) != token.spec.seconds_to_live
                    || record.org_id != token.org.org_id =>
            {
                TokenAction::Replace
            }
            Some(record) => {
                let lookup = declarative::token::read(
                    remote,
                    &token.org,
                    token.spec.service_account_id,
                    record.id,
                );
                match lookup {
                    Ok(TokenLookup::Present(_)) => TokenAction::Keep,
                    Ok(TokenLookup::Absent) => TokenAction::Recreate,
                    Err(e) => {
                        log::warn!("Failed to read token '{}': {e}", token.spec.name);
                        TokenAction::Unreadable(e.to_string())
                    }
                }
            }
        };
        changes.tokens.push(TokenChange {
            desired: token.clone(),
            action,
            existing,
        });
    }

    for (key, record) in &state.datasources {
        if !desired.has_datasource(key) {
            changes.orphans.push(Orphan::Datasource {
                key: key.clone(),
                record: record.clone(),
            });
        }
    }
    for (key, record) in &state.tokens {
        if !desired.has_token(key) {
            changes.orphans.push(Orphan::Token {
                key: key.clone(),
                record: record.clone(),
            });
        }
    }

    Ok(changes)
}

/// Org and service account of a recorded token
pub fn token_target(record: &TokenState) -> Result<(OrgContext, i64)> {
    let (_, service_account_id) = split_org_resource_id(&record.service_account_id)?;
    Ok((
        OrgContext {
            org_id: record.org_id,
        },
        service_account_id,
    ))
}

fn step_symbol(step: &Step) -> colored::ColoredString {
    match step {
        Step::Enable | Step::Add(_) => step.symbol().green(),
        Step::Remove(_) | Step::Disable => step.symbol().red(),
    }
}

/// Display a change set in a user-friendly format
pub fn display_changes(changes: &ChangeSet) {
    let unreadable = changes.unreadable_count();
    if changes.is_empty() && unreadable == 0 {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Permission Changes".bold()
    );
    println!("│");

    if !changes.datasources.is_empty() {
        println!("│ {}", "Data sources".bold());
        for change in &changes.datasources {
            let id = change.desired.datasource_id;
            match &change.action {
                DatasourceAction::Missing => {
                    println!("│   {} datasource {:<20} {}", "✗".red(), id, "(not found)".red());
                }
                DatasourceAction::Unreadable(reason) => {
                    println!("│   {} datasource {:<20} {}", "✗".red(), id, "(could not read)".red());
                    println!("│       {}", reason.dimmed());
                }
                DatasourceAction::Reconcile(plan) if plan.is_empty() => {
                    println!(
                        "│   {} datasource {:<20} {}",
                        "○".dimmed(),
                        id,
                        format!("({} grants, no change)", plan.kept.len()).dimmed()
                    );
                }
                DatasourceAction::Reconcile(plan) => {
                    println!("│   {} datasource {}", "~".yellow(), id);
                    for step in plan.steps() {
                        println!("│       {} {}", step_symbol(&step), step);
                    }
                }
            }
        }
        println!("│");
    }

    if !changes.tokens.is_empty() {
        println!("│ {}", "Service-account tokens".bold());
        for change in &changes.tokens {
            println!(
                "│   {} {:<30} {}",
                change.action.symbol(),
                change.desired.key,
                change.action.describe().dimmed()
            );
            if let TokenAction::Unreadable(reason) = &change.action {
                println!("│       {}", reason.dimmed());
            }
        }
        println!("│");
    }

    if !changes.orphans.is_empty() {
        println!("│ {}", "No longer configured".bold());
        for orphan in &changes.orphans {
            println!(
                "│   {} {:<30} {}",
                "-".red(),
                orphan.label(),
                "(will remove)".dimmed()
            );
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} resources to change",
        changes.change_count().to_string().bold()
    );
    if unreadable > 0 {
        println!(
            "│          {} resources could not be read",
            unreadable.to_string().red().bold()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}
