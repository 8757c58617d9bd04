//! Reconciler - converges a data source's permissions to the desired grants
//!
//! A run fetches the current state, plans the ordered steps and applies
//! them one at a time:
//!
//! 1. `Enable` if the subsystem is disabled and the intent enables it
//! 2. `Remove` every current grant that is not desired
//! 3. `Add` every desired grant that is missing
//! 4. `Disable` if the subsystem is enabled and the intent disables it
//!
//! Grant mutations need the subsystem enabled, so enabling comes first and
//! disabling comes last. There is no rollback: a failed step leaves the
//! steps before it applied, and re-running converges the rest. On the
//! deletion path a grant that is already gone is skipped.

use crate::diff::{self, GrantDiff};
use crate::error::{Error, Result};
use crate::grant::Grant;
use crate::remote::{self, Fetched, OrgContext, PermissionRemote, PermissionState};
use std::fmt;

/// What a run should do with the permission subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
    /// Enable the subsystem if it is disabled.
    pub enable: bool,
    /// Disable the subsystem if it is enabled.
    pub disable: bool,
}

impl Intent {
    /// Create or update: the subsystem must be on.
    pub const APPLY: Self = Self {
        enable: true,
        disable: false,
    };

    /// Delete: grants go away and the subsystem is switched off.
    pub const REMOVE: Self = Self {
        enable: false,
        disable: true,
    };

    /// Whether this run is on the deletion path.
    pub fn is_removal(&self) -> bool {
        self.disable
    }
}

/// A single remote mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Enable,
    Remove(Grant),
    Add(Grant),
    Disable,
}

impl Step {
    /// Symbol used when printing plans
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Enable => "+",
            Self::Remove(_) => "-",
            Self::Add(_) => "+",
            Self::Disable => "-",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => f.write_str("enable permissions"),
            Self::Remove(grant) => write!(f, "remove {grant}"),
            Self::Add(grant) => write!(f, "add {grant}"),
            Self::Disable => f.write_str("disable permissions"),
        }
    }
}

/// Ordered mutations for one data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub datasource_id: i64,
    pub intent: Intent,
    /// Enabled flag before the run.
    pub was_enabled: bool,
    pub enable: bool,
    pub diff: GrantDiff,
    pub disable: bool,
    /// Current grants that stay untouched.
    pub kept: Vec<Grant>,
}

impl Plan {
    /// Plan the transition from `state` to `desired` under `intent`.
    pub fn new(state: &PermissionState, desired: &[Grant], intent: Intent) -> Self {
        let diff = diff::diff(desired, &state.grants);
        let kept = state
            .grants
            .iter()
            .filter(|g| !diff.remove.iter().any(|r| r.id == g.id && *r == **g))
            .cloned()
            .collect();

        Self {
            datasource_id: state.datasource_id,
            intent,
            was_enabled: state.enabled,
            enable: !state.enabled && intent.enable,
            diff,
            disable: state.enabled && intent.disable,
            kept,
        }
    }

    /// Steps in the order they must be applied.
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::with_capacity(self.diff.total() + 2);
        if self.enable {
            steps.push(Step::Enable);
        }
        steps.extend(self.diff.remove.iter().cloned().map(Step::Remove));
        steps.extend(self.diff.add.iter().cloned().map(Step::Add));
        if self.disable {
            steps.push(Step::Disable);
        }
        steps
    }

    /// Check if the run would issue no mutation
    pub fn is_empty(&self) -> bool {
        !self.enable && !self.disable && self.diff.is_empty()
    }

    /// Enabled flag after the plan has been applied.
    pub fn final_enabled(&self) -> bool {
        (self.was_enabled || self.enable) && !self.disable
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub plan: Plan,
    /// Grants added during the run, with the ids the remote assigned.
    pub added: Vec<Grant>,
    /// Number of steps that were applied.
    pub steps_applied: usize,
}

impl Report {
    /// Enabled flag after the run.
    pub fn enabled(&self) -> bool {
        self.plan.final_enabled()
    }

    /// Grant collection the remote holds after the run.
    pub fn grants(&self) -> Vec<Grant> {
        let mut grants = self.plan.kept.clone();
        grants.extend(self.added.iter().cloned());
        grants
    }

    /// Whether the run changed anything remotely.
    pub fn changed(&self) -> bool {
        self.steps_applied > 0
    }
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(Report),
    /// The data source or its permission subsystem is already gone. Only
    /// produced on the deletion path.
    Gone,
}

/// Observer for step progress.
///
/// Implement this trait to log or display steps as they are applied.
pub trait StepObserver {
    /// Called before a step is sent to the remote
    fn on_step_start(&mut self, datasource_id: i64, step: &Step);

    /// Called after the remote accepted a step
    fn on_step_complete(&mut self, datasource_id: i64, step: &Step);
}

/// No-op observer
pub struct NoProgress;

impl StepObserver for NoProgress {
    fn on_step_start(&mut self, _datasource_id: i64, _step: &Step) {}
    fn on_step_complete(&mut self, _datasource_id: i64, _step: &Step) {}
}

/// Compute the plan without mutating anything.
///
/// Returns `None` if the data source does not exist.
pub fn plan<R>(
    remote: &R,
    org: &OrgContext,
    datasource_id: i64,
    desired: &[Grant],
    intent: Intent,
) -> Result<Option<Plan>>
where
    R: PermissionRemote + ?Sized,
{
    let plan = remote::fetch(remote, org, datasource_id)?
        .into_state()
        .map(|state| Plan::new(&state, desired, intent));
    Ok(plan)
}

/// Fetch, plan and apply in one run.
///
/// The first failing step aborts the run and its error is returned as-is.
/// On the deletion path a `NotFound` from any call means there is nothing
/// left to delete and yields [`Outcome::Gone`].
pub fn reconcile<R, O>(
    remote: &R,
    org: &OrgContext,
    datasource_id: i64,
    desired: &[Grant],
    intent: Intent,
    observer: &mut O,
) -> Result<Outcome>
where
    R: PermissionRemote + ?Sized,
    O: StepObserver + ?Sized,
{
    let state = match remote::fetch(remote, org, datasource_id)? {
        Fetched::Found(state) => state,
        Fetched::NotFound if intent.is_removal() => return Ok(Outcome::Gone),
        Fetched::NotFound => {
            return Err(Error::not_found(format!("datasource {datasource_id}")));
        }
    };

    let plan = Plan::new(&state, desired, intent);
    match execute(remote, org, plan, observer) {
        Ok(report) => Ok(Outcome::Applied(report)),
        Err(e) if e.is_not_found() && intent.is_removal() => Ok(Outcome::Gone),
        Err(e) => Err(e),
    }
}

/// Apply a plan's steps in order.
///
/// Under [`Intent::REMOVE`] a `NotFound` from removing a grant means the
/// grant is already gone; the run continues with the next step.
pub fn execute<R, O>(remote: &R, org: &OrgContext, plan: Plan, observer: &mut O) -> Result<Report>
where
    R: PermissionRemote + ?Sized,
    O: StepObserver + ?Sized,
{
    let id = plan.datasource_id;
    let mut added = Vec::with_capacity(plan.diff.add.len());
    let mut steps_applied = 0;

    for step in plan.steps() {
        observer.on_step_start(id, &step);
        match &step {
            Step::Enable => remote.enable_permissions(org, id)?,
            Step::Remove(grant) => {
                let grant_id = grant.id.ok_or_else(|| {
                    Error::InvalidResponse(format!("grant {grant} on datasource {id} has no id"))
                })?;
                match remote.remove_grant(org, id, grant_id) {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() && plan.intent.is_removal() => continue,
                    Err(e) => return Err(e),
                }
            }
            Step::Add(grant) => {
                let new_id = remote.add_grant(org, id, grant)?;
                added.push(grant.clone().with_id(new_id));
            }
            Step::Disable => remote.disable_permissions(org, id)?,
        }
        observer.on_step_complete(id, &step);
        steps_applied += 1;
    }

    Ok(Report {
        plan,
        added,
        steps_applied,
    })
}
