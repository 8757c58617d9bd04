//! Execution engine for grantsync
//!
//! The engine orchestrates:
//! 1. Planning - Resolve the config into desired resources
//! 2. Diffing - Compare desired resources with the remote and local records
//! 3. Executing - Apply changes and record what the remote reports back

pub mod differ;
pub mod executor;
pub mod planner;

pub use differ::{compute_changes, display_changes};
pub use executor::{ExecuteOptions, ExecuteSummary, apply, destroy, refresh};
pub use planner::DesiredState;
