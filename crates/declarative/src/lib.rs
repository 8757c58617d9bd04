//! # Declarative
//!
//! Declarative permission management for Grafana data sources.
//!
//! This crate computes and applies the smallest set of remote mutations that
//! make a data source's permission grants match a declared set, and manages
//! the create-once lifecycle of service-account tokens.
//!
//! ## Core Concepts
//!
//! - **Grant**: one permission binding a [`Subject`] to a [`Permission`] level
//! - **PermissionState**: a data source's enabled flag and current grants
//! - **GrantDiff**: grants to add and remove, by structural equality
//! - **Plan**: the ordered steps (enable → remove → add → disable)
//! - **Token**: a secret returned once at creation and never again
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     Grant, GrantItem, Intent, MockRemote, NoProgress, OrgContext, Outcome, grants_from_items,
//! };
//!
//! let remote = MockRemote::new();
//! remote.add_datasource(4, false, vec![]);
//!
//! let desired = grants_from_items(&[GrantItem {
//!     team_id: Some(5),
//!     permission: "Query".into(),
//!     ..Default::default()
//! }])?;
//!
//! let outcome = declarative::reconcile(
//!     &remote,
//!     &OrgContext::default_org(),
//!     4,
//!     &desired,
//!     Intent::APPLY,
//!     &mut NoProgress,
//! )?;
//! assert!(matches!(outcome, Outcome::Applied(ref r) if r.enabled()));
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Remote Traits
//!
//! The crate uses traits for the remote API:
//!
//! - [`PermissionRemote`]: data-source permission endpoints
//! - [`TokenRemote`]: service-account token endpoints
//! - [`StepObserver`]: receives step progress
//!
//! This allows the crate to be used without a hard dependency on an HTTP
//! client. Every remote call takes an explicit [`OrgContext`].

pub mod diff;
pub mod error;
pub mod grant;
pub mod mock;
pub mod reconcile;
pub mod remote;
pub mod token;

// Re-export main types at crate root
pub use diff::{GrantDiff, dedup, diff, same_grants};
pub use error::{Error, ErrorCategory, Result};
pub use grant::{BUILT_IN_ROLES, Grant, GrantItem, Permission, Subject, grants_from_items};
pub use mock::{Call, MockRemote};
pub use reconcile::{
    Intent, NoProgress, Outcome, Plan, Report, Step, StepObserver, execute, plan, reconcile,
};
pub use remote::{Fetched, OrgContext, PermissionRemote, PermissionState, TokenRemote, fetch};
pub use token::{
    CreatedToken, Deletion, Secret, TokenLookup, TokenRecord, TokenSpec, normalize_expiration,
};
