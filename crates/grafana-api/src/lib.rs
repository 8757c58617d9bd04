//! # grafana-api
//!
//! Blocking client for the Grafana HTTP API endpoints the `declarative`
//! crate reconciles against:
//!
//! - data-source permissions (`/api/datasources/{id}/permissions`)
//! - service-account tokens (`/api/serviceaccounts/{id}/tokens`)
//!
//! HTTP 404 responses map to `declarative::Error::NotFound`; every other
//! failure is returned as a transient `declarative::Error::Http`. Nothing is
//! retried.

pub mod client;
mod wire;

pub use client::{DEFAULT_TIMEOUT, GrafanaClient};
