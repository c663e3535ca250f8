//! Xray account and hosting-profile administration.
//!
//! Client accounts live as marker-delimited record pairs inside the Xray
//! daemon's JSON config; hosting profiles live in a SQLite database.
//!
//! ## Modules
//! - `cli` — Command-line handlers
//! - `core` — Record editing, stores, audit trail, paths
//! - `error` — Typed errors for the account and profile stores
//! - `models` — Data structures
//! - `util` — Filesystem, privilege and journald helpers

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;
