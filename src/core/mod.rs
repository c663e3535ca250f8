//! Core business logic modules.

pub mod account_doc;
pub mod account_store;
pub mod audit_log;
pub mod file_lock;
pub mod paths;
pub mod profile_store;
pub mod settings;
