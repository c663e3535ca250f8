//! Data structures shared by the core and CLI layers.

pub mod account;
pub mod admin_config;
pub mod kind;
pub mod policy;
pub mod profile;
