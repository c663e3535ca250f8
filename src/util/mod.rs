//! Utility modules for filesystem, privilege and journald operations.

pub mod fs;
pub mod journald;
pub mod privilege;
