//! Root checks for commands that touch the daemon config or database.

use anyhow::{bail, Result};

/// Whether the effective uid is 0.
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

pub fn require_root(command: &str) -> Result<()> {
    if !is_root() {
        bail!(
            "'{}' modifies the daemon config or profile database and requires root. Run with sudo, or set [policy] require_root = false in admin.toml.",
            command
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_root_matches_euid() {
        assert_eq!(require_root("account add").is_ok(), is_root());
    }
}
