//! Policy configuration for admin operations.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySection {
    /// Refuse mutating commands unless running as root.
    #[serde(default = "default_true")]
    pub require_root: bool,

    /// Forward audit entries to journald.
    #[serde(default)]
    pub journald_audit: bool,

    /// Keep a `.bak` copy of the daemon config before each write.
    #[serde(default)]
    pub backup_on_write: bool,

    /// Hold an exclusive lock on the daemon config during read-modify-write.
    #[serde(default = "default_true")]
    pub lock_config: bool,

    /// Minimum length for generated trojan passwords.
    #[serde(default)]
    pub min_generated_length: Option<usize>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            require_root: true,
            journald_audit: false,
            backup_on_write: false,
            lock_config: true,
            min_generated_length: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_policy_uses_defaults() {
        let policy: PolicySection = toml::from_str("").unwrap();
        assert!(policy.require_root);
        assert!(policy.lock_config);
        assert!(!policy.backup_on_write);
        assert_eq!(policy.min_generated_length, None);
    }
}
