//! Centralized constants for paths, permissions, and limits.

/// Default admin state directory (database, audit log, admin.toml).
pub const DEFAULT_ADMIN_ROOT: &str = "/opt/xray-admin";

/// Default location of the proxy daemon config.
pub const DEFAULT_XRAY_CONFIG: &str = "/etc/xray/config.json";

/// Environment variable overriding the state directory.
pub const ENV_ADMIN_ROOT: &str = "XRAY_ADMIN_ROOT";

/// Environment variable overriding the daemon config path.
pub const ENV_XRAY_CONFIG: &str = "XRAY_CONFIG_PATH";

/// Permission mode for the state directory.
pub const ADMIN_DIR_MODE: u32 = 0o750;

/// Permission mode for the data directory holding the database.
pub const DATA_DIR_MODE: u32 = 0o700;

/// Permission mode for admin.toml.
pub const ADMIN_TOML_MODE: u32 = 0o600;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;

/// Mode for a daemon config created from scratch; existing files keep theirs.
pub const XRAY_CONFIG_MODE: u32 = 0o644;

/// Suffix of the copy kept when `backup_on_write` is enabled.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Default length of generated trojan passwords.
pub const DEFAULT_GENERATED_LENGTH: usize = 16;

/// Tag used when forwarding audit lines to journald.
pub const JOURNALD_TAG: &str = "xray-admin";
