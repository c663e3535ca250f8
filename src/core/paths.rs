//! Admin state path resolution.

use crate::constants;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AdminPaths {
    pub root: PathBuf,
    pub data: PathBuf,
    pub database: PathBuf,
    pub admin_toml: PathBuf,
    pub audit_log: PathBuf,
    pub audit_lock: PathBuf,
    pub config_lock: PathBuf,
}

impl AdminPaths {
    /// Resolve the state root from `--root` (which clap also fills from
    /// `XRAY_ADMIN_ROOT`) or the default.
    pub fn resolve(root_arg: Option<PathBuf>) -> Self {
        let root = root_arg
            .filter(|root| !root.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_ADMIN_ROOT));
        Self::from_root(root)
    }

    pub fn from_root(root: PathBuf) -> Self {
        let data = root.join("data");
        let database = data.join("app.db");
        let admin_toml = root.join("admin.toml");
        let audit_log = root.join("audit.log");
        let audit_lock = root.join("audit.lock");
        let config_lock = root.join("xray-config.lock");
        Self {
            root,
            data,
            database,
            admin_toml,
            audit_log,
            audit_lock,
            config_lock,
        }
    }
}

/// Pick the daemon config path: `--config` (or `XRAY_CONFIG_PATH`), then
/// admin.toml, then the default.
pub fn resolve_xray_config(arg: Option<PathBuf>, from_file: Option<&str>) -> PathBuf {
    if let Some(path) = arg.filter(|p| !p.as_os_str().is_empty()) {
        return path;
    }
    if let Some(path) = from_file.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    PathBuf::from(constants::DEFAULT_XRAY_CONFIG)
}

impl std::fmt::Display for AdminPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "xray-admin@{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_root() {
        let paths = AdminPaths::from_root(PathBuf::from("/test"));
        assert_eq!(paths.database, PathBuf::from("/test/data/app.db"));
        assert_eq!(paths.admin_toml, PathBuf::from("/test/admin.toml"));
        assert_eq!(paths.audit_log, PathBuf::from("/test/audit.log"));
        assert_eq!(paths.audit_lock, PathBuf::from("/test/audit.lock"));
        assert_eq!(paths.config_lock, PathBuf::from("/test/xray-config.lock"));
    }

    #[test]
    fn test_explicit_config_wins() {
        let path = resolve_xray_config(Some(PathBuf::from("/tmp/x.json")), Some("/etc/other.json"));
        assert_eq!(path, PathBuf::from("/tmp/x.json"));
    }

    #[test]
    fn test_config_falls_back_to_admin_toml_then_default() {
        let path = resolve_xray_config(None, Some("/etc/other.json"));
        assert_eq!(path, PathBuf::from("/etc/other.json"));
        let path = resolve_xray_config(Some(PathBuf::new()), Some(""));
        assert_eq!(path, PathBuf::from(constants::DEFAULT_XRAY_CONFIG));
    }

    #[test]
    fn test_resolve_uses_only_the_given_root() {
        let paths = AdminPaths::resolve(Some(PathBuf::from("/srv/admin")));
        assert_eq!(paths.root, PathBuf::from("/srv/admin"));
        let paths = AdminPaths::resolve(Some(PathBuf::new()));
        assert_eq!(paths.root, PathBuf::from(constants::DEFAULT_ADMIN_ROOT));
    }
}
