//! Loading and saving `admin.toml`.

use crate::constants;
use crate::models::admin_config::AdminFile;
use crate::util::fs::atomic_write;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn load(path: &Path) -> Result<AdminFile> {
    if !path.exists() {
        return Ok(AdminFile::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("read admin config {}", path.display()))?;
    let admin: AdminFile = toml::from_str(&content)
        .with_context(|| format!("parse admin config {}", path.display()))?;
    Ok(admin)
}

pub fn save(path: &Path, admin: &AdminFile) -> Result<()> {
    let content = toml::to_string_pretty(admin).context("serialize admin config")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    atomic_write(path, content.as_bytes(), constants::ADMIN_TOML_MODE)
        .with_context(|| format!("persist admin config {}", path.display()))?;
    Ok(())
}

/// Fill in values `init` should pin on first run.
pub fn ensure_defaults(admin: &mut AdminFile, xray_config: &Path) {
    if admin.xray.config_path.is_none() {
        admin.xray.config_path = Some(xray_config.display().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let admin = load(&dir.path().join("admin.toml")).unwrap();
        assert!(admin.xray.config_path.is_none());
        assert!(admin.policy.require_root);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("admin.toml");
        let mut admin = AdminFile::default();
        ensure_defaults(&mut admin, Path::new("/etc/xray/config.json"));
        admin.policy.backup_on_write = true;
        save(&path, &admin).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.xray.config_path.as_deref(), Some("/etc/xray/config.json"));
        assert!(loaded.policy.backup_on_write);
    }

    #[test]
    fn test_parse_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("admin.toml");
        fs::write(&path, "[policy]\nrequire_root = false\n").unwrap();
        let admin = load(&path).unwrap();
        assert!(!admin.policy.require_root);
        assert!(admin.policy.lock_config);
    }
}
