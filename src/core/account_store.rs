//! Daemon config persistence for account records.
//!
//! Each call is a full read -> in-memory edit -> full write cycle. Writes go
//! through a temp file and rename, so a crash leaves either the old or the
//! new config. Without `lock_path`, concurrent invocations on the same file
//! are not serialized and the last writer wins.

use crate::constants;
use crate::core::account_doc::{self, DocumentReport, Edit};
use crate::core::file_lock::FileLock;
use crate::error::AccountError;
use crate::models::account::AccountEntry;
use crate::models::kind::CredentialKind;
use crate::util::fs::atomic_write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AccountStore {
    config_path: PathBuf,
    lock_path: Option<PathBuf>,
    backup: bool,
}

impl AccountStore {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            lock_path: None,
            backup: false,
        }
    }

    /// Hold an exclusive lock on `lock_path` around every mutation.
    pub fn with_lock(mut self, lock_path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(lock_path.into());
        self
    }

    /// Copy the previous config to `<config>.bak` before each write.
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.config_path.clone().into_os_string();
        name.push(constants::BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    /// Split the config on `\n` only. A `\r` stays on its line and a final
    /// newline shows up as a trailing empty element, so [`save`](Self::save)
    /// joining with `\n` gives back the input bytes for untouched lines.
    pub fn load(&self) -> Result<Vec<String>, AccountError> {
        if !self.config_path.is_file() {
            return Err(AccountError::ConfigMissing(self.config_path.clone()));
        }
        let content = fs::read_to_string(&self.config_path).map_err(|source| AccountError::Io {
            path: self.config_path.clone(),
            source,
        })?;
        let lines: Vec<String> = content.split('\n').map(str::to_string).collect();
        debug!(path = %self.config_path.display(), lines = lines.len(), "loaded config");
        Ok(lines)
    }

    pub fn save(&self, lines: &[String]) -> Result<(), AccountError> {
        let io_err = |source: std::io::Error| AccountError::Io {
            path: self.config_path.clone(),
            source,
        };
        if self.backup && self.config_path.is_file() {
            let backup = self.backup_path();
            fs::copy(&self.config_path, &backup).map_err(|source| AccountError::Io {
                path: backup.clone(),
                source,
            })?;
        }
        let content = lines.join("\n");
        atomic_write(&self.config_path, content.as_bytes(), constants::XRAY_CONFIG_MODE)
            .map_err(io_err)?;
        info!(path = %self.config_path.display(), lines = lines.len(), "wrote config");
        Ok(())
    }

    fn mutate<F>(&self, dry_run: bool, op: F) -> Result<Edit, AccountError>
    where
        F: FnOnce(&[String]) -> Result<Edit, AccountError>,
    {
        let _lock = match &self.lock_path {
            Some(path) if !dry_run => Some(FileLock::exclusive(path).map_err(|source| {
                AccountError::Io {
                    path: path.clone(),
                    source,
                }
            })?),
            _ => None,
        };
        let lines = self.load()?;
        let edit = op(&lines)?;
        if !dry_run {
            self.save(&edit.lines)?;
        }
        Ok(edit)
    }

    pub fn add(
        &self,
        kind: CredentialKind,
        name: &str,
        identifier: &str,
        expiry: &str,
        dry_run: bool,
    ) -> Result<Edit, AccountError> {
        account_doc::validate_token("name", name)?;
        account_doc::validate_token("identifier", identifier)?;
        account_doc::validate_token("expiry", expiry)?;
        self.mutate(dry_run, |lines| {
            account_doc::add(lines, kind, name, identifier, expiry)
        })
    }

    pub fn delete(&self, kind: CredentialKind, name: &str, dry_run: bool) -> Result<Edit, AccountError> {
        account_doc::validate_lookup(name)?;
        self.mutate(dry_run, |lines| account_doc::delete(lines, kind, name))
    }

    pub fn renew(
        &self,
        kind: CredentialKind,
        name: &str,
        new_expiry: &str,
        dry_run: bool,
    ) -> Result<Edit, AccountError> {
        account_doc::validate_lookup(name)?;
        account_doc::validate_token("expiry", new_expiry)?;
        self.mutate(dry_run, |lines| {
            account_doc::renew(lines, kind, name, new_expiry)
        })
    }

    /// Renew with an expiry derived from the stored record. `next_expiry`
    /// runs under the config lock, so the record it sees is the one rewritten.
    pub fn renew_with<F>(
        &self,
        kind: CredentialKind,
        name: &str,
        dry_run: bool,
        next_expiry: F,
    ) -> Result<Edit, AccountError>
    where
        F: FnOnce(&AccountEntry) -> Result<String, AccountError>,
    {
        account_doc::validate_lookup(name)?;
        self.mutate(dry_run, |lines| {
            let (_, current) =
                account_doc::find(lines, kind, name).ok_or_else(|| AccountError::NotFound {
                    kind,
                    name: name.to_string(),
                })?;
            let new_expiry = next_expiry(&current)?;
            account_doc::renew(lines, kind, name, &new_expiry)
        })
    }

    pub fn list(&self, kind: CredentialKind) -> Result<Vec<AccountEntry>, AccountError> {
        let lines = self.load()?;
        Ok(account_doc::list(&lines, kind))
    }

    pub fn find(&self, kind: CredentialKind, name: &str) -> Result<Option<AccountEntry>, AccountError> {
        account_doc::validate_lookup(name)?;
        let lines = self.load()?;
        Ok(account_doc::find(&lines, kind, name).map(|(_, entry)| entry))
    }

    pub fn exists(&self, kind: CredentialKind, name: &str) -> Result<bool, AccountError> {
        account_doc::validate_lookup(name)?;
        let lines = self.load()?;
        Ok(account_doc::exists(&lines, kind, name))
    }

    pub fn check(&self) -> Result<DocumentReport, AccountError> {
        let lines = self.load()?;
        Ok(account_doc::check(&lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = "{\n  \"clients\": [\n#vmess\n#vless\n#trojanws\n  ]\n}\n";

    fn setup() -> (TempDir, AccountStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, CONFIG).unwrap();
        let store = AccountStore::new(path).with_lock(dir.path().join("config.lock"));
        (dir, store)
    }

    #[test]
    fn test_missing_config_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = AccountStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.list(CredentialKind::Vmess), Err(AccountError::ConfigMissing(_))));
        assert!(matches!(
            store.add(CredentialKind::Vmess, "a", "u", "2025-01-01", false),
            Err(AccountError::ConfigMissing(_))
        ));
    }

    #[test]
    fn test_precondition_checked_before_io() {
        let dir = TempDir::new().unwrap();
        let store = AccountStore::new(dir.path().join("absent.json"));
        assert!(matches!(
            store.delete(CredentialKind::Vless, "", false),
            Err(AccountError::MissingField("name"))
        ));
    }

    #[test]
    fn test_dry_run_leaves_file_untouched() {
        let (_dir, store) = setup();
        let edit = store
            .add(CredentialKind::Trojan, "zed", "pw", "2025-01-01", true)
            .unwrap();
        assert_eq!(edit.changes.len(), 1);
        assert_eq!(fs::read_to_string(store.config_path()).unwrap(), CONFIG);
    }

    #[test]
    fn test_save_writes_trailing_newline() {
        let (_dir, store) = setup();
        store.add(CredentialKind::Vless, "amy", "u-1", "2025-01-01", false).unwrap();
        let content = fs::read_to_string(store.config_path()).unwrap();
        assert!(content.ends_with("}\n"));
        assert!(content.contains("#vless\n#& amy 2025-01-01\n},{\"id\": \"u-1\",\"email\": \"amy\"\n#trojanws"));
    }

    #[test]
    fn test_crlf_config_round_trips_byte_for_byte() {
        let (_dir, store) = setup();
        let original = "{\r\n  \"log\": 1,\r\n#vmess\r\n}\r\n";
        fs::write(store.config_path(), original).unwrap();

        store.add(CredentialKind::Vmess, "a", "u-a", "2025-01-01", false).unwrap();
        let added = fs::read_to_string(store.config_path()).unwrap();
        assert!(added.contains("#vmess\r\n### a 2025-01-01\r\n},{\"id\": \"u-a\",\"alterId\": 0,\"email\": \"a\"\r\n}"));

        store.delete(CredentialKind::Vmess, "a", false).unwrap();
        assert_eq!(fs::read_to_string(store.config_path()).unwrap(), original);
    }

    #[test]
    fn test_missing_final_newline_is_kept() {
        let (_dir, store) = setup();
        let original = "{\n#trojanws\n}";
        fs::write(store.config_path(), original).unwrap();
        store.add(CredentialKind::Trojan, "b", "pw", "2025-01-01", false).unwrap();
        let written = fs::read_to_string(store.config_path()).unwrap();
        assert!(written.ends_with("\n}"));
        store.delete(CredentialKind::Trojan, "b", false).unwrap();
        assert_eq!(fs::read_to_string(store.config_path()).unwrap(), original);
    }

    #[test]
    fn test_renew_with_derives_from_stored_expiry() {
        let (_dir, store) = setup();
        store.add(CredentialKind::Vless, "dee", "u-d", "2025-01-01", false).unwrap();
        store
            .renew_with(CredentialKind::Vless, "DEE", false, |current| {
                assert_eq!(current.expiry, "2025-01-01");
                Ok("2025-02-01".to_string())
            })
            .unwrap();
        let found = store.find(CredentialKind::Vless, "dee").unwrap().unwrap();
        assert_eq!(found.expiry, "2025-02-01");

        let err = store
            .renew_with(CredentialKind::Vless, "nobody", false, |_| Ok("2025-02-01".into()))
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound { .. }));
    }

    #[test]
    fn test_renew_with_rejects_bad_derived_expiry() {
        let (_dir, store) = setup();
        store.add(CredentialKind::Vmess, "eli", "u-e", "2025-01-01", false).unwrap();
        let before = fs::read(store.config_path()).unwrap();
        let err = store
            .renew_with(CredentialKind::Vmess, "eli", false, |_| Ok("not a token".into()))
            .unwrap_err();
        assert!(matches!(err, AccountError::InvalidField { field: "expiry", .. }));
        assert_eq!(fs::read(store.config_path()).unwrap(), before);
    }

    #[test]
    fn test_backup_holds_previous_content() {
        let (_dir, store) = setup();
        let store = store.with_backup(true);
        store.add(CredentialKind::Vmess, "ben", "u-2", "2025-01-01", false).unwrap();
        assert_eq!(fs::read_to_string(store.backup_path()).unwrap(), CONFIG);
    }

    #[test]
    fn test_find_and_exists() {
        let (_dir, store) = setup();
        store.add(CredentialKind::Vmess, "Cat", "u-3", "2025-05-05", false).unwrap();
        assert!(store.exists(CredentialKind::Vmess, "CAT").unwrap());
        assert!(!store.exists(CredentialKind::Trojan, "cat").unwrap());
        let found = store.find(CredentialKind::Vmess, "cat").unwrap().unwrap();
        assert_eq!(found.expiry, "2025-05-05");
    }
}
