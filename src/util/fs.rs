use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub fn ensure_dir(path: &Path, mode: u32) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("create directory {}", path.display()))?;
    }
    set_permissions(path, mode)
}

pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, perm)
            .with_context(|| format!("set permissions {:o} on {}", mode, path.display()))?;
    }
    Ok(())
}

/// Where a write to `path` must land. Symlinks are followed, including a
/// dangling one, so the link itself is never replaced.
fn write_target(path: &Path) -> io::Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(real) => Ok(real),
        Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::read_link(path) {
            Ok(dest) => Ok(path.parent().map(|p| p.join(&dest)).unwrap_or(dest)),
            Err(_) => Ok(path.to_path_buf()),
        },
        Err(e) => Err(e),
    }
}

/// Replace the file behind `path` with `contents` via a temp file next to it.
///
/// An existing file keeps its permission bits and owner; a new file gets `mode`.
/// Readers see either the old or the new content, never a mix.
pub fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let target = write_target(path)?;
    let existing = fs::metadata(&target).ok();
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new().prefix(".tmp-").tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        // chown first: it may clear setuid/setgid bits set afterwards.
        if let Some(meta) = &existing {
            let created = tmp.as_file().metadata()?;
            if (meta.uid(), meta.gid()) != (created.uid(), created.gid()) {
                std::os::unix::fs::fchown(tmp.as_file(), Some(meta.uid()), Some(meta.gid()))?;
            }
        }
        let mode = existing
            .as_ref()
            .map(|meta| meta.permissions().mode() & 0o7777)
            .unwrap_or(mode);
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = (mode, existing);

    tmp.persist(&target).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        atomic_write(&path, b"first\n", 0o640).unwrap();
        atomic_write(&path, b"second\n", 0o640).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        // no temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_keeps_existing_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        atomic_write(&path, b"new", 0o644).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_goes_through_symlink() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real.json");
        let link = dir.path().join("config.json");
        fs::write(&real, "{\n#vmess\n}\n").unwrap();
        std::os::unix::fs::symlink("real.json", &link).unwrap();

        atomic_write(&link, b"updated\n", 0o644).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "updated\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_through_dangling_symlink_creates_target() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("config.json");
        std::os::unix::fs::symlink("missing.json", &link).unwrap();

        atomic_write(&link, b"fresh", 0o644).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(dir.path().join("missing.json")).unwrap(), "fresh");
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_keeps_owner() {
        use std::os::unix::fs::MetadataExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "old").unwrap();
        // Only root can hand the file to another owner; otherwise the
        // current owner must simply survive the rewrite.
        if nix::unistd::geteuid().is_root() {
            std::os::unix::fs::chown(&path, Some(65534), Some(65534)).unwrap();
        }
        let before = fs::metadata(&path).unwrap();

        atomic_write(&path, b"new", 0o644).unwrap();

        let after = fs::metadata(&path).unwrap();
        assert_eq!((after.uid(), after.gid()), (before.uid(), before.gid()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_ensure_dir_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        ensure_dir(&nested, 0o755).unwrap();
        assert!(nested.is_dir());
    }
}
