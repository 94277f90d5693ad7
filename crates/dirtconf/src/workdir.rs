//! Service work directories and key-file permission enforcement.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// A service's persistent state directory.
///
/// The OS manager keeps `peer-allowlist.json` and its SSH client keypair
/// here; the server keeps the genome repository and user settings.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Open (creating if needed) a work directory rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create work dir {}", root.display()))?;
        Ok(Self { root })
    }

    /// Default location: `$DIRTSIM_DATA_DIR` or `~/.local/share/dirtsim/<name>`.
    pub fn default_for(service: &str) -> Result<Self> {
        let base = std::env::var_os("DIRTSIM_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME")
                    .map(|home| PathBuf::from(home).join(".local/share/dirtsim"))
            })
            .unwrap_or_else(|| PathBuf::from(".dirtsim"));
        Self::open(base.join(service))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Create a subdirectory under the work dir.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(dir)
    }
}

/// Enforce key-material permissions: 0600 on private files, 0644 on
/// public ones. No-op for missing files.
#[cfg(unix)]
pub fn ensure_key_permissions(private: &Path, public: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if private.exists() {
        fs::set_permissions(private, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("chmod 600 {}", private.display()))?;
    }
    if public.exists() {
        fs::set_permissions(public, fs::Permissions::from_mode(0o644))
            .with_context(|| format!("chmod 644 {}", public.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_key_permissions(_private: &Path, _public: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::open(dir.path().join("nested/osman")).unwrap();
        assert!(work.root().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn key_permissions_are_enforced() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("id_ecdsa");
        let public = dir.path().join("id_ecdsa.pub");
        fs::write(&private, "private").unwrap();
        fs::write(&public, "public").unwrap();

        ensure_key_permissions(&private, &public).unwrap();

        let private_mode = fs::metadata(&private).unwrap().permissions().mode() & 0o777;
        let public_mode = fs::metadata(&public).unwrap().permissions().mode() & 0o777;
        assert_eq!(private_mode, 0o600);
        assert_eq!(public_mode, 0o644);
    }

    #[test]
    fn missing_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        ensure_key_permissions(&dir.path().join("nope"), &dir.path().join("nope.pub")).unwrap();
    }
}
