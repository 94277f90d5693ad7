//! The peer allowlist: persisted trust bundles plus the authorized_keys
//! mirror.
//!
//! The allowlist file is rewritten atomically (tempfile then rename) and
//! writers are serialized by an in-process mutex, so a crash mid-write
//! never leaves a torn file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dirtproto::api::osman::PeerTrustBundle;
use dirtproto::error::ApiError;
use tracing::info;

pub const ALLOWLIST_FILE: &str = "peer-allowlist.json";

pub struct PeerTrustStore {
    allowlist_path: PathBuf,
    authorized_keys_path: PathBuf,
    write_lock: Mutex<()>,
}

impl PeerTrustStore {
    pub fn new(work_dir: &Path, authorized_keys_path: PathBuf) -> Self {
        Self {
            allowlist_path: work_dir.join(ALLOWLIST_FILE),
            authorized_keys_path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn allowlist_path(&self) -> &Path {
        &self.allowlist_path
    }

    /// Load the allowlist. A missing file is an error the callers map to
    /// their own messages; RemoteCliRun requires an existing allowlist.
    pub fn load(&self) -> Result<Vec<PeerTrustBundle>, ApiError> {
        let body = fs::read_to_string(&self.allowlist_path)
            .map_err(|_| ApiError::new("Peer allowlist not found"))?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::new(format!("Corrupt peer allowlist: {e}")))
    }

    pub fn load_or_empty(&self) -> Vec<PeerTrustBundle> {
        self.load().unwrap_or_default()
    }

    pub fn find(&self, host: &str) -> Result<PeerTrustBundle, ApiError> {
        self.load()?
            .into_iter()
            .find(|bundle| bundle.host == host)
            .ok_or_else(|| ApiError::new(format!("Peer '{host}' is not in the allowlist")))
    }

    /// Append a bundle, replacing any existing entry for the same host,
    /// and mirror its client key into authorized_keys.
    pub fn trust(&self, bundle: PeerTrustBundle) -> Result<(), ApiError> {
        let _guard = self.write_lock.lock().expect("allowlist lock");
        let mut entries = self.load_or_empty();
        entries.retain(|entry| entry.host != bundle.host);
        entries.push(bundle.clone());
        self.write_atomic(&entries)?;

        if !bundle.client_pubkey.trim().is_empty() {
            self.add_authorized_key(&bundle.client_pubkey)?;
        }
        info!(target: "osman", host = %bundle.host, "Peer trusted");
        Ok(())
    }

    /// Remove a host's entry and strip its authorized_keys line.
    pub fn untrust(&self, host: &str) -> Result<(), ApiError> {
        let _guard = self.write_lock.lock().expect("allowlist lock");
        let mut entries = self.load_or_empty();
        let removed: Vec<PeerTrustBundle> =
            entries.iter().filter(|e| e.host == host).cloned().collect();
        entries.retain(|entry| entry.host != host);
        self.write_atomic(&entries)?;

        for entry in removed {
            if !entry.client_pubkey.trim().is_empty() {
                self.remove_authorized_key(&entry.client_pubkey)?;
            }
        }
        info!(target: "osman", host, "Peer untrusted");
        Ok(())
    }

    fn write_atomic(&self, entries: &[PeerTrustBundle]) -> Result<(), ApiError> {
        let body = serde_json::to_string_pretty(entries)
            .map_err(|e| ApiError::new(format!("Serialize allowlist: {e}")))?;
        let tmp_path = self.allowlist_path.with_extension("json.tmp");
        fs::write(&tmp_path, body)
            .map_err(|e| ApiError::new(format!("Write allowlist: {e}")))?;
        fs::rename(&tmp_path, &self.allowlist_path)
            .map_err(|e| ApiError::new(format!("Replace allowlist: {e}")))?;
        Ok(())
    }

    fn add_authorized_key(&self, pubkey: &str) -> Result<(), ApiError> {
        let pubkey = pubkey.trim();
        let existing = fs::read_to_string(&self.authorized_keys_path).unwrap_or_default();
        if existing.lines().any(|line| line.trim() == pubkey) {
            return Ok(());
        }
        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(pubkey);
        updated.push('\n');
        fs::write(&self.authorized_keys_path, updated)
            .map_err(|e| ApiError::new(format!("Update authorized_keys: {e}")))
    }

    fn remove_authorized_key(&self, pubkey: &str) -> Result<(), ApiError> {
        let pubkey = pubkey.trim();
        let Ok(existing) = fs::read_to_string(&self.authorized_keys_path) else {
            return Ok(());
        };
        let kept: Vec<&str> = existing
            .lines()
            .filter(|line| line.trim() != pubkey)
            .collect();
        let mut updated = kept.join("\n");
        if !updated.is_empty() {
            updated.push('\n');
        }
        fs::write(&self.authorized_keys_path, updated)
            .map_err(|e| ApiError::new(format!("Update authorized_keys: {e}")))
    }
}
