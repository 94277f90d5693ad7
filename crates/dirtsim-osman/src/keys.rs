//! SSH client key material and the local trust bundle.

use std::path::{Path, PathBuf};
use std::process::Command;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use dirtproto::api::osman::PeerTrustBundle;
use dirtproto::error::ApiError;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub const CLIENT_KEY_FILE: &str = "id_ecdsa";

/// Default host key the fingerprint is read from; matches the host key
/// algorithm the executor pins.
pub const HOST_KEY_PUB: &str = "/etc/ssh/ssh_host_ecdsa_key.pub";

/// OpenSSH-style fingerprint: `SHA256:` + unpadded base64 of the digest
/// over the raw key blob.
pub fn fingerprint_sha256(key_blob: &[u8]) -> String {
    let digest = Sha256::digest(key_blob);
    format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

/// Fingerprint from an OpenSSH public-key line ("ecdsa-sha2-nistp256
/// AAAA... comment").
pub fn fingerprint_of_pubkey_line(line: &str) -> Option<String> {
    use base64::engine::general_purpose::STANDARD;
    let blob = line.split_whitespace().nth(1)?;
    let decoded = STANDARD.decode(blob).ok()?;
    Some(fingerprint_sha256(&decoded))
}

pub struct ClientKeys {
    pub private_path: PathBuf,
    pub public_path: PathBuf,
    pub public_line: String,
}

/// Ensure the client keypair exists, generating it on first use, and
/// enforce key-file permissions.
pub fn ensure_client_keys(work_dir: &Path) -> Result<ClientKeys, ApiError> {
    let private_path = work_dir.join(CLIENT_KEY_FILE);
    let public_path = work_dir.join(format!("{CLIENT_KEY_FILE}.pub"));

    if !private_path.exists() {
        info!(target: "osman", path = %private_path.display(), "Generating SSH client keypair");
        let output = Command::new("ssh-keygen")
            .args(["-t", "ecdsa", "-b", "256", "-N", "", "-q", "-f"])
            .arg(&private_path)
            .output()
            .map_err(|e| ApiError::new(format!("ssh-keygen failed to launch: {e}")))?;
        if !output.status.success() {
            return Err(ApiError::new(format!(
                "ssh-keygen failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
    }

    dirtconf::workdir::ensure_key_permissions(&private_path, &public_path)
        .map_err(|e| ApiError::new(format!("Key permissions: {e}")))?;

    let public_line = std::fs::read_to_string(&public_path)
        .map_err(|e| ApiError::new(format!("Read client public key: {e}")))?
        .trim()
        .to_string();

    Ok(ClientKeys {
        private_path,
        public_path,
        public_line,
    })
}

/// Build this host's own trust bundle for `TrustBundleGet`.
pub fn local_trust_bundle(work_dir: &Path, ssh_user: &str) -> Result<PeerTrustBundle, ApiError> {
    let keys = ensure_client_keys(work_dir)?;

    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let host_fingerprint = match std::fs::read_to_string(HOST_KEY_PUB) {
        Ok(line) => fingerprint_of_pubkey_line(&line).unwrap_or_default(),
        Err(_) => {
            warn!(target: "osman", path = HOST_KEY_PUB, "Host key unavailable; bundle has no fingerprint");
            String::new()
        }
    };

    Ok(PeerTrustBundle {
        host,
        ssh_user: ssh_user.to_string(),
        ssh_port: 22,
        host_fingerprint_sha256: host_fingerprint,
        client_pubkey: keys.public_line,
    })
}
