//! OS-manager command table: peer trust and remote execution.

use serde::{Deserialize, Serialize};

use super::ApiCommand;
use crate::impl_wire;

/// The per-peer SSH identity record persisted in the allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerTrustBundle {
    pub host: String,
    pub ssh_user: String,
    pub ssh_port: u16,
    /// `"SHA256:" + base64(sha256(host_key))`, padding stripped.
    pub host_fingerprint_sha256: String,
    /// The peer's client public key, mirrored into authorized_keys.
    pub client_pubkey: String,
}
impl_wire!(PeerTrustBundle {
    host,
    ssh_user,
    ssh_port,
    host_fingerprint_sha256,
    client_pubkey
});

/// Append (or replace, by host) an allowlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrustPeer {
    pub bundle: PeerTrustBundle,
}
impl_wire!(TrustPeer { bundle });
impl ApiCommand for TrustPeer {
    const NAME: &'static str = "TrustPeer";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UntrustPeer {
    pub host: String,
}
impl_wire!(UntrustPeer { host });
impl ApiCommand for UntrustPeer {
    const NAME: &'static str = "UntrustPeer";
    type Okay = ();
}

/// Emit this host's own bundle, generating the client keypair on first use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrustBundleGet {}
impl_wire!(TrustBundleGet {});
impl ApiCommand for TrustBundleGet {
    const NAME: &'static str = "TrustBundleGet";
    type Okay = PeerTrustBundle;
}

/// Run `dirtsim-cli <args...>` on a trusted peer over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteCliRun {
    pub host: String,
    pub args: Vec<String>,
    pub timeout_ms: i32,
}
impl_wire!(RemoteCliRun {
    host,
    args,
    timeout_ms
});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteCliRunOkay {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: i64,
}
impl_wire!(RemoteCliRunOkay {
    exit_code,
    stdout,
    stderr,
    elapsed_ms
});

impl ApiCommand for RemoteCliRun {
    const NAME: &'static str = "RemoteCliRun";
    type Okay = RemoteCliRunOkay;
}

/// Start/stop/restart a sibling service unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceControl {
    /// One of "server", "ui", "audio".
    pub service: String,
    /// One of "start", "stop", "restart".
    pub action: String,
}
impl_wire!(ServiceControl { service, action });
impl ApiCommand for ServiceControl {
    const NAME: &'static str = "ServiceControl";
    type Okay = ();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Wire;
    use pretty_assertions::assert_eq;

    #[test]
    fn remote_cli_run_roundtrip() {
        let cmd = RemoteCliRun {
            host: "dirtsim2".into(),
            args: vec!["server".into(), "GenomeList".into()],
            timeout_ms: 1234,
        };
        assert_eq!(
            RemoteCliRun::from_wire_bytes(&cmd.to_wire_bytes()).unwrap(),
            cmd
        );
    }

    #[test]
    fn bundle_json_roundtrip() {
        let bundle = PeerTrustBundle {
            host: "peer1".into(),
            ssh_user: "dirtsim".into(),
            ssh_port: 22,
            host_fingerprint_sha256: "SHA256:abc".into(),
            client_pubkey: "ecdsa-sha2-nistp256 AAAA...".into(),
        };
        let json = serde_json::to_string(&bundle).unwrap();
        let back: PeerTrustBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bundle);
    }
}
