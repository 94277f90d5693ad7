//! dirtsim-osman - fleet operations sidecar.
//!
//! Owns the peer trust allowlist, executes `dirtsim-cli` on trusted
//! peers over SSH, advertises this host over mDNS, and controls the
//! sibling service units.

pub mod advertise;
pub mod keys;
pub mod service_control;
pub mod ssh;
pub mod trust;

pub use advertise::PeerAdvertiser;
pub use keys::{ensure_client_keys, local_trust_bundle};
pub use ssh::RemoteSshExecutor;
pub use trust::PeerTrustStore;
