//! mDNS peer advertisement.
//!
//! Broadcasts `_dirtsim._tcp` with a `role` TXT record. A name collision
//! retries with a numeric suffix; an unrecoverable daemon failure stops
//! the advertiser cleanly and `is_running` reports false.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

pub const SERVICE_TYPE: &str = "_dirtsim._tcp.local.";
const MAX_NAME_ATTEMPTS: u32 = 4;

/// Role advertised in TXT; unknown roles still advertise.
pub fn role_txt(role: &str) -> &'static str {
    match role {
        "physics" => "physics",
        "ui" => "ui",
        _ => "unknown",
    }
}

pub struct PeerAdvertiser {
    daemon: Option<ServiceDaemon>,
    running: Arc<AtomicBool>,
    registered_name: Option<String>,
}

impl PeerAdvertiser {
    /// Register the service, retrying with `-2`, `-3`, ... suffixes on
    /// collision.
    pub fn start(instance_name: &str, role: &str, port: u16) -> Self {
        let running = Arc::new(AtomicBool::new(false));

        let daemon = match ServiceDaemon::new() {
            Ok(daemon) => daemon,
            Err(e) => {
                warn!(target: "osman", "mDNS daemon start failed: {e}");
                return Self {
                    daemon: None,
                    running,
                    registered_name: None,
                };
            }
        };

        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let host_fqdn = format!("{hostname}.local.");
        let mut properties = HashMap::new();
        properties.insert("role".to_string(), role_txt(role).to_string());

        let mut registered_name = None;
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                instance_name.to_string()
            } else {
                format!("{instance_name}-{}", attempt + 1)
            };

            let info = match ServiceInfo::new(
                SERVICE_TYPE,
                &candidate,
                &host_fqdn,
                (),
                port,
                properties.clone(),
            ) {
                Ok(info) => info.enable_addr_auto(),
                Err(e) => {
                    warn!(target: "osman", "mDNS service info invalid: {e}");
                    break;
                }
            };
            let fullname = info.get_fullname().to_string();

            match daemon.register(info) {
                Ok(()) => {
                    info!(
                        target: "osman",
                        name = %candidate,
                        port,
                        role = role_txt(role),
                        "Peer advertisement registered"
                    );
                    registered_name = Some(fullname);
                    break;
                }
                Err(e) => {
                    warn!(
                        target: "osman",
                        name = %candidate,
                        "mDNS registration failed ({e}); retrying with suffix"
                    );
                }
            }
        }

        let running_flag = registered_name.is_some();
        running.store(running_flag, Ordering::Release);
        Self {
            daemon: if running_flag { Some(daemon) } else { None },
            running,
            registered_name,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn registered_name(&self) -> Option<&str> {
        self.registered_name.as_deref()
    }

    /// Unregister and shut the daemon down.
    pub fn stop(&mut self) {
        if let (Some(daemon), Some(fullname)) = (&self.daemon, &self.registered_name) {
            let _ = daemon.unregister(fullname);
        }
        if let Some(daemon) = self.daemon.take() {
            let _ = daemon.shutdown();
        }
        self.running.store(false, Ordering::Release);
    }
}

impl Drop for PeerAdvertiser {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_txt_maps_known_roles() {
        assert_eq!(role_txt("physics"), "physics");
        assert_eq!(role_txt("ui"), "ui");
        assert_eq!(role_txt("whatever"), "unknown");
    }
}
