//! Control of the sibling service units via systemd user units.

use std::process::Command;

use dirtproto::error::ApiError;
use tracing::info;

const SERVICES: [&str; 3] = ["server", "ui", "audio"];
const ACTIONS: [&str; 3] = ["start", "stop", "restart"];

pub fn unit_name(service: &str) -> String {
    format!("dirtsim-{service}.service")
}

/// Validate and apply a start/stop/restart request.
pub fn control(service: &str, action: &str) -> Result<(), ApiError> {
    if !SERVICES.contains(&service) {
        return Err(ApiError::new(format!("Unknown service '{service}'")));
    }
    if !ACTIONS.contains(&action) {
        return Err(ApiError::new(format!("Unknown action '{action}'")));
    }

    let unit = unit_name(service);
    info!(target: "osman", %unit, action, "Service control");
    let output = Command::new("systemctl")
        .args(["--user", action, &unit])
        .output()
        .map_err(|e| ApiError::new(format!("systemctl failed to launch: {e}")))?;

    if !output.status.success() {
        return Err(ApiError::new(format!(
            "systemctl {action} {unit} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_service_rejected_before_spawn() {
        let err = control("database", "start").unwrap_err();
        assert!(err.message.contains("Unknown service"));
    }

    #[test]
    fn unknown_action_rejected_before_spawn() {
        let err = control("server", "explode").unwrap_err();
        assert!(err.message.contains("Unknown action"));
    }

    #[test]
    fn unit_names_are_prefixed() {
        assert_eq!(unit_name("ui"), "dirtsim-ui.service");
    }
}
