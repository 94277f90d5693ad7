//! SSH-authenticated remote CLI execution.
//!
//! Runs `dirtsim-cli <args...>` on a trusted peer: host key pinned to the
//! allowlist fingerprint, publickey auth with the local client keypair,
//! bounded output, and a hard deadline on the whole exchange. Every exit
//! path releases the session; the distinct error strings here are part
//! of the operator contract.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use dirtproto::api::osman::{PeerTrustBundle, RemoteCliRunOkay};
use dirtproto::error::ApiError;
use tracing::debug;

use crate::keys::fingerprint_sha256;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_STDOUT_BYTES: usize = 2 * 1024 * 1024;
pub const MAX_STDERR_BYTES: usize = 2 * 1024 * 1024;

/// Quote one argument for the remote shell: single quotes, with embedded
/// quotes spliced out.
pub fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for ch in arg.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// The full remote command line: `dirtsim-cli` plus quoted arguments.
pub fn build_command(args: &[String]) -> String {
    let mut command = String::from("dirtsim-cli");
    for arg in args {
        command.push(' ');
        command.push_str(&shell_quote(arg));
    }
    command
}

/// Map a finished remote invocation to its result, applying the
/// missing-binary special case.
pub fn map_completion(
    exit_code: i32,
    stdout: String,
    stderr: String,
    elapsed_ms: i64,
) -> Result<RemoteCliRunOkay, ApiError> {
    if exit_code == 127 && stderr.contains("not found") {
        return Err(ApiError::new("dirtsim-cli not found on remote host"));
    }
    Ok(RemoteCliRunOkay {
        exit_code,
        stdout,
        stderr,
        elapsed_ms,
    })
}

pub fn timeout_error(timeout_ms: i32) -> ApiError {
    ApiError::new(format!("Remote CLI command timed out after {timeout_ms}ms"))
}

pub fn output_limit_error() -> ApiError {
    ApiError::new("Remote CLI output exceeded limit")
}

pub fn fingerprint_mismatch_error() -> ApiError {
    ApiError::new("Host fingerprint mismatch")
}

pub struct RemoteSshExecutor {
    key_path: PathBuf,
}

impl RemoteSshExecutor {
    pub fn new(key_path: PathBuf) -> Self {
        Self { key_path }
    }

    /// Execute on a trusted peer. Blocking; callers run it on a worker
    /// thread.
    pub fn run(
        &self,
        peer: &PeerTrustBundle,
        args: &[String],
        command_timeout_ms: i32,
    ) -> Result<RemoteCliRunOkay, ApiError> {
        let started = Instant::now();
        // A caller's zero-or-default timeout still gets a real deadline.
        let effective_timeout_ms = command_timeout_ms.max(1);

        let address = (peer.host.as_str(), peer.ssh_port)
            .to_socket_addrs()
            .map_err(|_| ApiError::new(format!("Failed to resolve host: {}", peer.host)))?
            .next()
            .ok_or_else(|| ApiError::new(format!("Failed to resolve host: {}", peer.host)))?;
        let tcp = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT).map_err(|_| {
            ApiError::new(format!("Failed to connect to {}:{}", peer.host, peer.ssh_port))
        })?;

        let mut session = ssh2::Session::new()
            .map_err(|e| ApiError::new(format!("Failed to initialize SSH session: {e}")))?;
        session.set_tcp_stream(tcp);
        session
            .method_pref(ssh2::MethodType::HostKey, "ecdsa-sha2-nistp256")
            .map_err(|e| {
                ApiError::new(format!("Failed to set SSH host key preference: {e}"))
            })?;
        session.set_timeout(CONNECT_TIMEOUT.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| ApiError::new(format!("SSH handshake failed: {e}")))?;

        // Host key pinning against the allowlist entry.
        let (host_key, _key_type) = session
            .host_key()
            .ok_or_else(|| ApiError::new("Failed to read host key fingerprint"))?;
        let fingerprint = fingerprint_sha256(host_key);
        if fingerprint != peer.host_fingerprint_sha256 {
            return Err(fingerprint_mismatch_error());
        }

        let public_key = self.key_path.with_extension("pub");
        session
            .userauth_pubkey_file(&peer.ssh_user, Some(&public_key), &self.key_path, None)
            .map_err(|e| ApiError::new(format!("SSH authentication failed: {e}")))?;

        let deadline = Instant::now() + Duration::from_millis(effective_timeout_ms as u64);
        let mut channel = session
            .channel_session()
            .map_err(|e| ApiError::new(format!("SSH channel open failed: {e}")))?;

        let command = build_command(args);
        debug!(target: "osman", host = %peer.host, %command, "Remote exec");
        channel
            .exec(&command)
            .map_err(|e| ApiError::new(format!("SSH exec failed: {e}")))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut buffer = [0u8; 4096];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let _ = channel.close();
                return Err(timeout_error(effective_timeout_ms));
            }
            session.set_timeout(remaining.as_millis().max(1) as u32);

            let mut read_any = false;

            match channel.read(&mut buffer) {
                Ok(0) => {}
                Ok(n) => {
                    if stdout.len() + n > MAX_STDOUT_BYTES {
                        let _ = channel.close();
                        return Err(output_limit_error());
                    }
                    stdout.extend_from_slice(&buffer[..n]);
                    read_any = true;
                }
                Err(e) if would_block(&e) => {}
                Err(e) => {
                    let _ = channel.close();
                    return Err(ApiError::new(format!("SSH read failed: {e}")));
                }
            }

            match channel.stderr().read(&mut buffer) {
                Ok(0) => {}
                Ok(n) => {
                    if stderr.len() + n > MAX_STDERR_BYTES {
                        let _ = channel.close();
                        return Err(output_limit_error());
                    }
                    stderr.extend_from_slice(&buffer[..n]);
                    read_any = true;
                }
                Err(e) if would_block(&e) => {}
                Err(e) => {
                    let _ = channel.close();
                    return Err(ApiError::new(format!("SSH read stderr failed: {e}")));
                }
            }

            if channel.eof() {
                break;
            }
            if !read_any {
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        let _ = channel.close();
        let _ = channel.wait_close();
        let exit_code = channel.exit_status().unwrap_or(-1);
        let _ = session.disconnect(None, "Normal Shutdown", None);

        let elapsed_ms = started.elapsed().as_millis() as i64;
        map_completion(
            exit_code,
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
            elapsed_ms,
        )
    }
}

fn would_block(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn quoting_wraps_and_escapes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("a b"), "'a b'");
    }

    #[test]
    fn command_line_prepends_binary() {
        let command = build_command(&["server".into(), "StatusGet".into()]);
        assert_eq!(command, "dirtsim-cli 'server' 'StatusGet'");
    }

    #[test]
    fn missing_binary_maps_to_distinct_error() {
        let err = map_completion(127, String::new(), "sh: dirtsim-cli: not found".into(), 5)
            .unwrap_err();
        assert_eq!(err.message, "dirtsim-cli not found on remote host");
    }

    #[test]
    fn exit_127_without_not_found_passes_through() {
        let okay = map_completion(127, String::new(), "some other failure".into(), 5).unwrap();
        assert_eq!(okay.exit_code, 127);
    }

    #[test]
    fn nonzero_exits_are_results_not_errors() {
        let okay = map_completion(1, "out".into(), "err".into(), 12).unwrap();
        assert_eq!(okay.exit_code, 1);
        assert_eq!(okay.stdout, "out");
        assert_eq!(okay.elapsed_ms, 12);
    }

    #[test]
    fn error_strings_are_exact() {
        assert_eq!(
            timeout_error(500).message,
            "Remote CLI command timed out after 500ms"
        );
        assert_eq!(
            output_limit_error().message,
            "Remote CLI output exceeded limit"
        );
        assert_eq!(
            fingerprint_mismatch_error().message,
            "Host fingerprint mismatch"
        );
    }
}
