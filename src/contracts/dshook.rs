//! The DS-submit/retract external command hook (`spec.md` §6.5).
//!
//! Grounded on the teacher's own external-command pattern in
//! `src/units/key_manager.rs` (`KeySetCommand`, which shells out to
//! `dnst keyset` with structured stdin/stdout). The default
//! implementation here shells out to an operator-configured path with the
//! DNSKEY RR on stdin and the zone name as an argument, exactly as
//! `spec.md` §6.5 specifies; a non-zero exit is surfaced as
//! [`crate::error::CoreError::Backend`] so the enforcer retries on the
//! next pass.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsHookKind {
    Submit,
    Retract,
}

/// Emits "please submit DS" / "please retract DS" side effects
/// (`spec.md` §4.6 "Side effects") without mutating the parent registry
/// itself (`spec.md` §1 "Non-goals").
#[async_trait]
pub trait DsHook: Send + Sync {
    async fn run(&self, kind: DsHookKind, zone: &str, dnskey_rr: &str) -> Result<(), CoreError>;
}

/// `std::process::Command`-based default implementation: invokes the
/// configured path with the DNSKEY RR on stdin and the zone name as the
/// sole argument (`spec.md` §6.5).
pub struct ShellDsHook {
    pub submit_command: Option<Utf8PathBuf>,
    pub retract_command: Option<Utf8PathBuf>,
}

#[async_trait]
impl DsHook for ShellDsHook {
    async fn run(&self, kind: DsHookKind, zone: &str, dnskey_rr: &str) -> Result<(), CoreError> {
        let command = match kind {
            DsHookKind::Submit => &self.submit_command,
            DsHookKind::Retract => &self.retract_command,
        };
        let Some(command) = command else {
            // No hook configured: treat as a no-op success, matching an
            // operator who hasn't wired up registrar automation yet.
            return Ok(());
        };

        let mut child = Command::new(command.as_std_path())
            .arg(zone)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::Io(format!("spawning {command}: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(dnskey_rr.as_bytes())
                .await
                .map_err(|e| CoreError::Io(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CoreError::Io(e.to_string()))?;

        if !output.status.success() {
            return Err(CoreError::Backend(format!(
                "{command} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}
