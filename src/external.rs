//! Delegation to an external scanner installed on the host.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ports::PortSet;

/// Upper bound on the `--version` availability check.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// How a delegated scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalRun {
    /// Exit code of the tool, `None` if it was killed or died by signal.
    pub exit_code: Option<i32>,
    pub cancelled: bool,
}

/// A full-featured scanner driven as a subprocess.
///
/// Output is never parsed; the tool writes straight to the terminal.
#[async_trait]
pub trait ExternalEngine: Send + Sync {
    /// Short name for logs and headers.
    fn name(&self) -> &str;

    /// Whether the tool can be started. Absence is not an error.
    async fn is_available(&self) -> bool;

    /// Run the tool against `target`, killing it if `cancel` fires.
    async fn run(
        &self,
        target: &str,
        ports: &PortSet,
        extra_args: &[String],
        cancel: &CancellationToken,
    ) -> io::Result<ExternalRun>;
}

/// `nmap` as the external engine.
#[derive(Debug, Clone)]
pub struct Nmap {
    program: PathBuf,
}

impl Nmap {
    /// Looks `nmap` up through `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("nmap"),
        }
    }

    /// Uses an explicit binary path.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the tool, excluding the program itself.
    pub fn command_args(target: &str, ports: &PortSet, extra_args: &[String]) -> Vec<String> {
        let mut args = vec![
            "-Pn".to_string(),
            "-p".to_string(),
            ports.to_spec_string(),
        ];
        args.extend(extra_args.iter().cloned());
        args.push(target.to_string());
        args
    }
}

impl Default for Nmap {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalEngine for Nmap {
    fn name(&self) -> &str {
        "nmap"
    }

    async fn is_available(&self) -> bool {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match timeout(DISCOVERY_TIMEOUT, status).await {
            Ok(Ok(s)) => s.success(),
            Ok(Err(e)) => {
                debug!(program = %self.program.display(), error = %e, "external engine not invocable");
                false
            }
            Err(_) => {
                debug!(program = %self.program.display(), "external engine version check timed out");
                false
            }
        }
    }

    async fn run(
        &self,
        target: &str,
        ports: &PortSet,
        extra_args: &[String],
        cancel: &CancellationToken,
    ) -> io::Result<ExternalRun> {
        let args = Self::command_args(target, ports, extra_args);
        info!(
            program = %self.program.display(),
            args = %args.join(" "),
            "delegating scan to external engine"
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                Ok(ExternalRun {
                    exit_code: status.code(),
                    cancelled: false,
                })
            }
            _ = cancel.cancelled() => {
                // Already-exited children make kill fail; nothing to recover.
                let _ = child.kill().await;
                Ok(ExternalRun {
                    exit_code: None,
                    cancelled: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::parse_port_spec;

    #[test]
    fn command_line_puts_ports_first_and_target_last() {
        let ports = parse_port_spec("80,22,23,24").ports;
        let extra = vec!["-sS".to_string(), "-T4".to_string()];
        let args = Nmap::command_args("scanme.example", &ports, &extra);
        assert_eq!(
            args,
            vec!["-Pn", "-p", "22-24,80", "-sS", "-T4", "scanme.example"]
        );
    }

    #[test]
    fn default_program_is_nmap_on_path() {
        assert_eq!(Nmap::new().program(), Path::new("nmap"));
        let custom = Nmap::with_program("/opt/nmap/bin/nmap");
        assert_eq!(custom.program(), Path::new("/opt/nmap/bin/nmap"));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let nmap = Nmap::with_program("/nonexistent/forge-scan-test/nmap");
        assert!(!nmap.is_available().await);
    }

    #[tokio::test]
    async fn missing_binary_run_is_io_error() {
        let nmap = Nmap::with_program("/nonexistent/forge-scan-test/nmap");
        let ports = parse_port_spec("80").ports;
        let cancel = CancellationToken::new();
        assert!(nmap.run("127.0.0.1", &ports, &[], &cancel).await.is_err());
    }
}
