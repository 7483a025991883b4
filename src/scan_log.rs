//! Append-only record of completed scans.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::types::{format_rfc3339, ScanResult};

const LOG_FILE_NAME: &str = ".forge_scan.log";

/// One line per completed scan:
/// `<timestamp> | target=<target> | engine=<engine> | open=[p1,p2]`.
#[derive(Debug, Clone)]
pub struct ScanLog {
    path: PathBuf,
}

impl ScanLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.forge_scan.log`, or the working directory when no home is known.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(LOG_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the log line for `result`, without the trailing newline.
    pub fn format_record(result: &ScanResult) -> String {
        let open = result
            .open_ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        // Escaped so a hostile target cannot split or forge records.
        format!(
            "{} | target={} | engine={} | open=[{}]",
            format_rfc3339(result.started_at),
            result.target.escape_debug(),
            result.engine_used,
            open
        )
    }

    /// Best-effort append. Failures are reported through `tracing` only.
    pub fn append(&self, result: &ScanResult) {
        if let Err(e) = self.try_append(result) {
            warn!(path = %self.path.display(), error = %e, "failed to write scan log");
        }
    }

    fn try_append(&self, result: &ScanResult) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", Self::format_record(result))
    }

    /// Last `n` lines of the log. A missing file reads as empty.
    pub fn tail(&self, n: usize) -> io::Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let lines: Vec<&str> = content.lines().collect();
        let skip = lines.len().saturating_sub(n);
        Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
    }
}

impl Default for ScanLog {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Engine;
    use std::time::Duration;
    use time::OffsetDateTime;

    fn sample(partial: bool) -> ScanResult {
        ScanResult {
            target: "10.0.0.5".into(),
            engine_used: Engine::InternalSocket,
            open_ports: vec![22, 443],
            started_at: OffsetDateTime::UNIX_EPOCH,
            duration: Duration::from_millis(12),
            partial,
            ports_requested: 13,
            dropped_tokens: 0,
            external_exit_code: None,
        }
    }

    #[test]
    fn record_format() {
        assert_eq!(
            ScanLog::format_record(&sample(false)),
            "1970-01-01T00:00:00Z | target=10.0.0.5 | engine=InternalSocket | open=[22,443]"
        );
    }

    #[test]
    fn partial_scans_keep_the_same_line_shape() {
        assert_eq!(
            ScanLog::format_record(&sample(true)),
            ScanLog::format_record(&sample(false))
        );
    }

    #[test]
    fn default_path_uses_log_file_name() {
        assert!(ScanLog::default_path().ends_with(LOG_FILE_NAME));
    }
}
