use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use ::time::{format_description::well_known, OffsetDateTime};

use crate::error::{Result, ScanError};

/// Per-port connect deadline used when the caller does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(450);

/// Maximum number of in-flight connect attempts used by default.
pub const DEFAULT_CONCURRENCY: usize = 120;

/// Caller-supplied knobs for a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub timeout_per_port: Duration,
    pub max_concurrency: usize,
    pub prefer_external_engine: bool,
    /// Extra arguments appended to the external tool's command line.
    pub external_args: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout_per_port: DEFAULT_TIMEOUT,
            max_concurrency: DEFAULT_CONCURRENCY,
            prefer_external_engine: true,
            external_args: Vec::new(),
        }
    }
}

impl ScanOptions {
    /// Reject settings that would make the prober stall or spin.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(ScanError::Config(
                "max concurrency must be at least 1".into(),
            ));
        }
        if self.timeout_per_port.is_zero() {
            return Err(ScanError::Config(
                "per-port timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Which strategy produced a scan result.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    External,
    InternalSocket,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::External => write!(f, "External"),
            Engine::InternalSocket => write!(f, "InternalSocket"),
        }
    }
}

/// Outcome of one scan request.
///
/// `open_ports` is always ascending. For `Engine::External` it is empty:
/// the delegated tool prints its own report and nothing is parsed back.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub target: String,
    pub engine_used: Engine,
    pub open_ports: Vec<u16>,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub partial: bool,
    pub ports_requested: usize,
    pub dropped_tokens: usize,
    pub external_exit_code: Option<i32>,
}

/// RFC 3339 rendering shared by JSON output and the scan log.
pub fn format_rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

fn serialize_rfc3339<S: Serializer>(ts: &OffsetDateTime, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&format_rfc3339(*ts))
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
