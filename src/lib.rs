//! Library crate for forge-scan exposing the scanning core.
pub mod coordinator;
pub mod error;
pub mod external;
pub mod ports;
pub mod scan_log;
pub mod scanner;
pub mod types;

pub use coordinator::ScanCoordinator;
pub use error::ScanError;
pub use types::{Engine, ScanOptions, ScanResult};
