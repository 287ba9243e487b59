//! Errors surfaced across the Engine API's scan boundary (§7: only CIDR
//! parsing and report-file creation are fatal to scan startup; everything
//! below that seam is swallowed inside `netutils`).

use netutils::CidrError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid CIDR: {0}")]
    InvalidCidr(#[from] CidrError),
    #[error("a scan is already running")]
    AlreadyScanning,
    #[error("failed to open scan report: {0}")]
    Report(#[from] io::ReportError),
}
