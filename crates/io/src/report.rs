//! Device Sink & Report (C7): the optional append-only tab-separated scan
//! report. Only created when the operator passes `--debug`.

use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use formats::Device;
use thiserror::Error;

const HEADER_COLUMNS: &str = "IP Address\tHostname\tmDNS Name\tMAC Address\tVendor\tStatus\tPorts";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create report file: {0}")]
    Create(std::io::Error),
    #[error("failed to write to report file: {0}")]
    Write(std::io::Error),
}

/// Append-only writer for the scan report. Owned by the coordinator;
/// workers funnel their rows through `&mut` access serialised by the
/// coordinator's write path.
pub struct ScanReport {
    file: File,
}

impl ScanReport {
    pub fn create(path: &str) -> Result<Self, ReportError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(ReportError::Create)?;
        writeln!(file, "=== Scan started at {} ===", Utc::now().to_rfc3339())
            .map_err(ReportError::Write)?;
        writeln!(file, "{}", HEADER_COLUMNS).map_err(ReportError::Write)?;
        Ok(Self { file })
    }

    /// Appends one row. Only reachable devices are ever passed in: `Down`
    /// hosts never reach the report per the report's own scope.
    pub fn append_device(&mut self, device: &Device) -> Result<(), ReportError> {
        let hostnames = device.hostnames.join(",");
        let ports = device
            .open_ports
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        writeln!(
            self.file,
            "{}\t{}\t{}\t{}\t{}\t{:?}\t{}",
            device.ip, hostnames, device.mdns_name, device.mac, device.vendor, device.status, ports
        )
        .map_err(ReportError::Write)
    }

    pub fn close(mut self, total_devices: usize) -> Result<(), ReportError> {
        writeln!(self.file, "=== Scan finished: {} devices ===", total_devices)
            .map_err(ReportError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::DeviceStatus;

    #[test]
    fn header_and_rows_are_tab_separated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.log");
        let path_str = path.to_str().unwrap().to_string();

        let mut report = ScanReport::create(&path_str).unwrap();
        let mut device = Device::down("192.0.2.10");
        device.status = DeviceStatus::Up;
        device.open_ports = vec![22, 80];
        device.hostnames = vec!["host.lan".to_string()];
        report.append_device(&device).unwrap();
        report.close(1).unwrap();

        let contents = std::fs::read_to_string(&path_str).unwrap();
        assert!(contents.contains("=== Scan started at"));
        assert!(contents.contains(HEADER_COLUMNS));
        assert!(contents.contains("192.0.2.10\thost.lan\t\t\t\tUp\t22,80"));
        assert!(contents.contains("=== Scan finished: 1 devices ==="));
    }

    #[test]
    fn append_is_additive_across_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.log");
        let path_str = path.to_str().unwrap().to_string();

        {
            let report = ScanReport::create(&path_str).unwrap();
            report.close(0).unwrap();
        }
        {
            let report = ScanReport::create(&path_str).unwrap();
            report.close(0).unwrap();
        }

        let contents = std::fs::read_to_string(&path_str).unwrap();
        assert_eq!(contents.matches("=== Scan started at").count(), 2);
    }
}
