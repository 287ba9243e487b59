//! Canonical types produced by the discovery engine.
//!
//! This crate is deliberately free of any networking code: it only knows how
//! to represent a probed host (`Device`), the live state of a pool worker
//! (`WorkerStatus`), and a read-only progress snapshot (`ScanSnapshot`). Other
//! crates in the workspace build these values; nothing here reaches out to
//! the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod validate;

/// Reachability outcome for one probed IP.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceStatus {
    Up,
    Down,
}

/// Coarse device-type label derived from vendor/port/mDNS signals.
///
/// Distinct from `vendor`: this is a heuristic classification, not an OUI
/// lookup result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceType {
    Apple,
    PossibleApple,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Apple => "Apple",
            DeviceType::PossibleApple => "Possible Apple",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fully-probed host. Never mutated after insertion into the device map
/// for a given scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub ip: String,
    pub status: DeviceStatus,
    /// Ascending, de-duplicated.
    pub open_ports: Vec<u16>,
    /// Canonical `XX:XX:XX:XX:XX:XX` uppercase, or empty.
    pub mac: String,
    /// `"Unknown Vendor"` when the OUI prefix is not recognised, empty if no MAC.
    pub vendor: String,
    pub hostnames: Vec<String>,
    pub mdns_name: String,
    /// service type (e.g. `_airplay._tcp`) -> opaque info string.
    pub mdns_services: BTreeMap<String, String>,
    pub device_type: Option<DeviceType>,
}

impl Device {
    pub fn down(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            status: DeviceStatus::Down,
            open_ports: Vec::new(),
            mac: String::new(),
            vendor: String::new(),
            hostnames: Vec::new(),
            mdns_name: String::new(),
            mdns_services: BTreeMap::new(),
            device_type: None,
        }
    }
}

/// Live state of one pool worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Scanning,
    Idle,
    Completed,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Starting => "starting",
            WorkerState::Scanning => "scanning",
            WorkerState::Idle => "idle",
            WorkerState::Completed => "completed",
        }
    }
}

/// Snapshot of one worker's progress. Timestamps are milliseconds since the
/// owning scan started: `Instant` is not `Serialize`, and the UI only ever
/// needs relative timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerStatus {
    pub id: u32,
    pub start_time_ms: u64,
    pub last_seen_ms: u64,
    /// The IP currently under probe, or the literal string `"waiting"`.
    pub current_ip: String,
    pub state: WorkerState,
    pub ips_found: u64,
    pub ips_scanned: u64,
    pub total_ips: u64,
    pub sent_count: u64,
}

impl WorkerStatus {
    pub fn waiting(id: u32, total_ips: u64, now_ms: u64) -> Self {
        Self {
            id,
            start_time_ms: now_ms,
            last_seen_ms: now_ms,
            current_ip: "waiting".to_string(),
            state: WorkerState::Starting,
            ips_found: 0,
            ips_scanned: 0,
            total_ips,
            sent_count: 0,
        }
    }
}

/// Read-only progress snapshot exposed via the engine's stats API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanSnapshot {
    pub worker_stats: BTreeMap<u32, WorkerStatus>,
    pub scanned: u64,
    pub sent: u64,
    pub total: u64,
    pub discovered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_json_roundtrip() {
        let mut d = Device::down("192.0.2.1");
        d.status = DeviceStatus::Up;
        d.open_ports = vec![22, 80];
        d.mac = "AA:BB:CC:DD:EE:FF".to_string();
        d.vendor = "Acme".to_string();
        d.hostnames = vec!["host.lan".to_string()];
        d.device_type = Some(DeviceType::Apple);

        let j = serde_json::to_string(&d).expect("serialize");
        let back: Device = serde_json::from_str(&j).expect("deserialize");
        assert_eq!(d, back);
    }

    #[test]
    fn down_device_has_no_ports_or_mac() {
        let d = Device::down("10.0.0.5");
        assert_eq!(d.status, DeviceStatus::Down);
        assert!(d.open_ports.is_empty());
        assert!(d.mac.is_empty());
    }

    #[test]
    fn device_type_display_matches_spec_strings() {
        assert_eq!(DeviceType::Apple.to_string(), "Apple");
        assert_eq!(DeviceType::PossibleApple.to_string(), "Possible Apple");
    }

    #[test]
    fn worker_state_strings_match_spec() {
        assert_eq!(WorkerState::Starting.as_str(), "starting");
        assert_eq!(WorkerState::Scanning.as_str(), "scanning");
        assert_eq!(WorkerState::Idle.as_str(), "idle");
        assert_eq!(WorkerState::Completed.as_str(), "completed");
    }

    #[test]
    fn worker_status_waiting_defaults() {
        let w = WorkerStatus::waiting(3, 254, 1000);
        assert_eq!(w.current_ip, "waiting");
        assert_eq!(w.state, WorkerState::Starting);
        assert_eq!(w.sent_count, 0);
    }
}
