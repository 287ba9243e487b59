//! Stats/Progress Observer (C8): builds the read-only snapshot the UI
//! layers poll on a timer.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use formats::{ScanSnapshot, WorkerState, WorkerStatus};

use crate::coordinator::{Counters, DeviceMap, WorkerStatsMap};

/// Sentinel id for the synthetic `completed` entry (§4.8) shown once all
/// workers have torn down but devices were found.
const SYNTHETIC_COMPLETED_ID: u32 = u32::MAX;

pub(crate) fn snapshot(
    device_map: &DeviceMap,
    worker_stats: &WorkerStatsMap,
    counters: &Arc<Counters>,
) -> ScanSnapshot {
    let total = counters.total.load(Ordering::Acquire);
    let sent = counters.sent.load(Ordering::Acquire);
    let scanned = counters.scanned.load(Ordering::Acquire);
    let discovered = counters.discovered.load(Ordering::Acquire);

    let mut worker_map = worker_stats.read().unwrap().clone();
    if worker_map.is_empty() && !device_map.read().unwrap().is_empty() {
        worker_map.insert(
            SYNTHETIC_COMPLETED_ID,
            WorkerStatus {
                id: SYNTHETIC_COMPLETED_ID,
                start_time_ms: 0,
                last_seen_ms: 0,
                current_ip: "waiting".to_string(),
                state: WorkerState::Completed,
                ips_found: discovered,
                ips_scanned: scanned,
                total_ips: total,
                sent_count: sent,
            },
        );
    }

    ScanSnapshot {
        worker_stats: worker_map,
        scanned,
        sent,
        total,
        discovered,
    }
}
