//! Engine API (§6): the single surface the terminal UI and the web UI
//! build on. Neither UI is implemented here; both are external
//! collaborators consuming `Engine` through this API alone.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Instant;

use formats::{Device, ScanSnapshot};
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};

use crate::coordinator::{self, Counters, DeviceMap, ScanHandle, WorkerStatsMap};
use crate::error::EngineError;
use crate::observer;

const DEFAULT_REPORT_PATH: &str = "report.log";

/// `new_engine(debug) -> Engine` from the specification's external
/// interface: one `Engine` per process, reused across scans.
pub struct Engine {
    debug: bool,
    device_map: DeviceMap,
    worker_stats: WorkerStatsMap,
    counters: Arc<Counters>,
    active: Arc<StdMutex<Option<ScanHandle>>>,
    results_slot: Arc<StdMutex<Option<mpsc::Receiver<Device>>>>,
}

impl Engine {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            device_map: Arc::new(StdRwLock::new(BTreeMap::new())),
            worker_stats: Arc::new(StdRwLock::new(BTreeMap::new())),
            counters: Arc::new(Counters::default()),
            active: Arc::new(StdMutex::new(None)),
            results_slot: Arc::new(StdMutex::new(None)),
        }
    }

    /// Begins a scan. Non-blocking: this returns as soon as the producer
    /// and worker pool are spawned. Rejected with `AlreadyScanning` while a
    /// previous scan's completion has not yet been observed (§8 boundary
    /// case); rejected with `InvalidCidr` without spawning anything if the
    /// CIDR does not parse (§7).
    pub async fn scan(&self, cidr: &str, workers: usize) -> Result<(), EngineError> {
        {
            let active = self.active.lock().unwrap();
            if let Some(handle) = active.as_ref() {
                if !*handle.done_rx.borrow() {
                    return Err(EngineError::AlreadyScanning);
                }
            }
        }

        let hosts = netutils::expand_cidr(cidr)?;

        // Preparing: reset the device map, worker-stats map, and counters
        // before anything else is spawned.
        self.device_map.write().unwrap().clear();
        self.worker_stats.write().unwrap().clear();
        self.counters.reset();

        let report = if self.debug {
            Some(Arc::new(TokioMutex::new(io::ScanReport::create(
                DEFAULT_REPORT_PATH,
            )?)))
        } else {
            None
        };

        let (handle, results_rx) = coordinator::spawn_scan(
            hosts,
            workers.max(1),
            self.device_map.clone(),
            self.worker_stats.clone(),
            self.counters.clone(),
            Instant::now(),
            report,
        );

        *self.active.lock().unwrap() = Some(handle);
        *self.results_slot.lock().unwrap() = Some(results_rx);
        Ok(())
    }

    /// Returns the results stream and its completion signal. Single
    /// consumer (§6): calling this again after the receiver has already
    /// been taken for the current scan returns an already-closed channel
    /// paired with an already-true done signal.
    pub fn results(&self) -> (mpsc::Receiver<Device>, watch::Receiver<bool>) {
        let rx = self
            .results_slot
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| mpsc::channel(1).1);
        let done_rx = self
            .active
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| h.done_rx.clone())
            .unwrap_or_else(|| watch::channel(true).1);
        (rx, done_rx)
    }

    /// Cancels the in-progress scan. Cooperative and single-shot: calling
    /// this twice, or calling it with nothing running, is a no-op.
    pub async fn stop(&self) {
        let cancel = self
            .active
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| h.cancel.clone());
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
    }

    /// Read-only progress snapshot for the UI's polling timer.
    pub fn stats(&self) -> ScanSnapshot {
        observer::snapshot(&self.device_map, &self.worker_stats, &self.counters)
    }
}
