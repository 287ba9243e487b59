//! Scan Coordinator (C6): lifecycle wiring between the producer, the
//! worker pool, the results channel, and the completion barrier.
//!
//! The state machine in the specification (`Idle -> Preparing -> Running
//! -> Draining -> Completed|Cancelled -> Idle`) is expressed here as the
//! sequence of actions `spawn_scan` performs plus the tasks it spawns,
//! rather than as an explicit state enum: `Engine::scan` *is* Preparing,
//! the producer + worker tasks spawned here *are* Running, and the
//! completion task below *is* Draining followed by Completed/Cancelled.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Instant;

use formats::{Device, WorkerStatus};
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::worker;

pub(crate) type DeviceMap = Arc<StdRwLock<BTreeMap<Ipv4Addr, Device>>>;
pub(crate) type WorkerStatsMap = Arc<StdRwLock<BTreeMap<u32, WorkerStatus>>>;

/// Results channel capacity (§4.6): overflow is dropped on the stream only,
/// never the device map.
const RESULTS_CAPACITY: usize = 100;

/// Coordinator-wide atomic counters (§5: acquire/release semantics).
#[derive(Default)]
pub(crate) struct Counters {
    pub total: AtomicU64,
    pub sent: AtomicU64,
    pub scanned: AtomicU64,
    pub discovered: AtomicU64,
}

impl Counters {
    pub(crate) fn reset(&self) {
        self.total.store(0, Ordering::Release);
        self.sent.store(0, Ordering::Release);
        self.scanned.store(0, Ordering::Release);
        self.discovered.store(0, Ordering::Release);
    }
}

/// What `Engine` keeps around per in-flight scan: the single-shot
/// cancellation signal and the completion watch.
pub(crate) struct ScanHandle {
    pub(crate) cancel: CancellationToken,
    pub(crate) done_rx: watch::Receiver<bool>,
}

/// Spawns the producer, the `worker_count` workers, and the completion
/// task for one scan. Returns immediately: `scan()` is non-blocking.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_scan(
    hosts: Vec<Ipv4Addr>,
    worker_count: usize,
    device_map: DeviceMap,
    worker_stats: WorkerStatsMap,
    counters: Arc<Counters>,
    scan_start: Instant,
    report: Option<Arc<TokioMutex<io::ScanReport>>>,
) -> (ScanHandle, mpsc::Receiver<Device>) {
    let total = hosts.len();
    counters.total.store(total as u64, Ordering::Release);
    let all_hosts = hosts.clone();

    let cancel = CancellationToken::new();
    let (work_tx, work_rx) = mpsc::channel::<Ipv4Addr>(total.max(1));
    let (results_tx, results_rx) = mpsc::channel::<Device>(RESULTS_CAPACITY);
    let (done_tx, done_rx) = watch::channel(false);
    let work_rx = Arc::new(TokioMutex::new(work_rx));

    // Producer: enqueue in enumeration order, crediting `sent` per
    // enqueue, closing the channel early on cancellation.
    {
        let cancel = cancel.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
            for ip in hosts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    send = work_tx.send(ip) => {
                        if send.is_err() {
                            break;
                        }
                        counters.sent.fetch_add(1, Ordering::AcqRel);
                    }
                }
            }
            // Dropping `work_tx` here closes the work channel.
        });
    }

    // Worker pool (C5). Each worker's WorkerStatus is created here (spawn
    // time) and removed by the worker itself on return.
    let mut handles = Vec::with_capacity(worker_count);
    for id in 0..worker_count as u32 {
        worker_stats
            .write()
            .unwrap()
            .insert(id, WorkerStatus::waiting(id, total as u64, 0));

        let ctx = worker::WorkerContext {
            id,
            device_map: device_map.clone(),
            worker_stats: worker_stats.clone(),
            counters: counters.clone(),
            scan_start,
            report: report.clone(),
            cancel: cancel.clone(),
        };
        handles.push(tokio::spawn(worker::run(
            ctx,
            work_rx.clone(),
            results_tx.clone(),
        )));
    }
    drop(results_tx);

    // Completion barrier (Draining -> Completed/Cancelled).
    let completion_device_map = device_map.clone();
    let completion_counters = counters.clone();
    tokio::spawn(async move {
        for h in handles {
            let _ = h.await;
        }

        // Every host the producer enumerated must end up with a terminal
        // record (§3 invariant 3), whether it was never enqueued
        // (producer cancelled mid-enumeration) or enqueued but abandoned in
        // the channel when its worker observed cancellation before dequeuing
        // it. Hosts a worker actually started probing are already recorded
        // by the time `h.await` above returns, since cancellation is only
        // checked at dequeue, never mid-probe. Anything still missing here
        // was never probed at all, so it is recorded `Down`.
        {
            let mut map = completion_device_map.write().unwrap();
            for ip in &all_hosts {
                map.entry(*ip).or_insert_with(|| Device::down(&ip.to_string()));
            }
        }
        completion_counters.scanned.store(all_hosts.len() as u64, Ordering::Release);

        if let Some(report) = report {
            let total_devices = completion_device_map.read().unwrap().len();
            match Arc::try_unwrap(report) {
                Ok(mutex) => {
                    let report = mutex.into_inner();
                    if let Err(e) = report.close(total_devices) {
                        warn!(error = %e, "failed to close scan report");
                    }
                }
                Err(_) => warn!("scan report still referenced at scan completion"),
            }
        }

        let _ = done_tx.send(true);
    });

    (ScanHandle { cancel, done_rx }, results_rx)
}
