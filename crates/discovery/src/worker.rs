//! Worker (C5): per-IP orchestration of C2 -> C3 -> C4. Each worker owns a
//! logical dequeue loop; it updates its own `WorkerStatus`, inserts the
//! finished `Device` into the shared device map, and forwards reachable
//! devices to the results stream and the optional report.

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use formats::{Device, DeviceStatus, WorkerState, WorkerStatus};
use io::ScanReport;
use netutils::{arp, hostname, portscan};
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::coordinator::{Counters, DeviceMap, WorkerStatsMap};

/// MAC-retry policy (§4.5): three attempts, 100ms apart, stop on first hit.
const MAC_RETRY_ATTEMPTS: usize = 3;
const MAC_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(crate) struct WorkerContext {
    pub id: u32,
    pub device_map: DeviceMap,
    pub worker_stats: WorkerStatsMap,
    pub counters: Arc<Counters>,
    pub scan_start: Instant,
    pub report: Option<Arc<TokioMutex<ScanReport>>>,
    pub cancel: CancellationToken,
}

pub(crate) async fn run(
    ctx: WorkerContext,
    work_rx: Arc<TokioMutex<mpsc::Receiver<Ipv4Addr>>>,
    results_tx: mpsc::Sender<Device>,
) {
    let mut ips_found = 0u64;
    let mut ips_scanned = 0u64;

    loop {
        let ip = {
            let mut guard = work_rx.lock().await;
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                maybe = guard.recv() => maybe,
            }
        };
        let Some(ip) = ip else { break };

        set_status(&ctx, ip.to_string(), WorkerState::Scanning, ips_found, ips_scanned);

        let device = probe_one(ip, &ctx.report).await;
        ips_scanned += 1;
        if device.status == DeviceStatus::Up {
            ips_found += 1;
        }

        ctx.device_map.write().unwrap().insert(ip, device.clone());
        ctx.counters.scanned.fetch_add(1, Ordering::AcqRel);

        if device.status == DeviceStatus::Up {
            ctx.counters.discovered.fetch_add(1, Ordering::AcqRel);
            if results_tx.try_send(device).is_err() {
                warn!(%ip, "results channel full, dropping stream update (device map retains it)");
            }
        }

        set_status(&ctx, "waiting".to_string(), WorkerState::Idle, ips_found, ips_scanned);
    }

    ctx.worker_stats.write().unwrap().remove(&ctx.id);
}

fn set_status(ctx: &WorkerContext, current_ip: String, state: WorkerState, ips_found: u64, ips_scanned: u64) {
    let now_ms = ctx.scan_start.elapsed().as_millis() as u64;
    let total_ips = ctx.counters.total.load(Ordering::Acquire);
    let sent_count = ctx.counters.sent.load(Ordering::Acquire);
    let mut ws = ctx.worker_stats.write().unwrap();
    let entry = ws
        .entry(ctx.id)
        .or_insert_with(|| WorkerStatus::waiting(ctx.id, total_ips, now_ms));
    entry.last_seen_ms = now_ms;
    entry.current_ip = current_ip;
    entry.state = state;
    entry.ips_found = ips_found;
    entry.ips_scanned = ips_scanned;
    entry.total_ips = total_ips;
    entry.sent_count = sent_count;
}

/// C2 -> C3 -> C4 in strict sequence for one IP (§5 ordering guarantee).
async fn probe_one(ip: Ipv4Addr, report: &Option<Arc<TokioMutex<ScanReport>>>) -> Device {
    let reach = portscan::probe_reachability(ip).await;
    if !reach.reachable {
        return Device::down(&ip.to_string());
    }

    let mac = resolve_mac_with_retry(ip).await;
    let vendor = io::vendor_of(&mac);
    let hn = hostname::resolve(ip, &reach.open_ports).await;
    let device_type =
        hostname::classify_device_type(&vendor, &hn.mdns_services, hn.afp_seen, &reach.open_ports);

    let device = Device {
        ip: ip.to_string(),
        status: DeviceStatus::Up,
        open_ports: reach.open_ports,
        mac,
        vendor,
        hostnames: hn.hostnames,
        mdns_name: hn.mdns_name,
        mdns_services: hn.mdns_services,
        device_type,
    };

    if let Some(report) = report {
        let mut guard = report.lock().await;
        if let Err(e) = guard.append_device(&device) {
            warn!(%ip, error = %e, "failed to append scan report row");
        }
    }

    device
}

async fn resolve_mac_with_retry(ip: Ipv4Addr) -> String {
    for attempt in 0..MAC_RETRY_ATTEMPTS {
        let mac = arp::resolve_mac(ip).await;
        if !mac.is_empty() {
            return mac;
        }
        if attempt + 1 < MAC_RETRY_ATTEMPTS {
            tokio::time::sleep(MAC_RETRY_DELAY).await;
        }
    }
    String::new()
}
