//! Engine API (C6/C8, §6): ties the Address Enumerator (C1), Reachability
//! Prober (C2), ARP/MAC Resolver (C3), and Hostname Resolver (C4) from
//! `netutils` into a bounded-parallelism, cancellable scan coordinator
//! with a worker pool (C5, in `worker`) and a stats/progress observer
//! (C8, in `observer`). Neither the terminal UI nor the web UI lives here;
//! both are external collaborators of `Engine`.

mod coordinator;
mod engine;
mod error;
mod observer;
mod worker;

pub use engine::Engine;
pub use error::EngineError;
pub use formats::{Device, DeviceStatus, DeviceType, ScanSnapshot, WorkerState, WorkerStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// TEST-NET-3 (RFC 5737), documented non-routable: safe for tests that
    /// need a CIDR to expand without depending on real network state.
    const UNROUTABLE_CIDR: &str = "203.0.113.0/30";

    async fn wait_for_done(done_rx: &mut tokio::sync::watch::Receiver<bool>, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, async {
            while !*done_rx.borrow() {
                if done_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
    }

    #[tokio::test]
    async fn invalid_cidr_is_rejected_without_touching_state() {
        let engine = Engine::new(false);
        let err = engine.scan("not-a-cidr", 4).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCidr(_)));
        assert_eq!(engine.stats().total, 0);
    }

    #[tokio::test]
    async fn second_scan_while_running_is_rejected() {
        let engine = Engine::new(false);
        engine.scan(UNROUTABLE_CIDR, 2).await.unwrap();
        let err = engine.scan(UNROUTABLE_CIDR, 2).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyScanning));
        engine.stop().await;
    }

    #[tokio::test]
    async fn stop_is_single_shot_and_idempotent() {
        let engine = Engine::new(false);
        engine.scan(UNROUTABLE_CIDR, 2).await.unwrap();
        engine.stop().await;
        engine.stop().await; // second call must not panic
    }

    #[tokio::test]
    async fn cancellation_reconciles_scanned_with_total() {
        let engine = Engine::new(false);
        engine.scan(UNROUTABLE_CIDR, 2).await.unwrap();
        let (_results, mut done_rx) = engine.results();
        engine.stop().await;
        wait_for_done(&mut done_rx, Duration::from_secs(15)).await;

        let snapshot = engine.stats();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.scanned, snapshot.total);
    }

    #[tokio::test]
    async fn cancellation_during_enumeration_still_records_every_host() {
        use std::collections::BTreeMap;
        use std::sync::atomic::Ordering;
        use std::sync::{Arc, RwLock};
        use std::time::Instant;

        // A /24 (254 hosts) with a single worker: cancelling right away
        // guarantees the producer is still mid-enumeration and most hosts
        // were never even sent into the work channel, unlike the 2-host
        // CIDR above where every host is already in flight by the time
        // `stop` is called.
        let hosts = netutils::expand_cidr("203.0.113.0/24").unwrap();
        let total = hosts.len();

        let device_map: coordinator::DeviceMap = Arc::new(RwLock::new(BTreeMap::new()));
        let worker_stats: coordinator::WorkerStatsMap = Arc::new(RwLock::new(BTreeMap::new()));
        let counters = Arc::new(coordinator::Counters::default());

        let (handle, _results_rx) = coordinator::spawn_scan(
            hosts,
            1,
            device_map.clone(),
            worker_stats.clone(),
            counters.clone(),
            Instant::now(),
            None,
        );
        handle.cancel.cancel();

        let mut done_rx = handle.done_rx.clone();
        wait_for_done(&mut done_rx, Duration::from_secs(15)).await;

        assert_eq!(device_map.read().unwrap().len(), total);
        assert_eq!(counters.scanned.load(Ordering::Acquire), total as u64);
    }

    #[tokio::test]
    async fn scan_may_be_reused_after_completion() {
        let engine = Engine::new(false);
        engine.scan(UNROUTABLE_CIDR, 2).await.unwrap();
        let (_results, mut done_rx) = engine.results();
        engine.stop().await;
        wait_for_done(&mut done_rx, Duration::from_secs(15)).await;

        // A new scan is accepted once the prior one's done signal fired.
        engine.scan(UNROUTABLE_CIDR, 2).await.unwrap();
        engine.stop().await;
    }
}
