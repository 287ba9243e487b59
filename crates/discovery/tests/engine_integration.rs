//! End-to-end integration test: a real loopback listener, driven through the
//! full `Engine` API rather than any single component in isolation. Mirrors
//! the shape of the teacher's own `portscan_integration.rs`, which also binds
//! a local listener and drives the scan path against it directly.

use std::net::{Ipv4Addr, TcpListener};
use std::thread;
use std::time::Duration;

use discovery::{DeviceStatus, Engine};

#[tokio::test]
async fn scan_discovers_local_listener_on_standard_port() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 8080)).expect("bind 8080");
    let accept_thread = thread::spawn(move || {
        let _ = listener.accept();
    });

    let engine = Engine::new(false);
    engine
        .scan("127.0.0.1/32", 1)
        .await
        .expect("loopback /32 is a valid CIDR");

    let (mut results, mut done_rx) = engine.results();

    let mut found = None;
    let drain = async {
        while let Some(device) = results.recv().await {
            found = Some(device);
        }
    };
    let wait_done = async {
        while !*done_rx.borrow() {
            if done_rx.changed().await.is_err() {
                break;
            }
        }
    };

    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(drain, wait_done)
    })
    .await;

    accept_thread.join().ok();

    let snapshot = engine.stats();
    assert_eq!(snapshot.total, 1);
    assert_eq!(snapshot.scanned, 1);

    let device = found.expect("loopback host is Up and delivered on the results stream");
    assert_eq!(device.ip, "127.0.0.1");
    assert_eq!(device.status, DeviceStatus::Up);
    assert!(device.open_ports.contains(&8080));
    assert!(device.open_ports.windows(2).all(|w| w[0] < w[1]));
}
