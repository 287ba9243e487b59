//! Operator-facing CLI for the Network Discovery Engine (§6).
//!
//! Parses the CIDR and worker-count arguments, wires up structured logging
//! (stderr always, `debug.log` additionally under `--debug`), starts a scan
//! through the `discovery::Engine` API, and prints progress lines and
//! discovered devices until the engine signals completion. `Ctrl+C` is a
//! single cooperative cancellation, not a hard process exit.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use discovery::{Device, Engine};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Network Discovery Engine: enumerate a CIDR range and probe every host.
#[derive(Parser, Debug)]
#[command(name = "nde", version, about)]
struct Cli {
    /// CIDR range to scan, e.g. 192.168.1.0/24
    cidr: String,

    /// Number of concurrent worker tasks in the pool
    #[arg(long, default_value_t = 50)]
    workers: usize,

    /// Enable the append-only report.log and a debug.log file alongside it
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    // The appender guard must outlive the run; dropping it flushes and
    // closes the non-blocking writer on exit.
    let _debug_log_guard = init_tracing(cli.debug);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!(error = %e, "scan failed to start");
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(debug: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nde=info,discovery=info,netutils=info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if debug {
        let file_appender = tracing_appender::rolling::never(".", "debug.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(filter).with(stderr_layer).init();
        None
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!(cidr = %cli.cidr, workers = cli.workers, debug = cli.debug, "starting scan");

    let engine = Engine::new(cli.debug);
    engine
        .scan(&cli.cidr, cli.workers)
        .await
        .with_context(|| format!("could not start scan of {}", cli.cidr))?;

    let (mut results, mut done_rx) = engine.results();

    let stop_engine = {
        let engine = &engine;
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling scan");
                engine.stop().await;
            }
        }
    };
    tokio::pin!(stop_engine);

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let mut discovered_total = 0u64;
    let mut ctrl_c_seen = false;

    loop {
        tokio::select! {
            biased;

            changed = done_rx.changed() => {
                if changed.is_err() || *done_rx.borrow() {
                    break;
                }
            }
            _ = &mut stop_engine, if !ctrl_c_seen => {
                ctrl_c_seen = true;
            }
            device = results.recv() => {
                match device {
                    Some(d) => {
                        discovered_total += 1;
                        print_device(&d);
                    }
                    None => {}
                }
            }
            _ = ticker.tick() => {
                print_progress(&engine);
            }
        }
    }

    // Drain anything still buffered after the done signal fired.
    while let Ok(d) = results.try_recv() {
        discovered_total += 1;
        print_device(&d);
    }

    let snapshot = engine.stats();
    info!(
        scanned = snapshot.scanned,
        total = snapshot.total,
        discovered = discovered_total,
        "scan complete"
    );
    Ok(())
}

fn print_progress(engine: &Engine) {
    let s = engine.stats();
    eprintln!(
        "scanned {}/{} total, {} discovered, {} workers active",
        s.scanned,
        s.total,
        s.discovered,
        s.worker_stats.len()
    );
}

fn print_device(device: &Device) {
    let hostname = device.hostnames.first().cloned().unwrap_or_default();
    let mut vendor = device.vendor.clone();
    if vendor.is_empty() || vendor == "Unknown Vendor" {
        if let Some(hint) = hostname_vendor_hint(&hostname, &device.mdns_name) {
            vendor = format!("{vendor} ({hint})").trim().to_string();
        }
    }
    let ports = device
        .open_ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    println!(
        "{:<15} {:<20} {:<20} {:<8} {}",
        device.ip, hostname, vendor, device.mac, ports
    );
}

fn hostname_vendor_hint(hostname: &str, mdns_name: &str) -> Option<String> {
    enrich::vendor_from_hostname(hostname).or_else(|| enrich::vendor_from_hostname(mdns_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cidr_and_defaults() {
        let cli = Cli::try_parse_from(["nde", "192.168.1.0/24"]).unwrap();
        assert_eq!(cli.cidr, "192.168.1.0/24");
        assert_eq!(cli.workers, 50);
        assert!(!cli.debug);
    }

    #[test]
    fn parses_workers_and_debug_flags() {
        let cli = Cli::try_parse_from(["nde", "10.0.0.0/24", "--workers", "16", "--debug"]).unwrap();
        assert_eq!(cli.workers, 16);
        assert!(cli.debug);
    }

    #[test]
    fn rejects_missing_cidr() {
        assert!(Cli::try_parse_from(["nde"]).is_err());
    }
}
