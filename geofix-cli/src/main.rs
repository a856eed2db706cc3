//! GeoFix CLI — exercises the coordinator against a simulated provider.
//!
//! The simulated provider emits a slowly drifting fix; the CLI dispatches
//! the boundary commands through the bridge and prints each wire message
//! as JSON, which makes the one-shot/watch semantics easy to eyeball.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use geofix::bridge::{encode_delivery, CommandBridge};
use geofix::config::CoordinatorConfig;
use geofix::coordinator::LocationRequestCoordinator;
use geofix::permission::{PermissionGate, StaticPermissionGate};
use geofix::provider::{LocationProvider, SimulatedProvider};
use geofix::sample::{now_ms, LocationSample};
use geofix::sink::ChannelSink;

#[derive(Parser)]
#[command(name = "geofix", about = "Location request coordination demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request a single fix (getLocation).
    Get {
        /// Acceptable staleness of a cached fix, in milliseconds.
        #[arg(long, default_value_t = 0)]
        max_age_ms: u64,

        /// Preferred provider name.
        #[arg(long, default_value = "gps")]
        provider: String,
    },

    /// Register a watch and stream fixes until the count is reached.
    Watch {
        /// Watch id.
        #[arg(long, default_value = "cli-watch")]
        id: String,

        /// Number of updates to print before clearing the watch.
        #[arg(long, default_value_t = 5)]
        updates: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _logging = geofix::logging::init_logging("logs", "geofix.log")
        .expect("failed to initialize logging");

    let provider = Arc::new(SimulatedProvider::new());
    let coordinator = Arc::new(LocationRequestCoordinator::new(
        Arc::clone(&provider) as Arc<dyn LocationProvider>,
        Arc::new(StaticPermissionGate::new(true)) as Arc<dyn PermissionGate>,
        CoordinatorConfig::default(),
    ));
    let bridge = CommandBridge::new(Arc::clone(&coordinator));

    spawn_drift(Arc::clone(&provider));

    match cli.command {
        Command::Get {
            max_age_ms,
            provider: name,
        } => {
            let (sink, mut rx) = ChannelSink::new();
            if let Err(err) = bridge.execute(
                "getLocation",
                &json!([max_age_ms, name]),
                sink,
            ) {
                eprintln!("error: {err}");
                return;
            }
            if let Some(delivery) = rx.recv().await {
                print_wire(&delivery);
            }
        }

        Command::Watch { id, updates } => {
            let (sink, mut rx) = ChannelSink::new();
            if let Err(err) = bridge.execute("addWatch", &json!([id]), sink) {
                eprintln!("error: {err}");
                return;
            }
            let mut seen = 0;
            while seen < updates {
                match rx.recv().await {
                    Some(delivery) => {
                        print_wire(&delivery);
                        seen += 1;
                    }
                    None => break,
                }
            }
            let (ack_sink, mut ack_rx) = ChannelSink::new();
            bridge
                .execute("clearWatch", &json!([id]), ack_sink)
                .expect("clearWatch never fails");
            let _ = ack_rx.recv().await;
            tracing::info!(updates = seen, "watch cleared");
        }
    }

    coordinator.shutdown();
}

/// Emit a fix drifting north-east every 500ms, starting near Hamburg.
fn spawn_drift(provider: Arc<SimulatedProvider>) {
    tokio::spawn(async move {
        let mut lat = 53.5511;
        let mut lon = 9.9937;
        loop {
            lat += 0.0005;
            lon += 0.0003;
            provider.push_update(
                LocationSample::new(lat, lon, 8.0, now_ms())
                    .with_bearing(31.0)
                    .with_speed(42.0)
                    .with_altitude(120.0),
            );
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });
}

fn print_wire(delivery: &geofix::sink::Delivery) {
    println!("{}", encode_delivery(delivery));
}
