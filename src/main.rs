//! osc-attitude - OSC sensor receiver with attitude fusion
//!
//! Listens for OSC datagrams from the sensor rig, fuses IMU bundles into an
//! orientation and prints one JSON event per line on stdout:
//!
//! ```text
//! {"event":"rotation:data","data":{"w":1.0,"x":0.0,"y":0.0,"z":0.0}}
//! {"event":"alidade:data","data":-1.5707964}
//! {"event":"ctrlMsg","data":{"type":"danger","msg":"No data coming from the network"}}
//! ```
//!
//! Logging goes to stderr; `RUST_LOG` overrides the configured level.

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::thread;

use clap::Parser;
use crossbeam_channel::Receiver;

use osc_attitude::config::AppConfig;
use osc_attitude::error::{LinkError, Result};
use osc_attitude::orchestrator::{Orchestrator, OutboundEvent};
use osc_attitude::{EstimatorKind, LinkSupervisor, estimator};

/// OSC sensor receiver with attitude fusion
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface address for the multicast membership
    #[arg(long)]
    local_address: Option<Ipv4Addr>,

    /// UDP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Attitude estimator
    #[arg(short, long, value_enum)]
    filter: Option<EstimatorKind>,

    /// Receive plain unicast instead of joining the multicast group
    #[arg(long)]
    unicast: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(addr) = args.local_address {
        config.link.local_address = Some(addr);
    }
    if let Some(port) = args.port {
        config.link.port = port;
    }
    if let Some(filter) = args.filter {
        config.fusion.filter = filter;
    }
    if args.unicast {
        config.link.multicast_group = None;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("osc-attitude v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        log::info!("Using config: {}", path.display());
    }

    let link_settings = config.link_settings()?;
    log::info!(
        "Estimator: {:?}, local address {}, port {}",
        config.fusion.filter,
        link_settings.local_address,
        link_settings.port
    );

    let (tx, rx) = crossbeam_channel::unbounded();
    let printer = thread::Builder::new()
        .name("event-printer".to_string())
        .spawn(move || print_events(rx))
        .map_err(LinkError::Io)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(LinkError::Io)?;

    let mut orchestrator = Orchestrator::new(
        config.orchestrator_settings(),
        estimator::build(&config.fusion),
        tx,
    );

    runtime.block_on(async {
        let mut link = LinkSupervisor::new(link_settings);
        link.init().await?;
        orchestrator
            .run(&mut link, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    log::error!("Error waiting for Ctrl-C: {}", err);
                }
                log::info!("Received shutdown signal");
            })
            .await;
        Ok::<(), LinkError>(())
    })?;

    // Dropping the orchestrator closes the channel and ends the printer
    drop(orchestrator);
    if printer.join().is_err() {
        log::error!("Event printer thread panicked");
    }

    log::info!("osc-attitude stopped");
    Ok(())
}

/// Write each event as a JSON line until the channel closes
fn print_events(rx: Receiver<OutboundEvent>) {
    let stdout = std::io::stdout();
    for event in rx {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                log::error!("Failed to serialise event: {}", err);
                continue;
            }
        };
        let mut out = stdout.lock();
        if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
            log::warn!("stdout closed, stopping event output");
            break;
        }
    }
}
