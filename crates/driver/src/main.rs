//! Tablet driver daemon
//!
//! Claims supported tablets as they are plugged in and keeps their report
//! transfers running while control messages are delivered to the per-model
//! handlers.

use anyhow::{Context, Result};
use clap::Parser;
use common::{DriverBridge, DriverCommand, DriverEvent, create_driver_bridge, setup_logging};
use driver::config::{self, DaemonConfig};
use driver::usb::{list_devices, spawn_driver_worker};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tablet-driver-daemon")]
#[command(author, version, about = "Userspace tablet driver daemon")]
#[command(long_about = "
Userspace driver daemon for graphics tablets. Claims supported tablets from the
kernel, sends them their initialization command and keeps their report
transfers running.

EXAMPLES:
    # Run with default config
    tablet-driver-daemon

    # Run with custom config
    tablet-driver-daemon --config ~/tablets.toml

    # List USB devices and exit
    tablet-driver-daemon --list-devices

    # Run with debug logging
    tablet-driver-daemon --log-level debug

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/tablet-driver/daemon.toml
    3. /etc/tablet-driver/daemon.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = DaemonConfig::default();
        let path = DaemonConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        DaemonConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("Tablet driver daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if args.list_devices {
        return list_devices_mode(&config);
    }

    let (bridge, worker) = create_driver_bridge();
    let worker_handle =
        spawn_driver_worker(worker, config.clone()).context("Failed to spawn USB worker thread")?;

    let result = run(bridge.clone()).await;

    info!("Shutting down USB subsystem...");
    if let Err(e) = bridge.send_command(DriverCommand::Shutdown).await {
        error!("Error shutting down USB worker: {:#}", e);
    }

    match worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB worker failed: {:#}", e),
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }

    result
}

/// List USB devices and exit
fn list_devices_mode(config: &DaemonConfig) -> Result<()> {
    let context = rusb::Context::new().context("Failed to create USB context")?;
    let devices = list_devices(&context).context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for device in devices {
        let supported = device.vendor_id == config.vendor.vendor_id
            && config.products.iter().any(|p| p.id == device.product_id);
        println!(
            "  {:04x}:{:04x} - {}{}",
            device.vendor_id,
            device.product_id,
            device.product.as_deref().unwrap_or("Unknown Product"),
            if supported { " [supported]" } else { "" }
        );
        println!(
            "      Bus {:03} Device {:03}",
            device.bus_number, device.device_address
        );
    }

    Ok(())
}

/// Log driver events until Ctrl+C or the worker goes away
async fn run(bridge: DriverBridge) -> Result<()> {
    info!("Press Ctrl+C to shutdown");

    loop {
        tokio::select! {
            signal = signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                return Ok(());
            }
            event = bridge.recv_event() => match event {
                Ok(event) => log_event(&event),
                Err(e) => {
                    warn!("USB worker stopped: {}", e);
                    return Ok(());
                }
            },
        }
    }
}

fn log_event(event: &DriverEvent) {
    match event {
        DriverEvent::DeviceAttached { device } => info!(
            "{} ({:04x}:{:04x}) ready",
            device.name, device.vendor_id, device.product_id
        ),
        DriverEvent::DeviceDetached {
            vendor_id,
            product_id,
        } => info!("{:04x}:{:04x} unplugged", vendor_id, product_id),
        DriverEvent::AttachAbandoned {
            vendor_id,
            product_id,
        } => warn!(
            "{:04x}:{:04x} could not be claimed, unplug and replug it to retry",
            vendor_id, product_id
        ),
        DriverEvent::GuiMessage { message } => info!(
            "Message for GUI from {:04x}:{:04x} ({} bytes)",
            message.vendor,
            message.device,
            message.payload.len()
        ),
    }
}
