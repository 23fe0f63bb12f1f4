//! USB worker thread
//!
//! Dedicated thread owning the rusb context, the hotplug registrations and
//! every vendor handler. It runs the libusb event loop with a short timeout
//! and, between rounds, applies commands, hotplug notifications, transfer
//! completions and the periodic message drain.

use super::device::UsbDevice;
use super::transport::UsbTransport;
use crate::config::DaemonConfig;
use crate::dispatch::Dispatcher;
use crate::registry::build_vendor_handler;
use anyhow::{Context as _, Result};
use async_channel::{Receiver, Sender};
use common::{DriverWorker, TransferCompletion};
use protocol::VendorId;
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timeout of one `handle_events` round
const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Hotplug notification forwarded from the libusb callback
#[derive(Debug)]
pub enum HotplugEvent {
    Arrived(UsbDevice),
    Left(UsbDevice),
}

struct HotplugCallback {
    events: Sender<HotplugEvent>,
}

impl Hotplug<Context> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        let _ = self
            .events
            .try_send(HotplugEvent::Arrived(UsbDevice::new(device)));
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        let _ = self.events.try_send(HotplugEvent::Left(UsbDevice::new(device)));
    }
}

/// Completion channel of one vendor's transport
struct CompletionSource {
    vendor_id: VendorId,
    completions: Receiver<TransferCompletion>,
}

/// USB worker thread state
pub struct DriverWorkerThread {
    context: Context,
    dispatcher: Dispatcher<UsbTransport>,
    completions: Vec<CompletionSource>,
    hotplug_rx: Receiver<HotplugEvent>,
    hotplug_tx: Sender<HotplugEvent>,
    _registrations: Vec<Registration<Context>>,
    poll_interval: Duration,
}

impl DriverWorkerThread {
    /// Create the worker, build the configured vendor and start hotplug
    pub fn new(worker: DriverWorker, config: &DaemonConfig) -> Result<Self> {
        let context = Context::new().context("Failed to create USB context")?;

        let (completion_tx, completion_rx) = async_channel::unbounded();
        let vendor = build_vendor_handler(config, UsbTransport::new(completion_tx))
            .context("Failed to build vendor handler")?;
        let vendor_id = vendor.vendor_id();

        let (hotplug_tx, hotplug_rx) = async_channel::unbounded();

        let mut thread = Self {
            context,
            dispatcher: Dispatcher::new(vec![vendor], worker),
            completions: vec![CompletionSource {
                vendor_id,
                completions: completion_rx,
            }],
            hotplug_rx,
            hotplug_tx,
            _registrations: Vec::new(),
            poll_interval: config.poll_interval(),
        };
        thread.register_hotplug()?;
        Ok(thread)
    }

    /// Register one hotplug callback per vendor, or enumerate once when the
    /// platform has no hotplug support
    fn register_hotplug(&mut self) -> Result<()> {
        let vendor_ids = self.dispatcher.vendor_ids();

        if !rusb::has_hotplug() {
            warn!("Hot-plug not supported, only devices present now are handled");
            for device in self.context.devices()?.iter() {
                let _ = self
                    .hotplug_tx
                    .try_send(HotplugEvent::Arrived(UsbDevice::new(device)));
            }
            return Ok(());
        }

        for vendor_id in vendor_ids {
            let callback = HotplugCallback {
                events: self.hotplug_tx.clone(),
            };
            let registration = HotplugBuilder::new()
                .vendor_id(vendor_id)
                .enumerate(true)
                .register(&self.context, Box::new(callback))
                .with_context(|| format!("Failed to register hot-plug for {:#06x}", vendor_id))?;
            self._registrations.push(registration);
            debug!("Hot-plug callback registered for {:#06x}", vendor_id);
        }
        Ok(())
    }

    /// Run the worker loop until a Shutdown command arrives
    pub fn run(mut self) -> Result<()> {
        info!("USB worker thread started");
        let mut last_drain = Instant::now();

        loop {
            if !self.process_commands() {
                info!("USB worker shutting down");
                break;
            }

            match self.context.handle_events(Some(EVENT_TIMEOUT)) {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => debug!("USB event handling interrupted"),
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(EVENT_TIMEOUT);
                }
            }

            self.process_hotplug();
            self.process_completions();

            if last_drain.elapsed() >= self.poll_interval {
                self.dispatcher.drain();
                last_drain = Instant::now();
            }
        }

        self.dispatcher.shutdown();
        info!("USB worker thread stopped");
        Ok(())
    }

    fn process_commands(&mut self) -> bool {
        while let Some(cmd) = self.dispatcher.worker().try_recv_command() {
            // A panicking handler must not take the USB thread down with it.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.dispatcher.handle_command(cmd)
            }));

            match result {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => error!("Panic in command handler: {:?}", e),
            }
        }
        true
    }

    fn process_hotplug(&mut self) {
        while let Ok(event) = self.hotplug_rx.try_recv() {
            match event {
                HotplugEvent::Arrived(device) => match device.descriptor() {
                    Ok(descriptor) => self.dispatcher.device_arrived(device, descriptor),
                    Err(e) => warn!("Failed to read descriptor of {:?}: {}", device, e),
                },
                HotplugEvent::Left(device) => self.dispatcher.device_left(&device),
            }
        }
    }

    fn process_completions(&mut self) {
        for source in &self.completions {
            while let Ok(completion) = source.completions.try_recv() {
                self.dispatcher.handle_completion(source.vendor_id, completion);
            }
        }
    }
}

/// Spawn the USB worker thread
///
/// The thread runs until a Shutdown command is received or setup fails.
pub fn spawn_driver_worker(
    worker: DriverWorker,
    config: DaemonConfig,
) -> std::io::Result<std::thread::JoinHandle<Result<()>>> {
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            let worker_thread = DriverWorkerThread::new(worker, &config)?;
            worker_thread.run()
        })
}
