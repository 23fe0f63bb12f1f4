//! rusb-backed transport
//!
//! rusb only exposes synchronous transfers, so every armed transfer is a
//! reader thread polling the interface's interrupt IN endpoint with a short
//! timeout. Cancelling a transfer clears its `wanted` flag and joins the
//! reader, so at most one reader polls an endpoint and no reader outlives
//! the release of its handle.

use super::device::UsbDevice;
use async_channel::Sender;
use common::{ClaimedInterface, ProductDescriptor, TransferCompletion, TransferId, Transport};
use protocol::UsbError;
use rusb::{Context, DeviceHandle, Direction, TransferType};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Poll timeout of a reader thread, and the longest a cancel waits for it
const READ_POLL: Duration = Duration::from_millis(20);

/// Base address of the interrupt IN endpoints
const ENDPOINT_IN: u8 = 0x80;

/// A running reader thread
#[derive(Debug)]
pub struct ReaderTransfer {
    id: TransferId,
    wanted: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// [`Transport`] implementation on top of rusb
#[derive(Clone)]
pub struct UsbTransport {
    completions: Sender<TransferCompletion>,
}

impl UsbTransport {
    /// Create a transport delivering transfer completions to `completions`
    pub fn new(completions: Sender<TransferCompletion>) -> Self {
        Self { completions }
    }

    fn open_and_claim(
        device: &UsbDevice,
        handle: &DeviceHandle<Context>,
    ) -> Result<(u8, u16), rusb::Error> {
        let config = device.raw().active_config_descriptor()?;
        let (interface_number, max_packet_size) =
            find_report_interface(&config).ok_or(rusb::Error::NotFound)?;

        match handle.kernel_driver_active(interface_number) {
            Ok(true) => {
                debug!(
                    "Detaching kernel driver from interface {} on {:?}",
                    interface_number, device
                );
                handle.detach_kernel_driver(interface_number)?;
            }
            Ok(false) => {}
            Err(e) => debug!(
                "Could not check kernel driver status for interface {}: {}",
                interface_number, e
            ),
        }

        let active = handle.active_configuration()?;
        if active != config.number() {
            handle.set_active_configuration(config.number())?;
        }

        handle.claim_interface(interface_number)?;
        Ok((interface_number, max_packet_size))
    }
}

/// Last interface with an interrupt IN endpoint, and that endpoint's packet size
fn find_report_interface(config: &rusb::ConfigDescriptor) -> Option<(u8, u16)> {
    let mut found = None;

    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            let endpoint = descriptor.endpoint_descriptors().find(|ep| {
                ep.direction() == Direction::In && ep.transfer_type() == TransferType::Interrupt
            });
            if let Some(ep) = endpoint {
                found = Some((descriptor.interface_number(), ep.max_packet_size()));
            }
        }
    }

    found
}

impl Transport for UsbTransport {
    type Device = UsbDevice;
    type Handle = Arc<DeviceHandle<Context>>;
    type Transfer = ReaderTransfer;

    fn claim(
        &self,
        device: &UsbDevice,
        descriptor: &ProductDescriptor,
    ) -> Result<ClaimedInterface<Self::Handle>, UsbError> {
        let handle = device.raw().open().map_err(map_rusb_error)?;

        match Self::open_and_claim(device, &handle) {
            Ok((interface_number, max_packet_size)) => {
                debug!(
                    "Claimed interface {} of {:04x}:{:04x} ({} byte packets)",
                    interface_number,
                    descriptor.vendor_id,
                    descriptor.product_id,
                    max_packet_size
                );
                Ok(ClaimedInterface {
                    handle: Arc::new(handle),
                    interface_number,
                    max_packet_size,
                })
            }
            Err(e) => {
                // The handle is dropped here; give the interfaces back to the kernel first.
                if let Ok(config) = device.raw().active_config_descriptor() {
                    for interface in config.interfaces() {
                        let _ = handle.attach_kernel_driver(interface.number());
                    }
                }
                Err(map_rusb_error(e))
            }
        }
    }

    fn release(&self, claimed: ClaimedInterface<Self::Handle>) {
        let interface = claimed.interface_number;

        if let Err(e) = claimed.handle.release_interface(interface) {
            warn!("Failed to release interface {}: {}", interface, e);
        }

        if let Err(e) = claimed.handle.attach_kernel_driver(interface) {
            debug!(
                "Could not reattach kernel driver to interface {}: {}",
                interface, e
            );
        }
    }

    fn submit_transfer(
        &self,
        id: TransferId,
        handle: &Self::Handle,
        interface_number: u8,
        max_packet_size: u16,
    ) -> Result<ReaderTransfer, UsbError> {
        let wanted = Arc::new(AtomicBool::new(true));
        let reader = Reader {
            id,
            handle: handle.clone(),
            endpoint: ENDPOINT_IN | interface_number,
            packet_size: usize::from(max_packet_size.max(1)),
            wanted: wanted.clone(),
            completions: self.completions.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("usb-reader-{}", id.0))
            .spawn(move || reader.run())
            .map_err(|e| UsbError::Other {
                message: format!("Failed to spawn reader thread: {}", e),
            })?;

        Ok(ReaderTransfer { id, wanted, thread })
    }

    fn cancel_transfer(&self, transfer: ReaderTransfer) {
        trace!("Cancelling transfer {:?}", transfer.id);
        transfer.wanted.store(false, Ordering::Release);
        if transfer.thread.join().is_err() {
            warn!("Reader for transfer {:?} panicked", transfer.id);
        }
    }

    fn write_interrupt(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        handle
            .write_interrupt(endpoint, data, timeout)
            .map_err(map_rusb_error)
    }
}

struct Reader {
    id: TransferId,
    handle: Arc<DeviceHandle<Context>>,
    endpoint: u8,
    packet_size: usize,
    wanted: Arc<AtomicBool>,
    completions: Sender<TransferCompletion>,
}

impl Reader {
    fn run(self) {
        let mut buffer = vec![0u8; self.packet_size];

        while self.wanted.load(Ordering::Acquire) {
            let result = match self.handle.read_interrupt(self.endpoint, &mut buffer, READ_POLL) {
                Ok(len) => Ok(buffer[..len].to_vec()),
                Err(rusb::Error::Timeout) | Err(rusb::Error::Interrupted) => continue,
                Err(e) => Err(map_rusb_error(e)),
            };

            let terminal = result.is_err();
            let completion = TransferCompletion {
                id: self.id,
                result,
            };
            if self.completions.send_blocking(completion).is_err() || terminal {
                break;
            }
        }

        trace!("Reader for transfer {:?} stopped", self.id);
    }
}

/// Map rusb error to protocol UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}
