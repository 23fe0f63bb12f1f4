//! USB transport abstraction
//!
//! The driver core never talks to libusb directly. It drives a [`Transport`],
//! which the daemon implements on top of rusb and tests implement with
//! `test_utils::MockTransport` (behind the `test-utils` feature).

use protocol::{ProductId, UsbError, VendorId};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

/// Identifier of one submitted asynchronous transfer
///
/// Allocated by the caller of [`Transport::submit_transfer`]; completions
/// carry it back so stale completions can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub u64);

/// The part of a device descriptor used for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProductDescriptor {
    /// USB Vendor ID
    pub vendor_id: VendorId,
    /// USB Product ID
    pub product_id: ProductId,
}

impl ProductDescriptor {
    pub fn new(vendor_id: VendorId, product_id: ProductId) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

/// An opened device with one claimed interface
#[derive(Debug, Clone)]
pub struct ClaimedInterface<H> {
    /// Open device handle
    pub handle: H,
    /// Claimed interface number
    pub interface_number: u8,
    /// Max packet size of the interface's interrupt IN endpoint
    pub max_packet_size: u16,
}

/// Result of an asynchronous transfer, delivered from the transport's
/// completion context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCompletion {
    /// Transfer this completion belongs to
    pub id: TransferId,
    /// Report bytes, or the error that ended the transfer
    pub result: Result<Vec<u8>, UsbError>,
}

/// Transport layer consumed by the driver core
pub trait Transport {
    /// Opaque device identity, used as a lookup key only
    type Device: Clone + Eq + Hash + Debug;
    /// Open device handle
    type Handle: Clone;
    /// A submitted asynchronous transfer
    type Transfer;

    /// Open the device, detach any kernel driver, select the configuration
    /// and claim the reporting interface.
    ///
    /// On failure nothing acquired during the attempt may remain held.
    fn claim(
        &self,
        device: &Self::Device,
        descriptor: &ProductDescriptor,
    ) -> Result<ClaimedInterface<Self::Handle>, UsbError>;

    /// Release the claimed interface and close the handle
    fn release(&self, claimed: ClaimedInterface<Self::Handle>);

    /// Start an asynchronous interrupt IN transfer on `interface_number`
    fn submit_transfer(
        &self,
        id: TransferId,
        handle: &Self::Handle,
        interface_number: u8,
        max_packet_size: u16,
    ) -> Result<Self::Transfer, UsbError>;

    /// Request cancellation. A completion may still arrive afterwards.
    fn cancel_transfer(&self, transfer: Self::Transfer);

    /// Synchronous interrupt OUT write, returning the number of bytes sent
    fn write_interrupt(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;
}
