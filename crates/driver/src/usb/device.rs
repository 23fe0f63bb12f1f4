//! USB device identity
//!
//! Wraps `rusb::Device` so it can serve as the transport's device key. Two
//! wrappers are equal when they sit at the same bus address.

use common::ProductDescriptor;
use rusb::{Context, Device, UsbContext};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A USB device seen by the daemon
#[derive(Clone)]
pub struct UsbDevice {
    device: Device<Context>,
}

impl UsbDevice {
    pub fn new(device: Device<Context>) -> Self {
        Self { device }
    }

    pub fn bus_number(&self) -> u8 {
        self.device.bus_number()
    }

    pub fn device_address(&self) -> u8 {
        self.device.address()
    }

    /// Vendor and product id from the device descriptor
    pub fn descriptor(&self) -> Result<ProductDescriptor, rusb::Error> {
        let desc = self.device.device_descriptor()?;
        Ok(ProductDescriptor::new(desc.vendor_id(), desc.product_id()))
    }

    pub fn raw(&self) -> &Device<Context> {
        &self.device
    }

    fn key(&self) -> (u8, u8) {
        (self.bus_number(), self.device_address())
    }
}

impl PartialEq for UsbDevice {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for UsbDevice {}

impl Hash for UsbDevice {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.key().hash(state);
    }
}

impl fmt::Debug for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03}",
            self.bus_number(),
            self.device_address()
        )
    }
}

/// One line of `--list-devices` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub bus_number: u8,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
}

/// Enumerate every device currently on the bus
pub fn list_devices<C: UsbContext>(context: &C) -> Result<Vec<DeviceSummary>, rusb::Error> {
    let mut summaries = Vec::new();

    for device in context.devices()?.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        let product = device
            .open()
            .ok()
            .and_then(|handle| handle.read_product_string_ascii(&desc).ok());

        summaries.push(DeviceSummary {
            bus_number: device.bus_number(),
            device_address: device.address(),
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            product,
        });
    }

    Ok(summaries)
}
