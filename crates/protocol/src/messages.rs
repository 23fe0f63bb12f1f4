//! Control message definitions
//!
//! Messages travel over the daemon's message bus. A message is addressed by
//! destination category and vendor; `device` carries the product identifier
//! of the addressed tablet. Responses are always new messages.

use crate::types::{ProductId, VendorId};
use serde::{Deserialize, Serialize};

/// Who a message is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDestination {
    /// A vendor driver inside the daemon
    Driver,
    /// An external configuration front-end
    Gui,
}

/// A single control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Destination category
    pub destination: MessageDestination,
    /// USB vendor identifier the message concerns
    pub vendor: VendorId,
    /// Product identifier of the addressed device
    pub device: ProductId,
    /// Opaque payload, interpreted only by the product handler
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message
    pub fn new(
        destination: MessageDestination,
        vendor: VendorId,
        device: ProductId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            destination,
            vendor,
            device,
            payload,
        }
    }

    /// Whether this message is addressed to `destination` for `vendor`
    pub fn is_for(&self, destination: MessageDestination, vendor: VendorId) -> bool {
        self.destination == destination && self.vendor == vendor
    }

    /// Build a response for the same vendor/device, addressed back to the GUI
    pub fn reply(&self, payload: Vec<u8>) -> Self {
        Self::new(MessageDestination::Gui, self.vendor, self.device, payload)
    }
}
