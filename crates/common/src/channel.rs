//! Async channel bridge between the Tokio runtime and the USB worker thread

use async_channel::{Receiver, Sender, bounded};
use protocol::{Message, ProductId, VendorId};

/// Commands from Tokio runtime to the USB worker thread
#[derive(Debug)]
pub enum DriverCommand {
    /// Read the configuration tree of a vendor
    GetConfig {
        /// Vendor to query
        vendor_id: VendorId,
        /// Channel to send response back (`None` for an unknown vendor)
        response: tokio::sync::oneshot::Sender<Option<serde_json::Value>>,
    },

    /// Replace the configuration tree of a vendor
    SetConfig {
        /// Vendor to configure
        vendor_id: VendorId,
        /// New configuration tree
        config: serde_json::Value,
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<crate::Result<()>>,
    },

    /// List the tablets currently claimed by the daemon
    ListConnected {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Vec<ConnectedDevice>>,
    },

    /// Put a message on the daemon's message bus
    PostMessage {
        /// Message to publish
        message: Message,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

/// A tablet currently managed by the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedDevice {
    /// USB Vendor ID
    pub vendor_id: VendorId,
    /// USB Product ID
    pub product_id: ProductId,
    /// Product display name
    pub name: String,
}

/// Events from the USB worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A tablet was claimed and is reporting
    DeviceAttached {
        /// The claimed tablet
        device: ConnectedDevice,
    },

    /// A claimed tablet was unplugged
    DeviceDetached {
        /// USB Vendor ID
        vendor_id: VendorId,
        /// USB Product ID
        product_id: ProductId,
    },

    /// A supported tablet could not be claimed after every retry
    AttachAbandoned {
        /// USB Vendor ID
        vendor_id: VendorId,
        /// USB Product ID
        product_id: ProductId,
    },

    /// A product handler published a message for the GUI
    GuiMessage {
        /// The published message
        message: Message,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct DriverBridge {
    cmd_tx: Sender<DriverCommand>,
    event_rx: Receiver<DriverEvent>,
}

impl DriverBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: DriverCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the USB thread
    pub async fn recv_event(&self) -> crate::Result<DriverEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for USB thread (blocking)
pub struct DriverWorker {
    pub(crate) cmd_rx: Receiver<DriverCommand>,
    /// Event sender (public for the USB worker thread to access)
    pub event_tx: Sender<DriverEvent>,
}

impl DriverWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<DriverCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<DriverCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Send an event to Tokio runtime without blocking
    ///
    /// Events are informational; when nobody drains them the oldest
    /// information is simply lost instead of stalling the USB thread.
    pub fn send_event(&self, event: DriverEvent) -> crate::Result<()> {
        self.event_tx
            .try_send(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and the USB thread
///
/// Returns (DriverBridge for Tokio, DriverWorker for USB thread)
pub fn create_driver_bridge() -> (DriverBridge, DriverWorker) {
    let (cmd_tx, cmd_rx) = bounded(256);
    let (event_tx, event_rx) = bounded(256);

    (
        DriverBridge { cmd_tx, event_rx },
        DriverWorker { cmd_rx, event_tx },
    )
}
