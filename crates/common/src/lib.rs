//! Common utilities for the tablet driver daemon
//!
//! This crate provides the pieces shared between the driver core and the
//! daemon binary: error handling, logging setup, the message bus, the
//! transport abstraction the core drives, and the channel bridge between the
//! Tokio runtime and the USB worker thread.

pub mod bus;
pub mod channel;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;

pub use bus::{MessageBus, MessageQueue};
pub use channel::{
    ConnectedDevice, DriverBridge, DriverCommand, DriverEvent, DriverWorker, create_driver_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use transport::{
    ClaimedInterface, ProductDescriptor, TransferCompletion, TransferId, Transport,
};
