//! USB subsystem
//!
//! The rusb implementation of the driver's transport, plus the worker thread
//! that owns the libusb context. USB operations run on that dedicated thread
//! and talk to the Tokio runtime over async channels.

pub mod device;
pub mod transport;
pub mod worker;

pub use device::{DeviceSummary, UsbDevice, list_devices};
pub use transport::{UsbTransport, map_rusb_error};
pub use worker::{DriverWorkerThread, spawn_driver_worker};
