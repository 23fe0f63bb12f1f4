//! USB value types
//!
//! Identifiers and error conditions shared by every crate in the workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// USB vendor identifier
pub type VendorId = u16;

/// USB product identifier
pub type ProductId = u16;

/// USB error codes
///
/// Transport failures reduced to the cases the driver core distinguishes.
/// rusb errors are mapped onto these by the USB layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
pub enum UsbError {
    /// Transfer timed out
    #[error("operation timed out")]
    Timeout,
    /// Endpoint stalled (protocol error)
    #[error("endpoint stalled")]
    Pipe,
    /// Device was disconnected
    #[error("device disconnected")]
    NoDevice,
    /// Device or endpoint not found
    #[error("entity not found")]
    NotFound,
    /// Device or interface is busy (e.g. still claimed by a kernel driver)
    #[error("resource busy")]
    Busy,
    /// Buffer overflow
    #[error("overflow")]
    Overflow,
    /// I/O error
    #[error("input/output error")]
    Io,
    /// Invalid parameter
    #[error("invalid parameter")]
    InvalidParam,
    /// Access denied (permissions)
    #[error("access denied")]
    Access,
    /// Other error with message
    #[error("{message}")]
    Other { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_error_display() {
        assert_eq!(UsbError::Busy.to_string(), "resource busy");
        let other = UsbError::Other {
            message: "weird".to_string(),
        };
        assert_eq!(other.to_string(), "weird");
    }
}
