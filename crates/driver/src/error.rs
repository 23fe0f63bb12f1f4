//! Driver core error types
//!
//! None of these stop the daemon. Each one means a single device or message
//! goes unserviced while everything else keeps running.

use protocol::{ProductId, UsbError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Attach or message for a product this vendor does not support
    #[error("Unknown product {product_id:#06x}")]
    UnrecognizedProduct { product_id: ProductId },

    /// A single claim attempt failed
    #[error("Could not claim device on attempt {attempt}: {source}")]
    ClaimFailed { attempt: u32, source: UsbError },

    /// Every claim attempt failed; the device stays unmanaged
    #[error("Giving up on product {product_id:#06x} after {attempts} attempts")]
    ClaimAbandoned { product_id: ProductId, attempts: u32 },

    /// Handshake write failed or was short
    #[error("Failed to send init key on interface {interface_number}: {reason}")]
    TransferWriteFailed { interface_number: u8, reason: String },

    /// No attached device handles the message's product
    #[error("No attached device for product {device:#06x}")]
    UnroutableMessage { device: ProductId },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::UnrecognizedProduct { product_id: 0x091b };
        assert_eq!(err.to_string(), "Unknown product 0x091b");

        let err = DriverError::ClaimFailed {
            attempt: 2,
            source: UsbError::Busy,
        };
        assert!(err.to_string().contains("attempt 2"));
        assert!(err.to_string().contains("resource busy"));
    }
}
