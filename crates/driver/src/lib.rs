//! Tablet driver core
//!
//! Vendor-level dispatch and device lifecycle for the userspace tablet driver
//! daemon. A [`VendorHandler`](vendor::VendorHandler) owns the per-model
//! [`ProductHandler`](product::ProductHandler)s of one USB vendor, claims
//! devices as they are plugged in, and runs the drain cycle that cancels
//! report transfers, delivers control messages and re-arms the transfers.
//!
//! # Example
//! ```
//! use common::test_utils::{MockDevice, MockTransport};
//! use common::{MessageQueue, MessageBus, ProductDescriptor};
//! use driver::product::ConfiguredProduct;
//! use driver::vendor::VendorHandlerBuilder;
//! use protocol::{Message, MessageDestination};
//!
//! let mut vendor = VendorHandlerBuilder::new(0x28bd, "XP-Pen")
//!     .handler(ConfiguredProduct::new().with_product(0x091b, "Artist 22R Pro"))
//!     .build(MockTransport::new())
//!     .unwrap();
//!
//! vendor
//!     .handle_product_attach(MockDevice(1), &ProductDescriptor::new(0x28bd, 0x091b))
//!     .unwrap();
//!
//! let bus = MessageQueue::new();
//! bus.add_message(Message::new(MessageDestination::Driver, 0x28bd, 0x091b, vec![1]));
//! let summary = vendor.handle_messages(&bus);
//! assert_eq!(summary.handled, 1);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod product;
pub mod registry;
pub mod usb;
pub mod vendor;

pub use error::{DriverError, Result};
