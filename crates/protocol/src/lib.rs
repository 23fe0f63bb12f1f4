//! Message and USB value types for the tablet driver daemon
//!
//! This crate defines the values exchanged between the driver core and the
//! rest of the daemon (and, through the message bus, other processes such as
//! a configuration GUI):
//!
//! - [`Message`]: a control message routed by destination and vendor
//! - [`UsbError`]: transport errors in a form that can be logged and serialized
//!
//! # Example
//!
//! ```
//! use protocol::{Message, MessageDestination};
//!
//! let msg = Message::new(MessageDestination::Driver, 0x28bd, 0x091b, vec![0x01]);
//! assert!(msg.is_for(MessageDestination::Driver, 0x28bd));
//!
//! let reply = msg.reply(vec![0x02]);
//! assert_eq!(reply.destination, MessageDestination::Gui);
//! assert_eq!(reply.device, 0x091b);
//! ```

pub mod messages;
pub mod types;

pub use messages::{Message, MessageDestination};
pub use types::{ProductId, UsbError, VendorId};
