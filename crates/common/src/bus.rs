//! Message bus
//!
//! The bus carries control messages between vendor drivers and whatever
//! front-end talks to the daemon. Reads are destructive: a message returned by
//! [`MessageBus::get_messages_for`] belongs to the caller and is gone from the
//! bus.

use protocol::{Message, MessageDestination, VendorId};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// A process-wide message bus
pub trait MessageBus {
    /// Remove and return every pending message addressed to
    /// `destination` for `vendor`, oldest first
    fn get_messages_for(&self, destination: MessageDestination, vendor: VendorId) -> Vec<Message>;

    /// Publish a message
    fn add_message(&self, message: Message);
}

/// In-process FIFO message bus
///
/// Safe to share between threads behind an `Arc`.
#[derive(Debug, Default)]
pub struct MessageQueue {
    queue: Mutex<VecDeque<Message>>,
}

impl MessageQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently queued, for every destination
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue holds no messages
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of queued messages addressed to `destination` for `vendor`
    pub fn pending_for(&self, destination: MessageDestination, vendor: VendorId) -> usize {
        self.lock()
            .iter()
            .filter(|msg| msg.is_for(destination, vendor))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        // A panicking publisher cannot leave the deque half-updated.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageBus for MessageQueue {
    fn get_messages_for(&self, destination: MessageDestination, vendor: VendorId) -> Vec<Message> {
        let mut queue = self.lock();
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());

        for msg in queue.drain(..) {
            if msg.is_for(destination, vendor) {
                taken.push(msg);
            } else {
                kept.push_back(msg);
            }
        }
        *queue = kept;

        if !taken.is_empty() {
            trace!(
                "Took {} message(s) for {:?}/{:#06x}",
                taken.len(),
                destination,
                vendor
            );
        }
        taken
    }

    fn add_message(&self, message: Message) {
        self.lock().push_back(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(destination: MessageDestination, vendor: VendorId, device: u16) -> Message {
        Message::new(destination, vendor, device, vec![])
    }

    #[test]
    fn test_get_messages_is_destructive() {
        let bus = MessageQueue::new();
        bus.add_message(msg(MessageDestination::Driver, 0x28bd, 1));
        bus.add_message(msg(MessageDestination::Driver, 0x28bd, 2));

        let first = bus.get_messages_for(MessageDestination::Driver, 0x28bd);
        assert_eq!(first.len(), 2);
        assert!(bus.get_messages_for(MessageDestination::Driver, 0x28bd).is_empty());
        assert!(bus.is_empty());
    }

    #[test]
    fn test_get_messages_filters_and_keeps_order() {
        let bus = MessageQueue::new();
        bus.add_message(msg(MessageDestination::Driver, 0x28bd, 1));
        bus.add_message(msg(MessageDestination::Gui, 0x28bd, 2));
        bus.add_message(msg(MessageDestination::Driver, 0x256c, 3));
        bus.add_message(msg(MessageDestination::Driver, 0x28bd, 4));

        let taken = bus.get_messages_for(MessageDestination::Driver, 0x28bd);
        let devices: Vec<u16> = taken.iter().map(|m| m.device).collect();
        assert_eq!(devices, vec![1, 4]);

        assert_eq!(bus.len(), 2);
        assert_eq!(bus.pending_for(MessageDestination::Gui, 0x28bd), 1);
        assert_eq!(bus.pending_for(MessageDestination::Driver, 0x256c), 1);
    }

    #[test]
    fn test_shared_between_threads() {
        let bus = std::sync::Arc::new(MessageQueue::new());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        bus.add_message(msg(MessageDestination::Driver, 0x28bd, i * 100 + j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            bus.get_messages_for(MessageDestination::Driver, 0x28bd).len(),
            100
        );
    }
}
