//! Test utilities for the tablet driver daemon
//!
//! Provides a transport double and helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockDevice, MockTransport};
//! use common::{ProductDescriptor, Transport};
//!
//! let transport = MockTransport::new();
//! transport.fail_next_claims(1);
//!
//! let descriptor = ProductDescriptor::new(0x28bd, 0x091b);
//! assert!(transport.claim(&MockDevice(1), &descriptor).is_err());
//! assert!(transport.claim(&MockDevice(1), &descriptor).is_ok());
//! assert_eq!(transport.open_handle_count(), 1);
//! ```

use crate::transport::{ClaimedInterface, ProductDescriptor, TransferId, Transport};
use protocol::{Message, MessageDestination, ProductId, UsbError, VendorId};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Device identity used by [`MockTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockDevice(pub u32);

/// Device handle issued by [`MockTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockHandle(pub u32);

/// How [`MockTransport::write_interrupt`] behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteBehavior {
    /// Every byte is written
    #[default]
    Complete,
    /// At most this many bytes are written
    Short(usize),
    /// The write fails with the given error
    Fail(UsbErrorKind),
}

/// Copyable subset of [`UsbError`] for configuring the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbErrorKind {
    Timeout,
    Pipe,
    NoDevice,
    Busy,
    Io,
}

impl From<UsbErrorKind> for UsbError {
    fn from(kind: UsbErrorKind) -> Self {
        match kind {
            UsbErrorKind::Timeout => UsbError::Timeout,
            UsbErrorKind::Pipe => UsbError::Pipe,
            UsbErrorKind::NoDevice => UsbError::NoDevice,
            UsbErrorKind::Busy => UsbError::Busy,
            UsbErrorKind::Io => UsbError::Io,
        }
    }
}

/// An interrupt write recorded by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub handle: MockHandle,
    pub endpoint: u8,
    pub data: Vec<u8>,
    pub timeout: Duration,
}

#[derive(Debug)]
struct MockState {
    claim_failures_remaining: u32,
    claim_attempts: u32,
    next_handle: u32,
    open_handles: HashSet<MockHandle>,
    live_transfers: HashMap<TransferId, MockHandle>,
    submitted: u32,
    cancelled: u32,
    fail_submits: bool,
    write_behavior: WriteBehavior,
    writes: Vec<RecordedWrite>,
    interface_number: u8,
    max_packet_size: u16,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            claim_failures_remaining: 0,
            claim_attempts: 0,
            next_handle: 1,
            open_handles: HashSet::new(),
            live_transfers: HashMap::new(),
            submitted: 0,
            cancelled: 0,
            fail_submits: false,
            write_behavior: WriteBehavior::Complete,
            writes: Vec::new(),
            interface_number: 2,
            max_packet_size: 64,
        }
    }
}

/// In-memory [`Transport`] with failure injection and resource accounting
///
/// Clones share state, so a test can keep one clone for inspection while the
/// code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a transport whose claims succeed on interface 2 with 64-byte packets
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `interface_number` and `max_packet_size` for every claim
    pub fn with_interface(self, interface_number: u8, max_packet_size: u16) -> Self {
        {
            let mut state = self.lock();
            state.interface_number = interface_number;
            state.max_packet_size = max_packet_size;
        }
        self
    }

    /// Make the next `count` claims fail with [`UsbError::Busy`]
    pub fn fail_next_claims(&self, count: u32) {
        self.lock().claim_failures_remaining = count;
    }

    /// Make every transfer submission fail (or succeed again)
    pub fn fail_submits(&self, fail: bool) {
        self.lock().fail_submits = fail;
    }

    /// Configure how interrupt writes behave
    pub fn set_write_behavior(&self, behavior: WriteBehavior) {
        self.lock().write_behavior = behavior;
    }

    /// Number of claim attempts seen so far
    pub fn claim_attempts(&self) -> u32 {
        self.lock().claim_attempts
    }

    /// Number of handles opened and not yet released
    pub fn open_handle_count(&self) -> usize {
        self.lock().open_handles.len()
    }

    /// Whether `handle` is still open
    pub fn is_open(&self, handle: &MockHandle) -> bool {
        self.lock().open_handles.contains(handle)
    }

    /// Number of transfers submitted and not cancelled
    pub fn live_transfer_count(&self) -> usize {
        self.lock().live_transfers.len()
    }

    /// Ids of transfers submitted and not cancelled
    pub fn live_transfer_ids(&self) -> Vec<TransferId> {
        let mut ids: Vec<_> = self.lock().live_transfers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Total transfers ever submitted
    pub fn submitted_count(&self) -> u32 {
        self.lock().submitted
    }

    /// Total transfers ever cancelled
    pub fn cancelled_count(&self) -> u32 {
        self.lock().cancelled
    }

    /// Interrupt writes seen so far
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    type Device = MockDevice;
    type Handle = MockHandle;
    type Transfer = TransferId;

    fn claim(
        &self,
        _device: &MockDevice,
        _descriptor: &ProductDescriptor,
    ) -> Result<ClaimedInterface<MockHandle>, UsbError> {
        let mut state = self.lock();
        state.claim_attempts += 1;

        if state.claim_failures_remaining > 0 {
            state.claim_failures_remaining -= 1;
            return Err(UsbError::Busy);
        }

        let handle = MockHandle(state.next_handle);
        state.next_handle += 1;
        state.open_handles.insert(handle);

        Ok(ClaimedInterface {
            handle,
            interface_number: state.interface_number,
            max_packet_size: state.max_packet_size,
        })
    }

    fn release(&self, claimed: ClaimedInterface<MockHandle>) {
        let mut state = self.lock();
        state.open_handles.remove(&claimed.handle);
        state
            .live_transfers
            .retain(|_, handle| *handle != claimed.handle);
    }

    fn submit_transfer(
        &self,
        id: TransferId,
        handle: &MockHandle,
        _interface_number: u8,
        _max_packet_size: u16,
    ) -> Result<TransferId, UsbError> {
        let mut state = self.lock();
        if state.fail_submits {
            return Err(UsbError::Io);
        }
        if !state.open_handles.contains(handle) {
            return Err(UsbError::NoDevice);
        }

        state.submitted += 1;
        state.live_transfers.insert(id, *handle);
        Ok(id)
    }

    fn cancel_transfer(&self, transfer: TransferId) {
        let mut state = self.lock();
        if state.live_transfers.remove(&transfer).is_some() {
            state.cancelled += 1;
        }
    }

    fn write_interrupt(
        &self,
        handle: &MockHandle,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let mut state = self.lock();
        state.writes.push(RecordedWrite {
            handle: *handle,
            endpoint,
            data: data.to_vec(),
            timeout,
        });

        match state.write_behavior {
            WriteBehavior::Complete => Ok(data.len()),
            WriteBehavior::Short(limit) => Ok(limit.min(data.len())),
            WriteBehavior::Fail(kind) => Err(kind.into()),
        }
    }
}

/// Create a message addressed to the driver of `vendor` for product `device`
///
/// # Example
/// ```
/// use common::test_utils::create_mock_message;
///
/// let msg = create_mock_message(0x28bd, 0x091b);
/// assert_eq!(msg.device, 0x091b);
/// ```
pub fn create_mock_message(vendor: VendorId, device: ProductId) -> Message {
    Message::new(MessageDestination::Driver, vendor, device, vec![device as u8])
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ProductDescriptor {
        ProductDescriptor::new(0x28bd, 0x091b)
    }

    #[test]
    fn test_claim_failure_injection() {
        let transport = MockTransport::new();
        transport.fail_next_claims(2);

        assert_eq!(
            transport.claim(&MockDevice(1), &descriptor()).unwrap_err(),
            UsbError::Busy
        );
        assert!(transport.claim(&MockDevice(1), &descriptor()).is_err());
        let claimed = transport.claim(&MockDevice(1), &descriptor()).unwrap();

        assert_eq!(transport.claim_attempts(), 3);
        assert_eq!(claimed.interface_number, 2);
        assert_eq!(claimed.max_packet_size, 64);
        assert_eq!(transport.open_handle_count(), 1);
    }

    #[test]
    fn test_release_drops_live_transfers() {
        let transport = MockTransport::new();
        let claimed = transport.claim(&MockDevice(1), &descriptor()).unwrap();
        transport
            .submit_transfer(TransferId(1), &claimed.handle, 2, 64)
            .unwrap();
        assert_eq!(transport.live_transfer_count(), 1);

        transport.release(claimed);
        assert_eq!(transport.live_transfer_count(), 0);
        assert_eq!(transport.open_handle_count(), 0);
    }

    #[test]
    fn test_submit_on_closed_handle_fails() {
        let transport = MockTransport::new();
        let result = transport.submit_transfer(TransferId(1), &MockHandle(9), 0, 64);
        assert_eq!(result.unwrap_err(), UsbError::NoDevice);
    }

    #[test]
    fn test_cancel_counts_only_live_transfers() {
        let transport = MockTransport::new();
        let claimed = transport.claim(&MockDevice(1), &descriptor()).unwrap();
        let transfer = transport
            .submit_transfer(TransferId(7), &claimed.handle, 2, 64)
            .unwrap();

        transport.cancel_transfer(transfer);
        transport.cancel_transfer(transfer);
        assert_eq!(transport.cancelled_count(), 1);
    }

    #[test]
    fn test_write_behaviors() {
        let transport = MockTransport::new();
        let handle = MockHandle(1);
        let timeout = Duration::from_secs(1);

        assert_eq!(transport.write_interrupt(&handle, 2, &[0; 10], timeout), Ok(10));

        transport.set_write_behavior(WriteBehavior::Short(4));
        assert_eq!(transport.write_interrupt(&handle, 2, &[0; 10], timeout), Ok(4));

        transport.set_write_behavior(WriteBehavior::Fail(UsbErrorKind::Pipe));
        assert_eq!(
            transport.write_interrupt(&handle, 2, &[0; 10], timeout),
            Err(UsbError::Pipe)
        );
        assert_eq!(transport.writes().len(), 3);
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(result.is_err());
    }
}
