//! Daemon dispatch
//!
//! Glue between the worker thread's inputs (commands, hotplug notifications,
//! transfer completions, the drain timer) and the vendor handlers. Owns the
//! vendor handlers and the message queue; everything runs on the worker
//! thread.

use crate::error::DriverError;
use crate::vendor::{DrainSummary, VendorHandler};
use common::{
    ConnectedDevice, DriverCommand, DriverEvent, DriverWorker, MessageBus, MessageQueue,
    ProductDescriptor, TransferCompletion, Transport,
};
use protocol::{MessageDestination, VendorId};
use tracing::{debug, error, info, warn};

/// Vendor handlers plus the daemon's message queue
pub struct Dispatcher<T: Transport> {
    vendors: Vec<VendorHandler<T>>,
    bus: MessageQueue,
    worker: DriverWorker,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(vendors: Vec<VendorHandler<T>>, worker: DriverWorker) -> Self {
        Self {
            vendors,
            bus: MessageQueue::new(),
            worker,
        }
    }

    pub fn worker(&self) -> &DriverWorker {
        &self.worker
    }

    pub fn bus(&self) -> &MessageQueue {
        &self.bus
    }

    pub fn vendor(&self, vendor_id: VendorId) -> Option<&VendorHandler<T>> {
        self.vendors.iter().find(|v| v.vendor_id() == vendor_id)
    }

    fn vendor_mut(&mut self, vendor_id: VendorId) -> Option<&mut VendorHandler<T>> {
        self.vendors.iter_mut().find(|v| v.vendor_id() == vendor_id)
    }

    /// Vendor ids served, in registration order
    pub fn vendor_ids(&self) -> Vec<VendorId> {
        self.vendors.iter().map(|v| v.vendor_id()).collect()
    }

    /// Handle one command. Returns `false` once shutdown was requested.
    pub fn handle_command(&mut self, cmd: DriverCommand) -> bool {
        match cmd {
            DriverCommand::GetConfig {
                vendor_id,
                response,
            } => {
                let config = self.vendor_mut(vendor_id).map(|v| v.get_config());
                let _ = response.send(config);
            }

            DriverCommand::SetConfig {
                vendor_id,
                config,
                response,
            } => {
                let result = match self.vendor_mut(vendor_id) {
                    Some(vendor) => {
                        vendor.set_config(config);
                        Ok(())
                    }
                    None => Err(common::Error::Config(format!(
                        "Unknown vendor {:#06x}",
                        vendor_id
                    ))),
                };
                let _ = response.send(result);
            }

            DriverCommand::ListConnected { response } => {
                let devices: Vec<ConnectedDevice> = self
                    .vendors
                    .iter()
                    .flat_map(|v| v.connected_devices())
                    .collect();
                debug!("Listing {} connected tablet(s)", devices.len());
                let _ = response.send(devices);
            }

            DriverCommand::PostMessage { message } => {
                self.bus.add_message(message);
            }

            DriverCommand::Shutdown => return false,
        }
        true
    }

    /// A device appeared on the bus
    pub fn device_arrived(&mut self, device: T::Device, descriptor: ProductDescriptor) {
        let Some(vendor) = self.vendor_mut(descriptor.vendor_id) else {
            return;
        };

        let event = match vendor.handle_product_attach(device, &descriptor) {
            Ok(()) => Some(DriverEvent::DeviceAttached {
                device: ConnectedDevice {
                    vendor_id: descriptor.vendor_id,
                    product_id: descriptor.product_id,
                    name: vendor
                        .product_name(descriptor.product_id)
                        .unwrap_or_default(),
                },
            }),
            Err(DriverError::ClaimAbandoned { product_id, .. }) => {
                Some(DriverEvent::AttachAbandoned {
                    vendor_id: descriptor.vendor_id,
                    product_id,
                })
            }
            Err(e) => {
                debug!("Not attaching: {}", e);
                None
            }
        };

        if let Some(event) = event {
            self.publish(event);
        }
    }

    /// A device left the bus
    pub fn device_left(&mut self, device: &T::Device) {
        let detached = self.vendors.iter_mut().find_map(|vendor| {
            let product_id = vendor.product_of(device)?;
            vendor
                .handle_product_detach(device)
                .then_some((vendor.vendor_id(), product_id))
        });

        if let Some((vendor_id, product_id)) = detached {
            self.publish(DriverEvent::DeviceDetached {
                vendor_id,
                product_id,
            });
        }
    }

    /// Hand a transfer completion to the vendor that armed it
    pub fn handle_completion(&mut self, vendor_id: VendorId, completion: TransferCompletion) {
        if let Some(vendor) = self.vendor_mut(vendor_id) {
            vendor.handle_completion(completion);
        }
    }

    /// Run a drain cycle on every vendor and forward messages meant for the GUI
    pub fn drain(&mut self) -> Vec<DrainSummary> {
        let summaries = self
            .vendors
            .iter_mut()
            .map(|vendor| vendor.handle_messages(&self.bus))
            .collect();

        for vendor_id in self.vendor_ids() {
            for message in self.bus.get_messages_for(MessageDestination::Gui, vendor_id) {
                self.publish(DriverEvent::GuiMessage { message });
            }
        }

        summaries
    }

    /// Detach every device of every vendor
    pub fn shutdown(&mut self) {
        for vendor in &mut self.vendors {
            vendor.shutdown();
        }
        info!("All vendors shut down");
    }

    fn publish(&self, event: DriverEvent) {
        if let Err(e) = self.worker.send_event(event) {
            if self.worker.event_tx.is_closed() {
                error!("Event channel closed: {}", e);
            } else {
                warn!("Dropping event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ConfiguredProduct;
    use crate::vendor::{RetryPolicy, VendorHandlerBuilder};
    use common::create_driver_bridge;
    use common::test_utils::{MockDevice, MockTransport, create_mock_message};
    use protocol::Message;
    use serde_json::json;
    use std::time::Duration;

    const VENDOR: VendorId = 0x28bd;

    fn dispatcher(transport: &MockTransport) -> (Dispatcher<MockTransport>, common::DriverBridge) {
        let (bridge, worker) = create_driver_bridge();
        let vendor = VendorHandlerBuilder::new(VENDOR, "XP-Pen")
            .handler(ConfiguredProduct::new().with_product(0x091b, "Artist 22R Pro"))
            .retry_policy(RetryPolicy {
                max_attempts: 2,
                backoff: Duration::ZERO,
            })
            .build(transport.clone())
            .unwrap();
        (Dispatcher::new(vec![vendor], worker), bridge)
    }

    fn next_event(bridge: &common::DriverBridge) -> DriverEvent {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(bridge.recv_event())
            .unwrap()
    }

    #[test]
    fn test_arrival_publishes_attached() {
        let transport = MockTransport::new();
        let (mut dispatcher, bridge) = dispatcher(&transport);

        dispatcher.device_arrived(MockDevice(1), ProductDescriptor::new(VENDOR, 0x091b));

        assert_eq!(
            next_event(&bridge),
            DriverEvent::DeviceAttached {
                device: ConnectedDevice {
                    vendor_id: VENDOR,
                    product_id: 0x091b,
                    name: "Artist 22R Pro".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_abandoned_attach_is_reported() {
        let transport = MockTransport::new();
        transport.fail_next_claims(10);
        let (mut dispatcher, bridge) = dispatcher(&transport);

        dispatcher.device_arrived(MockDevice(1), ProductDescriptor::new(VENDOR, 0x091b));

        assert_eq!(
            next_event(&bridge),
            DriverEvent::AttachAbandoned {
                vendor_id: VENDOR,
                product_id: 0x091b,
            }
        );
    }

    #[test]
    fn test_foreign_devices_are_ignored() {
        let transport = MockTransport::new();
        let (mut dispatcher, _bridge) = dispatcher(&transport);

        dispatcher.device_arrived(MockDevice(1), ProductDescriptor::new(0x046d, 0xc52b));
        dispatcher.device_arrived(MockDevice(2), ProductDescriptor::new(VENDOR, 0x0001));

        assert_eq!(transport.claim_attempts(), 0);
        assert!(dispatcher.worker().event_tx.is_empty());
    }

    #[test]
    fn test_departure_publishes_detached_once() {
        let transport = MockTransport::new();
        let (mut dispatcher, bridge) = dispatcher(&transport);
        dispatcher.device_arrived(MockDevice(1), ProductDescriptor::new(VENDOR, 0x091b));
        let _ = next_event(&bridge);

        dispatcher.device_left(&MockDevice(1));
        dispatcher.device_left(&MockDevice(1));

        assert_eq!(
            next_event(&bridge),
            DriverEvent::DeviceDetached {
                vendor_id: VENDOR,
                product_id: 0x091b,
            }
        );
        assert!(dispatcher.worker().event_tx.is_empty());
    }

    #[test]
    fn test_config_commands() {
        let transport = MockTransport::new();
        let (mut dispatcher, _bridge) = dispatcher(&transport);

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        assert!(dispatcher.handle_command(DriverCommand::SetConfig {
            vendor_id: VENDOR,
            config: json!({ "2331": { "mode": "relative" } }),
            response: tx,
        }));
        assert!(rx.try_recv().unwrap().is_ok());

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        dispatcher.handle_command(DriverCommand::GetConfig {
            vendor_id: VENDOR,
            response: tx,
        });
        let config = rx.try_recv().unwrap().unwrap();
        assert_eq!(config["2331"], json!({ "mode": "relative" }));

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        dispatcher.handle_command(DriverCommand::GetConfig {
            vendor_id: 0x1234,
            response: tx,
        });
        assert!(rx.try_recv().unwrap().is_none());

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        dispatcher.handle_command(DriverCommand::SetConfig {
            vendor_id: 0x1234,
            config: json!({}),
            response: tx,
        });
        assert!(rx.try_recv().unwrap().is_err());
    }

    #[test]
    fn test_shutdown_command_stops() {
        let transport = MockTransport::new();
        let (mut dispatcher, _bridge) = dispatcher(&transport);
        assert!(!dispatcher.handle_command(DriverCommand::Shutdown));
    }

    #[test]
    fn test_posted_messages_are_drained() {
        let transport = MockTransport::new();
        let (mut dispatcher, _bridge) = dispatcher(&transport);
        dispatcher.device_arrived(MockDevice(1), ProductDescriptor::new(VENDOR, 0x091b));

        dispatcher.handle_command(DriverCommand::PostMessage {
            message: create_mock_message(VENDOR, 0x091b),
        });
        assert_eq!(dispatcher.bus().len(), 1);

        let summaries = dispatcher.drain();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].handled, 1);
        assert!(dispatcher.bus().is_empty());
    }

    #[test]
    fn test_gui_messages_become_events() {
        let transport = MockTransport::new();
        let (mut dispatcher, bridge) = dispatcher(&transport);

        let message = Message::new(MessageDestination::Gui, VENDOR, 0x091b, vec![5]);
        dispatcher.bus().add_message(message.clone());
        dispatcher.drain();

        assert_eq!(next_event(&bridge), DriverEvent::GuiMessage { message });
    }

    #[test]
    fn test_list_connected_and_shutdown() {
        let transport = MockTransport::new();
        let (mut dispatcher, _bridge) = dispatcher(&transport);
        dispatcher.device_arrived(MockDevice(1), ProductDescriptor::new(VENDOR, 0x091b));

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        dispatcher.handle_command(DriverCommand::ListConnected { response: tx });
        assert_eq!(rx.try_recv().unwrap().len(), 1);

        dispatcher.shutdown();
        assert_eq!(transport.open_handle_count(), 0);
        assert_eq!(dispatcher.vendor(VENDOR).unwrap().attached_count(), 0);
    }
}
