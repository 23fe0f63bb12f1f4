//! Per-model product handlers
//!
//! A [`ProductHandler`] implements everything specific to one tablet model
//! (or a family of models sharing a protocol). The vendor layer routes
//! configuration, messages and detach notifications to it and never looks
//! inside.

use protocol::{Message, ProductId};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Capability implemented once per supported hardware variant
///
/// `H` is the transport's device handle type. Handlers only borrow handles for
/// the duration of a call and must not keep them past [`detach_device`].
///
/// [`detach_device`]: ProductHandler::detach_device
pub trait ProductHandler<H>: Send {
    /// Product identifiers served by this handler
    fn product_ids(&self) -> Vec<ProductId>;

    /// Human readable model name
    fn product_name(&self, product_id: ProductId) -> String;

    /// Apply the configuration sub-tree of `product_id`
    fn set_config(&mut self, product_id: ProductId, config: Value);

    /// Current configuration of `product_id`
    fn get_config(&self, product_id: ProductId) -> Value;

    /// Handle a control message and return any responses to publish
    fn handle_message(&mut self, message: &Message) -> Vec<Message>;

    /// Called before the device's transport resources are released
    fn detach_device(&mut self, handle: &H);

    /// Called with every report read from a live transfer
    fn handle_report(&mut self, product_id: ProductId, report: &[u8]) {
        trace!(
            "Ignoring {} byte report from {:#06x}",
            report.len(),
            product_id
        );
    }
}

/// Product handler driven entirely by configuration
///
/// Serves a set of models known only by id and name. It keeps each model's
/// settings as opaque JSON and accepts messages without interpreting them.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredProduct {
    names: BTreeMap<ProductId, String>,
    configs: BTreeMap<ProductId, Value>,
    reports_seen: u64,
}

impl ConfiguredProduct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model served by this handler
    pub fn with_product(mut self, product_id: ProductId, name: impl Into<String>) -> Self {
        self.names.insert(product_id, name.into());
        self
    }

    /// Number of reports received since creation
    pub fn reports_seen(&self) -> u64 {
        self.reports_seen
    }

    fn name_of(&self, product_id: ProductId) -> String {
        self.names
            .get(&product_id)
            .cloned()
            .unwrap_or_else(|| format!("Unknown product {:#06x}", product_id))
    }
}

impl<H> ProductHandler<H> for ConfiguredProduct {
    fn product_ids(&self) -> Vec<ProductId> {
        self.names.keys().copied().collect()
    }

    fn product_name(&self, product_id: ProductId) -> String {
        self.name_of(product_id)
    }

    fn set_config(&mut self, product_id: ProductId, config: Value) {
        self.configs.insert(product_id, config);
    }

    fn get_config(&self, product_id: ProductId) -> Value {
        self.configs
            .get(&product_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    fn handle_message(&mut self, message: &Message) -> Vec<Message> {
        debug!(
            "{} received {} byte message",
            self.name_of(message.device),
            message.payload.len()
        );
        Vec::new()
    }

    fn detach_device(&mut self, _handle: &H) {}

    fn handle_report(&mut self, _product_id: ProductId, _report: &[u8]) {
        self.reports_seen += 1;
    }
}
