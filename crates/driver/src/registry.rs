//! Vendor handler construction from configuration

use crate::config::DaemonConfig;
use crate::error::Result;
use crate::product::ConfiguredProduct;
use crate::vendor::{VendorHandler, VendorHandlerBuilder};
use common::Transport;

/// Build the configured vendor's handler on top of `transport`
///
/// Every configured product is served by one [`ConfiguredProduct`].
pub fn build_vendor_handler<T: Transport>(
    config: &DaemonConfig,
    transport: T,
) -> Result<VendorHandler<T>> {
    let products = config
        .products
        .iter()
        .fold(ConfiguredProduct::new(), |products, product| {
            products.with_product(product.id, product.name.clone())
        });

    VendorHandlerBuilder::new(config.vendor.vendor_id, config.vendor.name.clone())
        .handler(products)
        .retry_policy(config.usb.retry_policy())
        .handshake_timeout(config.usb.handshake_timeout())
        .build(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::MockTransport;

    #[test]
    fn test_builds_default_vendor() {
        let config = DaemonConfig::default();
        let handler = build_vendor_handler(&config, MockTransport::new()).unwrap();

        assert_eq!(handler.vendor_id(), 0x28bd);
        assert_eq!(handler.vendor_name(), "XP-Pen");
        assert_eq!(
            handler.supported_product_ids(),
            vec![
                0x0075, 0x0202, 0x080a, 0x0905, 0x0909, 0x090a, 0x091a, 0x091b, 0x092b, 0x092d,
            ]
        );
        assert_eq!(handler.product_name(0x092d).as_deref(), Some("Artist 24 Pro"));
        assert_eq!(handler.product_name(0x091a).as_deref(), Some("Artist 22E Pro"));
        assert_eq!(handler.product_name(0x0075).as_deref(), Some("Star G430S"));
        assert_eq!(
            handler.product_name(0x0202).as_deref(),
            Some("AC19 Shortcut Remote")
        );
    }

    #[test]
    fn test_empty_product_list_fails() {
        let mut config = DaemonConfig::default();
        config.products.clear();
        assert!(build_vendor_handler(&config, MockTransport::new()).is_err());
    }
}
