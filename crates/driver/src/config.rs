//! Daemon configuration management

use crate::vendor::{DEFAULT_CLAIM_ATTEMPTS, DEFAULT_CLAIM_BACKOFF, HANDSHAKE_TIMEOUT, RetryPolicy};
use anyhow::{Context, Result, anyhow};
use protocol::{ProductId, VendorId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// XP-Pen's USB vendor id
pub const XP_PEN_VENDOR_ID: VendorId = 0x28bd;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    pub vendor: VendorSettings,
    /// Supported tablet models
    #[serde(default)]
    pub products: Vec<ProductSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    pub log_level: String,
    /// Interval between message drain cycles
    #[serde(default = "DaemonSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl DaemonSettings {
    fn default_poll_interval() -> u64 {
        50
    }
}

/// Claim and handshake tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Total claim attempts per attach, including the first
    #[serde(default = "UsbSettings::default_claim_attempts")]
    pub claim_attempts: u32,
    /// Sleep after every failed claim attempt
    #[serde(default = "UsbSettings::default_claim_backoff")]
    pub claim_backoff_ms: u64,
    /// Timeout of the init key write
    #[serde(default = "UsbSettings::default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            claim_attempts: Self::default_claim_attempts(),
            claim_backoff_ms: Self::default_claim_backoff(),
            handshake_timeout_ms: Self::default_handshake_timeout(),
        }
    }
}

impl UsbSettings {
    fn default_claim_attempts() -> u32 {
        DEFAULT_CLAIM_ATTEMPTS
    }

    fn default_claim_backoff() -> u64 {
        DEFAULT_CLAIM_BACKOFF.as_millis() as u64
    }

    fn default_handshake_timeout() -> u64 {
        HANDSHAKE_TIMEOUT.as_millis() as u64
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.claim_attempts,
            backoff: Duration::from_millis(self.claim_backoff_ms),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSettings {
    pub vendor_id: VendorId,
    pub name: String,
}

/// One supported tablet model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSettings {
    pub id: ProductId,
    pub name: String,
}

impl ProductSettings {
    fn new(id: ProductId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonSettings {
                log_level: "info".to_string(),
                poll_interval_ms: DaemonSettings::default_poll_interval(),
            },
            usb: UsbSettings::default(),
            vendor: VendorSettings {
                vendor_id: XP_PEN_VENDOR_ID,
                name: "XP-Pen".to_string(),
            },
            products: vec![
                ProductSettings::new(0x0075, "Star G430S"),
                ProductSettings::new(0x0202, "AC19 Shortcut Remote"),
                ProductSettings::new(0x080a, "Artist 12 Pro"),
                ProductSettings::new(0x0905, "Deco 01 v2"),
                ProductSettings::new(0x0909, "Deco Pro Small"),
                ProductSettings::new(0x090a, "Deco Pro Medium"),
                ProductSettings::new(0x091a, "Artist 22E Pro"),
                ProductSettings::new(0x091b, "Artist 22R Pro"),
                ProductSettings::new(0x092b, "Artist 13.3 Pro"),
                ProductSettings::new(0x092d, "Artist 24 Pro"),
            ],
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/tablet-driver/daemon.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("tablet-driver").join("daemon.toml")
        } else {
            PathBuf::from(".config/tablet-driver/daemon.toml")
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.poll_interval_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.daemon.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.daemon.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.daemon.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than 0"));
        }

        if self.usb.claim_attempts == 0 {
            return Err(anyhow!("claim_attempts must be at least 1"));
        }

        if self.vendor.name.trim().is_empty() {
            return Err(anyhow!("Vendor name must not be empty"));
        }

        if self.products.is_empty() {
            return Err(anyhow!(
                "No products configured for vendor {:#06x}",
                self.vendor.vendor_id
            ));
        }

        let mut seen = HashSet::new();
        for product in &self.products {
            if !seen.insert(product.id) {
                return Err(anyhow!("Duplicate product id {:#06x}", product.id));
            }
        }

        Ok(())
    }
}

/// Load a configuration file, expanding `~` and environment variables in `path`
pub fn load_config(path: &str) -> Result<DaemonConfig> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand config path: {}", path))?;
    DaemonConfig::load(Some(PathBuf::from(expanded.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.vendor.vendor_id, 0x28bd);
        assert_eq!(config.usb.claim_attempts, 5);
        assert!(config.products.iter().any(|p| p.id == 0x091b));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DaemonConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.daemon.log_level, parsed.daemon.log_level);
        assert_eq!(config.products, parsed.products);
    }

    #[test]
    fn test_usb_section_optional() {
        let config = DaemonConfig::from_toml(
            r#"
            [daemon]
            log_level = "debug"

            [vendor]
            vendor_id = 10429
            name = "XP-Pen"

            [[products]]
            id = 2331
            name = "Artist 22R Pro"
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon.poll_interval_ms, 50);
        assert_eq!(config.usb.retry_policy(), RetryPolicy::default());
        assert_eq!(config.usb.handshake_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = DaemonConfig::default();
        config.daemon.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.daemon.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DaemonConfig::default();
        config.usb.claim_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.daemon.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.products.clear();
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        let first = config.products[0].clone();
        config.products.push(first);
        assert!(config.validate().is_err());
    }
}
