//! Define the emulated device configuration
//! Provide mechanism to load it from Toml-file

use crate::{DeviceError, Result};
use std::time::Duration;

/// Configuration of the emulated accelerator
///
/// Every device of a [`crate::DeviceContext`] gets the same memory budget.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Number of devices exposed by the context
    pub devices: usize,
    /// Memory capacity of each device, in bytes
    pub memory_bytes: usize,
    /// Upper bound on a stream synchronization, `None` waits forever
    pub sync_timeout_ms: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            devices: 1,
            memory_bytes: 1 << 30,
            sync_timeout_ms: None,
        }
    }
}

impl DeviceConfig {
    /// Provide Serde mechanisms from TOML file
    pub fn from_toml(file: &str) -> Result<Self> {
        let file_str = std::fs::read_to_string(file)
            .map_err(|err| DeviceError::Config(format!("`{file}`: {err}")))?;
        Self::from_toml_str(&file_str)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|err| DeviceError::Config(format!("toml: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices == 0 {
            return Err(DeviceError::Config("at least one device is required".into()));
        }
        if self.memory_bytes == 0 {
            return Err(DeviceError::Config("device memory must not be empty".into()));
        }
        Ok(())
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partial_toml() {
        let cfg = DeviceConfig::from_toml_str(
            r#"
            devices = 3
            sync_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(cfg.devices, 3);
        assert_eq!(cfg.memory_bytes, DeviceConfig::default().memory_bytes);
        assert_eq!(cfg.sync_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn reject_empty_context() {
        let err = DeviceConfig::from_toml_str("devices = 0").unwrap_err();
        assert!(matches!(err, DeviceError::Config(_)));

        let err = DeviceConfig::from_toml_str("devices = \"two\"").unwrap_err();
        assert!(matches!(err, DeviceError::Config(_)));
    }
}
