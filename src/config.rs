use std::{collections::HashMap, fmt::Display, str::FromStr};

use thiserror::Error;

/// Key/value configuration handed to the subsystem by whatever loads it.
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    inner: HashMap<String, String>,
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("field {field} is required")]
    RequiredValue { field: String },
    #[error("{value} is not a valid value for field {field}: {err}")]
    InvalidValue {
        field: String,
        value: String,
        err: String,
    },
}

impl ModuleConfig {
    /// Inserts a new configuration value.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        self.inner.insert(key, value)
    }

    /// Returns a typed configuration value.
    pub fn required<T>(&self, config_name: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        match self.inner.get(config_name) {
            None => Err(ConfigError::RequiredValue {
                field: config_name.to_string(),
            }),
            Some(value) => parse(value, config_name),
        }
    }

    /// Returns an optional typed configuration value.
    pub fn optional<T>(&self, config_name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        self.inner
            .get(config_name)
            .map(|value| parse(value, config_name))
            .transpose()
    }

    /// Returns a typed configuration value, falling back to `default` when
    /// the field is missing.
    pub fn with_default<T>(&self, config_name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        Ok(self.optional(config_name)?.unwrap_or(default))
    }
}

fn parse<T>(value: &str, config_name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    T::from_str(value).map_err(|err| ConfigError::InvalidValue {
        field: config_name.to_string(),
        value: value.to_string(),
        err: err.to_string(),
    })
}

/// User configuration of a monitoring session: which device to watch and
/// which transfer directions to account.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub device: String,
    pub track_read: bool,
    pub track_write: bool,
}

impl MonitorConfig {
    /// Configuration tracking both directions of `device`.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            track_read: true,
            track_write: true,
        }
    }
}

impl TryFrom<&ModuleConfig> for MonitorConfig {
    type Error = ConfigError;

    fn try_from(config: &ModuleConfig) -> Result<Self, Self::Error> {
        Ok(MonitorConfig {
            device: config.required("device")?,
            track_read: config.with_default("track_read", true)?,
            track_write: config.with_default("track_write", true)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn device_is_required() {
        let config = ModuleConfig::default();
        let err = MonitorConfig::try_from(&config).unwrap_err();
        assert!(matches!(err, ConfigError::RequiredValue { field } if field == "device"));
    }

    #[test]
    fn directions_default_to_tracked() {
        let mut config = ModuleConfig::default();
        config.insert("device".to_string(), "sda".to_string());
        let config = MonitorConfig::try_from(&config).unwrap();
        assert_eq!(config.device, "sda");
        assert!(config.track_read);
        assert!(config.track_write);
    }

    #[test]
    fn directions_can_be_disabled() {
        let mut config = ModuleConfig::default();
        config.insert("device".to_string(), "nvme0n1".to_string());
        config.insert("track_write".to_string(), "false".to_string());
        let config = MonitorConfig::try_from(&config).unwrap();
        assert!(config.track_read);
        assert!(!config.track_write);
    }

    #[test]
    fn invalid_flag_is_reported_with_field_name() {
        let mut config = ModuleConfig::default();
        config.insert("device".to_string(), "sda".to_string());
        config.insert("track_read".to_string(), "yes".to_string());
        let err = MonitorConfig::try_from(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "track_read"));
    }
}
