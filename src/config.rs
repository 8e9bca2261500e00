//! Store Configuration

use std::{fs, path::Path};

use rusty_money::iso::{self, Currency};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    carts::{GUEST_USER, UserId},
    persistence::{PersistedField, PersistedFields, WritePolicy},
};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// A required value is empty
    #[error("Config value `{0}` must not be blank")]
    BlankValue(&'static str),
}

/// Store configuration, read from YAML.
///
/// Every field is optional in the file:
///
/// ```yaml
/// storage_key: cart
/// guest_user: guest
/// currency: USD
/// persist:
///   - carts
///   - current_user_id
/// write_policy:
///   mode: batched
///   max_pending: 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Key the snapshot is stored under
    pub storage_key: String,

    /// User id of the cart used while nobody is logged in
    pub guest_user: String,

    /// ISO 4217 code used to display amounts
    pub currency: String,

    /// Top-level snapshot fields to persist
    pub persist: Vec<PersistedField>,

    /// When changes are written
    pub write_policy: WritePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: "cart".to_string(),
            guest_user: GUEST_USER.to_string(),
            currency: "USD".to_string(),
            persist: vec![PersistedField::Carts, PersistedField::CurrentUserId],
            write_policy: WritePolicy::Immediate,
        }
    }
}

impl StoreConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;

        Self::from_yaml_str(&contents)
    }

    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the document cannot be parsed or validated.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = if yaml.trim().is_empty() {
            StoreConfig::default()
        } else {
            serde_norway::from_str(yaml)?
        };

        config.validate()?;

        Ok(config)
    }

    /// Check for blank values and an unknown currency.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::BlankValue("storage_key"));
        }

        if self.guest_user.trim().is_empty() {
            return Err(ConfigError::BlankValue("guest_user"));
        }

        self.currency()?;

        Ok(())
    }

    /// The display currency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCurrency`] for codes `rusty-money` does not know.
    pub fn currency(&self) -> Result<&'static Currency, ConfigError> {
        iso::find(&self.currency).ok_or_else(|| ConfigError::UnknownCurrency(self.currency.clone()))
    }

    /// The guest user id.
    pub fn guest_user_id(&self) -> UserId {
        UserId::new(self.guest_user.clone())
    }

    /// The persisted-field whitelist.
    pub fn persisted_fields(&self) -> PersistedFields {
        PersistedFields::whitelist(&self.persist)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() -> TestResult {
        let config = StoreConfig::from_yaml_str("")?;

        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.persisted_fields(), PersistedFields::ALL);
        assert_eq!(config.currency()?.iso_alpha_code, "USD");

        Ok(())
    }

    #[test]
    fn overrides_are_applied() -> TestResult {
        let yaml = "\
storage_key: shop-cart
guest_user: anon
currency: GBP
persist: [carts]
write_policy:
  mode: batched
  max_pending: 4
";

        let config = StoreConfig::from_yaml_str(yaml)?;

        assert_eq!(config.storage_key, "shop-cart");
        assert_eq!(config.guest_user_id(), UserId::new("anon"));
        assert_eq!(config.currency()?.iso_alpha_code, "GBP");
        assert!(!config.persisted_fields().includes(PersistedField::CurrentUserId));
        assert_eq!(config.write_policy, WritePolicy::Batched { max_pending: 4 });

        Ok(())
    }

    #[test]
    fn unknown_currency_is_rejected() {
        let result = StoreConfig::from_yaml_str("currency: XYZ\n");

        assert!(matches!(result, Err(ConfigError::UnknownCurrency(code)) if code == "XYZ"));
    }

    #[test]
    fn blank_guest_is_rejected() {
        let result = StoreConfig::from_yaml_str("guest_user: \"  \"\n");

        assert!(matches!(result, Err(ConfigError::BlankValue("guest_user"))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = StoreConfig::from_yaml_str("storage: cart\n");

        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn example_config_is_valid() -> TestResult {
        let config = StoreConfig::from_yaml_str(include_str!("../config/cart-store.example.yml"))?;

        assert_eq!(config.write_policy, WritePolicy::Batched { max_pending: 5 });
        assert_eq!(config.persisted_fields(), PersistedFields::ALL);

        Ok(())
    }

    #[test]
    fn load_reads_file() -> TestResult {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "storage_key: from-file")?;

        let config = StoreConfig::load(file.path())?;

        assert_eq!(config.storage_key, "from-file");

        Ok(())
    }
}
