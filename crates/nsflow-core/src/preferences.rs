//! Persisted theme preferences and client config.
//!
//! Both live in the local key-value store. Missing or unreadable entries fall
//! back to defaults; nothing here fails outward on read.

use std::rc::Rc;

use nsflow_types::{
    Result,
    artifact::Variant,
    config::{ClientConfig, ThemePreferences},
};
use crate::ports::StoragePort;

pub const THEME_ENABLED_KEY: &str = "nsflow:theme_enabled";
pub const THEME_VARIANT_KEY: &str = "nsflow:theme_variant";
pub const CONFIG_KEY: &str = "nsflow:config";

#[derive(Clone)]
pub struct PreferenceStore {
    storage: Rc<dyn StoragePort>,
}

impl PreferenceStore {
    pub fn new(storage: Rc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    pub fn backend_name(&self) -> &str {
        self.storage.backend_name()
    }

    pub async fn load_theme_preferences(&self) -> ThemePreferences {
        let defaults = ThemePreferences::default();

        let enabled = match self.read(THEME_ENABLED_KEY).await {
            Some(raw) => match raw.trim() {
                "true" => true,
                "false" => false,
                other => {
                    log::warn!("Ignoring stored {}: {:?}", THEME_ENABLED_KEY, other);
                    defaults.enabled
                }
            },
            None => defaults.enabled,
        };

        let variant = match self.read(THEME_VARIANT_KEY).await {
            Some(raw) => raw.trim().parse::<Variant>().unwrap_or_else(|e| {
                log::warn!("Ignoring stored {}: {}", THEME_VARIANT_KEY, e);
                defaults.variant
            }),
            None => defaults.variant,
        };

        ThemePreferences { enabled, variant }
    }

    pub async fn save_theme_preferences(&self, prefs: ThemePreferences) -> Result<()> {
        self.storage
            .set(THEME_ENABLED_KEY, if prefs.enabled { "true" } else { "false" })
            .await?;
        self.storage
            .set(THEME_VARIANT_KEY, prefs.variant.as_str())
            .await?;
        log::debug!("Theme preferences saved ({})", self.storage.backend_name());
        Ok(())
    }

    /// Restore the client config; defaults when absent, unreadable or invalid.
    pub async fn load_config(&self) -> ClientConfig {
        let Some(raw) = self.read(CONFIG_KEY).await else {
            return ClientConfig::default();
        };
        let config = match serde_json::from_str::<ClientConfig>(&raw) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Stored config is not valid JSON, using defaults: {}", e);
                return ClientConfig::default();
            }
        };
        match config.validate() {
            Ok(()) => {
                log::info!("Config restored from storage");
                config
            }
            Err(e) => {
                log::warn!("Stored config rejected, using defaults: {}", e);
                ClientConfig::default()
            }
        }
    }

    pub async fn save_config(&self, config: &ClientConfig) -> Result<()> {
        config.validate()?;
        let json = serde_json::to_string(config)?;
        self.storage.set(CONFIG_KEY, &json).await?;
        log::info!("Config saved to storage");
        Ok(())
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Reading {} failed: {}", key, e);
                None
            }
        }
    }
}
