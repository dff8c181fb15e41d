use std::{num::NonZeroU32, sync::Arc};

use serde_json::Value;
use tracing::warn;

use super::{KeyValueStore, SETTINGS_KEY, StoreError};
use crate::domain::{Category, CategoryConfig, Settings};

#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Stored values merged over the canonical defaults. Categories introduced
    /// after the settings were saved show up at their default state.
    pub fn get_settings(&self) -> Settings {
        self.load_settings().unwrap_or_else(|err| {
            warn!(error = %err, "failed to read settings; using defaults");
            Settings::default()
        })
    }

    fn load_settings(&self) -> Result<Settings, StoreError> {
        Ok(self
            .kv
            .get(SETTINGS_KEY)?
            .map(|value| merge_with_defaults(&value))
            .unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.kv.set(SETTINGS_KEY, &serde_json::to_value(settings)?)
    }

    pub fn get_enabled_categories(&self) -> Vec<Category> {
        self.get_settings().enabled_categories()
    }

    pub fn set_category_enabled(&self, category: Category, enabled: bool) -> Result<(), StoreError> {
        let mut settings = self.load_settings()?;
        for config in settings
            .categories
            .iter_mut()
            .filter(|config| config.id == category)
        {
            config.enabled = enabled;
        }
        self.save_settings(&settings)
    }

    pub fn set_refresh_interval(&self, minutes: NonZeroU32) -> Result<(), StoreError> {
        let mut settings = self.load_settings()?;
        settings.refresh_interval_minutes = minutes.get();
        self.save_settings(&settings)
    }
}

fn merge_with_defaults(stored: &Value) -> Settings {
    let Value::Object(map) = stored else {
        warn!("stored settings are not an object; using defaults");
        return Settings::default();
    };

    let saved: Vec<&Value> = map
        .get("categories")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().collect())
        .unwrap_or_default();

    let categories = Category::ALL
        .into_iter()
        .map(|category| {
            let default = CategoryConfig::default_for(category);
            saved
                .iter()
                .find(|entry| entry.get("id").and_then(Value::as_str) == Some(category.id()))
                .map(|entry| CategoryConfig {
                    id: category,
                    label: entry
                        .get("label")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .unwrap_or_else(|| default.label.clone()),
                    enabled: entry
                        .get("enabled")
                        .and_then(Value::as_bool)
                        .unwrap_or(default.enabled),
                })
                .unwrap_or(default)
        })
        .collect();

    let refresh_interval_minutes = ["refreshInterval", "refreshIntervalMinutes"]
        .into_iter()
        .find_map(|key| map.get(key).and_then(Value::as_u64))
        .filter(|minutes| *minutes > 0)
        .and_then(|minutes| u32::try_from(minutes).ok())
        .unwrap_or(Settings::DEFAULT_REFRESH_INTERVAL_MINUTES);

    Settings {
        categories,
        refresh_interval_minutes,
    }
}
