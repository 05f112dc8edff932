//! Cache and conversation settings

use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default cache key prefix, followed by `{local_user}_{peer}`
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "chat_messages_";

/// Chatline settings
///
/// Stored as JSON. Missing fields fall back to their defaults, so older
/// settings files keep loading as new options are added.
///
/// # Example
/// ```rust,no_run
/// use chatline::storage::Settings;
///
/// // Load settings (returns default if file doesn't exist)
/// let mut settings = Settings::load("chatline.json").expect("Failed to load");
///
/// // Shorten the cache lifetime and save
/// settings.cache_ttl_hours = 12;
/// settings.save("chatline.json").expect("Failed to save");
///
/// println!("Cache entries expire after {}", settings.cache_ttl());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cached conversations older than this are discarded
    pub cache_ttl_hours: u32,
    /// Namespace prefix of cache keys
    pub cache_key_prefix: String,
    /// Maximum concurrent image preloads
    pub preload_batch_size: usize,
    /// Largest attachment accepted for sending
    pub max_attachment_bytes: u64,
    /// Optional byte limit for the cache backend
    pub storage_quota_bytes: Option<usize>,
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the settings file
    ///
    /// # Returns
    /// The loaded settings, or default settings if file doesn't exist
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Storage(format!("Failed to read settings: {}", e)))?;

        // Handle empty file (return defaults)
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Storage(format!("Failed to parse settings: {}", e)))?;
        settings.normalize();

        Ok(settings)
    }

    /// Save settings to a JSON file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Storage(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| Error::Storage(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Cache freshness window
    pub fn cache_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.cache_ttl_hours))
    }

    /// Zero batch size would stall preloading
    fn normalize(&mut self) {
        if self.preload_batch_size == 0 {
            self.preload_batch_size = 1;
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            cache_key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
            preload_batch_size: 3,
            max_attachment_bytes: 10 * 1024 * 1024,
            storage_quota_bytes: None,
        }
    }
}
