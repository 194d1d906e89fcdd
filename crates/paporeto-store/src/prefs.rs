//! User preferences with defaults merge.
//!
//! The stored blob may be partial or carry keys this build does not know
//! about: missing keys take their default, unknown keys are kept verbatim so
//! newer clients sharing the store do not lose settings.

use paporeto_shared::constants::{DEFAULT_ACCENT, KEY_PREFS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::database::Database;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Preferences {
    // Notifications
    pub notif_msgs: bool,
    pub notif_groups: bool,
    pub notif_status: bool,
    pub notif_calls: bool,
    pub notif_sound: bool,
    pub notif_vibrate: bool,
    pub notif_dnd: bool,
    pub notif_volume: u8,

    // Privacy
    pub priv_lastseen: bool,
    pub priv_readreceipt: bool,
    pub priv_typing: bool,
    pub priv_online: bool,
    pub priv_photo: String,
    pub priv_bio: String,
    pub priv_status: String,
    pub priv_groups: String,

    // Calls
    pub call_noise: bool,
    pub call_echo: bool,
    pub call_mirror: bool,
    pub call_start_muted: bool,
    pub call_vibrate: bool,
    pub call_quality: String,

    // Media auto-download
    pub media_img: bool,
    pub media_audio: bool,
    pub media_video: bool,
    pub media_docs: bool,

    // Network
    pub net_offline: bool,
    pub net_save: bool,

    // Display
    pub compact: bool,
    pub show_time: bool,
    pub enter_send: bool,
    pub font_size: u32,
    pub accent_color: String,
    pub bubble_style: String,
    pub theme: String,

    /// Keys not known to this build.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notif_msgs: true,
            notif_groups: true,
            notif_status: false,
            notif_calls: true,
            notif_sound: true,
            notif_vibrate: true,
            notif_dnd: false,
            notif_volume: 80,
            priv_lastseen: true,
            priv_readreceipt: true,
            priv_typing: true,
            priv_online: true,
            priv_photo: "all".into(),
            priv_bio: "contacts".into(),
            priv_status: "contacts".into(),
            priv_groups: "contacts".into(),
            call_noise: true,
            call_echo: true,
            call_mirror: true,
            call_start_muted: false,
            call_vibrate: true,
            call_quality: "auto".into(),
            media_img: true,
            media_audio: true,
            media_video: false,
            media_docs: false,
            net_offline: true,
            net_save: false,
            compact: false,
            show_time: true,
            enter_send: true,
            font_size: 14,
            accent_color: DEFAULT_ACCENT.into(),
            bubble_style: "rounded".into(),
            theme: "dark".into(),
            extra: Map::new(),
        }
    }
}

fn merge_over_defaults(stored: Map<String, Value>) -> Preferences {
    let mut merged = match serde_json::to_value(Preferences::default()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in stored {
        let previous = merged.insert(key.clone(), value);
        if serde_json::from_value::<Preferences>(Value::Object(merged.clone())).is_err() {
            warn!(key = %key, "stored preference has the wrong type, using default");
            match previous {
                Some(default) => merged.insert(key, default),
                None => merged.remove(&key),
            };
        }
    }
    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

impl Database {
    /// Stored preferences merged over the defaults, key by key.  A stored
    /// value of the wrong type is skipped; the rest of the blob still applies.
    pub fn preferences(&self) -> Result<Preferences> {
        match self.read_json::<Value>(KEY_PREFS)? {
            Some(Value::Object(stored)) => Ok(merge_over_defaults(stored)),
            _ => Ok(Preferences::default()),
        }
    }

    pub fn set_preferences(&self, prefs: &Preferences) -> Result<()> {
        self.write_json(KEY_PREFS, prefs)
    }

    /// Merge a partial update over the current preferences and persist it.
    pub fn update_preferences(&self, patch: Map<String, Value>) -> Result<Preferences> {
        let mut merged = match serde_json::to_value(self.preferences()?)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.extend(patch);
        let prefs: Preferences = serde_json::from_value(Value::Object(merged))
            .map_err(|e| StoreError::InvalidPreference(e.to_string()))?;
        self.set_preferences(&prefs)?;
        Ok(prefs)
    }

    /// A single preference value, falling back to its default.
    pub fn preference(&self, key: &str) -> Result<Option<Value>> {
        let prefs = serde_json::to_value(self.preferences()?)?;
        Ok(prefs.get(key).cloned())
    }

    pub fn set_preference(&self, key: &str, value: Value) -> Result<()> {
        let mut patch = Map::new();
        patch.insert(key.to_string(), value);
        self.update_preferences(patch)?;
        Ok(())
    }
}
