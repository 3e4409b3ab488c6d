//! Client configuration and device identity.
//!
//! # Design
//! `ClientConfig` describes the app build being impersonated and the target
//! host. Every field has a default so a partial JSON document can override a
//! handful of values. `Device` holds per-install identifiers; they are minted
//! once and persisted through the settings store so a reinstall is not
//! simulated on every start.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::settings::{keys, SettingsStore};

pub const DEFAULT_BASE_URL: &str = "https://i.instagram.com/api/v1/";

/// Static description of the emulated app and target host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub app_version: String,
    pub version_code: String,
    pub app_id: String,
    pub capabilities: String,
    pub connection_type: String,
    pub locale: String,
    pub timezone_offset: i32,
    pub bloks_versioning_id: String,
    /// Device descriptor embedded in the user agent, e.g.
    /// `"26/8.0.0; 480dpi; 1080x1920; samsung; SM-G930F; herolte; samsungexynos8890"`.
    pub device_string: String,
    pub timeout_ms: u64,
    /// Page size requested by exclusion-based search.
    pub search_page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_version: "269.0.0.18.75".to_string(),
            version_code: "314665256".to_string(),
            app_id: "567067343352427".to_string(),
            capabilities: "3brTv10=".to_string(),
            connection_type: "WIFI".to_string(),
            locale: "en_US".to_string(),
            timezone_offset: 0,
            bloks_versioning_id: "ce555e5500576acd8e84a66018f54a05720f2dce29f0bb5a1f97f0c10d6fac48"
                .to_string(),
            device_string: "26/8.0.0; 480dpi; 1080x1920; samsung; SM-G930F; herolte; samsungexynos8890"
                .to_string(),
            timeout_ms: 30_000,
            search_page_size: 30,
        }
    }
}

impl ClientConfig {
    /// Overlay a (possibly partial) JSON document on the defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ApiError> {
        serde_json::from_str(raw).map_err(|e| ApiError::Serialization(e.to_string()))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn user_agent(&self) -> String {
        format!(
            "Instagram {} Android ({}; {}; {})",
            self.app_version, self.device_string, self.locale, self.version_code
        )
    }
}

/// Per-install identifiers sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// `android-<16 hex>`.
    pub device_id: String,
    pub uuid: String,
    pub phone_id: String,
    pub advertising_id: String,
}

impl Device {
    pub fn generate() -> Self {
        let seed = Uuid::new_v4().simple().to_string();
        Self {
            device_id: format!("android-{}", &seed[..16]),
            uuid: Uuid::new_v4().to_string(),
            phone_id: Uuid::new_v4().to_string(),
            advertising_id: Uuid::new_v4().to_string(),
        }
    }

    /// Load the stored identity, minting and persisting any missing parts.
    pub fn load_or_generate(store: &dyn SettingsStore) -> Self {
        let fresh = Self::generate();
        let pick = |key: &str, generated: String| match store.get(key) {
            Some(existing) if !existing.is_empty() => existing,
            _ => {
                store.set(key, &generated);
                generated
            }
        };
        Self {
            device_id: pick(keys::DEVICE_ID, fresh.device_id),
            uuid: pick(keys::UUID, fresh.uuid),
            phone_id: pick(keys::PHONE_ID, fresh.phone_id),
            advertising_id: pick(keys::ADVERTISING_ID, fresh.advertising_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    #[test]
    fn partial_json_overrides_defaults() {
        let config =
            ClientConfig::from_json_str(r#"{"base_url":"http://127.0.0.1:9/api/v1/","timeout_ms":500}"#)
                .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9/api/v1/");
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.search_page_size, 30);
    }

    #[test]
    fn invalid_config_is_reported() {
        let err = ClientConfig::from_json_str(r#"{"timeout_ms":"soon"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
    }

    #[test]
    fn user_agent_mentions_version_and_locale() {
        let ua = ClientConfig::default().user_agent();
        assert!(ua.starts_with("Instagram 269.0.0.18.75 Android ("));
        assert!(ua.contains("en_US"));
    }

    #[test]
    fn device_id_shape() {
        let device = Device::generate();
        assert!(device.device_id.starts_with("android-"));
        assert_eq!(device.device_id.len(), "android-".len() + 16);
    }

    #[test]
    fn device_identity_is_persisted() {
        let store = MemorySettings::new();
        let first = Device::load_or_generate(&store);
        let second = Device::load_or_generate(&store);
        assert_eq!(first, second);
        assert_eq!(store.get(keys::DEVICE_ID), Some(first.device_id));
    }
}
