//! The `config.jsonc` document shape: typed sections with defaults, per §3.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_WEB_UI_PORT: u16 = 8765;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub web_enabled: bool,
    pub sound_enabled: bool,
    pub sound_volume: u8,
    pub sound_mute: bool,
    pub bark_enabled: bool,
    pub bark_url: String,
    pub bark_device_key: String,
    pub bark_icon: String,
    /// One of `"none"`, `"url"`, `"copy"`.
    pub bark_action: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            web_enabled: true,
            sound_enabled: true,
            sound_volume: 80,
            sound_mute: false,
            bark_enabled: false,
            bark_url: String::new(),
            bark_device_key: String::new(),
            bark_icon: String::new(),
            bark_action: "none".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebUiConfig {
    pub host: String,
    pub port: u16,
    pub max_retries: u32,
    pub retry_delay: u64,
}

impl Default for WebUiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_WEB_UI_PORT,
            max_retries: 3,
            retry_delay: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkSecurityConfig {
    pub bind_interface: String,
    pub allowed_networks: Vec<String>,
    pub blocked_ips: Vec<String>,
    pub enable_access_control: bool,
}

impl Default for NetworkSecurityConfig {
    fn default() -> Self {
        Self {
            bind_interface: "127.0.0.1".to_string(),
            allowed_networks: vec!["127.0.0.0/8".to_string(), "::1/128".to_string()],
            blocked_ips: Vec::new(),
            enable_access_control: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedbackConfig {
    pub timeout: u64,
    pub resubmit_prompt: String,
    pub prompt_suffix: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            timeout: 3600,
            resubmit_prompt: "No response was received in time; continuing with the agent's own judgment.".to_string(),
            prompt_suffix: "\n\n(You can reply with text, pick an option, or attach images.)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// The full `config.jsonc` document. Unknown top-level keys are preserved
/// verbatim (round-tripped on write-back) even though nothing reads them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConfigDocument {
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub web_ui: WebUiConfig,
    #[serde(default)]
    pub network_security: NetworkSecurityConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

/// Clamp and validate a parsed document. Returns the list of hard validation
/// failures (empty = valid). Clamping (e.g. `sound_volume`) happens in place
/// regardless of whether other fields fail validation.
pub fn clamp_and_validate(doc: &mut ConfigDocument) -> Vec<String> {
    let mut errors = Vec::new();

    doc.notification.sound_volume = doc.notification.sound_volume.min(100);

    if doc.web_ui.port == 0 {
        errors.push("web_ui.port must be in 1..=65535".to_string());
    }

    for cidr in &doc.network_security.allowed_networks {
        if cidr.parse::<ipnetwork::IpNetwork>().is_err() {
            errors.push(format!("network_security.allowed_networks: invalid CIDR '{cidr}'"));
        }
    }
    for ip in &doc.network_security.blocked_ips {
        if ip.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!("network_security.blocked_ips: invalid IP '{ip}'"));
        }
    }

    if doc.feedback.timeout == 0 {
        errors.push("feedback.timeout must be > 0".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_is_valid() {
        let mut doc = ConfigDocument::default();
        assert!(clamp_and_validate(&mut doc).is_empty());
    }

    #[test]
    fn sound_volume_is_clamped_not_rejected() {
        let mut doc = ConfigDocument::default();
        doc.notification.sound_volume = 255;
        let errors = clamp_and_validate(&mut doc);
        assert!(errors.is_empty());
        assert_eq!(doc.notification.sound_volume, 100);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut doc = ConfigDocument::default();
        doc.feedback.timeout = 0;
        let errors = clamp_and_validate(&mut doc);
        assert!(errors.iter().any(|e| e.contains("feedback.timeout")));
    }

    #[test]
    fn bad_cidr_is_rejected() {
        let mut doc = ConfigDocument::default();
        doc.network_security.allowed_networks = vec!["not-a-cidr".to_string()];
        let errors = clamp_and_validate(&mut doc);
        assert!(errors.iter().any(|e| e.contains("invalid CIDR")));
    }

    #[test]
    fn unknown_keys_round_trip() {
        let raw = r#"{"feedback": {"timeout": 10}, "some_future_key": {"x": 1}}"#;
        let doc: ConfigDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.feedback.timeout, 10);
        assert!(doc.unknown.contains_key("some_future_key"));
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["some_future_key"]["x"], 1);
    }
}
