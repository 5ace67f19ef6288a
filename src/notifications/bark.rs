//! Bark push transport: HTTPS POST to a user-supplied endpoint.

use crate::config::NotificationConfig;
use crate::notifications::NotificationEvent;

#[derive(Debug, thiserror::Error)]
pub enum BarkError {
    #[error("bark_url is not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(reqwest::StatusCode),
}

pub async fn send(config: &NotificationConfig, event: &NotificationEvent) -> Result<(), BarkError> {
    if config.bark_url.is_empty() {
        return Err(BarkError::NotConfigured);
    }

    let title = format!("{} needs your input", event.project);
    let body = serde_json::json!({
        "title": title,
        "body": event.prompt_preview,
        "device_key": config.bark_device_key,
        "icon": config.bark_icon,
        "group": "ai-intervention-agent",
        "action": config.bark_action,
    });

    post(&config.bark_url, &body).await
}

/// Used by `POST /api/test-bark`: caller supplies the parameters directly
/// rather than reading them from the stored config, so a human can verify a
/// Bark endpoint before saving it.
pub async fn send_probe(
    bark_url: &str,
    device_key: &str,
    icon: &str,
    action: &str,
) -> Result<(), BarkError> {
    if bark_url.is_empty() {
        return Err(BarkError::NotConfigured);
    }
    let body = serde_json::json!({
        "title": "Test notification",
        "body": "This is a test notification from ai-intervention-agent.",
        "device_key": device_key,
        "icon": icon,
        "group": "ai-intervention-agent",
        "action": action,
    });
    post(bark_url, &body).await
}

async fn post(url: &str, body: &serde_json::Value) -> Result<(), BarkError> {
    let client = reqwest::Client::new();
    let response = client.post(url).json(body).send().await?;
    if !response.status().is_success() {
        return Err(BarkError::Status(response.status()));
    }
    Ok(())
}
