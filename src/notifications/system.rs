//! Native OS notification transport via `notify-rust`.
//!
//! Errors are logged and swallowed by the caller; this function's `Result`
//! only exists so the dispatcher can distinguish "failed" from "timed out"
//! for its own log line.

use crate::notifications::NotificationEvent;

#[derive(Debug, thiserror::Error)]
#[error("system notification backend error: {0}")]
pub struct SystemNotifyError(String);

pub async fn send(event: &NotificationEvent) -> Result<(), SystemNotifyError> {
    let project = event.project.clone();
    let prompt_preview = event.prompt_preview.clone();

    tokio::task::spawn_blocking(move || {
        notify_rust::Notification::new()
            .summary(&format!("{project} needs your input"))
            .body(&prompt_preview)
            .appname("ai-intervention-agent")
            .show()
            .map(|_| ())
            .map_err(|err| SystemNotifyError(err.to_string()))
    })
    .await
    .map_err(|join_err| SystemNotifyError(join_err.to_string()))?
}
