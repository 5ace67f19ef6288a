//! Notification fan-out: fires an out-of-band human alert when a new task
//! becomes visible, through independent transports with partial-failure
//! tolerance.
//!
//! Grounded on the teacher's `telemetry::TelemetrySender`: `send` hands the
//! event to a background task and returns immediately, never blocking the
//! caller. Unlike telemetry's batched interval flush, each event here fans
//! out to its transports right away — the dispatcher re-reads the current
//! config snapshot on every send, matching spec'd "toggling a transport in
//! the UI takes effect on the next event" and the fix for a known
//! stale-snapshot-silences-Bark defect.

mod bark;
mod system;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::ConfigStore;

/// Per-transport budget: a transport that doesn't finish within this window
/// is treated as failed so shutdown stays bounded.
const TRANSPORT_BUDGET: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub task_id: String,
    pub project: String,
    pub prompt_preview: String,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<NotificationEvent>,
}

impl NotificationDispatcher {
    /// Spawn the background fan-out worker and return a sender handle.
    pub fn spawn(config: ConfigStore) -> Self {
        let (tx, mut rx) = mpsc::channel::<NotificationEvent>(256);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let snapshot = config.snapshot();
                if !snapshot.notification.enabled {
                    continue;
                }

                // Web toast / sound: indirection only — the dispatcher's
                // entire role for these transports is to make sure the task
                // is visible on the next poll, which `queue.add` already
                // guaranteed before this event was ever sent.

                if snapshot.notification.bark_enabled {
                    let cfg = snapshot.notification.clone();
                    let event = event.clone();
                    tokio::spawn(async move {
                        match tokio::time::timeout(
                            TRANSPORT_BUDGET,
                            bark::send(&cfg, &event),
                        )
                        .await
                        {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => {
                                tracing::warn!(error = %err, "bark notification failed");
                            }
                            Err(_) => {
                                tracing::warn!("bark notification timed out");
                            }
                        }
                    });
                }

                {
                    let event = event.clone();
                    tokio::spawn(async move {
                        match tokio::time::timeout(TRANSPORT_BUDGET, system::send(&event)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => {
                                tracing::warn!(error = %err, "system notification failed");
                            }
                            Err(_) => {
                                tracing::warn!("system notification timed out");
                            }
                        }
                    });
                }
            }
        });

        Self { tx }
    }

    /// Queue an event for fan-out. Never blocks — drops silently if the
    /// queue is full (the dispatcher degrades, it never backs up the queue
    /// or the RPC).
    pub fn send(&self, event: NotificationEvent) {
        let _ = self.tx.try_send(event);
    }
}

pub use bark::send_probe as send_bark_probe;
