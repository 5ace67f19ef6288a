//! Completion rendezvous: gives the blocking RPC caller for task `T` a
//! one-shot hand-off of `T`'s submitted result.
//!
//! A `Mutex<HashMap<id, Slot>>` plus a `broadcast` wake channel; `wait` loops
//! on "check current state, then await the next broadcast or the deadline."
//! A slot carries a `TaskResult`, and `deliver` is idempotent — a second
//! delivery (the scheduler racing a human submission) is a silent no-op
//! rather than an error, per the queue's own single-winner guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};

use crate::tasks::TaskResult;

#[derive(Debug, Clone)]
pub enum WaitOutcome {
    Delivered(TaskResult),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
enum SlotState {
    Empty,
    Filled(TaskResult),
    Cancelled,
}

pub struct Rendezvous {
    slots: Arc<Mutex<HashMap<String, SlotState>>>,
    tx: broadcast::Sender<String>,
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl Rendezvous {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            tx,
        }
    }

    /// Create a fresh, empty slot for `task_id`. Idempotent: registering a
    /// task id that already has a slot just resets it to empty.
    pub async fn register(&self, task_id: &str) {
        self.slots
            .lock()
            .await
            .insert(task_id.to_string(), SlotState::Empty);
    }

    /// Fill the slot if it exists and is still empty. Delivering to an
    /// unknown or already-filled slot is a silent no-op.
    pub async fn deliver(&self, task_id: &str, result: TaskResult) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(task_id) {
            if matches!(slot, SlotState::Empty) {
                *slot = SlotState::Filled(result);
                drop(slots);
                let _ = self.tx.send(task_id.to_string());
            }
        }
    }

    /// Wake the waiter with a cancellation outcome (process shutdown).
    pub async fn cancel(&self, task_id: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(task_id) {
            if matches!(slot, SlotState::Empty) {
                *slot = SlotState::Cancelled;
                drop(slots);
                let _ = self.tx.send(task_id.to_string());
            }
        }
    }

    /// Block until the slot is filled, `overall_deadline` elapses, or the
    /// slot is cancelled. Removes the slot before returning.
    pub async fn wait(&self, task_id: &str, overall_deadline: Duration) -> WaitOutcome {
        let mut rx = self.tx.subscribe();
        let deadline = tokio::time::Instant::now() + overall_deadline;

        let outcome = loop {
            {
                let slots = self.slots.lock().await;
                match slots.get(task_id) {
                    Some(SlotState::Filled(result)) => break WaitOutcome::Delivered(result.clone()),
                    Some(SlotState::Cancelled) => break WaitOutcome::Cancelled,
                    Some(SlotState::Empty) => {}
                    None => break WaitOutcome::Cancelled,
                }
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break WaitOutcome::TimedOut;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(_)) => {
                    // Re-check status on the next loop iteration — either this
                    // task's slot changed, or a different one did.
                }
                Ok(Err(_)) | Err(_) => {
                    break WaitOutcome::TimedOut;
                }
            }
        };

        self.slots.lock().await.remove(task_id);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn deliver_then_wait_returns_immediately() {
        let rendezvous = Rendezvous::new();
        rendezvous.register("t1").await;
        rendezvous
            .deliver("t1", TaskResult { text: "hi".into(), ..Default::default() })
            .await;

        let outcome = rendezvous.wait("t1", Duration::from_secs(5)).await;
        match outcome {
            WaitOutcome::Delivered(r) => assert_eq!(r.text, "hi"),
            _ => panic!("expected delivery"),
        }
    }

    #[tokio::test]
    async fn wait_then_deliver_wakes_the_waiter() {
        let rendezvous = Arc::new(Rendezvous::new());
        rendezvous.register("t1").await;

        let waiter = {
            let rendezvous = rendezvous.clone();
            tokio::spawn(async move { rendezvous.wait("t1", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        rendezvous
            .deliver("t1", TaskResult { text: "late".into(), ..Default::default() })
            .await;

        let outcome = waiter.await.unwrap();
        match outcome {
            WaitOutcome::Delivered(r) => assert_eq!(r.text, "late"),
            _ => panic!("expected delivery"),
        }
    }

    #[tokio::test]
    async fn second_deliver_is_a_silent_noop() {
        let rendezvous = Rendezvous::new();
        rendezvous.register("t1").await;
        rendezvous
            .deliver("t1", TaskResult { text: "first".into(), ..Default::default() })
            .await;
        rendezvous
            .deliver("t1", TaskResult { text: "second".into(), ..Default::default() })
            .await;

        let outcome = rendezvous.wait("t1", Duration::from_secs(1)).await;
        match outcome {
            WaitOutcome::Delivered(r) => assert_eq!(r.text, "first"),
            _ => panic!("expected delivery"),
        }
    }

    #[tokio::test]
    async fn timeout_elapses_without_delivery() {
        let rendezvous = Rendezvous::new();
        rendezvous.register("t1").await;
        let outcome = rendezvous.wait("t1", Duration::from_millis(50)).await;
        assert!(matches!(outcome, WaitOutcome::TimedOut));
    }

    #[tokio::test]
    async fn cancel_wakes_waiter_with_cancellation() {
        let rendezvous = Arc::new(Rendezvous::new());
        rendezvous.register("t1").await;

        let waiter = {
            let rendezvous = rendezvous.clone();
            tokio::spawn(async move { rendezvous.wait("t1", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        rendezvous.cancel("t1").await;

        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, WaitOutcome::Cancelled));
    }
}
