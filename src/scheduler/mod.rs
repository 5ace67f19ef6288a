//! Auto-resubmit scheduler: one logical timer per armed task, guaranteeing
//! every task with `auto_resubmit_timeout > 0` reaches `completed` no later
//! than its deadline even without human input.
//!
//! Each armed task gets its own `tokio::spawn`ed sleeper rather than a
//! shared timer wheel — deadlines are wall-clock (`tokio::time::sleep_until`
//! against an `Instant` computed from the task's `deadline`), so the timer
//! survives arbitrarily long gaps between UI polls.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::rendezvous::Rendezvous;
use crate::tasks::{TaskQueue, TaskResult};

pub struct Scheduler {
    queue: Arc<TaskQueue>,
    rendezvous: Arc<Rendezvous>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(queue: Arc<TaskQueue>, rendezvous: Arc<Rendezvous>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            rendezvous,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Arm a deadline timer for `task_id`, firing `resubmit_text` as a
    /// synthesized submission if nothing else completes the task first.
    /// Idempotent: arming a task twice replaces the previous timer.
    pub async fn arm(
        self: &Arc<Self>,
        task_id: String,
        fire_at: std::time::Instant,
        resubmit_text: String,
    ) {
        self.disarm(&task_id).await;

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(fire_at.into()).await;

            let result = TaskResult {
                text: resubmit_text,
                selected_options: Vec::new(),
                images: Vec::new(),
            };

            // If the queue rejects this (already completed by a concurrent
            // human submission), the timer firing is a no-op — the queue's
            // own single-winner guarantee resolves the race.
            if scheduler.queue.submit(&task_id, result.clone()).await.is_ok() {
                scheduler.rendezvous.deliver(&task_id, result).await;
            }

            scheduler.timers.lock().await.remove(&task_id);
        });

        self.timers.lock().await.insert(task_id, handle);
    }

    /// Disarm on human submission, eviction, or shutdown.
    pub async fn disarm(&self, task_id: &str) {
        if let Some(handle) = self.timers.lock().await.remove(task_id) {
            handle.abort();
        }
    }

    /// Disarm every outstanding timer (process shutdown).
    pub async fn disarm_all(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}
