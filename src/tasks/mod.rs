//! The task queue: FIFO-by-arrival, at-most-one-active, per-task deadlines.
//!
//! A `Mutex`-guarded map with state transitions checked under the lock and
//! no I/O while held; the pending/active/completed state machine with FIFO
//! promotion is specific to this queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Base64-encoded, already size-capped, already re-encoded bytes.
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskResult {
    pub text: String,
    #[serde(default)]
    pub selected_options: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub auto_resubmit_timeout: u64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
}

impl Task {
    pub fn remaining_time(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline.map(|d| (d - now).num_seconds().max(0))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task already completed: {0}")]
    AlreadyCompleted(String),
}

/// Monotonic, process-unique, never-reused task id generator: `<slug>-<NNNN>`.
pub struct TaskIdGenerator {
    slug: String,
    counter: AtomicU64,
}

impl TaskIdGenerator {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            counter: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:04}", self.slug, n)
    }
}

struct Inner {
    tasks: BTreeMap<String, Task>,
    /// Insertion order by id, oldest first — used for FIFO promotion.
    arrival_order: Vec<String>,
    active_id: Option<String>,
}

/// Outcome of a `submit` call, used by callers (the feedback entry, the
/// scheduler) to decide whether to trigger rendezvous delivery.
pub struct SubmitOutcome {
    pub task_id: String,
    pub result: TaskResult,
}

pub struct TaskQueue {
    ids: TaskIdGenerator,
    inner: Mutex<Inner>,
}

impl TaskQueue {
    pub fn new(project_slug: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            ids: TaskIdGenerator::new(project_slug),
            inner: Mutex::new(Inner {
                tasks: BTreeMap::new(),
                arrival_order: Vec::new(),
                active_id: None,
            }),
        })
    }

    /// Create a task in `pending`; if no task is currently active, promote it.
    pub async fn add(
        &self,
        project: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<String>,
        auto_resubmit_timeout: u64,
    ) -> String {
        let id = self.ids.next();
        let now = Utc::now();
        let deadline = if auto_resubmit_timeout > 0 {
            Some(now + chrono::Duration::seconds(auto_resubmit_timeout as i64))
        } else {
            None
        };

        let mut status = TaskStatus::Pending;
        let mut guard = self.inner.lock().await;
        if guard.active_id.is_none() {
            status = TaskStatus::Active;
        }

        let task = Task {
            id: id.clone(),
            project: project.into(),
            prompt: prompt.into(),
            options,
            auto_resubmit_timeout,
            status,
            created_at: now,
            deadline,
            result: None,
        };

        if status == TaskStatus::Active {
            guard.active_id = Some(id.clone());
        }
        guard.arrival_order.push(id.clone());
        guard.tasks.insert(id.clone(), task);
        id
    }

    /// Ordered, stable-by-creation task listing (completed tasks that have
    /// already been evicted are simply absent).
    pub async fn list(&self) -> Vec<Task> {
        let guard = self.inner.lock().await;
        guard
            .arrival_order
            .iter()
            .filter_map(|id| guard.tasks.get(id).cloned())
            .collect()
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.inner.lock().await.tasks.get(task_id).cloned()
    }

    pub async fn active_task_id(&self) -> Option<String> {
        self.inner.lock().await.active_id.clone()
    }

    pub async fn stats(&self) -> QueueStats {
        let guard = self.inner.lock().await;
        let mut stats = QueueStats::default();
        for task in guard.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Active => stats.active += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
        }
        stats
    }

    /// Explicit activation. No-op if already active; fails for completed or
    /// unknown tasks. Demotes the previous active task (if any) to pending.
    pub async fn activate(&self, task_id: &str) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().await;

        let target_status = guard
            .tasks
            .get(task_id)
            .ok_or_else(|| QueueError::NotFound(task_id.to_string()))?
            .status;

        match target_status {
            TaskStatus::Active => Ok(()),
            TaskStatus::Completed => Err(QueueError::AlreadyCompleted(task_id.to_string())),
            TaskStatus::Pending => {
                if let Some(prev_id) = guard.active_id.clone() {
                    if let Some(prev) = guard.tasks.get_mut(&prev_id) {
                        prev.status = TaskStatus::Pending;
                    }
                }
                guard.active_id = Some(task_id.to_string());
                guard.tasks.get_mut(task_id).unwrap().status = TaskStatus::Active;
                Ok(())
            }
        }
    }

    /// Submit a result for `task_id`. Valid only from `pending` or `active`;
    /// double-submit is rejected. On success, promotes the FIFO-earliest
    /// remaining pending task to active (unless an explicit activation has
    /// already chosen a different one — FIFO is only the default).
    pub async fn submit(
        &self,
        task_id: &str,
        result: TaskResult,
    ) -> Result<SubmitOutcome, QueueError> {
        let mut guard = self.inner.lock().await;

        let task = guard
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| QueueError::NotFound(task_id.to_string()))?;

        if task.status == TaskStatus::Completed {
            return Err(QueueError::AlreadyCompleted(task_id.to_string()));
        }

        task.status = TaskStatus::Completed;
        task.result = Some(result.clone());

        if guard.active_id.as_deref() == Some(task_id) {
            guard.active_id = None;
            let next_id = guard
                .arrival_order
                .iter()
                .find(|id| {
                    guard
                        .tasks
                        .get(*id)
                        .map(|t| t.status == TaskStatus::Pending)
                        .unwrap_or(false)
                })
                .cloned();
            if let Some(next_id) = next_id {
                guard.active_id = Some(next_id.clone());
                guard.tasks.get_mut(&next_id).unwrap().status = TaskStatus::Active;
            }
        }

        Ok(SubmitOutcome {
            task_id: task_id.to_string(),
            result,
        })
    }

    /// Remove a completed task from the map once its result has been
    /// consumed by the RPC caller.
    pub async fn evict(&self, task_id: &str) {
        let mut guard = self.inner.lock().await;
        guard.tasks.remove(task_id);
        guard.arrival_order.retain(|id| id != task_id);
    }
}
