//! Interactive feedback daemon: a task-queue coordination service that lets
//! an autonomous coding agent pause and ask a human for guidance.

pub mod config;
pub mod error;
pub mod feedback;
pub mod http;
pub mod notifications;
pub mod policy;
pub mod rendezvous;
pub mod rpc;
pub mod scheduler;
pub mod tasks;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use config::ConfigStore;
use notifications::NotificationDispatcher;
use policy::RateLimiter;
use rendezvous::Rendezvous;
use scheduler::Scheduler;
use tasks::TaskQueue;

/// Everything a feedback cycle, the HTTP surface, and the RPC transport
/// share. Built once at startup and handed around behind an `Arc`.
pub struct AppContext {
    pub project: String,
    pub queue: Arc<TaskQueue>,
    pub rendezvous: Arc<Rendezvous>,
    pub scheduler: Arc<Scheduler>,
    pub config: ConfigStore,
    pub notifications: NotificationDispatcher,
    pub rate_limiter: Mutex<RateLimiter>,
    /// `--timeout` CLI override for `feedback.timeout`, process-local and
    /// never written back to config.jsonc. Zero means "no override, use
    /// the config snapshot's value."
    timeout_override: AtomicU64,
}

impl AppContext {
    pub fn new(project: impl Into<String>, config: ConfigStore) -> Arc<Self> {
        let project = project.into();
        let queue = TaskQueue::new(project.clone());
        let rendezvous = Arc::new(Rendezvous::new());
        let scheduler = Scheduler::new(queue.clone(), rendezvous.clone());
        let notifications = NotificationDispatcher::spawn(config.clone());

        Arc::new(Self {
            project,
            queue,
            rendezvous,
            scheduler,
            config,
            notifications,
            rate_limiter: Mutex::new(RateLimiter::new()),
            timeout_override: AtomicU64::new(0),
        })
    }

    pub fn override_timeout(&self, seconds: u64) {
        self.timeout_override.store(seconds, Ordering::Relaxed);
    }

    /// The effective `feedback.timeout`: the CLI override if one was set,
    /// otherwise the live config snapshot's value.
    pub fn feedback_timeout(&self) -> u64 {
        match self.timeout_override.load(Ordering::Relaxed) {
            0 => self.config.snapshot().feedback.timeout,
            seconds => seconds,
        }
    }
}
