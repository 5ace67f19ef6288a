//! Config store: discovery, JSONC parsing, validation, hot reload, and
//! comment-preserving write-back.
//!
//! A published snapshot behind `Arc<RwLock<Arc<ConfigDocument>>>` so readers
//! never observe a torn read, and a `notify`-backed debounced watcher that
//! re-parses and swaps the snapshot on change.

mod document;
mod jsonc;

pub use document::{
    clamp_and_validate, ConfigDocument, FeedbackConfig, LoggingConfig, NetworkSecurityConfig,
    NotificationConfig, WebUiConfig,
};

use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed: {0:?}")]
    Invalid(Vec<String>),
    #[error("section '{0}' not found in document on disk")]
    SectionMissing(String),
}

const APP_DIR_NAME: &str = "ai-intervention-agent";

/// Resolve the config path per the discovery order: `./config.jsonc`, then
/// the platform per-user config dir, creating the latter with defaults if
/// neither exists yet.
pub fn resolve_path() -> std::io::Result<PathBuf> {
    let cwd_candidate = PathBuf::from("config.jsonc");
    if cwd_candidate.exists() {
        return Ok(cwd_candidate);
    }

    let per_user_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME);
    let per_user_candidate = per_user_dir.join("config.jsonc");
    if per_user_candidate.exists() {
        return Ok(per_user_candidate);
    }

    std::fs::create_dir_all(&per_user_dir)?;
    let default_doc = ConfigDocument::default();
    let rendered =
        serde_json::to_string_pretty(&default_doc).expect("ConfigDocument always serializes");
    std::fs::write(&per_user_candidate, rendered)?;
    Ok(per_user_candidate)
}

fn read_and_parse(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let stripped = jsonc::strip_comments(&raw);
    let mut doc: ConfigDocument =
        serde_json::from_str(&stripped).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let errors = clamp_and_validate(&mut doc);
    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors));
    }
    Ok(doc)
}

/// A live, hot-reloadable configuration handle. Cloning is cheap (it clones
/// the `Arc`s); every clone observes the same underlying snapshot and the
/// same change broadcast.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    snapshot: Arc<RwLock<Arc<ConfigDocument>>>,
    changes: broadcast::Sender<Arc<ConfigDocument>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl ConfigStore {
    /// Load the document at `path` (or fall back to defaults if it can't be
    /// read/parsed, logging a warning — the store never fails to construct).
    pub fn load(path: PathBuf) -> Self {
        let doc = match read_and_parse(&path) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "using default config, failed to load existing file");
                ConfigDocument::default()
            }
        };
        let (tx, _rx) = broadcast::channel(16);
        Self {
            path,
            snapshot: Arc::new(RwLock::new(Arc::new(doc))),
            changes: tx,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Convenience constructor using the standard discovery order.
    pub fn discover() -> std::io::Result<Self> {
        let path = resolve_path()?;
        Ok(Self::load(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current snapshot. Cheap: an `Arc` clone, never blocks a writer.
    pub fn snapshot(&self) -> Arc<ConfigDocument> {
        self.snapshot
            .read()
            .expect("config snapshot lock poisoned")
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ConfigDocument>> {
        self.changes.subscribe()
    }

    /// Re-read and re-parse the file at `self.path`. On success, swaps the
    /// snapshot and broadcasts iff the new document differs from the old
    /// one. On failure, logs and leaves the previous snapshot in effect.
    fn reload(&self) {
        match read_and_parse(&self.path) {
            Ok(doc) => {
                let changed = *self.snapshot() != doc;
                if changed {
                    let doc = Arc::new(doc);
                    *self.snapshot.write().expect("config snapshot lock poisoned") = doc.clone();
                    let _ = self.changes.send(doc);
                    tracing::info!(path = %self.path.display(), "config reloaded");
                }
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "config reload failed, keeping previous snapshot");
            }
        }
    }

    /// Merge a partial notification-config update onto the current snapshot,
    /// validate, write the changed keys back to disk (preserving comments
    /// and formatting elsewhere), then swap and broadcast.
    ///
    /// Write errors are surfaced to the caller; the in-memory snapshot is
    /// only swapped after the write to disk succeeds.
    pub async fn update_notification(
        &self,
        patch: serde_json::Value,
    ) -> Result<Arc<ConfigDocument>, ConfigError> {
        let _guard = self.write_lock.lock().await;

        let mut next = (*self.snapshot()).clone();
        let mut notification_json = serde_json::to_value(&next.notification)
            .expect("NotificationConfig always serializes");
        merge_json(&mut notification_json, &patch);
        next.notification = serde_json::from_value(notification_json)
            .map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let errors = clamp_and_validate(&mut next);
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        self.write_back(&next)?;

        let next = Arc::new(next);
        *self.snapshot.write().expect("config snapshot lock poisoned") = next.clone();
        let _ = self.changes.send(next.clone());
        Ok(next)
    }

    fn write_back(&self, doc: &ConfigDocument) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        let mut rendered = raw.clone();
        let notification_json =
            serde_json::to_value(&doc.notification).expect("NotificationConfig always serializes");
        if let serde_json::Value::Object(map) = notification_json {
            for (key, value) in map {
                let literal = serde_json::to_string(&value).expect("scalar always serializes");
                match jsonc::replace_scalar(&rendered, "notification", &key, &literal) {
                    Some(updated) => rendered = updated,
                    None => {
                        tracing::debug!(key = %key, "key not present verbatim in config file, falling back to full rewrite");
                        rendered = serde_json::to_string_pretty(doc)
                            .expect("ConfigDocument always serializes");
                        break;
                    }
                }
            }
        }

        std::fs::write(&self.path, rendered).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Shallow merge of `patch` onto `target` (both expected to be JSON objects).
/// Keys present in `patch` overwrite; keys absent are left as-is.
fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (serde_json::Value::Object(target_map), serde_json::Value::Object(patch_map)) =
        (target, patch)
    {
        for (key, value) in patch_map {
            target_map.insert(key.clone(), value.clone());
        }
    }
}

/// Holds the debouncer alive for as long as the store should keep watching;
/// dropping this stops the watch.
pub struct ConfigWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, FileIdMap>,
}

impl ConfigWatcher {
    /// Returns `None` if the watcher could not be created (non-fatal; the
    /// daemon runs fine without hot-reload, it just needs a restart to pick
    /// up edits).
    pub fn spawn(store: ConfigStore) -> Option<Self> {
        let watch_path = store.path.clone();
        let parent = watch_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let debouncer = new_debouncer(
            Duration::from_secs(2),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    use notify::EventKind;
                    let relevant = events
                        .iter()
                        .any(|e| matches!(e.event.kind, EventKind::Modify(_) | EventKind::Create(_)));
                    if relevant {
                        store.reload();
                    }
                }
                Err(errors) => {
                    for err in errors {
                        tracing::warn!(error = %err, "config watcher error");
                    }
                }
            },
        );

        let mut debouncer = match debouncer {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!(error = %err, "config watcher failed to start, hot-reload disabled");
                return None;
            }
        };

        use notify::Watcher as _;
        if let Err(err) = debouncer
            .watcher()
            .watch(&parent, notify::RecursiveMode::NonRecursive)
        {
            tracing::warn!(error = %err, path = %parent.display(), "config watcher failed to start, hot-reload disabled");
            return None;
        }

        tracing::info!(path = %watch_path.display(), "config hot-reload watcher started");
        Some(Self {
            _debouncer: debouncer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.jsonc");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.jsonc");
        let store = ConfigStore::load(path);
        assert_eq!(*store.snapshot(), ConfigDocument::default());
    }

    #[test]
    fn loads_and_parses_real_file() {
        let (_dir, path) = write_temp(
            r#"{
              // user overrides
              "feedback": { "timeout": 120 },
              "notification": { "bark_enabled": true }
            }"#,
        );
        let store = ConfigStore::load(path);
        let snap = store.snapshot();
        assert_eq!(snap.feedback.timeout, 120);
        assert!(snap.notification.bark_enabled);
    }

    #[test]
    fn invalid_file_keeps_defaults_on_initial_load() {
        let (_dir, path) = write_temp(r#"{ "feedback": { "timeout": 0 } }"#);
        let store = ConfigStore::load(path);
        assert_eq!(store.snapshot().feedback.timeout, ConfigDocument::default().feedback.timeout);
    }

    #[tokio::test]
    async fn update_notification_merges_and_persists() {
        let (_dir, path) = write_temp(
            r#"{ "notification": { "bark_enabled": false, "sound_volume": 50 } }"#,
        );
        let store = ConfigStore::load(path.clone());
        let updated = store
            .update_notification(serde_json::json!({ "bark_enabled": true }))
            .await
            .unwrap();
        assert!(updated.notification.bark_enabled);
        assert_eq!(updated.notification.sound_volume, 50);

        let reread = std::fs::read_to_string(&path).unwrap();
        assert!(reread.contains("\"bark_enabled\": true") || reread.contains("\"bark_enabled\":true"));
    }

    #[tokio::test]
    async fn update_notification_rejects_invalid_patch() {
        let (_dir, path) = write_temp(r#"{ "notification": { "sound_volume": 50 } }"#);
        let store = ConfigStore::load(path);
        // sound_volume is clamped not rejected, so use a patch that can't
        // deserialize into the right type to exercise the error path.
        let err = store
            .update_notification(serde_json::json!({ "sound_volume": "not-a-number" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn reload_ignores_unchanged_content() {
        let (_dir, path) = write_temp(r#"{ "feedback": { "timeout": 90 } }"#);
        let store = ConfigStore::load(path);
        let mut rx = store.subscribe();
        store.reload();
        assert!(rx.try_recv().is_err());
    }
}
