use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long a progress record survives after its last update.
pub const PROGRESS_RETENTION_SECS: i64 = 300;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Started,
    Processing,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEntry {
    pub status: GenerationStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

/// Progress records keyed by generation identifier. Each generation is the
/// only writer for its own key; readers take the same lock.
#[derive(Default)]
pub struct ProgressStore {
    entries: Mutex<HashMap<Uuid, ProgressEntry>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, id: Uuid, status: GenerationStatus, progress: u8, message: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            id,
            ProgressEntry {
                status,
                progress,
                message: message.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, id: &Uuid) -> Option<ProgressEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(id).cloned()
    }

    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| !is_stale(entry, now));
        before - entries.len()
    }
}

pub fn is_stale(entry: &ProgressEntry, now: DateTime<Utc>) -> bool {
    now - entry.updated_at >= ChronoDuration::seconds(PROGRESS_RETENTION_SECS)
}

/// Periodic eviction of progress records past the retention window.
pub fn spawn_sweeper(store: Arc<ProgressStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = store.evict_stale(Utc::now());
            if removed > 0 {
                tracing::debug!("Evicted {} stale progress records", removed);
            }
        }
    });
}

/// One cancellation token per in-flight generation. The cancel endpoint has
/// no request body, so it fires every registered token.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.insert(id, token.clone());
        token
    }

    pub fn unregister(&self, id: &Uuid) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.remove(id);
    }

    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_then_get_returns_latest() {
        let store = ProgressStore::new();
        let id = Uuid::new_v4();
        store.update(id, GenerationStatus::Started, 5, "Starting video generation...");
        store.update(id, GenerationStatus::Processing, 40, "Downloading 3 videos...");

        let entry = store.get(&id).unwrap();
        assert_eq!(entry.status, GenerationStatus::Processing);
        assert_eq!(entry.progress, 40);
        assert_eq!(entry.message, "Downloading 3 videos...");
    }

    #[test]
    fn unknown_id_is_absent() {
        let store = ProgressStore::new();
        assert!(store.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn eviction_respects_retention_window() {
        let store = ProgressStore::new();
        let id = Uuid::new_v4();
        store.update(id, GenerationStatus::Processing, 50, "Generating audio...");

        let now = Utc::now();
        assert_eq!(store.evict_stale(now), 0);
        assert!(store.get(&id).is_some());

        let later = now + ChronoDuration::seconds(PROGRESS_RETENTION_SECS + 1);
        assert_eq!(store.evict_stale(later), 1);
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn status_serializes_snake_case() {
        let value = serde_json::to_value(GenerationStatus::Processing).unwrap();
        assert_eq!(value, serde_json::json!("processing"));
    }

    #[test]
    fn cancel_all_fires_every_registered_token() {
        let registry = CancelRegistry::new();
        let a = registry.register(Uuid::new_v4());
        let b = registry.register(Uuid::new_v4());
        assert!(!a.is_cancelled());

        assert_eq!(registry.cancel_all(), 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn unregister_removes_token() {
        let registry = CancelRegistry::new();
        let id = Uuid::new_v4();
        let token = registry.register(id);
        registry.unregister(&id);

        assert_eq!(registry.cancel_all(), 0);
        assert!(!token.is_cancelled());
    }
}
