//! Shared JSON-file persistence for the stores.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load a JSON array from disk; missing or unparseable files yield empty.
pub(crate) fn load_items<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse store file");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// Persist a JSON array to disk off the async executor.
pub(crate) async fn save_items<T: Serialize>(path: &PathBuf, items: &[T]) {
    let json = match serde_json::to_string_pretty(items) {
        Ok(j) => j,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to serialize store");
            return;
        }
    };
    let path = path.clone();
    let _ = tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, json) {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist store");
        }
    })
    .await;
}
