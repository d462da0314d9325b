//! Long-term memory — vector store trait and the in-process implementation.

use parking_lot::RwLock;

use nexus_domain::error::Result;
use nexus_domain::memory::MemoryEntry;

/// Produces embeddings for memory content and retrieval queries.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Pluggable vector store for episodic memory.
#[async_trait::async_trait]
pub trait VectorMemoryStore: Send + Sync {
    async fn store(&self, entry: MemoryEntry) -> Result<()>;

    /// Top-k entries for a project by cosine similarity, best first.
    async fn search(
        &self,
        project_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(MemoryEntry, f32)>>;
}

/// In-process vector store with exact cosine search. Suitable for a
/// single-writer runtime; the trait boundary allows swapping in a
/// database-backed store.
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl VectorMemoryStore for InMemoryVectorStore {
    async fn store(&self, entry: MemoryEntry) -> Result<()> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn search(
        &self,
        project_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(MemoryEntry, f32)>> {
        let now = chrono::Utc::now();
        let mut scored: Vec<(MemoryEntry, f32)> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.project_id == project_id)
            .filter(|e| e.expires_at.map_or(true, |exp| exp > now))
            .map(|e| (e.clone(), cosine_similarity(&e.embedding, query_embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Cosine similarity; zero when either vector is empty or zero-length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(project: &str, embedding: Vec<f32>, content: &str) -> MemoryEntry {
        MemoryEntry {
            id: Uuid::new_v4(),
            project_id: project.into(),
            session_id: None,
            category: "episodic".into(),
            content: content.into(),
            embedding,
            importance: 0.5,
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
            expires_at: None,
            metadata: None,
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_isolates_projects() {
        let store = InMemoryVectorStore::new();
        store
            .store(entry("P1", vec![1.0, 0.0, 0.0], "exact match"))
            .await
            .unwrap();
        store
            .store(entry("P1", vec![0.7, 0.7, 0.0], "partial match"))
            .await
            .unwrap();
        store
            .store(entry("P2", vec![1.0, 0.0, 0.0], "other tenant"))
            .await
            .unwrap();

        let results = store.search("P1", &[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.content, "exact match");
        assert!(results[0].1 > results[1].1);
    }

    #[tokio::test]
    async fn expired_entries_are_skipped() {
        let store = InMemoryVectorStore::new();
        let mut e = entry("P1", vec![1.0], "stale");
        e.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.store(e).await.unwrap();

        let results = store.search("P1", &[1.0], 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn top_k_truncates() {
        let store = InMemoryVectorStore::new();
        for i in 0..10 {
            store
                .store(entry("P1", vec![1.0, i as f32 * 0.01], &format!("m{i}")))
                .await
                .unwrap();
        }
        let results = store.search("P1", &[1.0, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }
}
