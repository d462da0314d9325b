//! Memory management — four layers, hit in order for every turn.
//!
//! 1. **Context window** — pass messages through untouched when they fit.
//! 2. **Pruning** — turn-based or token-based trimming when they don't.
//! 3. **Compaction** — explicit summary replacement of old history.
//! 4. **Long-term** — vector-similarity retrieval over episodic entries.

pub mod compaction;
pub mod fit;
pub mod long_term;

use std::sync::Arc;

use nexus_domain::error::{Error, Result};
use nexus_domain::memory::{CompactionEntry, MemoryEntry};
use nexus_domain::project::MemoryConfig;
use nexus_domain::tool::Message;

pub use compaction::Summarizer;
pub use long_term::{Embedder, InMemoryVectorStore, VectorMemoryStore};

/// Counts tokens for a message list. Implemented by provider adapters;
/// a character-based estimate is available for tests and fallbacks.
pub trait TokenCounter: Send + Sync {
    fn count(&self, messages: &[Message]) -> u32;
}

/// ~4 chars per token plus a small per-message overhead.
pub struct CharEstimateCounter;

impl TokenCounter for CharEstimateCounter {
    fn count(&self, messages: &[Message]) -> u32 {
        let chars: usize = messages.iter().map(|m| m.content.char_len() + 16).sum();
        (chars / 4) as u32
    }
}

/// Orchestrates the four memory layers for one project.
pub struct MemoryManager {
    config: MemoryConfig,
    counter: Arc<dyn TokenCounter>,
    summarizer: Option<Arc<dyn Summarizer>>,
    store: Option<Arc<dyn VectorMemoryStore>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            config,
            counter,
            summarizer: None,
            store: None,
            embedder: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_long_term(
        mut self,
        store: Arc<dyn VectorMemoryStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        self.store = Some(store);
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// L1 + L2: return messages that fit inside
    /// `context_window − reserve_tokens`, pruning per the configured
    /// strategy when they don't. Idempotent when the input already fits.
    pub fn fit_to_context_window(&self, messages: &[Message], context_window: u32) -> Vec<Message> {
        let available = context_window.saturating_sub(self.config.reserve_tokens);
        fit::fit_to_window(
            messages,
            self.counter.as_ref(),
            available,
            self.config.pruning_strategy,
            self.config.max_turns,
        )
    }

    /// L3: replace all but the last 4 messages with a single summary
    /// message. Fails when compaction is disabled or no summarizer is
    /// configured.
    pub async fn compact(
        &self,
        session_id: uuid::Uuid,
        messages: &[Message],
    ) -> Result<(Vec<Message>, CompactionEntry)> {
        if !self.config.compaction_enabled {
            return Err(Error::Validation(
                "compaction is disabled for this project".into(),
            ));
        }
        let summarizer = self.summarizer.as_ref().ok_or_else(|| {
            Error::Validation("compaction requires a configured summarizer".into())
        })?;

        compaction::compact(
            session_id,
            messages,
            summarizer.as_ref(),
            self.counter.as_ref(),
        )
        .await
    }

    /// L4: persist a long-term entry (embedding computed if absent).
    pub async fn store_memory(&self, mut entry: MemoryEntry) -> Result<()> {
        let Some(store) = &self.store else {
            return Err(Error::Validation("long-term memory is not enabled".into()));
        };
        if entry.embedding.is_empty() {
            if let Some(embedder) = &self.embedder {
                entry.embedding = embedder.embed(&entry.content).await?;
            }
        }
        store.store(entry).await
    }

    /// L4: vector-similarity retrieval. Returns empty when long-term
    /// memory is disabled or no store is configured.
    pub async fn retrieve_memories(
        &self,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryEntry>> {
        if !self.config.long_term_enabled {
            return Ok(Vec::new());
        }
        let (Some(store), Some(embedder)) = (&self.store, &self.embedder) else {
            return Ok(Vec::new());
        };

        let query_embedding = embedder.embed(query).await?;
        let mut scored = store.search(project_id, &query_embedding, top_k * 2).await?;

        // Optional age decay: similarity × 0.5^(age_days / half_life_days).
        if let Some(half_life) = self.config.decay_half_life_days {
            let now = chrono::Utc::now();
            for (entry, score) in scored.iter_mut() {
                let age_days =
                    (now - entry.created_at).num_seconds() as f64 / 86_400.0;
                *score *= 0.5_f32.powf((age_days / half_life) as f32);
            }
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        }

        Ok(scored.into_iter().take(top_k).map(|(e, _)| e).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: MemoryConfig) -> MemoryManager {
        MemoryManager::new(config, Arc::new(CharEstimateCounter))
    }

    #[tokio::test]
    async fn compact_fails_when_disabled() {
        let m = manager(MemoryConfig::default());
        let err = m
            .compact(uuid::Uuid::new_v4(), &[Message::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn compact_fails_without_summarizer() {
        let m = manager(MemoryConfig {
            compaction_enabled: true,
            ..Default::default()
        });
        let err = m
            .compact(uuid::Uuid::new_v4(), &[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("summarizer"));
    }

    #[tokio::test]
    async fn retrieve_returns_empty_when_long_term_disabled() {
        let m = manager(MemoryConfig::default());
        let out = m.retrieve_memories("P1", "anything", 5).await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn fit_is_idempotent_when_messages_fit() {
        let m = manager(MemoryConfig::default());
        let messages = vec![Message::system("sys"), Message::user("hello")];
        let fitted = m.fit_to_context_window(&messages, 100_000);
        assert_eq!(fitted.len(), messages.len());
        let refitted = m.fit_to_context_window(&fitted, 100_000);
        assert_eq!(refitted.len(), fitted.len());
    }

    // ── Long-term retrieval ─────────────────────────────────────────

    /// Maps a few known phrases onto fixed unit vectors.
    struct PhraseEmbedder;

    #[async_trait::async_trait]
    impl Embedder for PhraseEmbedder {
        async fn embed(&self, text: &str) -> nexus_domain::error::Result<Vec<f32>> {
            Ok(if text.contains("coffee") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }
    }

    fn entry(content: &str, embedding: Vec<f32>, age_days: i64) -> MemoryEntry {
        MemoryEntry {
            id: uuid::Uuid::new_v4(),
            project_id: "P1".into(),
            session_id: None,
            category: "episodic".into(),
            content: content.into(),
            embedding,
            importance: 0.5,
            access_count: 0,
            last_accessed_at: None,
            created_at: chrono::Utc::now() - chrono::Duration::days(age_days),
            expires_at: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn retrieval_ranks_by_similarity() {
        let store = Arc::new(InMemoryVectorStore::new());
        let m = MemoryManager::new(
            MemoryConfig {
                long_term_enabled: true,
                ..Default::default()
            },
            Arc::new(CharEstimateCounter),
        )
        .with_long_term(store, Arc::new(PhraseEmbedder));

        m.store_memory(entry("likes coffee", vec![1.0, 0.0], 0))
            .await
            .unwrap();
        m.store_memory(entry("prefers tea", vec![0.0, 1.0], 0))
            .await
            .unwrap();

        let hits = m.retrieve_memories("P1", "coffee order", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "likes coffee");
    }

    #[tokio::test]
    async fn decay_demotes_stale_memories() {
        let store = Arc::new(InMemoryVectorStore::new());
        let m = MemoryManager::new(
            MemoryConfig {
                long_term_enabled: true,
                decay_half_life_days: Some(7.0),
                ..Default::default()
            },
            Arc::new(CharEstimateCounter),
        )
        .with_long_term(store, Arc::new(PhraseEmbedder));

        // Perfect match but 70 days old (10 half-lives) vs a weaker but
        // fresh match.
        m.store_memory(entry("stale coffee fact", vec![1.0, 0.0], 70))
            .await
            .unwrap();
        m.store_memory(entry("fresh mixed fact", vec![0.8, 0.6], 0))
            .await
            .unwrap();

        let hits = m.retrieve_memories("P1", "coffee", 1).await.unwrap();
        assert_eq!(hits[0].content, "fresh mixed fact");
    }

    #[tokio::test]
    async fn store_memory_requires_long_term() {
        let m = manager(MemoryConfig::default());
        let err = m
            .store_memory(entry("anything", vec![1.0], 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
