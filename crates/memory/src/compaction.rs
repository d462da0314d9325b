//! Compaction — collapse old conversation history into a summary so the
//! context window stays healthy after many turns.
//!
//! The newest 4 messages are never compacted; everything before them is
//! replaced by a single system message carrying the summary.

use chrono::Utc;
use uuid::Uuid;

use nexus_domain::error::Result;
use nexus_domain::memory::CompactionEntry;
use nexus_domain::tool::Message;

use crate::TokenCounter;

/// Number of trailing messages that always survive compaction.
pub const KEEP_LAST: usize = 4;

/// Prefix of the summary message injected into the conversation.
pub const SUMMARY_PREFIX: &str = "[Compacted conversation summary]\n";

/// Produces a summary of a message span. Backed by an LLM in production;
/// tests inject a deterministic implementation.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

/// Run one compaction pass: summarize everything but the last
/// [`KEEP_LAST`] messages and splice the summary in their place.
pub async fn compact(
    session_id: Uuid,
    messages: &[Message],
    summarizer: &dyn Summarizer,
    counter: &dyn TokenCounter,
) -> Result<(Vec<Message>, CompactionEntry)> {
    if messages.len() <= KEEP_LAST {
        let entry = CompactionEntry {
            session_id,
            summary: String::new(),
            messages_compacted: 0,
            tokens_recovered: 0,
            created_at: Utc::now(),
        };
        return Ok((messages.to_vec(), entry));
    }

    let split = messages.len() - KEEP_LAST;
    let (to_compact, to_keep) = messages.split_at(split);

    let original_tokens = counter.count(messages) as u64;
    let summary = summarizer.summarize(to_compact).await?;

    let mut compacted = Vec::with_capacity(KEEP_LAST + 1);
    compacted.push(Message::system(format!("{SUMMARY_PREFIX}{summary}")));
    compacted.extend_from_slice(to_keep);

    let compacted_tokens = counter.count(&compacted) as u64;
    let entry = CompactionEntry {
        session_id,
        summary,
        messages_compacted: to_compact.len(),
        tokens_recovered: original_tokens.saturating_sub(compacted_tokens),
        created_at: Utc::now(),
    };

    tracing::info!(
        session_id = %session_id,
        messages_compacted = entry.messages_compacted,
        tokens_recovered = entry.tokens_recovered,
        "conversation compacted"
    );

    Ok((compacted, entry))
}
