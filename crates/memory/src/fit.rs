//! Context-window fitting and pruning strategies.

use nexus_domain::project::PruningStrategy;
use nexus_domain::tool::Message;

use crate::TokenCounter;

/// L1 + L2: pass through when the list fits in `available` tokens,
/// otherwise prune per strategy.
pub fn fit_to_window(
    messages: &[Message],
    counter: &dyn TokenCounter,
    available: u32,
    strategy: PruningStrategy,
    max_turns: usize,
) -> Vec<Message> {
    if counter.count(messages) <= available {
        return messages.to_vec();
    }

    let pruned = match strategy {
        PruningStrategy::TurnBased => prune_turn_based(messages, max_turns),
        PruningStrategy::TokenBased => prune_token_based(messages, counter, available),
    };

    tracing::debug!(
        original = messages.len(),
        pruned = pruned.len(),
        ?strategy,
        "context pruned"
    );
    pruned
}

/// Turn-based pruning: keep the head and tail of the conversation.
///
/// `keep = max(2, max_turns / 2)`; the result is the first `keep` plus the
/// last `keep` messages. The first message (the system anchor) is always
/// in the head.
pub fn prune_turn_based(messages: &[Message], max_turns: usize) -> Vec<Message> {
    let keep = (max_turns / 2).max(2);
    if messages.len() <= keep * 2 {
        return messages.to_vec();
    }
    let mut out = Vec::with_capacity(keep * 2);
    out.extend_from_slice(&messages[..keep]);
    out.extend_from_slice(&messages[messages.len() - keep..]);
    out
}

/// Token-based pruning: keep message[0] unconditionally, then walk from
/// the newest message backward, adding messages while the rolling sum
/// stays within budget.
pub fn prune_token_based(
    messages: &[Message],
    counter: &dyn TokenCounter,
    budget: u32,
) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    let anchor = &messages[0];
    let mut used = counter.count(std::slice::from_ref(anchor));
    let mut kept_rev: Vec<&Message> = Vec::new();

    for msg in messages[1..].iter().rev() {
        let cost = counter.count(std::slice::from_ref(msg));
        if used + cost > budget {
            break;
        }
        used += cost;
        kept_rev.push(msg);
    }

    let mut out = Vec::with_capacity(kept_rev.len() + 1);
    out.push(anchor.clone());
    out.extend(kept_rev.into_iter().rev().cloned());
    out
}
