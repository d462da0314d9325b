//! LLM provider adapters.
//!
//! Each adapter translates between the internal message/tool vocabulary and
//! one vendor wire format, exposing a uniform streaming contract: a lazy
//! sequence of [`nexus_domain::stream::ChatEvent`]s with exactly one
//! `message_start` and one `message_end` per successful stream.

pub mod anthropic;
pub mod failover;
pub mod openai_compat;
pub mod pricing;
pub mod registry;
pub mod sse;
pub mod traits;
mod util;

pub use registry::ProviderRegistry;
pub use traits::{ChatParams, ProviderAdapter};
pub use util::estimate_tokens;
