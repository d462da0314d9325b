//! Typed persistence for the runtime's durable state.
//!
//! Every store is an in-memory map guarded by an async `RwLock`, loaded
//! from a JSON file at startup and re-persisted (off the async executor)
//! after each mutation. The narrow per-store APIs are the seam where a
//! relational backend would slot in.

pub mod approvals;
pub mod contacts;
pub mod layers;
pub mod messages;
mod persist;
pub mod projects;
pub mod secrets;
pub mod sessions;
pub mod tasks;
pub mod traces;
pub mod usage;
pub mod webhooks;

pub use approvals::ApprovalRepo;
pub use contacts::ContactStore;
pub use layers::PromptLayerStore;
pub use messages::MessageStore;
pub use projects::ProjectStore;
pub use secrets::{SecretRow, SecretStore};
pub use sessions::SessionStore;
pub use tasks::{TaskRunStore, TaskStore};
pub use traces::TraceStore;
pub use usage::UsageStore;
pub use webhooks::WebhookStore;
