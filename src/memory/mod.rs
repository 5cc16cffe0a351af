//! Per-user memory: stores and the personalization overlay

pub mod in_memory;
pub mod overlay;
pub mod sqlite;
pub mod store;

pub use in_memory::InMemoryMemoryStore;
pub use overlay::{
    OverlaySession, Personalization, PersonalizationOverlay, CONTEXT_SNAPSHOT_KEY,
    RESPONSE_STYLE_KEY,
};
pub use sqlite::SqliteMemoryStore;
pub use store::{is_expired, MemoryStore};
