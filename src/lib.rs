//! FormHelper - query understanding and response routing for a
//! medical-billing form assistant
//!
//! Free-text questions asked while filling out billing forms are classified,
//! scanned for medical entities, and answered either from the in-process
//! knowledge base or by a rate-limited remote reasoning service, with
//! per-user memory layered on top.

pub mod assistant;
pub mod config;
pub mod error;
pub mod intelligence;
pub mod knowledge;
pub mod memory;
pub mod remote;
pub mod routing;
pub mod types;

pub use assistant::{AssistantReply, FormAssistant, QueryDiagnostics};
pub use config::AssistantConfig;
pub use error::{FormHelperError, RemoteError, Result};
pub use knowledge::KnowledgeBase;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
