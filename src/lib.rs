//! Mnemo - context memory core for AI agents
//!
//! Ingests raw interaction materials (chat transcripts, code diffs,
//! execution logs), distills them into structured memory items, ranks them
//! against a stated purpose under a hard token budget, and emits a
//! deterministic working set for downstream LLM context injection.
//!
//! All state is isolated per workspace; no operation reads or writes
//! across workspaces.

pub mod consolidate;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod rank;
pub mod redact;
pub mod storage;
pub mod types;
pub mod workingset;

pub use engine::MemoryCore;
pub use error::{MnemoError, Result};
pub use storage::Storage;
pub use types::*;
pub use workingset::{ArtifactRef, WorkingSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
