//! AIOS Agents - triangular coordination of scout, worker and oracle tiers
//!
//! - Scout (Gemma): classifies the overlong line, regex fast path first
//! - Worker (Mistral): proposes a shortened replacement
//! - Oracle (Gemini): approves, rejects or asks for a revision
//! - Fallback: deterministic whitespace splitter when the agents give up

pub mod bridges;
pub mod coordinator;
pub mod error;
pub mod fallback;
pub mod oracle;
pub mod scout;
pub mod worker;

pub use coordinator::{Coordinator, CoordinatorSettings, TierInfo};
pub use error::{AgentError, AgentResult};
pub use fallback::{split_line, FallbackSplit};
pub use oracle::Oracle;
pub use scout::{Classification, FastPath, Scout};
pub use worker::Worker;
