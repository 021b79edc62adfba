//! Agent tier errors

use aios_llm::LlmError;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Bridge(#[from] LlmError),

    #[error("unparseable reply: {0}")]
    Unparseable(String),
}
