use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid rate limits: {0}")]
    InvalidRateLimits(String),
    #[error("invalid agent config `{agent_id}`: {message}")]
    InvalidAgentConfig { agent_id: String, message: String },
}

impl DomainError {
    pub fn agent_config(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAgentConfig { agent_id: agent_id.into(), message: message.into() }
    }
}
