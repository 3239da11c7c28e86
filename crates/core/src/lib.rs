pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod rate_limit;

pub use audit::{AuditEntry, AuditFilter, AuditLogger, AuditSink, AuditStatus};
pub use domain::agent::{AgentConfig, AgentContext, RateLimits};
pub use domain::escalation::EscalationEvent;
pub use domain::tool_call::{PolicyDecision, ToolCall, ToolResult};
pub use errors::DomainError;
pub use rate_limit::{RateGate, RateLimitDecision, RateLimiter, RateWindow};
