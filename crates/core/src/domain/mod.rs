pub mod agent;
pub mod escalation;
pub mod tool_call;
