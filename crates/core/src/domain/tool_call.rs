use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::agent::AgentConfig;

/// One proposed tool invocation. Built fresh per attempt and only ever persisted via audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub agent_id: String,
    pub agent_role: String,
    pub tenant_id: String,
    pub tool: String,
    pub input: Value,
    pub reason: String,
    pub workflow_id: Option<String>,
}

impl ToolCall {
    pub fn from_config(
        config: &AgentConfig,
        tool: impl Into<String>,
        input: Value,
        reason: impl Into<String>,
        workflow_id: Option<String>,
    ) -> Self {
        Self {
            agent_id: config.id.clone(),
            agent_role: config.role.clone(),
            tenant_id: config.tenant_id.clone(),
            tool: tool.into(),
            input,
            reason: reason.into(),
            workflow_id,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub approver_roles: Vec<String>,
}

impl PolicyDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            requires_approval: false,
            approver_roles: Vec::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_approval: false,
            approver_roles: Vec::new(),
        }
    }

    pub fn require_approval(reason: impl Into<String>, approver_roles: Vec<String>) -> Self {
        Self { allowed: true, reason: reason.into(), requires_approval: true, approver_roles }
    }
}

/// Outcome of a tool call. `duration_ms == 0` with `success == false` means the call was
/// stopped before it reached a handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self { success: true, output, duration_ms: 0 }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, output: json!({ "error": error.into() }), duration_ms: 0 }
    }

    pub fn with_output(success: bool, output: Value) -> Self {
        Self { success, output, duration_ms: 0 }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// The `error` message carried in the output, if any.
    pub fn error(&self) -> Option<&str> {
        self.output.get("error").and_then(Value::as_str)
    }
}
