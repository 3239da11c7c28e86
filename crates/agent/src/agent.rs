use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolgate_core::{AgentConfig, AgentContext, AuditEntry, EscalationEvent};

/// What an execution hands back to its host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub output: Value,
    /// Every gated call attempted during the execution, in order.
    pub tool_calls: Vec<AuditEntry>,
    pub escalations: Vec<EscalationEvent>,
    /// The escalation the agent chose to surface, if any.
    pub escalation: Option<EscalationEvent>,
}

/// The contract every business agent fulfils.
///
/// Agents hold a [`ToolGateway`](crate::gateway::ToolGateway) by composition and reach tools
/// only through the session it hands out.
#[async_trait]
pub trait Agent: Send + Sync {
    fn config(&self) -> &AgentConfig;

    fn id(&self) -> &str {
        &self.config().id
    }

    fn role(&self) -> &str {
        &self.config().role
    }

    fn tenant_id(&self) -> &str {
        &self.config().tenant_id
    }

    async fn execute(&self, context: AgentContext) -> Result<AgentResult>;
}
