use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decision or action that could not proceed automatically and needs a human.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub agent_id: String,
    pub tenant_id: String,
    pub workflow_id: Option<String>,
    pub reason: String,
    pub context: Value,
    pub timestamp: DateTime<Utc>,
}

impl EscalationEvent {
    pub fn new(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        workflow_id: Option<String>,
        reason: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            tenant_id: tenant_id.into(),
            workflow_id,
            reason: reason.into(),
            context,
            timestamp: Utc::now(),
        }
    }
}
