use toolgate_core::{AgentConfig, PolicyDecision, ToolCall};

/// Decides whether a proposed call may proceed. Implementations must be pure.
pub trait PolicyDecider: Send + Sync {
    fn check(&self, config: &AgentConfig, call: &ToolCall) -> PolicyDecision;
}

/// Allowlist, then tenant isolation, then approval requirements; first match wins.
///
/// Tenant isolation is evaluated before approvals so a cross-tenant call is always a hard
/// deny and never lands in an approval queue.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyDecider for PolicyEngine {
    fn check(&self, config: &AgentConfig, call: &ToolCall) -> PolicyDecision {
        if !config.is_tool_allowed(&call.tool) {
            let allowlist = config.allowed_tools.iter().cloned().collect::<Vec<_>>().join(", ");
            return PolicyDecision::deny(format!(
                "agent `{}` (role `{}`) is not permitted to call `{}`; allowed tools: [{}]",
                config.id, config.role, call.tool, allowlist
            ));
        }

        if config.tenant_id != call.tenant_id {
            return PolicyDecision::deny(format!(
                "agent `{}` belongs to tenant `{}` and cannot act for tenant `{}`",
                config.id, config.tenant_id, call.tenant_id
            ));
        }

        if let Some(approvers) = config.approvers_for(&call.tool) {
            return PolicyDecision::require_approval(
                format!("`{}` requires approval from: {}", call.tool, approvers.join(", ")),
                approvers.to_vec(),
            );
        }

        PolicyDecision::allow(format!("`{}` is permitted for role `{}`", call.tool, config.role))
    }
}
