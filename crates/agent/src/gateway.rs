//! The single gated path from an agent to its tools.
//!
//! Every call runs policy, then rate limiting, then the dispatcher, and leaves exactly one
//! audit entry behind whichever way it exits.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use toolgate_core::{
    AgentConfig, AgentContext, AuditEntry, AuditLogger, AuditSink, AuditStatus, DomainError,
    EscalationEvent, RateGate, RateLimiter, ToolCall, ToolResult,
};

use crate::agent::AgentResult;
use crate::policy::{PolicyDecider, PolicyEngine};
use crate::tools::{ToolDispatcher, ToolRouter};

/// Shared collaborators behind the gated path. Cloning shares the same ledger, limiter and
/// router, which is how a host wires many agents to one audit trail.
#[derive(Clone)]
pub struct GatewayServices {
    pub policy: Arc<dyn PolicyDecider>,
    pub rate_gate: Arc<dyn RateGate>,
    pub dispatcher: Arc<dyn ToolDispatcher>,
    pub audit: Arc<dyn AuditSink>,
}

impl GatewayServices {
    pub fn new(dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            policy: Arc::new(PolicyEngine),
            rate_gate: Arc::new(RateLimiter::new()),
            dispatcher,
            audit: Arc::new(AuditLogger::new()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyDecider>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_rate_gate(mut self, rate_gate: Arc<dyn RateGate>) -> Self {
        self.rate_gate = rate_gate;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}

impl Default for GatewayServices {
    fn default() -> Self {
        Self::new(Arc::new(ToolRouter::new()))
    }
}

/// Held by every concrete agent; the only sanctioned route to a tool.
pub struct ToolGateway {
    config: AgentConfig,
    services: GatewayServices,
}

impl ToolGateway {
    /// Validates `config` and registers its budget with the rate gate.
    pub fn new(config: AgentConfig, services: GatewayServices) -> Result<Self, DomainError> {
        config.validate()?;
        services.rate_gate.configure(&config.id, config.rate_limits);
        Ok(Self { config, services })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn services(&self) -> &GatewayServices {
        &self.services
    }

    /// Starts an execution scoped to the agent's own tenant, with no default workflow.
    pub fn begin(&self) -> ToolSession<'_> {
        ToolSession::new(self, self.config.tenant_id.clone(), None)
    }

    /// Starts an execution on behalf of `context`. Calls carry the context's tenant, so a
    /// context for a foreign tenant is refused by policy, and default to its workflow id.
    pub fn begin_for(&self, context: &AgentContext) -> ToolSession<'_> {
        ToolSession::new(self, context.tenant_id.clone(), Some(context.workflow_id.clone()))
    }
}

#[derive(Debug, Default)]
struct ExecutionTrace {
    calls: Vec<Arc<AuditEntry>>,
    escalations: Vec<EscalationEvent>,
}

/// One execution's view of the gateway. Its call log and escalations start empty and are
/// consumed by [`ToolSession::build_result`].
pub struct ToolSession<'g> {
    gateway: &'g ToolGateway,
    tenant_id: String,
    workflow_id: Option<String>,
    trace: Mutex<ExecutionTrace>,
}

impl<'g> ToolSession<'g> {
    fn new(gateway: &'g ToolGateway, tenant_id: String, workflow_id: Option<String>) -> Self {
        Self { gateway, tenant_id, workflow_id, trace: Mutex::new(ExecutionTrace::default()) }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.gateway.config
    }

    pub async fn call_tool(
        &self,
        tool: impl Into<String>,
        input: Value,
        reason: impl Into<String>,
        workflow_id: Option<&str>,
    ) -> ToolResult {
        let services = &self.gateway.services;
        let config = &self.gateway.config;
        let workflow_id = workflow_id.map(str::to_string).or_else(|| self.workflow_id.clone());
        let call = ToolCall::from_config(config, tool, input, reason, workflow_id)
            .with_tenant(self.tenant_id.clone());

        let decision = services.policy.check(config, &call);
        if !decision.allowed {
            tracing::warn!(
                event_name = "gateway.tool_call.denied",
                agent_id = %call.agent_id,
                tenant_id = %call.tenant_id,
                tool = %call.tool,
                workflow_id = call.workflow_id.as_deref().unwrap_or("none"),
                reason = %decision.reason,
                "tool call denied by policy"
            );
            let result = ToolResult::with_output(
                false,
                json!({ "error": "denied by policy", "reason": decision.reason }),
            );
            return self.finish(call, result, AuditStatus::Denied);
        }

        if decision.requires_approval {
            tracing::info!(
                event_name = "gateway.tool_call.escalated",
                agent_id = %call.agent_id,
                tenant_id = %call.tenant_id,
                tool = %call.tool,
                workflow_id = call.workflow_id.as_deref().unwrap_or("none"),
                approver_roles = %decision.approver_roles.join(","),
                "tool call parked for approval"
            );
            self.push_escalation(EscalationEvent::new(
                &call.agent_id,
                &call.tenant_id,
                call.workflow_id.clone(),
                decision.reason.clone(),
                json!({
                    "tool": call.tool,
                    "input": call.input,
                    "justification": call.reason,
                    "approver_roles": decision.approver_roles,
                }),
            ));
            let result = ToolResult::with_output(
                false,
                json!({
                    "error": "approval required",
                    "reason": decision.reason,
                    "approver_roles": decision.approver_roles,
                }),
            );
            return self.finish(call, result, AuditStatus::Escalated);
        }

        let admission = services.rate_gate.try_acquire(&call.agent_id);
        if !admission.allowed {
            let window = admission.exceeded.map(|window| window.as_str()).unwrap_or("unknown");
            tracing::warn!(
                event_name = "gateway.tool_call.rate_limited",
                agent_id = %call.agent_id,
                tenant_id = %call.tenant_id,
                tool = %call.tool,
                workflow_id = call.workflow_id.as_deref().unwrap_or("none"),
                window,
                retry_after_ms = admission.retry_after_ms,
                "tool call rejected by rate limit"
            );
            let result = ToolResult::with_output(
                false,
                json!({
                    "error": "rate limit exceeded",
                    "window": window,
                    "retry_after_ms": admission.retry_after_ms,
                }),
            );
            return self.finish(call, result, AuditStatus::Denied);
        }

        let result = services.dispatcher.execute(&call).await;
        let status = if result.success { AuditStatus::Success } else { AuditStatus::Failure };
        tracing::info!(
            event_name = "gateway.tool_call.completed",
            agent_id = %call.agent_id,
            tenant_id = %call.tenant_id,
            tool = %call.tool,
            workflow_id = call.workflow_id.as_deref().unwrap_or("none"),
            status = status.as_str(),
            duration_ms = result.duration_ms,
            "tool call completed"
        );
        self.finish(call, result, status)
    }

    /// Raises an escalation from business logic, independent of any tool call.
    pub fn escalate(&self, reason: impl Into<String>, context: Value, workflow_id: Option<&str>) {
        let config = &self.gateway.config;
        let workflow_id = workflow_id.map(str::to_string).or_else(|| self.workflow_id.clone());
        let event =
            EscalationEvent::new(&config.id, &self.tenant_id, workflow_id, reason, context);
        tracing::info!(
            event_name = "gateway.escalation.raised",
            agent_id = %event.agent_id,
            tenant_id = %event.tenant_id,
            workflow_id = event.workflow_id.as_deref().unwrap_or("none"),
            reason = %event.reason,
            "agent raised an escalation"
        );
        self.push_escalation(event);
    }

    /// Audit entries produced so far in this execution, in call order.
    pub fn tool_calls(&self) -> Vec<Arc<AuditEntry>> {
        self.trace().calls.clone()
    }

    pub fn escalations(&self) -> Vec<EscalationEvent> {
        self.trace().escalations.clone()
    }

    /// Closes the execution. `escalation` is the summary the agent chose to surface; the
    /// full list raised during the execution is always included.
    pub fn build_result(
        self,
        success: bool,
        output: Value,
        escalation: Option<EscalationEvent>,
    ) -> AgentResult {
        let trace = match self.trace.into_inner() {
            Ok(trace) => trace,
            Err(poisoned) => poisoned.into_inner(),
        };

        AgentResult {
            success,
            output,
            tool_calls: trace.calls.iter().map(|entry| AuditEntry::clone(entry)).collect(),
            escalations: trace.escalations,
            escalation,
        }
    }

    fn finish(&self, call: ToolCall, result: ToolResult, status: AuditStatus) -> ToolResult {
        let entry = self.gateway.services.audit.log(AuditEntry::new(call, &result, status));
        self.trace().calls.push(entry);
        result
    }

    fn push_escalation(&self, event: EscalationEvent) {
        self.trace().escalations.push(event);
    }

    fn trace(&self) -> MutexGuard<'_, ExecutionTrace> {
        match self.trace.lock() {
            Ok(trace) => trace,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
