use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use toolgate_agent::{Agent, AgentResult, GatewayServices, ToolGateway, ToolRouter};
use toolgate_core::{
    AgentConfig, AgentContext, AuditFilter, AuditLogger, AuditSink, AuditStatus, RateLimiter,
    RateLimits, ToolResult,
};

struct Harness {
    router: Arc<ToolRouter>,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLogger>,
    hits: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let router = Arc::new(ToolRouter::new());
        let hits = Arc::new(AtomicUsize::new(0));
        for tool in ["consultant.search", "offer.send"] {
            let hits = Arc::clone(&hits);
            router.register_tool(tool, move |_input: Value| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(ToolResult {
                        success: true,
                        output: json!({ "consultants": [{ "id": "c-1", "skills": ["go"] }] }),
                        duration_ms: 0,
                    })
                }
            });
        }
        router.register_tool("email.send", |_input: Value| async move {
            anyhow::Ok(ToolResult::failed("mailbox unavailable"))
        });

        Self {
            router,
            limiter: Arc::new(RateLimiter::new()),
            audit: Arc::new(AuditLogger::new()),
            hits,
        }
    }

    fn services(&self) -> GatewayServices {
        GatewayServices::new(self.router.clone())
            .with_rate_gate(self.limiter.clone())
            .with_audit(self.audit.clone())
    }

    fn gateway(&self, config: AgentConfig) -> ToolGateway {
        match ToolGateway::new(config, self.services()) {
            Ok(gateway) => gateway,
            Err(error) => panic!("gateway should build: {error}"),
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn sourcer(limits: RateLimits) -> AgentConfig {
    AgentConfig::new("sourcer-1", "Sourcer", "recruiter", "t1", limits)
        .with_allowed_tools(["consultant.search", "offer.send", "email.send", "calendar.book"])
        .with_approval("offer.send", ["account_manager"])
}

fn roomy() -> RateLimits {
    RateLimits { per_minute: 5, per_hour: 50, daily: 200 }
}

struct SourcingAgent {
    gateway: ToolGateway,
}

#[async_trait]
impl Agent for SourcingAgent {
    fn config(&self) -> &AgentConfig {
        self.gateway.config()
    }

    async fn execute(&self, context: AgentContext) -> Result<AgentResult> {
        let session = self.gateway.begin_for(&context);
        let result = session
            .call_tool("consultant.search", context.input.clone(), "sourcing", None)
            .await;
        if !result.success {
            session.escalate("search failed", json!({ "output": result.output }), None);
            let summary = session.escalations().into_iter().next();
            return Ok(session.build_result(false, result.output, summary));
        }
        Ok(session.build_result(true, result.output, None))
    }
}

#[tokio::test]
async fn unlisted_tool_is_denied_without_touching_the_rate_limiter() {
    let harness = Harness::new();
    let gateway = harness.gateway(sourcer(roomy()));

    let session = gateway.begin();
    let result = session.call_tool("db.delete", json!({ "table": "users" }), "cleanup", None).await;

    assert!(!result.success);
    assert_eq!(result.duration_ms, 0);
    assert_eq!(harness.limiter.window_len("sourcer-1"), 0);
    assert_eq!(harness.hits(), 0);
    let entries = harness.audit.entries(&AuditFilter::agent("sourcer-1"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, AuditStatus::Denied);
    assert!(entries[0].output["reason"]
        .as_str()
        .is_some_and(|reason| reason.contains("consultant.search")));
}

#[tokio::test]
async fn tenant_mismatch_is_denied_even_for_approval_tools() {
    let harness = Harness::new();
    let gateway = harness.gateway(sourcer(roomy()));
    let context = AgentContext::new("wf-1", "t2", json!({}));

    let session = gateway.begin_for(&context);
    let result = session.call_tool("offer.send", json!({}), "extend offer", None).await;
    let agent_result = session.build_result(false, result.output.clone(), None);

    assert!(!result.success);
    assert_eq!(agent_result.tool_calls.len(), 1);
    assert_eq!(agent_result.tool_calls[0].status, AuditStatus::Denied);
    assert!(agent_result.escalations.is_empty());
    assert_eq!(harness.hits(), 0);
    assert_eq!(harness.limiter.window_len("sourcer-1"), 0);
}

#[tokio::test]
async fn approval_tools_escalate_and_never_execute() {
    let harness = Harness::new();
    let gateway = harness.gateway(sourcer(roomy()));

    let session = gateway.begin();
    let result = session.call_tool("offer.send", json!({ "salary": 100 }), "extend offer", None).await;
    let agent_result = session.build_result(false, json!(null), None);

    assert!(!result.success);
    assert_eq!(result.duration_ms, 0);
    assert_eq!(harness.hits(), 0);
    assert_eq!(harness.limiter.window_len("sourcer-1"), 0);
    assert_eq!(agent_result.tool_calls[0].status, AuditStatus::Escalated);
    assert_eq!(agent_result.tool_calls[0].duration_ms, 0);
    assert_eq!(agent_result.escalations.len(), 1);
    assert_eq!(agent_result.escalations[0].context["approver_roles"], json!(["account_manager"]));
    assert!(agent_result.escalations[0].reason.contains("account_manager"));
    assert!(agent_result.escalation.is_none());
}

#[tokio::test]
async fn third_call_within_a_minute_is_rate_limited() {
    let harness = Harness::new();
    let gateway = harness.gateway(sourcer(RateLimits { per_minute: 2, per_hour: 50, daily: 200 }));

    let session = gateway.begin();
    let first = session.call_tool("consultant.search", json!({}), "one", None).await;
    let second = session.call_tool("consultant.search", json!({}), "two", None).await;
    let third = session.call_tool("consultant.search", json!({}), "three", None).await;

    assert!(first.success);
    assert!(second.success);
    assert!(!third.success);
    assert_eq!(third.duration_ms, 0);
    assert_eq!(third.output["window"], json!("minute"));
    assert!(third.output["retry_after_ms"].as_u64().is_some_and(|retry| retry > 0));
    assert_eq!(harness.hits(), 2);
    assert_eq!(harness.limiter.window_len("sourcer-1"), 2);

    let statuses: Vec<_> = session.tool_calls().iter().map(|entry| entry.status).collect();
    assert_eq!(statuses, vec![AuditStatus::Success, AuditStatus::Success, AuditStatus::Denied]);
}

#[tokio::test]
async fn every_branch_leaves_exactly_one_audit_entry() {
    let harness = Harness::new();
    let gateway = harness.gateway(sourcer(roomy()));

    let session = gateway.begin();
    session.call_tool("db.delete", json!({}), "denied", None).await;
    session.call_tool("offer.send", json!({}), "escalated", None).await;
    session.call_tool("consultant.search", json!({}), "success", None).await;
    session.call_tool("email.send", json!({}), "handler failure", None).await;
    session.call_tool("calendar.book", json!({}), "router has no handler", None).await;

    let entries = harness.audit.entries(&AuditFilter::default());
    let statuses: Vec<_> = entries.iter().map(|entry| entry.status).collect();
    assert_eq!(
        statuses,
        vec![
            AuditStatus::Denied,
            AuditStatus::Escalated,
            AuditStatus::Success,
            AuditStatus::Failure,
            AuditStatus::Failure,
        ]
    );
    for entry in &entries {
        if matches!(entry.status, AuditStatus::Denied | AuditStatus::Escalated) {
            assert_eq!(entry.duration_ms, 0, "{} should not report duration", entry.reason);
        }
    }
    assert_eq!(entries[4].output["error"], json!("unknown tool: calendar.book"));
    assert_eq!(session.tool_calls().len(), 5);
}

#[tokio::test]
async fn end_to_end_search_produces_a_clean_result() {
    let harness = Harness::new();
    let agent = SourcingAgent { gateway: harness.gateway(sourcer(roomy())) };

    let result = agent
        .execute(AgentContext::new("wf-9", "t1", json!({ "skills": ["go"] })))
        .await
        .map_err(|error| error.to_string());

    let result = match result {
        Ok(result) => result,
        Err(error) => panic!("execution failed: {error}"),
    };
    assert!(result.success);
    assert_eq!(result.output["consultants"][0]["id"], json!("c-1"));
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].status, AuditStatus::Success);
    assert_eq!(result.tool_calls[0].workflow_id.as_deref(), Some("wf-9"));
    assert!(result.escalations.is_empty());
    assert!(result.escalation.is_none());
}

#[tokio::test]
async fn agent_can_surface_its_own_escalation() {
    let harness = Harness::new();
    let config = AgentConfig::new("sourcer-2", "Sourcer", "recruiter", "t1", roomy());
    let agent = SourcingAgent { gateway: harness.gateway(config) };

    let result = match agent.execute(AgentContext::new("wf-3", "t1", json!({}))).await {
        Ok(result) => result,
        Err(error) => panic!("execution failed: {error}"),
    };

    assert!(!result.success);
    assert_eq!(result.tool_calls[0].status, AuditStatus::Denied);
    assert_eq!(result.escalations.len(), 1);
    assert_eq!(result.escalation.as_ref().map(|event| event.reason.as_str()), Some("search failed"));
}

#[tokio::test]
async fn concurrent_calls_never_exceed_the_minute_budget() {
    let harness = Harness::new();
    let gateway = harness.gateway(sourcer(RateLimits { per_minute: 3, per_hour: 50, daily: 200 }));

    let session = gateway.begin();
    let calls = (0..10).map(|attempt| {
        session.call_tool("consultant.search", json!({ "attempt": attempt }), "burst", None)
    });
    let results = futures::future::join_all(calls).await;

    assert_eq!(results.iter().filter(|result| result.success).count(), 3);
    assert_eq!(harness.hits(), 3);
    assert_eq!(harness.audit.total_entries(), 10);
    assert_eq!(session.tool_calls().len(), 10);
}

#[tokio::test]
async fn limits_are_per_agent() {
    let harness = Harness::new();
    let tight = harness.gateway(sourcer(RateLimits { per_minute: 1, per_hour: 1, daily: 1 }));
    let other = harness.gateway(
        AgentConfig::new("sourcer-9", "Other", "recruiter", "t1", roomy())
            .with_allowed_tool("consultant.search"),
    );

    let first = tight.begin();
    assert!(first.call_tool("consultant.search", json!({}), "one", None).await.success);
    assert!(!first.call_tool("consultant.search", json!({}), "two", None).await.success);

    let second = other.begin();
    assert!(second.call_tool("consultant.search", json!({}), "one", None).await.success);
    assert_eq!(harness.audit.entries(&AuditFilter::agent("sourcer-9")).len(), 1);
    assert_eq!(harness.audit.entries(&AuditFilter::tenant("t1")).len(), 3);
}
