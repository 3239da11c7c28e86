use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::commands::{escape_json, CommandResult};
use serde::Serialize;
use serde_json::{json, Value};
use toolgate_agent::{GatewayServices, ToolGateway, ToolRouter};
use toolgate_core::config::{AppConfig, LoadOptions};
use toolgate_core::{AuditLogger, AuditSink, AuditStatus, RateLimiter, ToolResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
}

#[derive(Debug, Default, Serialize)]
struct StatusCounts {
    success: usize,
    failure: usize,
    escalated: usize,
    denied: usize,
}

#[derive(Debug, Serialize)]
struct AgentRun {
    agent_id: String,
    tenant_id: String,
    calls: usize,
    escalations: usize,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    flush_threshold_reached: bool,
    flushed_entries: usize,
    statuses: StatusCounts,
    agents: Vec<AgentRun>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let started = Instant::now();

    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return finalize_failure(format!("config validation failed: {error}"), &started);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return finalize_failure(format!("failed to initialize async runtime: {error}"), &started);
        }
    };

    let router = echo_router(&config);
    let audit = Arc::new(AuditLogger::new());
    let services = GatewayServices::new(router)
        .with_rate_gate(Arc::new(RateLimiter::new()))
        .with_audit(audit.clone());

    let mut agents = Vec::with_capacity(config.agents.len());
    for agent in &config.agents {
        let gateway = match ToolGateway::new(agent.clone(), services.clone()) {
            Ok(gateway) => gateway,
            Err(error) => return finalize_failure(error.to_string(), &started),
        };
        agents.push(runtime.block_on(exercise(&gateway)));
    }

    let flush_threshold_reached = audit.should_flush(config.audit.flush_threshold);
    let flushed = audit.flush();
    let mut statuses = StatusCounts::default();
    for entry in &flushed {
        match entry.status {
            AuditStatus::Success => statuses.success += 1,
            AuditStatus::Failure => statuses.failure += 1,
            AuditStatus::Escalated => statuses.escalated += 1,
            AuditStatus::Denied => statuses.denied += 1,
        }
    }

    let total_elapsed_ms = started.elapsed().as_millis() as u64;
    let failed = statuses.failure > 0;
    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!(
            "smoke: {} agent(s), {} gated call(s) in {total_elapsed_ms}ms",
            agents.len(),
            flushed.len()
        ),
        total_elapsed_ms,
        flush_threshold_reached,
        flushed_entries: flushed.len(),
        statuses,
        agents,
    };

    finalize_report(&report, if failed { 6 } else { 0 })
}

/// One router shared by every agent, echoing the input of each allowlisted tool.
fn echo_router(config: &AppConfig) -> Arc<ToolRouter> {
    let mut router = ToolRouter::new();
    if config.router.tool_timeout_ms > 0 {
        router = router.with_timeout(Duration::from_millis(config.router.tool_timeout_ms));
    }

    for tool in config.agents.iter().flat_map(|agent| agent.allowed_tools.iter()) {
        if router.has_tool(tool) {
            continue;
        }
        let name = tool.clone();
        router.register_tool(tool.clone(), move |input: Value| {
            let name = name.clone();
            async move { anyhow::Ok(ToolResult::ok(json!({ "tool": name, "echo": input }))) }
        });
    }

    Arc::new(router)
}

async fn exercise(gateway: &ToolGateway) -> AgentRun {
    let config = gateway.config();
    let session = gateway.begin();
    for tool in &config.allowed_tools {
        session.call_tool(tool.clone(), json!({ "smoke": true }), "smoke check", Some("smoke")).await;
    }

    AgentRun {
        agent_id: config.id.clone(),
        tenant_id: config.tenant_id.clone(),
        calls: session.tool_calls().len(),
        escalations: session.escalations().len(),
    }
}

fn finalize_failure(message: String, started: &Instant) -> CommandResult {
    let total_elapsed_ms = started.elapsed().as_millis() as u64;
    let report = SmokeReport {
        command: "smoke",
        status: SmokeStatus::Fail,
        summary: format!("smoke: {message}"),
        total_elapsed_ms,
        flush_threshold_reached: false,
        flushed_entries: 0,
        statuses: StatusCounts::default(),
        agents: Vec::new(),
    };
    finalize_report(&report, 6)
}

fn finalize_report(report: &SmokeReport, exit_code: u8) -> CommandResult {
    let human = report.summary.clone();
    let machine = serde_json::to_string(report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    });

    CommandResult { exit_code, output: format!("{human}\n{machine}") }
}
