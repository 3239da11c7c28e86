use crate::commands::{escape_json, CommandResult};
use serde::Serialize;
use toolgate_core::config::{AppConfig, LoadOptions};
use toolgate_core::AgentConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorCheck {
    fn new(name: impl Into<String>, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name: name.into(), status, details: details.into() }
    }
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 5 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            if config.agents.is_empty() {
                checks.push(DoctorCheck::new(
                    "agents_configured",
                    CheckStatus::Fail,
                    "no [[agents]] entries found",
                ));
            } else {
                checks.push(DoctorCheck::new(
                    "agents_configured",
                    CheckStatus::Pass,
                    format!("{} agent(s) configured", config.agents.len()),
                ));
                checks.extend(config.agents.iter().map(check_agent));
            }
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            checks.push(DoctorCheck::new(
                "agents_configured",
                CheckStatus::Skipped,
                "skipped because configuration did not load",
            ));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_agent(agent: &AgentConfig) -> DoctorCheck {
    let name = format!("agent.{}", agent.id);
    let problems = agent_problems(agent);

    if problems.is_empty() {
        let approvals = agent.approval_required.values().filter(|roles| !roles.is_empty()).count();
        return DoctorCheck::new(
            name,
            CheckStatus::Pass,
            format!(
                "{} allowlisted tool(s), {} behind approval",
                agent.allowed_tools.len(),
                approvals
            ),
        );
    }

    DoctorCheck::new(name, CheckStatus::Fail, problems.join("; "))
}

fn agent_problems(agent: &AgentConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if agent.allowed_tools.is_empty() {
        problems.push("allowlist is empty so every call will be denied".to_string());
    }

    for tool in agent.approval_required.keys() {
        if !agent.is_tool_allowed(tool) {
            problems.push(format!(
                "`{tool}` requires approval but is not allowlisted, so it can never escalate"
            ));
        }
    }

    let limits = agent.rate_limits;
    if limits.per_minute > limits.per_hour {
        problems.push(format!(
            "per_minute ({}) exceeds per_hour ({}) and can never be reached",
            limits.per_minute, limits.per_hour
        ));
    }
    if limits.per_hour > limits.daily {
        problems.push(format!(
            "per_hour ({}) exceeds daily ({}) and can never be reached",
            limits.per_hour, limits.daily
        ));
    }

    problems
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
