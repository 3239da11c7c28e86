use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::CommandResult;
use toolgate_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct SourceContext {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let path = detect_config_path(options.config_path.as_deref());
    let sources = SourceContext { doc: load_config_file_doc(path.as_deref()), path };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        sources.field("logging.level", &["TOOLGATE_LOGGING_LEVEL", "TOOLGATE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_ascii_lowercase(),
        sources.field("logging.format", &["TOOLGATE_LOGGING_FORMAT", "TOOLGATE_LOG_FORMAT"]),
    ));
    lines.push(render_line(
        "audit.flush_threshold",
        &config.audit.flush_threshold.to_string(),
        sources.field("audit.flush_threshold", &["TOOLGATE_AUDIT_FLUSH_THRESHOLD"]),
    ));
    lines.push(render_line(
        "router.tool_timeout_ms",
        &config.router.tool_timeout_ms.to_string(),
        sources.field("router.tool_timeout_ms", &["TOOLGATE_ROUTER_TOOL_TIMEOUT_MS"]),
    ));
    lines.push(render_line(
        "agents",
        &format!("{} configured", config.agents.len()),
        sources.field("agents", &[]),
    ));

    for agent in &config.agents {
        let tools = agent.allowed_tools.iter().cloned().collect::<Vec<_>>().join(", ");
        lines.push(format!(
            "  - {} (role: {}, tenant: {}, tools: [{}], limits: {}/min {}/h {}/day)",
            agent.id,
            agent.role,
            agent.tenant_id,
            tools,
            agent.rate_limits.per_minute,
            agent.rate_limits.per_hour,
            agent.rate_limits.daily,
        ));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

impl SourceContext {
    fn field(&self, key_path: &str, env_keys: &[&str]) -> String {
        // Blank values are ignored by the loader, so they are not a source either.
        let is_set = |key: &&&str| env::var(key).is_ok_and(|value| !value.trim().is_empty());
        if let Some(env_key) = env_keys.iter().find(is_set) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("toolgate.toml"), PathBuf::from("config/toolgate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
