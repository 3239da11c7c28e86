use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;

/// Invocation budgets for one agent across the minute, hour and day windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub daily: u32,
}

impl RateLimits {
    pub fn new(per_minute: u32, per_hour: u32, daily: u32) -> Result<Self, DomainError> {
        let limits = Self { per_minute, per_hour, daily };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in
            [("per_minute", self.per_minute), ("per_hour", self.per_hour), ("daily", self.daily)]
        {
            if value == 0 {
                return Err(DomainError::InvalidRateLimits(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

/// Static description of an agent: who it is, which tenant it serves and what it may touch.
///
/// Hosts build one of these per agent and hand it to the gateway; it is never mutated
/// afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub role: String,
    pub tenant_id: String,
    #[serde(default)]
    pub allowed_tools: BTreeSet<String>,
    /// Tool name to the approver roles that must sign off before it runs.
    #[serde(default)]
    pub approval_required: BTreeMap<String, Vec<String>>,
    pub rate_limits: RateLimits,
}

impl AgentConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        tenant_id: impl Into<String>,
        rate_limits: RateLimits,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
            tenant_id: tenant_id.into(),
            allowed_tools: BTreeSet::new(),
            approval_required: BTreeMap::new(),
            rate_limits,
        }
    }

    pub fn with_allowed_tool(mut self, tool: impl Into<String>) -> Self {
        self.allowed_tools.insert(tool.into());
        self
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_approval<I, S>(mut self, tool: impl Into<String>, approver_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.approval_required
            .insert(tool.into(), approver_roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_tool_allowed(&self, tool: &str) -> bool {
        self.allowed_tools.contains(tool)
    }

    /// Approver roles for `tool`, or `None` when the tool runs without sign-off.
    pub fn approvers_for(&self, tool: &str) -> Option<&[String]> {
        self.approval_required
            .get(tool)
            .map(Vec::as_slice)
            .filter(|roles| !roles.is_empty())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.name),
            ("role", &self.role),
            ("tenant_id", &self.tenant_id),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::agent_config(
                    &self.id,
                    format!("{field} must not be empty"),
                ));
            }
        }

        if let Some(tool) = self.allowed_tools.iter().find(|tool| tool.trim().is_empty()) {
            return Err(DomainError::agent_config(
                &self.id,
                format!("allowed_tools contains a blank tool name `{tool}`"),
            ));
        }

        for (tool, roles) in &self.approval_required {
            if roles.iter().any(|role| role.trim().is_empty()) {
                return Err(DomainError::agent_config(
                    &self.id,
                    format!("approval_required.{tool} contains a blank approver role"),
                ));
            }
        }

        self.rate_limits
            .validate()
            .map_err(|error| DomainError::agent_config(&self.id, error.to_string()))
    }
}

/// What a host hands an agent for a single execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub workflow_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub input: Value,
}

impl AgentContext {
    pub fn new(workflow_id: impl Into<String>, tenant_id: impl Into<String>, input: Value) -> Self {
        Self { workflow_id: workflow_id.into(), tenant_id: tenant_id.into(), input }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::domain::agent::{AgentConfig, RateLimits};
    use crate::errors::DomainError;

    fn limits() -> RateLimits {
        RateLimits { per_minute: 5, per_hour: 50, daily: 200 }
    }

    #[test]
    fn zero_budget_is_rejected() {
        let error = RateLimits::new(5, 0, 200).err();

        assert_eq!(
            error,
            Some(DomainError::InvalidRateLimits("per_hour must be greater than zero".to_string()))
        );
    }

    #[test]
    fn empty_approver_list_means_no_approval() {
        let config = AgentConfig::new("a-1", "Sourcer", "recruiter", "t1", limits())
            .with_allowed_tools(["consultant.search", "email.send"])
            .with_approval("email.send", Vec::<String>::new());

        assert!(config.is_tool_allowed("consultant.search"));
        assert_eq!(config.approvers_for("email.send"), None);
        assert_eq!(config.approvers_for("consultant.search"), None);
    }

    #[test]
    fn approver_roles_are_exposed() {
        let config = AgentConfig::new("a-1", "Sourcer", "recruiter", "t1", limits())
            .with_allowed_tool("contract.sign")
            .with_approval("contract.sign", ["legal", "finance"]);

        assert_eq!(
            config.approvers_for("contract.sign"),
            Some(&["legal".to_string(), "finance".to_string()][..])
        );
    }

    #[test]
    fn validation_names_the_blank_field() {
        let config = AgentConfig::new("a-1", "Sourcer", "recruiter", " ", limits());

        let error = config.validate().err();

        assert_eq!(error, Some(DomainError::agent_config("a-1", "tenant_id must not be empty")));
    }

    #[test]
    fn validation_rejects_zero_limits_constructed_directly() {
        let config = AgentConfig::new(
            "a-1",
            "Sourcer",
            "recruiter",
            "t1",
            RateLimits { per_minute: 0, per_hour: 1, daily: 1 },
        );

        assert!(matches!(
            config.validate(),
            Err(DomainError::InvalidAgentConfig { ref message, .. }) if message.contains("per_minute")
        ));
    }

    #[test]
    fn deserializes_with_defaulted_tool_tables() {
        let config: AgentConfig = serde_json::from_value(json!({
            "id": "a-2",
            "name": "Checker",
            "role": "compliance",
            "tenant_id": "t9",
            "rate_limits": { "per_minute": 1, "per_hour": 2, "daily": 3 }
        }))
        .expect("config should deserialize");

        assert!(config.allowed_tools.is_empty());
        assert!(config.approval_required.is_empty());
        assert_eq!(config.rate_limits.daily, 3);
    }
}
