use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::tool_call::{ToolCall, ToolResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    Escalated,
    Denied,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Escalated => "escalated",
            Self::Denied => "denied",
        }
    }
}

/// The permanent record of one gated call attempt.
///
/// Once handed to an [`AuditSink`] the entry lives behind an `Arc` and is never mutated again;
/// callers that kept their own copy can change it freely without affecting the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub agent_id: String,
    pub agent_role: String,
    pub tenant_id: String,
    pub tool: String,
    pub input: Value,
    pub reason: String,
    pub workflow_id: Option<String>,
    pub output: Value,
    pub duration_ms: u64,
    pub status: AuditStatus,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(call: ToolCall, result: &ToolResult, status: AuditStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: call.agent_id,
            agent_role: call.agent_role,
            tenant_id: call.tenant_id,
            tool: call.tool,
            input: call.input,
            reason: call.reason,
            workflow_id: call.workflow_id,
            output: result.output.clone(),
            duration_ms: result.duration_ms,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Narrows [`AuditSink::entries`]; every populated field must match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub agent_id: Option<String>,
    pub tenant_id: Option<String>,
    pub workflow_id: Option<String>,
}

impl AuditFilter {
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self { agent_id: Some(agent_id.into()), ..Self::default() }
    }

    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self { tenant_id: Some(tenant_id.into()), ..Self::default() }
    }

    pub fn workflow(workflow_id: impl Into<String>) -> Self {
        Self { workflow_id: Some(workflow_id.into()), ..Self::default() }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.agent_id.as_ref().map_or(true, |id| *id == entry.agent_id)
            && self.tenant_id.as_ref().map_or(true, |id| *id == entry.tenant_id)
            && self
                .workflow_id
                .as_ref()
                .map_or(true, |id| entry.workflow_id.as_deref() == Some(id.as_str()))
    }
}

pub trait AuditSink: Send + Sync {
    fn log(&self, entry: AuditEntry) -> Arc<AuditEntry>;
    /// Moves the buffer into the retained set and returns what moved.
    fn flush(&self) -> Vec<Arc<AuditEntry>>;
    fn entries(&self, filter: &AuditFilter) -> Vec<Arc<AuditEntry>>;
    fn buffer_size(&self) -> usize;
    fn total_entries(&self) -> usize;
}

#[derive(Debug, Default)]
struct AuditLedger {
    retained: Vec<Arc<AuditEntry>>,
    buffer: Vec<Arc<AuditEntry>>,
}

/// In-process, append-only ledger. Durable export is left to whoever drains [`flush`].
///
/// [`flush`]: AuditSink::flush
#[derive(Clone, Default)]
pub struct AuditLogger {
    ledger: Arc<Mutex<AuditLedger>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_flush(&self, threshold: usize) -> bool {
        threshold > 0 && self.buffer_size() >= threshold
    }

    fn ledger(&self) -> MutexGuard<'_, AuditLedger> {
        match self.ledger.lock() {
            Ok(ledger) => ledger,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AuditSink for AuditLogger {
    fn log(&self, entry: AuditEntry) -> Arc<AuditEntry> {
        let entry = Arc::new(entry);
        self.ledger().buffer.push(Arc::clone(&entry));
        entry
    }

    fn flush(&self) -> Vec<Arc<AuditEntry>> {
        let flushed = {
            let mut ledger = self.ledger();
            let flushed = std::mem::take(&mut ledger.buffer);
            ledger.retained.extend(flushed.iter().cloned());
            flushed
        };

        if !flushed.is_empty() {
            tracing::debug!(
                event_name = "audit.flushed",
                flushed = flushed.len(),
                "audit buffer moved to retained set"
            );
        }
        flushed
    }

    fn entries(&self, filter: &AuditFilter) -> Vec<Arc<AuditEntry>> {
        let ledger = self.ledger();
        ledger
            .retained
            .iter()
            .chain(ledger.buffer.iter())
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    fn buffer_size(&self) -> usize {
        self.ledger().buffer.len()
    }

    fn total_entries(&self) -> usize {
        let ledger = self.ledger();
        ledger.retained.len() + ledger.buffer.len()
    }
}
