use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use toolgate_core::AgentContext;

use crate::agent::{Agent, AgentResult};

/// Registry misuse. Both variants point at a wiring bug in the host rather than a runtime
/// condition worth retrying.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent `{0}` is already registered")]
    DuplicateAgent(String),
    #[error("agent `{0}` is not registered")]
    AgentNotFound(String),
}

/// Directory of live agents keyed by id.
///
/// Hosts normally construct one and pass it to whatever needs lookups; [`AgentRegistry::global`]
/// exists for hosts that want a process-wide instance.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

static GLOBAL: OnceLock<RwLock<Arc<AgentRegistry>>> = OnceLock::new();

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<AgentRegistry> {
        let slot = global_slot();
        let registry = match slot.read() {
            Ok(registry) => registry,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&registry)
    }

    /// Swaps the process-wide instance for an empty one. Handles obtained earlier keep
    /// pointing at the old registry.
    pub fn reset_global() {
        let slot = global_slot();
        let mut registry = match slot.write() {
            Ok(registry) => registry,
            Err(poisoned) => poisoned.into_inner(),
        };
        *registry = Arc::new(AgentRegistry::new());
    }

    pub fn register(&self, agent: Arc<dyn Agent>) -> Result<(), RegistryError> {
        let id = agent.id().to_string();
        let mut agents = self.write();
        if agents.contains_key(&id) {
            return Err(RegistryError::DuplicateAgent(id));
        }

        tracing::debug!(
            event_name = "registry.agent.registered",
            agent_id = %id,
            role = agent.role(),
            tenant_id = agent.tenant_id(),
            "agent registered"
        );
        agents.insert(id, agent);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Agent>, RegistryError> {
        self.read().get(id).cloned().ok_or_else(|| RegistryError::AgentNotFound(id.to_string()))
    }

    pub fn get_by_role(&self, role: &str) -> Vec<Arc<dyn Agent>> {
        let mut matches: Vec<_> =
            self.read().values().filter(|agent| agent.role() == role).cloned().collect();
        matches.sort_by(|left, right| left.id().cmp(right.id()));
        matches
    }

    pub fn has(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<dyn Agent>> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            tracing::debug!(event_name = "registry.agent.unregistered", agent_id = id, "agent removed");
        }
        removed
    }

    /// All agents, ordered by id.
    pub fn list_all(&self) -> Vec<Arc<dyn Agent>> {
        let mut agents: Vec<_> = self.read().values().cloned().collect();
        agents.sort_by(|left, right| left.id().cmp(right.id()));
        agents
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Looks up `id` and runs one execution. The registry lock is released before the agent
    /// starts.
    pub async fn dispatch(&self, id: &str, context: AgentContext) -> anyhow::Result<AgentResult> {
        let agent = self.get(id)?;
        agent.execute(context).await
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn Agent>>> {
        match self.agents.read() {
            Ok(agents) => agents,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn Agent>>> {
        match self.agents.write() {
            Ok(agents) => agents,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn global_slot() -> &'static RwLock<Arc<AgentRegistry>> {
    GLOBAL.get_or_init(|| RwLock::new(Arc::new(AgentRegistry::new())))
}
