//! Capability-indexed agent registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace};

use maestro_core::{AgentCapability, Data};

use crate::agent::{Agent, AgentHandle};
use crate::error::{RegistryError, RegistryResult};
use crate::info::{AgentInfo, AgentStatus, RegistryStatistics};

#[derive(Default)]
struct RegistryInner {
    agents: HashMap<String, Arc<dyn Agent>>,
    info: HashMap<String, AgentInfo>,
    /// Agent ids per capability, highest priority first, registration order
    /// within a priority.
    index: HashMap<AgentCapability, Vec<String>>,
}

impl RegistryInner {
    fn priority_of(&self, id: &str) -> i32 {
        self.info.get(id).map_or(0, |i| i.priority)
    }

    fn remove_from_index(&mut self, id: &str) {
        for bucket in self.index.values_mut() {
            bucket.retain(|existing| existing != id);
        }
        self.index.retain(|_, bucket| !bucket.is_empty());
    }

    fn insert_into_index(&mut self, id: &str, capabilities: &BTreeSet<AgentCapability>) {
        let priority = self.priority_of(id);
        for capability in capabilities {
            let position = {
                let bucket = self.index.get(capability).map(Vec::as_slice).unwrap_or_default();
                bucket.partition_point(|existing| self.priority_of(existing) >= priority)
            };
            self.index
                .entry(*capability)
                .or_default()
                .insert(position, id.to_string());
        }
    }

    fn matching(
        &self,
        capability: AgentCapability,
        status: Option<AgentStatus>,
    ) -> impl Iterator<Item = &String> {
        self.index
            .get(&capability)
            .into_iter()
            .flatten()
            .filter(move |id| {
                status.is_none_or(|wanted| self.info.get(*id).is_some_and(|i| i.status == wanted))
            })
    }

    fn handle(&self, id: &str) -> Option<AgentHandle> {
        self.agents.get(id).map(|agent| AgentHandle {
            id: id.to_string(),
            agent: Arc::clone(agent),
        })
    }
}

/// Registry of agents indexed by capability.
///
/// All state sits behind one lock. Agent callbacks (`set_status`) are invoked
/// after the lock is released.
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
    lookups: AtomicU64,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agent_count", &self.len())
            .finish_non_exhaustive()
    }
}

impl AgentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an agent.
    ///
    /// Registering an existing id replaces the agent and its info; counters
    /// start over. New agents are [`AgentStatus::Active`]. Returns `true`
    /// once the agent is stored.
    pub fn register(
        &self,
        id: impl Into<String>,
        agent: Arc<dyn Agent>,
        capabilities: BTreeSet<AgentCapability>,
        priority: i32,
        metadata: Option<Data>,
    ) -> bool {
        let id = id.into();
        let mut info = AgentInfo::new(id.clone(), capabilities.clone(), priority);
        info.names = agent.display_names();
        info.description = agent.description();
        info.metadata = metadata.unwrap_or_default();

        let updated = {
            let mut inner = self.write();
            let updated = inner.agents.insert(id.clone(), agent).is_some();
            if updated {
                inner.remove_from_index(&id);
            }
            inner.info.insert(id.clone(), info);
            inner.insert_into_index(&id, &capabilities);
            updated
        };

        if updated {
            info!(agent_id = %id, priority, capabilities = ?capabilities, "Agent registration updated");
        } else {
            info!(agent_id = %id, priority, capabilities = ?capabilities, "Agent registered");
        }
        true
    }

    /// Register an agent using the capabilities it declares.
    pub fn register_declared(&self, id: impl Into<String>, agent: Arc<dyn Agent>, priority: i32) -> bool {
        let capabilities = agent.capabilities();
        self.register(id, agent, capabilities, priority, None)
    }

    /// Remove an agent.
    ///
    /// Returns `true` if it was registered.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = {
            let mut inner = self.write();
            let removed = inner.agents.remove(id).is_some();
            inner.info.remove(id);
            inner.remove_from_index(id);
            removed
        };
        if removed {
            info!(agent_id = %id, "Agent unregistered");
        }
        removed
    }

    /// Look up an agent by id.
    #[must_use]
    pub fn get_agent(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.read().agents.get(id).cloned()
    }

    /// Snapshot of an agent's info.
    #[must_use]
    pub fn get_agent_info(&self, id: &str) -> Option<AgentInfo> {
        self.read().info.get(id).cloned()
    }

    /// Snapshot of every agent's info, ordered by id.
    #[must_use]
    pub fn list_agents(&self) -> Vec<AgentInfo> {
        let mut agents: Vec<_> = self.read().info.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Highest-priority agent for a capability whose status matches the
    /// filter (any status when `None`).
    #[must_use]
    pub fn get_agent_by_capability(
        &self,
        capability: AgentCapability,
        status: Option<AgentStatus>,
    ) -> Option<AgentHandle> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let inner = self.read();
        let found = inner
            .matching(capability, status)
            .find_map(|id| inner.handle(id));
        trace!(
            capability = %capability,
            status = ?status,
            agent_id = ?found.as_ref().map(|h| h.id.as_str()),
            "Capability lookup"
        );
        found
    }

    /// Every agent for a capability whose status matches the filter, in
    /// priority order.
    #[must_use]
    pub fn get_agents_by_capability(
        &self,
        capability: AgentCapability,
        status: Option<AgentStatus>,
    ) -> Vec<AgentHandle> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let inner = self.read();
        inner
            .matching(capability, status)
            .filter_map(|id| inner.handle(id))
            .collect()
    }

    /// Ids of agents that declare every one of the required capabilities.
    ///
    /// An empty requirement matches nothing.
    #[must_use]
    pub fn find_agents_for_task(&self, required: &[AgentCapability]) -> BTreeSet<String> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let inner = self.read();
        let Some((first, rest)) = required.split_first() else {
            return BTreeSet::new();
        };

        let mut candidates: BTreeSet<String> = inner
            .index
            .get(first)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default();
        for capability in rest {
            let bucket = inner.index.get(capability);
            candidates.retain(|id| bucket.is_some_and(|b| b.contains(id)));
        }
        candidates
    }

    /// Record one dispatch to an agent.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] if the id is unknown.
    pub fn record_usage(&self, id: &str, latency_ms: f64, success: bool) -> RegistryResult<()> {
        let mut inner = self.write();
        let info = inner
            .info
            .get_mut(id)
            .ok_or_else(|| RegistryError::AgentNotFound {
                agent_id: id.to_string(),
            })?;
        info.record(latency_ms, success);
        debug!(
            agent_id = %id,
            latency_ms,
            success,
            usage_count = info.usage_count,
            avg_response_time_ms = info.avg_response_time_ms,
            "Agent usage recorded"
        );
        Ok(())
    }

    /// Change an agent's status and notify the agent.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] if the id is unknown.
    pub fn update_agent_status(&self, id: &str, status: AgentStatus) -> RegistryResult<()> {
        let (agent, previous) = {
            let mut inner = self.write();
            let info = inner
                .info
                .get_mut(id)
                .ok_or_else(|| RegistryError::AgentNotFound {
                    agent_id: id.to_string(),
                })?;
            let previous = std::mem::replace(&mut info.status, status);
            (inner.agents.get(id).cloned(), previous)
        };

        if let Some(agent) = agent {
            agent.set_status(status);
        }
        if previous != status {
            debug!(agent_id = %id, from = %previous, to = %status, "Agent status changed");
        }
        Ok(())
    }

    /// Aggregate counters across all agents.
    #[must_use]
    pub fn statistics(&self) -> RegistryStatistics {
        let inner = self.read();
        let mut stats = RegistryStatistics {
            total_agents: inner.info.len(),
            capability_lookups: self.lookups.load(Ordering::Relaxed),
            ..RegistryStatistics::default()
        };
        for info in inner.info.values() {
            let count = stats.by_status.entry(info.status).or_default();
            *count = count.saturating_add(1);
            stats.total_usage = stats.total_usage.saturating_add(info.usage_count);
            stats.total_errors = stats.total_errors.saturating_add(info.error_count);
        }
        for (capability, bucket) in &inner.index {
            stats.by_capability.insert(*capability, bucket.len());
        }
        stats
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().agents.len()
    }

    /// Check if no agents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().agents.is_empty()
    }
}
