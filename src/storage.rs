//! Abstract storage port for agents and revocation entries, plus the
//! in-memory reference backend.
//!
//! Contract for every backend: serializable writes, a uniqueness constraint
//! over `ans_name` and over the `(protocol, agent_id, capability, provider,
//! version)` tuple, and deterministic `ans_name` ordering for listing
//! queries.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::agent::Agent;
use crate::ca::RevocationEntry;
use crate::error::AnsError;

/// Filter for listing queries. `None` or `*` matches any value.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub protocol: Option<String>,
    pub capability: Option<String>,
    pub provider: Option<String>,
    pub include_inactive: bool,
}

impl AgentFilter {
    fn accepts(&self, agent: &Agent) -> bool {
        if !self.include_inactive && !agent.is_active {
            return false;
        }
        field_ok(&self.protocol, &agent.protocol)
            && field_ok(&self.capability, &agent.capability)
            && field_ok(&self.provider, &agent.provider)
    }
}

fn field_ok(filter: &Option<String>, value: &str) -> bool {
    match filter.as_deref() {
        None | Some("*") => true,
        Some(f) => f == value,
    }
}

pub trait StoragePort: Send + Sync {
    /// Insert a new agent. Fails with `AlreadyRegistered` when the
    /// `ans_name` or the name tuple is already taken.
    fn put_agent(&self, agent: &Agent) -> Result<(), AnsError>;

    /// The current head record for an agent id: highest active version,
    /// falling back to the highest version overall.
    fn get_by_id(&self, agent_id: &str) -> Result<Option<Agent>, AnsError>;

    /// Every record registered under an agent id.
    fn list_by_id(&self, agent_id: &str) -> Result<Vec<Agent>, AnsError>;

    fn get_by_ans_name(&self, ans_name: &str) -> Result<Option<Agent>, AnsError>;

    /// Filtered listing in ascending `ans_name` order, truncated to `limit`.
    fn query(&self, filter: &AgentFilter, limit: usize) -> Result<Vec<Agent>, AnsError>;

    /// Replace an existing agent record, keyed by `ans_name`.
    fn update_agent(&self, agent: &Agent) -> Result<(), AnsError>;

    fn put_revocation(&self, entry: &RevocationEntry) -> Result<(), AnsError>;

    fn get_revocation(&self, serial: &str) -> Result<Option<RevocationEntry>, AnsError>;

    fn list_revocations(&self) -> Result<Vec<RevocationEntry>, AnsError>;
}

#[derive(Default)]
struct MemoryInner {
    // Keyed by ans_name; BTreeMap iteration is the deterministic listing
    // order the port requires.
    agents: BTreeMap<String, Agent>,
    ids: BTreeMap<String, BTreeSet<String>>,
    revocations: BTreeMap<String, RevocationEntry>,
}

/// In-memory backend. A single `RwLock` gives one-writer/many-readers
/// semantics and read-after-write visibility across threads.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemoryStorage {
    fn put_agent(&self, agent: &Agent) -> Result<(), AnsError> {
        let mut inner = self.inner.write();
        if inner.agents.contains_key(&agent.ans_name) {
            return Err(AnsError::AlreadyRegistered(agent.ans_name.clone()));
        }
        // Names differing only in extension still collide on the tuple.
        if let Some(names) = inner.ids.get(&agent.agent_id) {
            for name in names {
                let existing = &inner.agents[name];
                if existing.protocol == agent.protocol
                    && existing.capability == agent.capability
                    && existing.provider == agent.provider
                    && existing.version == agent.version
                {
                    return Err(AnsError::AlreadyRegistered(agent.ans_name.clone()));
                }
            }
        }

        inner
            .ids
            .entry(agent.agent_id.clone())
            .or_default()
            .insert(agent.ans_name.clone());
        inner.agents.insert(agent.ans_name.clone(), agent.clone());
        Ok(())
    }

    fn get_by_id(&self, agent_id: &str) -> Result<Option<Agent>, AnsError> {
        let records = self.list_by_id(agent_id)?;
        let head = records
            .iter()
            .filter(|a| a.is_active)
            .max_by_key(|a| (a.version, a.registration_time))
            .or_else(|| {
                records
                    .iter()
                    .max_by_key(|a| (a.version, a.registration_time))
            })
            .cloned();
        Ok(head)
    }

    fn list_by_id(&self, agent_id: &str) -> Result<Vec<Agent>, AnsError> {
        let inner = self.inner.read();
        let Some(names) = inner.ids.get(agent_id) else {
            return Ok(Vec::new());
        };
        Ok(names
            .iter()
            .filter_map(|name| inner.agents.get(name).cloned())
            .collect())
    }

    fn get_by_ans_name(&self, ans_name: &str) -> Result<Option<Agent>, AnsError> {
        Ok(self.inner.read().agents.get(ans_name).cloned())
    }

    fn query(&self, filter: &AgentFilter, limit: usize) -> Result<Vec<Agent>, AnsError> {
        let inner = self.inner.read();
        Ok(inner
            .agents
            .values()
            .filter(|a| filter.accepts(a))
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_agent(&self, agent: &Agent) -> Result<(), AnsError> {
        let mut inner = self.inner.write();
        match inner.agents.get_mut(&agent.ans_name) {
            Some(slot) => {
                *slot = agent.clone();
                Ok(())
            }
            None => Err(AnsError::NotFound(agent.ans_name.clone())),
        }
    }

    fn put_revocation(&self, entry: &RevocationEntry) -> Result<(), AnsError> {
        self.inner
            .write()
            .revocations
            .insert(entry.serial.clone(), entry.clone());
        Ok(())
    }

    fn get_revocation(&self, serial: &str) -> Result<Option<RevocationEntry>, AnsError> {
        Ok(self.inner.read().revocations.get(serial).cloned())
    }

    fn list_revocations(&self) -> Result<Vec<RevocationEntry>, AnsError> {
        Ok(self.inner.read().revocations.values().cloned().collect())
    }
}
