//! Worker registry
//!
//! In-memory bookkeeping of launched workers keyed by agent id. Every read
//! and write goes through one mutex so a worker's registration can never be
//! lost between two polls of the orchestrator.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::error::AgentError;
use crate::models::{AgentHandle, AgentStatus, WorkerRecord};

#[derive(Debug, Default)]
pub struct WorkerRegistry {
    records: Mutex<HashMap<Uuid, WorkerRecord>>,
    lookups: AtomicU64,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly launched worker
    pub fn add(&self, record: WorkerRecord) {
        debug!("Registry add {} ({})", record.id, record.status);
        self.records.lock().insert(record.id, record);
    }

    pub fn remove(&self, id: Uuid) -> Option<WorkerRecord> {
        let removed = self.records.lock().remove(&id);
        if removed.is_some() {
            debug!("Registry remove {}", id);
        }
        removed
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.records.lock().contains_key(&id)
    }

    /// The worker reference for an id, if the worker has registered
    pub fn agent(&self, id: Uuid) -> Option<AgentHandle> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.records.lock().get(&id).and_then(|r| r.agent.clone())
    }

    pub fn status(&self, id: Uuid) -> Option<AgentStatus> {
        self.records.lock().get(&id).map(|r| r.status)
    }

    pub fn record(&self, id: Uuid) -> Option<WorkerRecord> {
        self.records.lock().get(&id).cloned()
    }

    /// Attach the worker reference to a pending record. Status is unchanged.
    pub fn attach_agent(&self, agent: AgentHandle) -> Result<(), AgentError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(&agent.id)
            .ok_or(AgentError::UnknownAgent(agent.id))?;

        if record.agent.is_some() {
            return Err(AgentError::AlreadyRegistered(agent.id));
        }

        debug!("Registry attach {}", agent);
        record.agent = Some(agent);
        Ok(())
    }

    /// Update a record's status in place
    pub fn set_status(&self, id: Uuid, status: AgentStatus) -> Result<AgentStatus, AgentError> {
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or(AgentError::UnknownAgent(id))?;

        let previous = record.status;
        if !previous.can_transition_to(status) {
            return Err(AgentError::InvalidTransition {
                id,
                from: previous,
                to: status,
            });
        }

        record.status = status;
        debug!("Registry status {}: {} -> {}", id, previous, status);
        Ok(previous)
    }

    /// Reverse lookup by worker reference
    pub fn id_of(&self, agent: &AgentHandle) -> Option<Uuid> {
        self.records
            .lock()
            .values()
            .find(|r| r.agent.as_ref() == Some(agent))
            .map(|r| r.id)
    }

    /// Copy of all records, oldest first
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        let mut records: Vec<_> = self.records.lock().values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of agent lookups served, used by diagnostics
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}
