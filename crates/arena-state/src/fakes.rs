//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryAgentStore` and `MemoryInterfaceStore` that satisfy the
//! trait contracts without any external dependencies. Both can be told to
//! report `StorageError::Unavailable` so callers' retry and abort paths can
//! be exercised.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryAgentStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AgentTables {
    agents: HashMap<AgentId, AgentProfile>,
    outcomes: BTreeMap<(AgentId, NaiveDate), AgentOutcome>,
    failures: Vec<FailureRecord>,
}

/// In-memory agent store backed by a `HashMap<AgentId, AgentProfile>` and
/// an outcome table keyed by `(agent, day)`.
#[derive(Debug, Default)]
pub struct MemoryAgentStore {
    tables: Mutex<AgentTables>,
    unavailable: AtomicBool,
    failing_writes: AtomicU32,
    rejected_agents: Mutex<HashSet<AgentId>>,
    write_attempts: AtomicUsize,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `record_outcome` fail with `Unavailable`.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make every `record_outcome` for `agent_id` fail with `Unavailable`
    /// until [`MemoryAgentStore::clear_write_failures`] is called.
    pub fn fail_writes_for(&self, agent_id: &AgentId) {
        self.rejected_agents.lock().unwrap().insert(agent_id.clone());
    }

    pub fn clear_write_failures(&self) {
        self.rejected_agents.lock().unwrap().clear();
        self.failing_writes.store(0, Ordering::SeqCst);
    }

    /// Number of `record_outcome` calls seen, including failed ones.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn take_injected_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AgentStore for MemoryAgentStore {
    async fn register(&self, profile: AgentProfile) -> StorageResult<()> {
        self.check_available()?;
        let mut tables = self.tables.lock().unwrap();
        tables.agents.insert(profile.agent_id.clone(), profile);
        Ok(())
    }

    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<AgentProfile> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        tables
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StorageError::AgentNotFound {
                agent_id: agent_id.0.clone(),
            })
    }

    async fn list_agents(&self) -> StorageResult<Vec<AgentProfile>> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        let mut agents: Vec<AgentProfile> = tables.agents.values().cloned().collect();
        agents.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        Ok(agents)
    }

    async fn list_due(&self, day: NaiveDate) -> StorageResult<Vec<AgentProfile>> {
        let agents = self.list_agents().await?;
        let tables = self.tables.lock().unwrap();
        Ok(agents
            .into_iter()
            .filter(|a| a.active && !tables.outcomes.contains_key(&(a.agent_id.clone(), day)))
            .collect())
    }

    async fn outcome_for(
        &self,
        agent_id: &AgentId,
        day: NaiveDate,
    ) -> StorageResult<Option<AgentOutcome>> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.outcomes.get(&(agent_id.clone(), day)).cloned())
    }

    async fn record_outcome(&self, outcome: &AgentOutcome) -> StorageResult<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.take_injected_write_failure()
            || self
                .rejected_agents
                .lock()
                .unwrap()
                .contains(&outcome.agent_id)
        {
            return Err(StorageError::Unavailable("injected write failure".into()));
        }

        let mut tables = self.tables.lock().unwrap();
        let key = (outcome.agent_id.clone(), outcome.run_date);
        if tables.outcomes.contains_key(&key) {
            return Err(StorageError::AlreadyRecorded {
                agent_id: outcome.agent_id.0.clone(),
                run_date: outcome.run_date.to_string(),
            });
        }
        let profile = tables.agents.get_mut(&outcome.agent_id).ok_or_else(|| {
            StorageError::AgentNotFound {
                agent_id: outcome.agent_id.0.clone(),
            }
        })?;
        if !outcome.basis().matches(profile) {
            return Err(StorageError::ScoreConflict {
                agent_id: outcome.agent_id.0.clone(),
            });
        }
        profile.score = outcome.new_score;
        profile.price = outcome.new_price;
        profile.last_run_date = Some(outcome.run_date);
        tables.outcomes.insert(key, outcome.clone());
        Ok(())
    }

    async fn record_failure(
        &self,
        agent_id: &AgentId,
        day: NaiveDate,
        reason: &str,
    ) -> StorageResult<()> {
        self.check_available()?;
        let mut tables = self.tables.lock().unwrap();
        tables.failures.push(FailureRecord {
            agent_id: agent_id.clone(),
            run_date: day,
            reason: reason.to_string(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn failures(&self, agent_id: &AgentId) -> StorageResult<Vec<FailureRecord>> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .failures
            .iter()
            .filter(|f| &f.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn history(&self, agent_id: &AgentId) -> StorageResult<Vec<AgentOutcome>> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        // BTreeMap keys sort by (agent, day), so this is already oldest first.
        Ok(tables
            .outcomes
            .iter()
            .filter(|((id, _), _)| id == agent_id)
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn update_tier(
        &self,
        agent_id: &AgentId,
        expected: TierScore,
        next: TierScore,
        price: f64,
    ) -> StorageResult<AgentProfile> {
        self.check_available()?;
        let mut tables = self.tables.lock().unwrap();
        let profile =
            tables
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| StorageError::AgentNotFound {
                    agent_id: agent_id.0.clone(),
                })?;
        if !expected.matches(profile) {
            return Err(StorageError::ScoreConflict {
                agent_id: agent_id.0.clone(),
            });
        }
        profile.tier = next.tier;
        profile.score = next.score;
        profile.price = price;
        Ok(profile.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryInterfaceStore
// ---------------------------------------------------------------------------

/// In-memory content-addressed interface store backed by a
/// `HashMap<digest, code>`.
#[derive(Debug, Default)]
pub struct MemoryInterfaceStore {
    store: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryInterfaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("interface store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl InterfaceStore for MemoryInterfaceStore {
    async fn put(&self, code: &str) -> StorageResult<InterfaceRef> {
        self.check_available()?;
        let digest = ContentDigest::from_bytes(code.as_bytes());
        let mut store = self.store.lock().unwrap();
        store.insert(digest.as_str().to_string(), code.to_string());
        Ok(digest)
    }

    async fn get(&self, interface_ref: &InterfaceRef) -> StorageResult<String> {
        self.check_available()?;
        let store = self.store.lock().unwrap();
        store
            .get(interface_ref.as_str())
            .cloned()
            .ok_or_else(|| StorageError::InterfaceNotFound {
                digest: interface_ref.as_str().to_string(),
            })
    }

    async fn contains(&self, interface_ref: &InterfaceRef) -> StorageResult<bool> {
        self.check_available()?;
        let store = self.store.lock().unwrap();
        Ok(store.contains_key(interface_ref.as_str()))
    }
}
