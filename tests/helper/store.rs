//! In-memory store with failure injection

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use version_service::storage::store::filter_by_group;
use version_service::storage::{DurableStore, StoreError, VersionStore};
use version_service::version::{Identifier, SemVer, VersionMap, VersionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Set,
    List,
    Delete,
    Health,
    Rebuild,
    Push,
}

#[derive(Default)]
struct State {
    records: VersionMap,
    /// Errors returned once each, in order, before falling through
    queued: HashMap<Op, VecDeque<StoreError>>,
    /// Errors returned on every call
    persistent: HashMap<Op, StoreError>,
    calls: HashMap<Op, usize>,
    /// Every successful `set` in the order it was applied
    writes: Vec<(String, SemVer)>,
    /// Start time of every `set` call, successful or not
    set_started: Vec<Instant>,
}

pub struct FakeStore {
    name: &'static str,
    state: Mutex<State>,
    set_delay: Option<Duration>,
    supports_push: bool,
}

pub fn record(identifier: &str, version: &str) -> VersionRecord {
    VersionRecord::new(
        &Identifier::parse(identifier).unwrap(),
        SemVer::parse(version).unwrap(),
        Utc::now(),
    )
}

impl FakeStore {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
            set_delay: None,
            supports_push: true,
        }
    }

    pub fn with_record(self, identifier: &str, version: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .records
            .insert(identifier.to_string(), record(identifier, version));
        self
    }

    pub fn with_set_delay(mut self, delay: Duration) -> Self {
        self.set_delay = Some(delay);
        self
    }

    pub fn without_push(mut self) -> Self {
        self.supports_push = false;
        self
    }

    pub fn fail_times(&self, op: Op, times: usize, err: StoreError) {
        let mut state = self.state.lock().unwrap();
        let queue = state.queued.entry(op).or_default();
        queue.extend(std::iter::repeat_n(err, times));
    }

    pub fn fail_always(&self, op: Op, err: StoreError) {
        self.state.lock().unwrap().persistent.insert(op, err);
    }

    pub fn recover(&self, op: Op) {
        let mut state = self.state.lock().unwrap();
        state.persistent.remove(&op);
        state.queued.remove(&op);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    pub fn get_record(&self, identifier: &str) -> Option<VersionRecord> {
        self.state.lock().unwrap().records.get(identifier).cloned()
    }

    pub fn writes(&self) -> Vec<(String, SemVer)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn set_instants(&self) -> Vec<Instant> {
        self.state.lock().unwrap().set_started.clone()
    }

    fn enter(&self, op: Op) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_default() += 1;

        if let Some(err) = state.queued.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        match state.persistent.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VersionStore for FakeStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, identifier: &str) -> Result<Option<VersionRecord>, StoreError> {
        self.enter(Op::Get)?;
        Ok(self.get_record(identifier))
    }

    async fn set(&self, identifier: &str, record: &VersionRecord) -> Result<(), StoreError> {
        self.state.lock().unwrap().set_started.push(Instant::now());
        if let Some(delay) = self.set_delay {
            tokio::time::sleep(delay).await;
        }
        self.enter(Op::Set)?;

        let mut state = self.state.lock().unwrap();
        state
            .records
            .insert(identifier.to_string(), record.clone());
        state
            .writes
            .push((identifier.to_string(), record.current.clone()));
        Ok(())
    }

    async fn list_all(&self) -> Result<VersionMap, StoreError> {
        self.enter(Op::List)?;
        Ok(self.state.lock().unwrap().records.clone())
    }

    async fn list_by_prefix(&self, group_id: &str) -> Result<VersionMap, StoreError> {
        Ok(filter_by_group(self.list_all().await?, group_id))
    }

    async fn delete(&self, identifier: &str) -> Result<(), StoreError> {
        self.enter(Op::Delete)?;
        self.state.lock().unwrap().records.remove(identifier);
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        self.enter(Op::Health)
    }

    async fn rebuild(&self, records: &VersionMap) -> Result<(), StoreError> {
        self.enter(Op::Rebuild)?;
        self.state.lock().unwrap().records = records.clone();
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FakeStore {
    async fn push_pending_writes(&self) -> Result<(), StoreError> {
        if !self.supports_push {
            return Err(StoreError::unsupported("fake store cannot push"));
        }
        self.enter(Op::Push)
    }
}
