//! In-process stand-in for the replicated store.
//!
//! Every write is tagged with a global sequence number (last write wins) and
//! becomes visible immediately on the replicas that acknowledged it and on
//! the remaining replicas only after `propagation_delay`. Reads at `One`
//! consult the handle's local replica; stronger levels merge the replica
//! set they would contact. Time is measured on the tokio clock, so paused
//! tests can step through settle delays and TTLs deterministically.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Consistency, RecordStore, StatusPage, StoreError, StoreResult};
use crate::records::{MutexRecord, RecordKey, StatusRecord};
use crate::topology::NamespaceManifest;

type Table<T> = BTreeMap<RecordKey, Vec<Cell<T>>>;

/// Replication shape of a [`MemoryStore`].
#[derive(Clone, Copy, Debug)]
pub struct MemoryStoreOptions {
    /// Number of simulated replicas.
    pub replicas: usize,
    /// Delay before a write reaches replicas that did not acknowledge it.
    pub propagation_delay: Duration,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            replicas: 1,
            propagation_delay: Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug)]
struct Cell<T> {
    seq: u64,
    visible_at: Instant,
    expires_at: Option<Instant>,
    /// `None` is a tombstone.
    value: Option<T>,
}

impl<T> Cell<T> {
    fn live(&self, now: Instant) -> Option<&T> {
        match self.expires_at {
            Some(expires_at) if expires_at <= now => None,
            _ => self.value.as_ref(),
        }
    }
}

fn latest_visible<T>(cells: &[Cell<T>], now: Instant) -> Option<&Cell<T>> {
    cells
        .iter()
        .filter(|cell| cell.visible_at <= now)
        .max_by_key(|cell| cell.seq)
}

#[derive(Debug, Default)]
struct Replica {
    mutex: Table<MutexRecord>,
    status: Table<StatusRecord>,
}

fn mutex_table(replica: &Replica) -> &Table<MutexRecord> {
    &replica.mutex
}

fn mutex_table_mut(replica: &mut Replica) -> &mut Table<MutexRecord> {
    &mut replica.mutex
}

fn status_table(replica: &Replica) -> &Table<StatusRecord> {
    &replica.status
}

fn status_table_mut(replica: &mut Replica) -> &mut Table<StatusRecord> {
    &mut replica.status
}

#[derive(Debug)]
struct State {
    sequence: u64,
    replicas: Vec<Replica>,
    manifest: Option<NamespaceManifest>,
}

struct Shared {
    options: MemoryStoreOptions,
    state: Mutex<State>,
    fail_status_writes: AtomicBool,
}

/// Replicated in-memory [`RecordStore`]. Clones share the same data; use
/// [`MemoryStore::replica_view`] to get a handle whose local replica differs.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    local: usize,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("replicas", &self.shared.options.replicas)
            .field("propagation_delay", &self.shared.options.propagation_delay)
            .field("local", &self.local)
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Single replica, no propagation delay.
    pub fn new() -> Self {
        Self::with_options(MemoryStoreOptions::default())
    }

    pub fn with_options(options: MemoryStoreOptions) -> Self {
        let replicas = options.replicas.max(1);
        let options = MemoryStoreOptions { replicas, ..options };
        Self {
            shared: Arc::new(Shared {
                options,
                state: Mutex::new(State {
                    sequence: 0,
                    replicas: (0..replicas).map(|_| Replica::default()).collect(),
                    manifest: None,
                }),
                fail_status_writes: AtomicBool::new(false),
            }),
            local: 0,
        }
    }

    /// Handle over the same data that reads and coordinates writes through
    /// replica `local` (modulo the replica count).
    pub fn replica_view(&self, local: usize) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            local: local % self.shared.options.replicas,
        }
    }

    /// Fault injection: make every subsequent status write fail.
    pub fn fail_status_writes(&self, fail: bool) {
        self.shared.fail_status_writes.store(fail, Ordering::SeqCst);
    }

    /// The manifest persisted by the first `ensure_namespace` call.
    pub fn manifest(&self) -> Option<NamespaceManifest> {
        self.shared.state.lock().manifest.clone()
    }

    fn replica_set(&self, consistency: Consistency) -> Vec<usize> {
        let replicas = self.shared.options.replicas;
        (0..consistency.required(replicas))
            .map(|offset| (self.local + offset) % replicas)
            .collect()
    }

    fn apply<T>(
        &self,
        table: fn(&mut Replica) -> &mut Table<T>,
        key: &RecordKey,
        value: Option<T>,
        ttl: Option<Duration>,
        consistency: Consistency,
    ) where
        T: Clone,
    {
        let now = Instant::now();
        let delay = self.shared.options.propagation_delay;
        let acknowledged = self.replica_set(consistency);

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        state.sequence += 1;
        let seq = state.sequence;

        for (index, replica) in state.replicas.iter_mut().enumerate() {
            let visible_at = if acknowledged.contains(&index) {
                now
            } else {
                now + delay
            };
            let cells = table(replica).entry(key.clone()).or_default();
            let newest_visible = latest_visible(cells, now).map(|cell| cell.seq);
            cells.retain(|cell| cell.visible_at > now || Some(cell.seq) == newest_visible);
            cells.push(Cell {
                seq,
                visible_at,
                expires_at: ttl.map(|ttl| now + ttl),
                value: value.clone(),
            });
        }
    }

    fn read<T>(
        &self,
        table: fn(&Replica) -> &Table<T>,
        consistency: Consistency,
        filter: impl Fn(&RecordKey) -> bool,
    ) -> Vec<T>
    where
        T: Clone,
    {
        let now = Instant::now();
        let state = self.shared.state.lock();
        let mut merged: BTreeMap<&RecordKey, &Cell<T>> = BTreeMap::new();

        for index in self.replica_set(consistency) {
            for (key, cells) in table(&state.replicas[index]) {
                if !filter(key) {
                    continue;
                }
                let Some(cell) = latest_visible(cells, now) else {
                    continue;
                };
                match merged.get(key) {
                    Some(existing) if existing.seq >= cell.seq => {}
                    _ => {
                        merged.insert(key, cell);
                    }
                }
            }
        }

        merged
            .into_values()
            .filter_map(|cell| cell.live(now).cloned())
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put_mutex(
        &self,
        key: &RecordKey,
        ttl: Duration,
        consistency: Consistency,
    ) -> StoreResult<()> {
        self.apply(
            mutex_table_mut,
            key,
            Some(MutexRecord::new(key)),
            Some(ttl),
            consistency,
        );
        Ok(())
    }

    async fn mutex_records(
        &self,
        data_center: &str,
        consistency: Consistency,
    ) -> StoreResult<Vec<MutexRecord>> {
        Ok(self.read(mutex_table, consistency, |key| {
            key.data_center == data_center
        }))
    }

    async fn delete_mutex(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<()> {
        self.apply(mutex_table_mut, key, None, None, consistency);
        Ok(())
    }

    async fn put_status(
        &self,
        record: &StatusRecord,
        ttl: Duration,
        consistency: Consistency,
    ) -> StoreResult<()> {
        if self.shared.fail_status_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Query("injected status write failure".into()));
        }
        self.apply(
            status_table_mut,
            &record.key(),
            Some(record.clone()),
            Some(ttl),
            consistency,
        );
        Ok(())
    }

    async fn status(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<Option<StatusRecord>> {
        Ok(self
            .read(status_table, consistency, |candidate| candidate == key)
            .into_iter()
            .next())
    }

    async fn data_center_statuses(
        &self,
        data_center: &str,
        consistency: Consistency,
    ) -> StoreResult<Vec<StatusRecord>> {
        Ok(self.read(status_table, consistency, |key| {
            key.data_center == data_center
        }))
    }

    async fn status_page(
        &self,
        cursor: Option<u64>,
        limit: usize,
        consistency: Consistency,
    ) -> StoreResult<StatusPage> {
        let all = self.read(status_table, consistency, |_| true);
        let offset = cursor.unwrap_or(0) as usize;
        let end = offset.saturating_add(limit.max(1)).min(all.len());
        let records = all.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next = (end < all.len()).then_some(end as u64);
        Ok(StatusPage { records, next })
    }

    async fn delete_status(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<()> {
        self.apply(status_table_mut, key, None, None, consistency);
        Ok(())
    }

    async fn ensure_namespace(&self, manifest: &NamespaceManifest) -> StoreResult<bool> {
        let mut state = self.shared.state.lock();
        if state.manifest.is_some() {
            return Ok(false);
        }
        state.manifest = Some(manifest.clone());
        Ok(true)
    }
}
