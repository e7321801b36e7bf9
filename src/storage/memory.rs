use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::config::QueryConfig;
use crate::errors::DbError;

use super::{Cursor, Store, Transaction};

type Snapshot = Arc<BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory ordered store with snapshot reads.
///
/// Each transaction reads from the snapshot current when it began and
/// buffers its writes; commit applies them on top of the latest snapshot.
/// Concurrent writers are not checked for conflicts, the last commit wins.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Snapshot>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn begin_txn(&self, writable: bool) -> MemoryTxn<'_> {
        MemoryTxn {
            store: self,
            snapshot: Arc::clone(&self.data.read()),
            pending: BTreeMap::new(),
            writable,
            deadline: None,
            cancel: CancelHandle::default(),
        }
    }

    /// Read-only transaction for a query, with the configured default
    /// timeout applied when there is one.
    #[must_use]
    pub fn begin_query(&self, config: &QueryConfig) -> MemoryTxn<'_> {
        let txn = self.begin_txn(false);
        match config.default_timeout_ms {
            Some(ms) => txn.with_timeout(Duration::from_millis(ms)),
            None => txn,
        }
    }

    /// Number of committed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn publish(&self, pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>) {
        if pending.is_empty() {
            return;
        }
        let mut guard = self.data.write();
        let map = Arc::make_mut(&mut guard);
        for (k, v) in pending {
            match v {
                Some(v) => {
                    map.insert(k, v);
                }
                None => {
                    map.remove(&k);
                }
            }
        }
    }
}

impl Store for MemoryStore {
    fn begin(&self, writable: bool) -> Result<Box<dyn Transaction + '_>, DbError> {
        Ok(Box::new(self.begin_txn(writable)))
    }
}

/// Shared flag that cancels every transaction holding a clone of it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct MemoryTxn<'s> {
    store: &'s MemoryStore,
    snapshot: Snapshot,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    writable: bool,
    deadline: Option<Instant>,
    cancel: CancelHandle,
}

impl MemoryTxn<'_> {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn ensure_writable(&self) -> Result<(), DbError> {
        if self.writable {
            Ok(())
        } else {
            Err(DbError::Storage("write in read-only transaction".into()))
        }
    }
}

impl Transaction for MemoryTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        if let Some(v) = self.pending.get(key) {
            return Ok(v.clone());
        }
        Ok(self.snapshot.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), DbError> {
        self.ensure_writable()?;
        self.pending.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), DbError> {
        self.ensure_writable()?;
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    fn cursor(&self, prefix: &[u8], reverse: bool) -> Result<Box<dyn Cursor + '_>, DbError> {
        let mut merged: BTreeMap<&[u8], &[u8]> = self
            .snapshot
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        for (k, v) in self.pending.range(prefix.to_vec()..).take_while(|(k, _)| k.starts_with(prefix)) {
            match v {
                Some(v) => {
                    merged.insert(k.as_slice(), v.as_slice());
                }
                None => {
                    merged.remove(k.as_slice());
                }
            }
        }
        let entries: Vec<(Vec<u8>, Vec<u8>)> =
            merged.into_iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
        Ok(Box::new(MemoryCursor::new(entries, reverse)))
    }

    fn check_cancelled(&self) -> Result<(), DbError> {
        if self.cancel.is_cancelled() {
            return Err(DbError::Cancelled("transaction cancelled".into()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DbError::Cancelled("deadline exceeded".into()));
        }
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), DbError> {
        let Self { store, pending, writable, .. } = *self;
        if writable {
            store.publish(pending);
        }
        Ok(())
    }

    fn discard(self: Box<Self>) {}
}

/// Cursor over a materialized, sorted copy of one prefix range.
pub struct MemoryCursor {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
    reverse: bool,
}

impl MemoryCursor {
    fn new(entries: Vec<(Vec<u8>, Vec<u8>)>, reverse: bool) -> Self {
        let pos = if reverse { entries.len().checked_sub(1) } else { (!entries.is_empty()).then_some(0) };
        Self { entries, pos, reverse }
    }
}

impl Cursor for MemoryCursor {
    fn seek(&mut self, target: &[u8]) {
        if self.reverse {
            let after = self.entries.partition_point(|(k, _)| k.as_slice() <= target);
            self.pos = after.checked_sub(1);
        } else {
            let at = self.entries.partition_point(|(k, _)| k.as_slice() < target);
            self.pos = (at < self.entries.len()).then_some(at);
        }
    }

    fn next(&mut self) {
        self.pos = match self.pos {
            Some(p) if self.reverse => p.checked_sub(1),
            Some(p) => Some(p + 1).filter(|&n| n < self.entries.len()),
            None => None,
        };
    }

    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn key(&self) -> &[u8] {
        self.pos.and_then(|p| self.entries.get(p)).map_or(&[], |(k, _)| k.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.pos.and_then(|p| self.entries.get(p)).map_or(&[], |(_, v)| v.as_slice())
    }
}
