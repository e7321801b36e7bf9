use std::sync::Arc;

use crate::config::QueryConfig;
use crate::encoding::{self, Value};
use crate::errors::DbError;
use crate::key::Namespace;
use crate::pool::BufferPool;
use crate::storage::Transaction;

/// Everything an iterator pipeline needs from its surroundings: the
/// transaction it reads through, where documents live, scratch buffers and
/// tuning. Cloning is cheap; every iterator keeps its own copy.
#[derive(Clone)]
pub struct QueryContext<'a> {
    pub txn: &'a dyn Transaction,
    pub data_ns: Namespace,
    pub pool: BufferPool,
    pub config: Arc<QueryConfig>,
}

impl<'a> QueryContext<'a> {
    #[must_use]
    pub fn new(txn: &'a dyn Transaction, data_ns: Namespace, config: Arc<QueryConfig>) -> Self {
        let pool = BufferPool::new(config.pool_max_buffers);
        Self { txn, data_ns, pool, config }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    /// Data row key for an encoded document id.
    #[must_use]
    pub fn data_key(&self, id: &[u8]) -> Vec<u8> {
        let mut key = self.data_ns.key();
        key.push_encoded(id);
        key.into_bytes()
    }

    /// Loads and decodes the document stored under an encoded id.
    ///
    /// # Errors
    /// Returns `DbError::Storage` from the transaction or `DbError::Decode` for a corrupt row.
    pub fn fetch(&self, id: &[u8]) -> Result<Option<Value>, DbError> {
        match self.txn.get(&self.data_key(id))? {
            Some(bytes) => Ok(Some(encoding::decode_exact(&bytes)?)),
            None => Ok(None),
        }
    }
}
