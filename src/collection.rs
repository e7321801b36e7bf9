use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::config::QueryConfig;
use crate::context::QueryContext;
use crate::encoding::{self, Value};
use crate::errors::DbError;
use crate::index::{Index, IndexInfo, IndexWriter};
use crate::iterator::ValueIterator;
use crate::key::{Key, Namespace};
use crate::planner::{self, ID_FIELD};
use crate::pool::BufferPool;
use crate::query::Query;
use crate::storage::Transaction;

/// Documents of one collection plus their secondary indexes.
///
/// Every write goes through the caller's transaction, so a document and its
/// index entries commit or roll back together. The index list itself is
/// held in memory.
pub struct Collection {
    name: String,
    data_ns: Namespace,
    indexes: RwLock<Vec<Index>>,
    config: Arc<QueryConfig>,
    pool: BufferPool,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, QueryConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: QueryConfig) -> Self {
        let name = name.into();
        let pool = BufferPool::new(config.pool_max_buffers);
        Self {
            data_ns: Namespace::data(&name),
            name,
            indexes: RwLock::new(Vec::new()),
            config: Arc::new(config),
            pool,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn data_namespace(&self) -> &Namespace {
        &self.data_ns
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    #[must_use]
    pub fn indexes(&self) -> Vec<IndexInfo> {
        self.indexes.read().iter().map(|i| i.info().clone()).collect()
    }

    /// Declares an index and fills it from the documents already stored.
    ///
    /// # Errors
    /// Returns `DbError::IndexCreation` for an invalid declaration or a name
    /// already in use, or a storage error from the build.
    pub fn create_index(&self, txn: &mut dyn Transaction, info: IndexInfo) -> Result<(), DbError> {
        let index = Index::new(&self.name, info)?;
        let mut indexes = self.indexes.write();
        if indexes.iter().any(|i| i.name() == index.name()) {
            return Err(DbError::IndexCreation(format!("index {} already exists", index.name())));
        }
        index.build(txn, &self.data_ns)?;
        debug!("collection {}: created index {} on {:?}", self.name, index.name(), index.fields());
        indexes.push(index);
        Ok(())
    }

    /// # Errors
    /// Returns `DbError::NoSuchIndex` if no index has that name.
    pub fn drop_index(&self, txn: &mut dyn Transaction, name: &str) -> Result<(), DbError> {
        let mut indexes = self.indexes.write();
        let pos = indexes
            .iter()
            .position(|i| i.name() == name)
            .ok_or_else(|| DbError::NoSuchIndex(name.to_owned()))?;
        indexes[pos].drop_all(txn)?;
        indexes.remove(pos);
        Ok(())
    }

    fn encoded_id(doc: &Value) -> Result<Vec<u8>, DbError> {
        match doc.get(ID_FIELD) {
            Some(id @ (Value::Number(_) | Value::String(_) | Value::Binary(_) | Value::Bool(_))) => {
                Ok(encoding::encode(id))
            }
            Some(other) => Err(DbError::InvalidDocumentId(format!("unsupported id {other}"))),
            None => Err(DbError::InvalidDocumentId("document has no id field".into())),
        }
    }

    fn data_key(&self, id: &[u8]) -> Vec<u8> {
        let mut key = self.data_ns.key();
        key.push_encoded(id);
        key.into_bytes()
    }

    fn load(&self, txn: &dyn Transaction, id: &[u8]) -> Result<Option<Value>, DbError> {
        txn.get(&self.data_key(id))?.map(|b| encoding::decode_exact(&b)).transpose()
    }

    /// Stores a new document and its index entries. Returns the encoded id.
    ///
    /// # Errors
    /// Returns `DbError::InvalidDocumentId` when `id` is missing or not a
    /// scalar, `DbError::DuplicateDocument` when the id is taken.
    pub fn insert(&self, txn: &mut dyn Transaction, doc: &Value) -> Result<Vec<u8>, DbError> {
        let indexes = self.indexes.read();
        let mut writers = Self::writers(&indexes, txn)?;
        let id = self.store_new(txn, &mut writers, doc)?;
        Self::flush(writers, txn)?;
        Ok(id)
    }

    /// Inserts every document of `docs`, storing each index's statistics
    /// once for the whole batch. Returns the encoded ids in order.
    ///
    /// # Errors
    /// As [`Collection::insert`], for the first document that fails. The
    /// caller's transaction must then be discarded.
    pub fn insert_many<'d>(
        &self,
        txn: &mut dyn Transaction,
        docs: impl IntoIterator<Item = &'d Value>,
    ) -> Result<Vec<Vec<u8>>, DbError> {
        let indexes = self.indexes.read();
        let mut writers = Self::writers(&indexes, txn)?;
        let mut ids = Vec::new();
        for doc in docs {
            ids.push(self.store_new(txn, &mut writers, doc)?);
        }
        Self::flush(writers, txn)?;
        debug!("collection {}: inserted {} documents", self.name, ids.len());
        Ok(ids)
    }

    fn writers<'i>(
        indexes: &'i [Index],
        txn: &dyn Transaction,
    ) -> Result<Vec<IndexWriter<'i>>, DbError> {
        indexes.iter().map(|i| i.writer(txn)).collect()
    }

    fn flush(writers: Vec<IndexWriter<'_>>, txn: &mut dyn Transaction) -> Result<(), DbError> {
        for writer in writers {
            writer.flush(txn)?;
        }
        Ok(())
    }

    fn store_new(
        &self,
        txn: &mut dyn Transaction,
        writers: &mut [IndexWriter<'_>],
        doc: &Value,
    ) -> Result<Vec<u8>, DbError> {
        let id = Self::encoded_id(doc)?;
        let key = self.data_key(&id);
        if txn.get(&key)?.is_some() {
            return Err(DbError::DuplicateDocument(Key::from_bytes(key).to_string()));
        }
        txn.set(&key, &encoding::encode(doc))?;
        for writer in writers.iter_mut() {
            writer.insert(txn, &id, doc)?;
        }
        Ok(id)
    }

    /// Replaces the stored document with the same id.
    ///
    /// # Errors
    /// Returns `DbError::NoSuchDocument` when nothing is stored under the id.
    pub fn update(&self, txn: &mut dyn Transaction, doc: &Value) -> Result<(), DbError> {
        let id = Self::encoded_id(doc)?;
        let key = self.data_key(&id);
        let old = self
            .load(txn, &id)?
            .ok_or_else(|| DbError::NoSuchDocument(Key::from_bytes(key.clone()).to_string()))?;
        txn.set(&key, &encoding::encode(doc))?;
        for index in self.indexes.read().iter() {
            index.update(txn, &id, &old, doc)?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns `DbError::NoSuchDocument` when nothing is stored under the id.
    pub fn delete(&self, txn: &mut dyn Transaction, id: &Value) -> Result<(), DbError> {
        let id = encoding::encode(id);
        let key = self.data_key(&id);
        let old = self
            .load(txn, &id)?
            .ok_or_else(|| DbError::NoSuchDocument(Key::from_bytes(key.clone()).to_string()))?;
        for index in self.indexes.read().iter() {
            index.delete(txn, &id, &old)?;
        }
        txn.delete(&key)
    }

    /// # Errors
    /// Returns a storage or decode error.
    pub fn get(&self, txn: &dyn Transaction, id: &Value) -> Result<Option<Value>, DbError> {
        self.load(txn, &encoding::encode(id))
    }

    fn context<'a>(&self, txn: &'a dyn Transaction) -> QueryContext<'a> {
        QueryContext::new(txn, self.data_ns.clone(), Arc::clone(&self.config))
            .with_pool(self.pool.clone())
    }

    /// Plans `query` and returns its pipeline, bound to `txn`.
    ///
    /// # Errors
    /// Returns a storage or stats error raised while planning.
    pub fn find<'a>(
        &self,
        txn: &'a dyn Transaction,
        query: &Query,
    ) -> Result<Box<dyn ValueIterator + 'a>, DbError> {
        let indexes = self.indexes.read();
        planner::plan(&self.context(txn), query, &indexes)
    }

    /// The plan `find` would run, e.g. `FETCH(INDEX(a, Bounds{('1','4')}))`.
    ///
    /// # Errors
    /// As [`Collection::find`].
    pub fn explain(&self, txn: &dyn Transaction, query: &Query) -> Result<String, DbError> {
        let mut iter = self.find(txn, query)?;
        let plan = iter.to_string();
        iter.close()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, read_with, write_with};
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Value {
        Value::from(v)
    }

    #[test]
    fn insert_requires_scalar_unique_id() {
        let store = MemoryStore::new();
        let coll = Collection::new("users");
        write_with(&store, |txn| {
            coll.insert(txn, &doc(json!({"id": 1, "a": 1})))?;
            assert!(matches!(
                coll.insert(txn, &doc(json!({"id": 1}))),
                Err(DbError::DuplicateDocument(_))
            ));
            assert!(matches!(coll.insert(txn, &doc(json!({"a": 1}))), Err(DbError::InvalidDocumentId(_))));
            assert!(matches!(
                coll.insert(txn, &doc(json!({"id": [1]}))),
                Err(DbError::InvalidDocumentId(_))
            ));
            Ok(())
        })
        .unwrap();
        let got = read_with(&store, |txn| coll.get(txn, &Value::Number(1.0))).unwrap();
        assert_eq!(got, Some(doc(json!({"id": 1, "a": 1}))));
    }

    #[test]
    fn update_and_delete_keep_indexes_in_step() {
        let store = MemoryStore::new();
        let coll = Collection::new("c");
        write_with(&store, |txn| {
            coll.create_index(txn, IndexInfo::new(&["a"]))?;
            coll.insert(txn, &doc(json!({"id": "x", "a": 1})))?;
            coll.update(txn, &doc(json!({"id": "x", "a": 2})))?;
            Ok(())
        })
        .unwrap();
        let q = Query::parse(&doc(json!({"a": 2})), &[] as &[&str]).unwrap();
        let found = read_with(&store, |txn| crate::iterator::collect(coll.find(txn, &q)?)).unwrap();
        assert_eq!(found.len(), 1);
        write_with(&store, |txn| coll.delete(txn, &Value::from("x"))).unwrap();
        let found = read_with(&store, |txn| crate::iterator::collect(coll.find(txn, &q)?)).unwrap();
        assert!(found.is_empty());
        assert!(matches!(
            write_with(&store, |txn| coll.delete(txn, &Value::from("x"))),
            Err(DbError::NoSuchDocument(_))
        ));
    }

    #[test]
    fn index_declarations() {
        let store = MemoryStore::new();
        let coll = Collection::new("c");
        write_with(&store, |txn| {
            coll.create_index(txn, IndexInfo::new(&["a"]))?;
            assert!(matches!(
                coll.create_index(txn, IndexInfo::new(&["b"]).with_name("a")),
                Err(DbError::IndexCreation(_))
            ));
            assert!(matches!(coll.drop_index(txn, "zzz"), Err(DbError::NoSuchIndex(_))));
            coll.drop_index(txn, "a")
        })
        .unwrap();
        assert!(coll.indexes().is_empty());
    }
}
