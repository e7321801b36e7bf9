//! Secondary indexes: key fan-out, maintenance and planner statistics.

mod keys;
mod stats;

pub use keys::{fans_out, generate_keys};
pub use stats::IndexStats;

use std::collections::BTreeSet;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::encoding::{self, Value};
use crate::errors::DbError;
use crate::key::{Key, Namespace};
use crate::storage::Transaction;

/// Declaration of an index: which fields, in what order, and whether
/// documents lacking a field are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub fields: Vec<String>,
    pub sparse: bool,
}

impl IndexInfo {
    /// An index on `fields`, named after them joined by `_`.
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Self {
        let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_owned()).collect();
        Self { name: fields.join("_"), fields, sparse: false }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub const fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// # Errors
    /// Returns `DbError::IndexCreation` for an empty name or field list, an
    /// empty field path segment, or a repeated field.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.fields.is_empty() {
            return Err(DbError::IndexCreation("index needs at least one field".into()));
        }
        if self.name.is_empty() {
            return Err(DbError::IndexCreation("index name is empty".into()));
        }
        let mut seen = BTreeSet::new();
        for f in &self.fields {
            if f.is_empty() || f.split('.').any(str::is_empty) {
                return Err(DbError::IndexCreation(format!("invalid field name: {f:?}")));
            }
            if !seen.insert(f.as_str()) {
                return Err(DbError::IndexCreation(format!("duplicate field: {f}")));
            }
        }
        Ok(())
    }
}

/// A secondary index bound to one collection.
///
/// Entries live under `/<collection>/index/<name>` as the encoded field
/// values followed by the encoded document id, with empty values. Statistics
/// live in a single record under `/<collection>/stats/<name>`.
#[derive(Debug, Clone)]
pub struct Index {
    info: IndexInfo,
    paths: Vec<Vec<String>>,
    ns: Namespace,
    stats_key: Vec<u8>,
}

impl Index {
    /// # Errors
    /// Returns `DbError::IndexCreation` if the declaration is invalid.
    pub fn new(collection: &str, info: IndexInfo) -> Result<Self, DbError> {
        info.validate()?;
        let paths = info.fields.iter().map(|f| f.split('.').map(str::to_owned).collect()).collect();
        let ns = Namespace::index(collection, &info.name);
        let stats_key = Namespace::stats(collection, &info.name).key().into_bytes();
        Ok(Self { info, paths, ns, stats_key })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.info.fields
    }

    #[must_use]
    pub const fn is_sparse(&self) -> bool {
        self.info.sparse
    }

    #[must_use]
    pub const fn info(&self) -> &IndexInfo {
        &self.info
    }

    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.ns
    }

    /// # Errors
    /// Returns a storage or stats decode error.
    pub fn stats(&self, txn: &dyn Transaction) -> Result<IndexStats, DbError> {
        IndexStats::load(txn, &self.stats_key)
    }

    /// Value tuples `doc` contributes, without namespace or id.
    #[must_use]
    pub fn tuples(&self, doc: &Value) -> Vec<Vec<u8>> {
        generate_keys(doc, &self.paths, self.info.sparse)
    }

    fn entry_key(&self, tuple: &[u8], id: &[u8]) -> Vec<u8> {
        let mut key = self.ns.key();
        key.push_encoded(tuple);
        key.push_encoded(id);
        key.into_bytes()
    }

    /// Opens a writer that holds this index's statistics in memory until
    /// [`IndexWriter::flush`], so a batch of writes stores them once.
    ///
    /// # Errors
    /// Returns a storage or stats decode error.
    pub fn writer(&self, txn: &dyn Transaction) -> Result<IndexWriter<'_>, DbError> {
        Ok(IndexWriter { index: self, stats: self.stats(txn)?, dirty: false })
    }

    /// Writes the entries of a new document. `id` is the encoded document id.
    ///
    /// # Errors
    /// Propagates storage and stats errors.
    pub fn insert(&self, txn: &mut dyn Transaction, id: &[u8], doc: &Value) -> Result<(), DbError> {
        let mut writer = self.writer(txn)?;
        writer.insert(txn, id, doc)?;
        writer.flush(txn)
    }

    /// # Errors
    /// Propagates storage and stats errors.
    pub fn delete(&self, txn: &mut dyn Transaction, id: &[u8], doc: &Value) -> Result<(), DbError> {
        let mut writer = self.writer(txn)?;
        writer.delete(txn, id, doc)?;
        writer.flush(txn)
    }

    /// Replaces the entries of `old` with those of `new`, touching only the
    /// tuples that differ.
    ///
    /// # Errors
    /// Propagates storage and stats errors.
    pub fn update(
        &self,
        txn: &mut dyn Transaction,
        id: &[u8],
        old: &Value,
        new: &Value,
    ) -> Result<(), DbError> {
        let mut writer = self.writer(txn)?;
        writer.update(txn, id, old, new)?;
        writer.flush(txn)
    }

    /// Indexes every document already stored under `data_ns`.
    ///
    /// # Errors
    /// Returns `DbError::Decode` for a corrupt row, or a storage/stats error.
    pub fn build(&self, txn: &mut dyn Transaction, data_ns: &Namespace) -> Result<usize, DbError> {
        let mut rows = Vec::new();
        {
            let mut cursor = txn.cursor(data_ns.prefix(), false)?;
            while cursor.valid() {
                txn.check_cancelled()?;
                let id = cursor.key()[data_ns.prefix().len()..].to_vec();
                rows.push((id, encoding::decode_exact(cursor.value())?));
                cursor.next();
            }
        }
        let mut writer = self.writer(txn)?;
        for (id, doc) in &rows {
            writer.insert(txn, id, doc)?;
        }
        writer.flush(txn)?;
        debug!("index {}: built from {} documents", self.info.name, rows.len());
        Ok(rows.len())
    }

    /// Removes every entry and the statistics record.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub fn drop_all(&self, txn: &mut dyn Transaction) -> Result<(), DbError> {
        let mut keys = Vec::new();
        {
            let mut cursor = txn.cursor(self.ns.prefix(), false)?;
            while cursor.valid() {
                keys.push(cursor.key().to_vec());
                cursor.next();
            }
        }
        for key in &keys {
            txn.delete(key)?;
        }
        txn.delete(&self.stats_key)?;
        debug!("index {}: dropped {} entries", self.info.name, keys.len());
        Ok(())
    }
}

/// Batched maintenance of one index inside a transaction.
///
/// Entries are written through immediately; the statistics are kept here
/// and written once by `flush`. Dropping a writer without flushing loses
/// the statistics changes, which is only sound when the transaction is
/// discarded too.
pub struct IndexWriter<'i> {
    index: &'i Index,
    stats: IndexStats,
    dirty: bool,
}

impl IndexWriter<'_> {
    #[must_use]
    pub const fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// # Errors
    /// Propagates storage errors.
    pub fn insert(
        &mut self,
        txn: &mut dyn Transaction,
        id: &[u8],
        doc: &Value,
    ) -> Result<(), DbError> {
        let tuples = self.index.tuples(doc);
        if tuples.is_empty() {
            return Ok(());
        }
        self.write(txn, id, &tuples)?;
        self.stats.multikey |= fans_out(doc, &self.index.paths);
        Ok(())
    }

    /// # Errors
    /// Propagates storage errors.
    pub fn delete(
        &mut self,
        txn: &mut dyn Transaction,
        id: &[u8],
        doc: &Value,
    ) -> Result<(), DbError> {
        let tuples = self.index.tuples(doc);
        self.erase(txn, id, &tuples)
    }

    /// # Errors
    /// Propagates storage errors.
    pub fn update(
        &mut self,
        txn: &mut dyn Transaction,
        id: &[u8],
        old: &Value,
        new: &Value,
    ) -> Result<(), DbError> {
        let before: BTreeSet<Vec<u8>> = self.index.tuples(old).into_iter().collect();
        let after: BTreeSet<Vec<u8>> = self.index.tuples(new).into_iter().collect();
        let removed: Vec<Vec<u8>> = before.difference(&after).cloned().collect();
        let added: Vec<Vec<u8>> = after.difference(&before).cloned().collect();
        if removed.is_empty() && added.is_empty() {
            return Ok(());
        }
        self.erase(txn, id, &removed)?;
        self.write(txn, id, &added)?;
        if !added.is_empty() {
            self.stats.multikey |= fans_out(new, &self.index.paths);
        }
        Ok(())
    }

    fn write(
        &mut self,
        txn: &mut dyn Transaction,
        id: &[u8],
        tuples: &[Vec<u8>],
    ) -> Result<(), DbError> {
        for tuple in tuples {
            let key = self.index.entry_key(tuple, id);
            trace!("index {}: set {}", self.index.name(), Key::from_bytes(key.clone()));
            txn.set(&key, &[])?;
            self.stats.add(tuple);
            self.dirty = true;
        }
        Ok(())
    }

    fn erase(
        &mut self,
        txn: &mut dyn Transaction,
        id: &[u8],
        tuples: &[Vec<u8>],
    ) -> Result<(), DbError> {
        for tuple in tuples {
            let key = self.index.entry_key(tuple, id);
            trace!("index {}: delete {}", self.index.name(), Key::from_bytes(key.clone()));
            txn.delete(&key)?;
            self.stats.remove();
            self.dirty = true;
        }
        Ok(())
    }

    /// Stores the statistics if any write changed them.
    ///
    /// # Errors
    /// Returns `DbError::StatsEncode` or a storage error.
    pub fn flush(self, txn: &mut dyn Transaction) -> Result<(), DbError> {
        if self.dirty {
            self.stats.store(txn, &self.index.stats_key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Value {
        Value::from(v)
    }

    fn entries(txn: &dyn Transaction, idx: &Index) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut c = txn.cursor(idx.namespace().prefix(), false).unwrap();
        while c.valid() {
            out.push(c.key().to_vec());
            c.next();
        }
        out
    }

    #[test]
    fn info_validation() {
        assert_eq!(IndexInfo::new(&["a", "b.c"]).name, "a_b.c");
        assert!(Index::new("c", IndexInfo::new::<&str>(&[])).is_err());
        assert!(matches!(
            Index::new("c", IndexInfo::new(&["a", "a"])),
            Err(DbError::IndexCreation(_))
        ));
        assert!(Index::new("c", IndexInfo::new(&["a..b"])).is_err());
    }

    #[test]
    fn insert_writes_entries_and_stats() {
        let store = MemoryStore::new();
        let mut txn = store.begin_txn(true);
        let idx = Index::new("c", IndexInfo::new(&["a"])).unwrap();
        let id = encoding::encode(&Value::Number(1.0));
        idx.insert(&mut txn, &id, &doc(json!({"a": ["x", "y", "x"]}))).unwrap();
        assert_eq!(entries(&txn, &idx).len(), 2);
        let stats = idx.stats(&txn).unwrap();
        assert_eq!(stats.count, 2);
        assert!(stats.multikey);
    }

    #[test]
    fn update_touches_only_the_delta() {
        let store = MemoryStore::new();
        let idx = Index::new("c", IndexInfo::new(&["a"])).unwrap();
        let id = encoding::encode(&Value::from("d1"));
        {
            let mut txn = store.begin_txn(true);
            idx.insert(&mut txn, &id, &doc(json!({"a": ["x", "y"]}))).unwrap();
            Box::new(txn).commit().unwrap();
        }
        let mut txn = store.begin_txn(true);
        idx.update(&mut txn, &id, &doc(json!({"a": ["x", "y"]})), &doc(json!({"a": ["y", "z"]})))
            .unwrap();
        let keys = entries(&txn, &idx);
        let mut expected_x = idx.namespace().key().with_value(&Value::from("x")).into_bytes();
        expected_x.extend_from_slice(&id);
        assert!(!keys.contains(&expected_x));
        assert_eq!(keys.len(), 2);
        // one removed, one added on top of the two original insertions
        assert_eq!(idx.stats(&txn).unwrap().count, 2);
    }

    #[test]
    fn unchanged_update_writes_nothing() {
        let store = MemoryStore::new();
        let idx = Index::new("c", IndexInfo::new(&["a"])).unwrap();
        let mut txn = store.begin_txn(true);
        let id = encoding::encode(&Value::from("d1"));
        let d = doc(json!({"a": 1, "b": 1}));
        idx.insert(&mut txn, &id, &d).unwrap();
        let before = idx.stats(&txn).unwrap();
        idx.update(&mut txn, &id, &d, &doc(json!({"a": 1, "b": 2}))).unwrap();
        assert_eq!(idx.stats(&txn).unwrap(), before);
    }

    #[test]
    fn writer_stores_stats_once_on_flush() {
        let store = MemoryStore::new();
        let mut txn = store.begin_txn(true);
        let idx = Index::new("c", IndexInfo::new(&["a"])).unwrap();
        let mut w = idx.writer(&txn).unwrap();
        for i in 0..100 {
            let id = encoding::encode(&Value::Number(f64::from(i)));
            w.insert(&mut txn, &id, &doc(json!({"a": i % 10}))).unwrap();
        }
        assert!(txn.get(&idx.stats_key).unwrap().is_none());
        assert_eq!(w.stats().count, 100);
        w.flush(&mut txn).unwrap();
        let stats = idx.stats(&txn).unwrap();
        assert_eq!((stats.count, stats.approx_distinct()), (100, 10));

        let other = Index::new("c", IndexInfo::new(&["b"])).unwrap();
        other.writer(&txn).unwrap().flush(&mut txn).unwrap();
        assert!(txn.get(&other.stats_key).unwrap().is_none(), "clean writers store nothing");
    }

    #[test]
    fn delete_and_drop() {
        let store = MemoryStore::new();
        let mut txn = store.begin_txn(true);
        let idx = Index::new("c", IndexInfo::new(&["a"])).unwrap();
        let d1 = encoding::encode(&Value::from("d1"));
        let d2 = encoding::encode(&Value::from("d2"));
        idx.insert(&mut txn, &d1, &doc(json!({"a": 1}))).unwrap();
        idx.insert(&mut txn, &d2, &doc(json!({"a": 2}))).unwrap();
        idx.delete(&mut txn, &d1, &doc(json!({"a": 1}))).unwrap();
        assert_eq!(entries(&txn, &idx).len(), 1);
        assert_eq!(idx.stats(&txn).unwrap().count, 1);
        idx.drop_all(&mut txn).unwrap();
        assert!(entries(&txn, &idx).is_empty());
        assert!(txn.get(&idx.stats_key).unwrap().is_none());
    }

    #[test]
    fn sparse_index_skips_documents_without_field() {
        let store = MemoryStore::new();
        let mut txn = store.begin_txn(true);
        let idx = Index::new("c", IndexInfo::new(&["a"]).sparse(true)).unwrap();
        let id = encoding::encode(&Value::from("d1"));
        idx.insert(&mut txn, &id, &doc(json!({"b": 1}))).unwrap();
        assert!(entries(&txn, &idx).is_empty());
        assert_eq!(idx.stats(&txn).unwrap().count, 0);
    }

    #[test]
    fn build_indexes_existing_rows() {
        let store = MemoryStore::new();
        let data = Namespace::data("c");
        let mut txn = store.begin_txn(true);
        for i in 0..3 {
            let id = Value::Number(f64::from(i));
            let key = data.key().with_value(&id);
            txn.set(key.as_bytes(), &encoding::encode(&doc(json!({"id": i, "a": i % 2}))))
                .unwrap();
        }
        let idx = Index::new("c", IndexInfo::new(&["a"])).unwrap();
        assert_eq!(idx.build(&mut txn, &data).unwrap(), 3);
        assert_eq!(entries(&txn, &idx).len(), 3);
        let stats = idx.stats(&txn).unwrap();
        assert_eq!((stats.count, stats.approx_distinct(), stats.multikey), (3, 2, false));
    }
}
