use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use croaring::{Bitmap, Portable};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::errors::DbError;
use crate::storage::Transaction;

/// Fixed part of the stats record; the portable bitmap follows it.
#[derive(Serialize, Deserialize)]
struct StatsHeader {
    count: u64,
    multikey: bool,
}

/// Planner statistics for one index.
///
/// `count` is exact. The distinct bitmap holds truncated hashes of every
/// value tuple ever written; it never shrinks on delete, so it only
/// approximates cardinality.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub count: u64,
    distinct: Bitmap,
    pub multikey: bool,
}

impl Default for IndexStats {
    fn default() -> Self {
        Self { count: 0, distinct: Bitmap::new(), multikey: false }
    }
}

impl IndexStats {
    /// Reads the record stored under `key`; a missing record is empty stats.
    ///
    /// # Errors
    /// Returns `DbError::StatsDecode` for a corrupt header, `DbError::Decode`
    /// for a corrupt bitmap, or a storage error.
    pub fn load(txn: &dyn Transaction, key: &[u8]) -> Result<Self, DbError> {
        let Some(bytes) = txn.get(key)? else {
            return Ok(Self::default());
        };
        let (header, used) = decode_from_slice::<StatsHeader, _>(&bytes, standard())?;
        let distinct = Bitmap::try_deserialize::<Portable>(&bytes[used..])
            .ok_or_else(|| DbError::decode("corrupt distinct bitmap in index stats"))?;
        Ok(Self { count: header.count, distinct, multikey: header.multikey })
    }

    /// # Errors
    /// Returns `DbError::StatsEncode` or a storage error.
    pub fn store(&self, txn: &mut dyn Transaction, key: &[u8]) -> Result<(), DbError> {
        let header = StatsHeader { count: self.count, multikey: self.multikey };
        let mut bytes = encode_to_vec(&header, standard())?;
        bytes.extend(self.distinct.serialize::<Portable>());
        txn.set(key, &bytes)
    }

    pub fn add(&mut self, tuple: &[u8]) {
        // collisions only understate cardinality
        #[allow(clippy::cast_possible_truncation)]
        let h = xxh3_64(tuple) as u32;
        self.distinct.add(h);
        self.count += 1;
    }

    pub fn remove(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    #[must_use]
    pub fn approx_distinct(&self) -> u64 {
        self.distinct.cardinality()
    }

    /// Distinct values per entry; zero for an empty index.
    #[must_use]
    pub fn selectivity(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.distinct.cardinality() as f64 / self.count as f64;
        ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn counts_and_distinct() {
        let mut s = IndexStats::default();
        s.add(b"x");
        s.add(b"x");
        s.add(b"y");
        assert_eq!(s.count, 3);
        assert_eq!(s.approx_distinct(), 2);
        s.remove();
        assert_eq!(s.count, 2);
        assert_eq!(s.approx_distinct(), 2);
        assert!((s.selectivity() - 1.0).abs() < f64::EPSILON);
        assert!(IndexStats::default().selectivity().abs() < f64::EPSILON);
    }

    #[test]
    fn persists_through_transaction() {
        let store = MemoryStore::new();
        let mut txn = store.begin_txn(true);
        let mut s = IndexStats::default();
        for i in 0u32..1000 {
            s.add(&i.to_be_bytes());
        }
        s.multikey = true;
        s.store(&mut txn, b"stats").unwrap();
        let loaded = IndexStats::load(&txn, b"stats").unwrap();
        assert_eq!(loaded, s);
        assert_eq!(loaded.approx_distinct(), 1000);
        assert_eq!(IndexStats::load(&txn, b"other").unwrap(), IndexStats::default());
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let store = MemoryStore::new();
        let mut txn = store.begin_txn(true);
        txn.set(b"stats", &[]).unwrap();
        assert!(matches!(IndexStats::load(&txn, b"stats"), Err(DbError::StatsDecode(_))));
        // valid header, truncated bitmap
        let mut s = IndexStats::default();
        s.add(b"a");
        s.store(&mut txn, b"stats").unwrap();
        let mut bytes = txn.get(b"stats").unwrap().unwrap();
        bytes.truncate(bytes.len() - 2);
        txn.set(b"stats", &bytes).unwrap();
        assert!(matches!(IndexStats::load(&txn, b"stats"), Err(DbError::Decode(_))));
    }
}
