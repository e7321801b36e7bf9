use std::collections::HashSet;
use std::fmt;

use crate::errors::DbError;

use super::IdIterator;

/// Passes each id through once, dropping repeats from multikey entries.
pub struct UniqueIterator<'a> {
    source: Box<dyn IdIterator + 'a>,
    seen: HashSet<Vec<u8>>,
}

impl<'a> UniqueIterator<'a> {
    #[must_use]
    pub fn new(source: Box<dyn IdIterator + 'a>) -> Self {
        Self { source, seen: HashSet::new() }
    }
}

impl IdIterator for UniqueIterator<'_> {
    fn advance(&mut self) -> bool {
        while self.source.advance() {
            if self.seen.insert(self.source.id().to_vec()) {
                return true;
            }
        }
        false
    }

    fn id(&self) -> &[u8] {
        self.source.id()
    }

    fn err(&self) -> Option<&DbError> {
        self.source.err()
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.seen.clear();
        self.source.close()
    }
}

impl fmt::Display for UniqueIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{self, Value};
    use crate::index::{Index, IndexInfo};
    use crate::iterator::IndexIterator;
    use crate::iterator::test_support::num_id;
    use crate::query::Bounds;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn multikey_duplicates_are_suppressed() {
        let store = MemoryStore::new();
        let idx = Index::new("c", IndexInfo::new(&["tags"])).unwrap();
        let mut txn = store.begin_txn(true);
        for (id, tags) in [(1, json!(["a", "b", "c"])), (2, json!(["b"]))] {
            let id = encoding::encode(&Value::Number(f64::from(id)));
            idx.insert(&mut txn, &id, &Value::from(json!({ "tags": tags }))).unwrap();
        }
        let inner = IndexIterator::new(&txn, idx.namespace(), idx.name(), Bounds::new(), false);
        let mut it = UniqueIterator::new(Box::new(inner));
        let mut out = Vec::new();
        while it.advance() {
            out.push(num_id(it.id()));
        }
        // entries in key order: a/1, b/1, b/2, c/1
        assert_eq!(out, vec![1.0, 2.0]);
        assert_eq!(it.to_string(), "INDEX(tags)");
        assert!(it.close().is_ok());
    }
}
