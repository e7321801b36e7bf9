use std::fmt;

use crate::errors::DbError;
use crate::key::Key;
use crate::storage::Transaction;

use super::{IdIterator, State, close_with};

/// Keeps the ids from `source` that have an entry under at least one of the
/// candidate key prefixes, i.e. where `prefix + id` exists.
pub struct InIterator<'a> {
    txn: &'a dyn Transaction,
    prefixes: Vec<Vec<u8>>,
    source: Box<dyn IdIterator + 'a>,
    lookup: Vec<u8>,
    state: State,
    err: Option<DbError>,
}

impl<'a> InIterator<'a> {
    #[must_use]
    pub fn new(txn: &'a dyn Transaction, prefixes: Vec<Key>, source: Box<dyn IdIterator + 'a>) -> Self {
        Self {
            txn,
            prefixes: prefixes.into_iter().map(Key::into_bytes).collect(),
            source,
            lookup: Vec::new(),
            state: State::NotStarted,
            err: None,
        }
    }

    fn step(&mut self) -> Result<bool, DbError> {
        while self.source.advance() {
            let id = self.source.id();
            for prefix in &self.prefixes {
                self.lookup.clear();
                self.lookup.extend_from_slice(prefix);
                self.lookup.extend_from_slice(id);
                if self.txn.get(&self.lookup)?.is_some() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl IdIterator for InIterator<'_> {
    fn advance(&mut self) -> bool {
        if self.state == State::Exhausted {
            return false;
        }
        match self.step() {
            Ok(true) => {
                self.state = State::HasValue;
                true
            }
            Ok(false) => {
                self.state = State::Exhausted;
                false
            }
            Err(e) => {
                self.err = Some(e);
                self.state = State::Exhausted;
                false
            }
        }
    }

    fn id(&self) -> &[u8] {
        if self.state == State::HasValue { self.source.id() } else { &[] }
    }

    fn err(&self) -> Option<&DbError> {
        self.err.as_ref().or_else(|| self.source.err())
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.state = State::Exhausted;
        close_with(self.source.as_mut(), &mut self.err)
    }
}

impl fmt::Display for InIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IN({}, {} keys)", self.source, self.prefixes.len())
    }
}
