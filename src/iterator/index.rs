use std::fmt;

use crate::errors::DbError;
use crate::key::{Namespace, trailing_segment};
use crate::query::Bounds;
use crate::storage::Transaction;

use super::walker::RangeWalker;
use super::{IdIterator, State};

/// Yields the ids of index entries whose values fall inside `bounds`.
///
/// A multikey document can match several entries; wrap this in a
/// [`super::UniqueIterator`] to see each id once.
pub struct IndexIterator<'a> {
    name: String,
    walker: RangeWalker<'a>,
    reverse: bool,
    id: Vec<u8>,
    state: State,
    err: Option<DbError>,
}

impl<'a> IndexIterator<'a> {
    #[must_use]
    pub fn new(
        txn: &'a dyn Transaction,
        ns: &Namespace,
        name: &str,
        bounds: Bounds,
        reverse: bool,
    ) -> Self {
        Self {
            name: name.to_owned(),
            walker: RangeWalker::new(txn, ns.prefix().to_vec(), bounds, reverse),
            reverse,
            id: Vec::new(),
            state: State::NotStarted,
            err: None,
        }
    }

    fn step(&mut self) -> Result<bool, DbError> {
        if !self.walker.advance()? {
            return Ok(false);
        }
        let id = trailing_segment(self.walker.key(), self.walker.prefix_len())?;
        self.id.clear();
        self.id.extend_from_slice(id);
        Ok(true)
    }
}

impl IdIterator for IndexIterator<'_> {
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
        if self.state == State::HasValue { &self.id } else { &[] }
    }

    fn err(&self) -> Option<&DbError> {
        self.err.as_ref()
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.walker.close();
        self.state = State::Exhausted;
        self.err.take().map_or(Ok(()), Err)
    }
}

impl fmt::Display for IndexIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INDEX({}", self.name)?;
        fmt_range(f, self.walker.bounds(), self.reverse)?;
        f.write_str(")")
    }
}

/// Writes `, <bounds>` and `, rev` as needed. Bounds are shown in key order
/// whatever the walk direction.
pub(crate) fn fmt_range(f: &mut fmt::Formatter<'_>, walked: &Bounds, reverse: bool) -> fmt::Result {
    if !walked.is_empty() {
        if reverse {
            write!(f, ", {}", walked.reversed())?;
        } else {
            write!(f, ", {walked}")?;
        }
    }
    if reverse {
        f.write_str(", rev")?;
    }
    Ok(())
}
