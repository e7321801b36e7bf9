use std::fmt;

use crate::encoding::Value;
use crate::errors::DbError;

use super::{IdIterator, State, ValueIterator, not_positioned};

/// Skips the first `skip` items of its source and stops after `limit` more.
pub struct LimitIterator<'a> {
    source: Box<dyn ValueIterator + 'a>,
    skip: usize,
    limit: Option<usize>,
    served: usize,
    state: State,
}

impl<'a> LimitIterator<'a> {
    #[must_use]
    pub fn new(source: Box<dyn ValueIterator + 'a>, skip: usize, limit: Option<usize>) -> Self {
        Self { source, skip, limit, served: 0, state: State::NotStarted }
    }
}

impl IdIterator for LimitIterator<'_> {
    fn advance(&mut self) -> bool {
        if self.state == State::Exhausted {
            return false;
        }
        if self.limit.is_some_and(|l| self.served >= l) {
            self.state = State::Exhausted;
            return false;
        }
        if self.state == State::NotStarted {
            for _ in 0..self.skip {
                if !self.source.advance() {
                    self.state = State::Exhausted;
                    return false;
                }
            }
        }
        if self.source.advance() {
            self.served += 1;
            self.state = State::HasValue;
            true
        } else {
            self.state = State::Exhausted;
            false
        }
    }

    fn id(&self) -> &[u8] {
        if self.state == State::HasValue { self.source.id() } else { &[] }
    }

    fn err(&self) -> Option<&DbError> {
        self.source.err()
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.state = State::Exhausted;
        self.source.close()
    }
}

impl ValueIterator for LimitIterator<'_> {
    fn with_value(
        &mut self,
        f: &mut dyn FnMut(&Value) -> Result<(), DbError>,
    ) -> Result<(), DbError> {
        if self.state != State::HasValue {
            return Err(not_positioned());
        }
        self.source.with_value(f)
    }
}

impl fmt::Display for LimitIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LIMIT({}", self.source)?;
        if self.skip > 0 {
            write!(f, ", skip={}", self.skip)?;
        }
        if let Some(limit) = self.limit {
            write!(f, ", limit={limit}")?;
        }
        f.write_str(")")
    }
}
