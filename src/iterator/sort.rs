use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::context::QueryContext;
use crate::encoding::Value;
use crate::errors::DbError;
use crate::key::Key;
use crate::query::Sort;
use crate::query::telemetry;

use super::{IdIterator, State, ValueIterator, close_with, not_positioned};

/// Drains its source, orders the ids by sort key, then serves documents in
/// that order, re-reading each one lazily.
pub struct SortIterator<'a> {
    ctx: QueryContext<'a>,
    source: Box<dyn ValueIterator + 'a>,
    sort: Arc<Sort>,
    rows: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
    current: Option<Value>,
    state: State,
    err: Option<DbError>,
}

impl<'a> SortIterator<'a> {
    #[must_use]
    pub fn new(ctx: QueryContext<'a>, source: Box<dyn ValueIterator + 'a>, sort: Arc<Sort>) -> Self {
        Self {
            ctx,
            source,
            sort,
            rows: Vec::new(),
            pos: 0,
            current: None,
            state: State::NotStarted,
            err: None,
        }
    }

    fn collect(&mut self) -> Result<(), DbError> {
        let started = Instant::now();
        let every = self.ctx.config.sort_cancel_check_every.max(1);
        let sort = Arc::clone(&self.sort);
        let pool = self.ctx.pool.clone();
        while self.source.advance() {
            if self.rows.len() % every == 0 {
                self.ctx.txn.check_cancelled()?;
            }
            let mut key = pool.acquire();
            self.source.with_value(&mut |doc| {
                sort.append_key(&mut key, doc);
                Ok(())
            })?;
            self.rows.push((key.to_vec(), self.source.id().to_vec()));
        }
        self.rows.sort_unstable();
        let elapsed = started.elapsed().as_millis();
        telemetry::log_sort(self.rows.len(), elapsed, self.ctx.config.slow_sort_ms);
        Ok(())
    }

    fn step(&mut self) -> Result<bool, DbError> {
        if self.state == State::NotStarted {
            self.collect()?;
            // a failed source leaves its error in place; serve nothing
            if self.source.err().is_some() {
                self.rows.clear();
                return Ok(false);
            }
        } else {
            self.pos += 1;
        }
        let Some((_, id)) = self.rows.get(self.pos) else {
            return Ok(false);
        };
        let doc = self.ctx.fetch(id)?.ok_or_else(|| {
            let key = Key::from_bytes(self.ctx.data_key(id));
            DbError::NoSuchDocument(key.to_string())
        })?;
        self.current = Some(doc);
        Ok(true)
    }
}

impl IdIterator for SortIterator<'_> {
    fn advance(&mut self) -> bool {
        if self.state == State::Exhausted {
            return false;
        }
        self.current = None;
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
        match (self.state, self.rows.get(self.pos)) {
            (State::HasValue, Some((_, id))) => id,
            _ => &[],
        }
    }

    fn err(&self) -> Option<&DbError> {
        self.err.as_ref().or_else(|| self.source.err())
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.state = State::Exhausted;
        self.rows.clear();
        self.current = None;
        close_with(self.source.as_mut(), &mut self.err)
    }
}

impl ValueIterator for SortIterator<'_> {
    fn with_value(
        &mut self,
        f: &mut dyn FnMut(&Value) -> Result<(), DbError>,
    ) -> Result<(), DbError> {
        match (&self.state, &self.current) {
            (State::HasValue, Some(v)) => f(v),
            _ => Err(not_positioned()),
        }
    }
}

impl fmt::Display for SortIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SORT({})", self.source)
    }
}
