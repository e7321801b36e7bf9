use std::fmt;
use std::sync::Arc;

use log::warn;

use crate::context::QueryContext;
use crate::encoding::Value;
use crate::errors::DbError;
use crate::key::Key;
use crate::query::Filter;

use super::{IdIterator, State, ValueIterator, close_with, not_positioned};

/// Loads the document behind each id and keeps those passing the residual filter.
pub struct FetchIterator<'a> {
    ctx: QueryContext<'a>,
    source: Box<dyn IdIterator + 'a>,
    filter: Arc<Filter>,
    current: Option<Value>,
    state: State,
    err: Option<DbError>,
}

impl<'a> FetchIterator<'a> {
    #[must_use]
    pub fn new(ctx: QueryContext<'a>, source: Box<dyn IdIterator + 'a>, filter: Arc<Filter>) -> Self {
        Self { ctx, source, filter, current: None, state: State::NotStarted, err: None }
    }

    fn step(&mut self) -> Result<bool, DbError> {
        while self.source.advance() {
            let id = self.source.id();
            let Some(doc) = self.ctx.fetch(id)? else {
                warn!("dangling index entry for {}", Key::from_bytes(self.ctx.data_key(id)));
                continue;
            };
            let mut buf = self.ctx.pool.acquire();
            if self.filter.ok_with(Some(&doc), &mut buf) {
                self.current = Some(doc);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl IdIterator for FetchIterator<'_> {
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
        if self.state == State::HasValue { self.source.id() } else { &[] }
    }

    fn err(&self) -> Option<&DbError> {
        self.err.as_ref().or_else(|| self.source.err())
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.state = State::Exhausted;
        self.current = None;
        close_with(self.source.as_mut(), &mut self.err)
    }
}

impl ValueIterator for FetchIterator<'_> {
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

impl fmt::Display for FetchIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FETCH({})", self.source)
    }
}
