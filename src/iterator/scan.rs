use std::fmt;
use std::sync::Arc;

use crate::context::QueryContext;
use crate::encoding::{self, Value};
use crate::errors::DbError;
use crate::query::{Bounds, Filter};

use super::index::fmt_range;
use super::walker::RangeWalker;
use super::{IdIterator, State, ValueIterator, not_positioned};

/// Walks the primary rows directly, optionally bounded on the encoded id,
/// and keeps documents passing the filter.
pub struct ScanIterator<'a> {
    ctx: QueryContext<'a>,
    walker: RangeWalker<'a>,
    filter: Arc<Filter>,
    reverse: bool,
    current: Option<Value>,
    state: State,
    err: Option<DbError>,
}

impl<'a> ScanIterator<'a> {
    #[must_use]
    pub fn new(ctx: QueryContext<'a>, filter: Arc<Filter>, bounds: Bounds, reverse: bool) -> Self {
        let walker = RangeWalker::new(ctx.txn, ctx.data_ns.prefix().to_vec(), bounds, reverse);
        Self { ctx, walker, filter, reverse, current: None, state: State::NotStarted, err: None }
    }

    fn step(&mut self) -> Result<bool, DbError> {
        while self.walker.advance()? {
            let doc = encoding::decode_exact(self.walker.value())?;
            let mut buf = self.ctx.pool.acquire();
            if self.filter.ok_with(Some(&doc), &mut buf) {
                self.current = Some(doc);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl IdIterator for ScanIterator<'_> {
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
        if self.state == State::HasValue {
            self.walker.key().get(self.walker.prefix_len()..).unwrap_or_default()
        } else {
            &[]
        }
    }

    fn err(&self) -> Option<&DbError> {
        self.err.as_ref()
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.walker.close();
        self.state = State::Exhausted;
        self.current = None;
        self.err.take().map_or(Ok(()), Err)
    }
}

impl ValueIterator for ScanIterator<'_> {
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

impl fmt::Display for ScanIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SCAN(id")?;
        fmt_range(f, self.walker.bounds(), self.reverse)?;
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::test_support::{ctx, num_id, store_with};
    use crate::query::parse_filter_json;

    fn run(it: &mut ScanIterator<'_>) -> Vec<f64> {
        let mut out = Vec::new();
        while it.advance() {
            out.push(num_id(it.id()));
        }
        out
    }

    #[test]
    fn full_scan_with_filter() {
        let store = store_with(&[3, 1, 2, 5]);
        let txn = store.begin_txn(false);
        let filter = Arc::new(parse_filter_json(r#"{"a": {"$gte": 2}}"#).unwrap());
        let mut it = ScanIterator::new(ctx(&txn), filter, Bounds::new(), false);
        assert_eq!(run(&mut it), vec![2.0, 3.0, 5.0]);
        assert_eq!(it.to_string(), "SCAN(id)");
        assert!(it.close().is_ok());
    }

    #[test]
    fn bounded_reverse_scan_over_ids() {
        let store = store_with(&[1, 2, 3, 4, 5]);
        let txn = store.begin_txn(false);
        let filter = Arc::new(parse_filter_json(r#"{"id": {"$lte": 3}}"#).unwrap());
        let bounds = filter.index_bounds_for("id", false).unwrap();
        let mut it = ScanIterator::new(ctx(&txn), filter, bounds, true);
        assert_eq!(run(&mut it), vec![3.0, 2.0, 1.0]);
        assert_eq!(it.to_string(), "SCAN(id, Bounds{[-inf,'3']}, rev)");
    }

    #[test]
    fn values_follow_the_cursor() {
        let store = store_with(&[7]);
        let txn = store.begin_txn(false);
        let mut it = ScanIterator::new(ctx(&txn), Arc::new(Filter::All), Bounds::new(), false);
        assert!(it.value().is_err());
        assert!(it.advance());
        assert_eq!(it.value().unwrap().get("a").and_then(Value::as_f64), Some(7.0));
        assert!(!it.advance());
        assert!(it.id().is_empty());
    }

    #[test]
    fn cancellation_is_reported() {
        let store = store_with(&[1, 2]);
        let txn = store.begin_txn(false);
        let handle = txn.cancel_handle();
        let mut it = ScanIterator::new(ctx(&txn), Arc::new(Filter::All), Bounds::new(), false);
        assert!(it.advance());
        handle.cancel();
        assert!(!it.advance());
        assert!(matches!(it.close(), Err(DbError::Cancelled(_))));
    }
}
