//! Pull-based iterators that execute a query plan over one transaction.
//!
//! Every iterator follows the same protocol: call [`IdIterator::advance`]
//! until it returns `false`, then check [`IdIterator::err`] (or the result
//! of [`IdIterator::close`]) to tell exhaustion from failure.

mod fetch;
mod in_iter;
mod index;
mod limit;
mod project;
mod scan;
mod sort;
mod unique;
mod walker;

pub use fetch::FetchIterator;
pub use in_iter::InIterator;
pub use index::IndexIterator;
pub use limit::LimitIterator;
pub use project::ProjectIterator;
pub use scan::ScanIterator;
pub use sort::SortIterator;
pub use unique::UniqueIterator;

use std::fmt;

use crate::encoding::Value;
use crate::errors::DbError;

/// Lifecycle shared by all iterators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    NotStarted,
    HasValue,
    Exhausted,
}

/// Yields encoded document ids.
///
/// `Display` renders the plan this iterator stands for, e.g.
/// `FETCH(INDEX(a, Bounds{['5','10']}))`.
pub trait IdIterator: fmt::Display {
    /// Moves to the next item. Returns `false` once exhausted or failed.
    fn advance(&mut self) -> bool;

    /// Encoded id of the current item; empty unless positioned on one.
    fn id(&self) -> &[u8];

    /// The error that stopped iteration, if any.
    fn err(&self) -> Option<&DbError>;

    /// Releases resources. Safe to call more than once; the first call
    /// hands back the retained error.
    ///
    /// # Errors
    /// Returns the error that stopped iteration.
    fn close(&mut self) -> Result<(), DbError>;
}

/// An id iterator that can also present the current document.
pub trait ValueIterator: IdIterator {
    /// Calls `f` with the current document.
    ///
    /// # Errors
    /// Returns an error if the document cannot be loaded, or whatever `f` returns.
    fn with_value(
        &mut self,
        f: &mut dyn FnMut(&Value) -> Result<(), DbError>,
    ) -> Result<(), DbError>;

    /// Owned copy of the current document.
    ///
    /// # Errors
    /// As [`ValueIterator::with_value`].
    fn value(&mut self) -> Result<Value, DbError> {
        let mut out = None;
        self.with_value(&mut |v| {
            out = Some(v.clone());
            Ok(())
        })?;
        out.ok_or_else(not_positioned)
    }
}

/// Error for value access outside `HasValue`.
pub(crate) fn not_positioned() -> DbError {
    DbError::NoSuchDocument("iterator is not positioned".into())
}

/// Closes `inner` and combines its error with `own`, preferring the earliest.
pub(crate) fn close_with(
    inner: &mut dyn IdIterator,
    own: &mut Option<DbError>,
) -> Result<(), DbError> {
    let inner_res = inner.close();
    match own.take() {
        Some(e) => Err(e),
        None => inner_res,
    }
}

/// Drains a value iterator into `(id, document)` pairs and closes it.
///
/// # Errors
/// Returns the first error raised while iterating or closing.
pub fn collect(mut it: Box<dyn ValueIterator + '_>) -> Result<Vec<(Vec<u8>, Value)>, DbError> {
    let mut out = Vec::new();
    while it.advance() {
        let id = it.id().to_vec();
        match it.value() {
            Ok(v) => out.push((id, v)),
            Err(e) => {
                let _ = it.close();
                return Err(e);
            }
        }
    }
    it.close()?;
    Ok(out)
}
