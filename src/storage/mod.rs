//! Transactional ordered key-value interface consumed by the query core.

mod memory;

pub use memory::{CancelHandle, MemoryCursor, MemoryStore, MemoryTxn};

use crate::errors::DbError;

/// A positioned view over the keys sharing one prefix.
///
/// A forward cursor `seek`s to the first key `>= target`; a reverse cursor to
/// the last key `<= target`. `next` moves in the cursor's direction.
pub trait Cursor {
    fn seek(&mut self, target: &[u8]);
    fn next(&mut self);
    fn valid(&self) -> bool;
    /// Current key; empty when the cursor is not valid.
    fn key(&self) -> &[u8];
    /// Current value; empty when the cursor is not valid.
    fn value(&self) -> &[u8];
}

pub trait Transaction {
    /// # Errors
    /// Returns `DbError::Storage` when the backend fails.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError>;

    /// # Errors
    /// Returns `DbError::Storage` on read-only transactions or backend failure.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), DbError>;

    /// # Errors
    /// Returns `DbError::Storage` on read-only transactions or backend failure.
    fn delete(&mut self, key: &[u8]) -> Result<(), DbError>;

    /// Opens a cursor over keys starting with `prefix`, positioned on the first
    /// key in its direction.
    ///
    /// # Errors
    /// Returns `DbError::Storage` when the backend fails.
    fn cursor(&self, prefix: &[u8], reverse: bool) -> Result<Box<dyn Cursor + '_>, DbError>;

    /// Polled by iterators before each cursor step.
    ///
    /// # Errors
    /// Returns `DbError::Cancelled` once the transaction is cancelled or past its deadline.
    fn check_cancelled(&self) -> Result<(), DbError> {
        Ok(())
    }

    /// # Errors
    /// Returns `DbError::Storage` when the writes cannot be published.
    fn commit(self: Box<Self>) -> Result<(), DbError>;

    fn discard(self: Box<Self>);
}

pub trait Store {
    /// # Errors
    /// Returns `DbError::Storage` when no transaction can be started.
    fn begin(&self, writable: bool) -> Result<Box<dyn Transaction + '_>, DbError>;
}

/// Runs `f` in a read-only transaction: committed when `f` succeeds,
/// discarded when it fails.
///
/// # Errors
/// Propagates the error from `f` or from starting/committing the transaction.
pub fn read_with<T>(
    store: &dyn Store,
    f: impl FnOnce(&dyn Transaction) -> Result<T, DbError>,
) -> Result<T, DbError> {
    let txn = store.begin(false)?;
    match f(txn.as_ref()) {
        Ok(v) => {
            txn.commit()?;
            Ok(v)
        }
        Err(e) => {
            txn.discard();
            Err(e)
        }
    }
}

/// Runs `f` in a writable transaction with the same commit/discard rule as
/// [`read_with`].
///
/// # Errors
/// Propagates the error from `f` or from starting/committing the transaction.
pub fn write_with<T>(
    store: &dyn Store,
    f: impl FnOnce(&mut dyn Transaction) -> Result<T, DbError>,
) -> Result<T, DbError> {
    let mut txn = store.begin(true)?;
    match f(txn.as_mut()) {
        Ok(v) => {
            txn.commit()?;
            Ok(v)
        }
        Err(e) => {
            txn.discard();
            Err(e)
        }
    }
}
