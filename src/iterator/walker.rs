use crate::errors::DbError;
use crate::query::Bounds;
use crate::storage::{Cursor, Transaction};

/// Greater than every tag byte, so `x + SEEK_PAST` sorts after all keys
/// whose tail starts with the encoded value `x`.
const SEEK_PAST: u8 = 0xff;

enum Step {
    Inside,
    Seek(Vec<u8>),
    Done,
}

/// Walks the keys under one prefix that fall inside a list of bounds.
///
/// Bounds are matched against the key tail after the prefix, so a bound on
/// the first encoded value also covers whatever segments follow it.
pub(crate) struct RangeWalker<'a> {
    txn: &'a dyn Transaction,
    prefix: Vec<u8>,
    bounds: Bounds,
    reverse: bool,
    cursor: Option<Box<dyn Cursor + 'a>>,
    current: usize,
    step: bool,
    done: bool,
}

impl<'a> RangeWalker<'a> {
    pub(crate) fn new(txn: &'a dyn Transaction, prefix: Vec<u8>, bounds: Bounds, reverse: bool) -> Self {
        let bounds = if reverse { bounds.reversed() } else { bounds };
        Self { txn, prefix, bounds, reverse, cursor: None, current: 0, step: false, done: false }
    }

    /// Bounds in walk order.
    pub(crate) fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub(crate) fn prefix_len(&self) -> usize {
        self.prefix.len()
    }

    /// Moves to the next key inside the bounds; `Ok(false)` when there is none.
    pub(crate) fn advance(&mut self) -> Result<bool, DbError> {
        if self.done {
            return Ok(false);
        }
        self.txn.check_cancelled()?;
        if self.cursor.is_none() {
            let txn = self.txn;
            self.cursor = Some(txn.cursor(&self.prefix, self.reverse)?);
        } else if self.step
            && let Some(c) = self.cursor.as_mut()
        {
            c.next();
        }
        self.step = false;
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(false);
        };
        loop {
            if !cursor.valid() {
                self.done = true;
                return Ok(false);
            }
            let tail = cursor.key().get(self.prefix.len()..).unwrap_or_default();
            let step = if self.reverse {
                step_reverse(&self.bounds, &mut self.current, tail)
            } else {
                step_forward(&self.bounds, &mut self.current, tail)
            };
            match step {
                Step::Inside => {
                    self.step = true;
                    return Ok(true);
                }
                Step::Done => {
                    self.done = true;
                    return Ok(false);
                }
                Step::Seek(target) => {
                    self.txn.check_cancelled()?;
                    let mut abs = self.prefix.clone();
                    abs.extend_from_slice(&target);
                    let stuck = if self.reverse {
                        cursor.key() <= abs.as_slice()
                    } else {
                        cursor.key() >= abs.as_slice()
                    };
                    if stuck {
                        cursor.next();
                    } else {
                        cursor.seek(&abs);
                    }
                }
            }
        }
    }

    pub(crate) fn key(&self) -> &[u8] {
        self.cursor.as_ref().map_or(&[], |c| c.key())
    }

    pub(crate) fn value(&self) -> &[u8] {
        self.cursor.as_ref().map_or(&[], |c| c.value())
    }

    pub(crate) fn close(&mut self) {
        self.cursor = None;
        self.done = true;
    }
}

fn step_forward(bounds: &Bounds, current: &mut usize, tail: &[u8]) -> Step {
    if bounds.is_empty() {
        return Step::Inside;
    }
    while let Some(b) = bounds.as_slice().get(*current) {
        if b.is_before_start(tail) {
            let mut target = b.start.clone();
            if !b.start_include {
                target.push(SEEK_PAST);
            }
            return Step::Seek(target);
        }
        if b.is_after_end(tail) {
            *current += 1;
            continue;
        }
        return Step::Inside;
    }
    Step::Done
}

fn step_reverse(bounds: &Bounds, current: &mut usize, tail: &[u8]) -> Step {
    if bounds.is_empty() {
        return Step::Inside;
    }
    while let Some(b) = bounds.as_slice().get(*current) {
        if b.is_after_end(tail) {
            let mut target = b.end.clone();
            if b.end_include {
                target.push(SEEK_PAST);
            }
            return Step::Seek(target);
        }
        if b.is_before_start(tail) {
            *current += 1;
            continue;
        }
        return Step::Inside;
    }
    Step::Done
}
