use std::cmp::Ordering;
use std::fmt;

use crate::key::fmt_segment;

/// Compares `key` with `bound` over their common length only, so a key that
/// starts with the bound value compares equal to it.
pub(crate) fn prefix_cmp(key: &[u8], bound: &[u8]) -> Ordering {
    let n = key.len().min(bound.len());
    key[..n].cmp(&bound[..n])
}

/// A contiguous range of encoded values. An empty `start` or `end` is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bound {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub start_include: bool,
    pub end_include: bool,
}

impl Bound {
    #[must_use]
    pub fn point(v: Vec<u8>) -> Self {
        Self { start: v.clone(), end: v, start_include: true, end_include: true }
    }

    #[must_use]
    pub fn above(v: Vec<u8>, include: bool) -> Self {
        Self { start: v, start_include: include, ..Self::default() }
    }

    #[must_use]
    pub fn below(v: Vec<u8>, include: bool) -> Self {
        Self { end: v, end_include: include, ..Self::default() }
    }

    /// True when `enc` sits before the start of this bound.
    pub(crate) fn is_before_start(&self, enc: &[u8]) -> bool {
        if self.start.is_empty() {
            return false;
        }
        match prefix_cmp(enc, &self.start) {
            Ordering::Less => true,
            Ordering::Equal => !self.start_include,
            Ordering::Greater => false,
        }
    }

    /// True when `enc` sits past the end of this bound.
    pub(crate) fn is_after_end(&self, enc: &[u8]) -> bool {
        if self.end.is_empty() {
            return false;
        }
        match prefix_cmp(enc, &self.end) {
            Ordering::Greater => true,
            Ordering::Equal => !self.end_include,
            Ordering::Less => false,
        }
    }

    #[must_use]
    pub fn contains(&self, enc: &[u8]) -> bool {
        !self.is_before_start(enc) && !self.is_after_end(enc)
    }

    /// Narrows to the range covered by both bounds. The result may be empty
    /// (start after end), which scans nothing.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let (start, start_include) = match (self.start.is_empty(), other.start.is_empty()) {
            (true, _) => (other.start.clone(), other.start_include),
            (_, true) => (self.start.clone(), self.start_include),
            _ => match self.start.cmp(&other.start) {
                Ordering::Greater => (self.start.clone(), self.start_include),
                Ordering::Less => (other.start.clone(), other.start_include),
                Ordering::Equal => {
                    (self.start.clone(), self.start_include && other.start_include)
                }
            },
        };
        let (end, end_include) = match (self.end.is_empty(), other.end.is_empty()) {
            (true, _) => (other.end.clone(), other.end_include),
            (_, true) => (self.end.clone(), self.end_include),
            _ => match self.end.cmp(&other.end) {
                Ordering::Less => (self.end.clone(), self.end_include),
                Ordering::Greater => (other.end.clone(), other.end_include),
                Ordering::Equal => (self.end.clone(), self.end_include && other.end_include),
            },
        };
        Self { start, end, start_include, end_include }
    }

    fn merge(&self, other: &Self) -> Self {
        let (start, start_include) = if self.start.is_empty() || other.start.is_empty() {
            (Vec::new(), true)
        } else {
            match self.start.cmp(&other.start) {
                Ordering::Less => (self.start.clone(), self.start_include),
                Ordering::Greater => (other.start.clone(), other.start_include),
                Ordering::Equal => (self.start.clone(), self.start_include || other.start_include),
            }
        };
        let (end, end_include) = if self.end.is_empty() || other.end.is_empty() {
            (Vec::new(), true)
        } else {
            match self.end.cmp(&other.end) {
                Ordering::Greater => (self.end.clone(), self.end_include),
                Ordering::Less => (other.end.clone(), other.end_include),
                Ordering::Equal => (self.end.clone(), self.end_include || other.end_include),
            }
        };
        Self { start, end, start_include, end_include }
    }
}

/// `a` reaches at least as far as where `b` begins.
fn reaches(a: &Bound, b: &Bound) -> bool {
    if a.end.is_empty() || b.start.is_empty() {
        return true;
    }
    match a.end.cmp(&b.start) {
        Ordering::Equal => a.end_include || b.start_include,
        Ordering::Greater => true,
        Ordering::Less => false,
    }
}

fn overlaps(a: &Bound, b: &Bound) -> bool {
    reaches(a, b) && reaches(b, a)
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.is_empty() {
            f.write_str("[-inf")?;
        } else {
            f.write_str(if self.start_include { "['" } else { "('" })?;
            fmt_segment(f, &self.start)?;
            f.write_str("'")?;
        }
        f.write_str(",")?;
        if self.end.is_empty() {
            f.write_str("inf]")
        } else {
            f.write_str("'")?;
            fmt_segment(f, &self.end)?;
            f.write_str(if self.end_include { "']" } else { "')" })
        }
    }
}

/// Start-sorted, overlap-free list of bounds. An empty list places no
/// restriction on the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bounds(Vec<Bound>);

impl Bounds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(b: Bound) -> Self {
        Self(vec![b])
    }

    /// Inserts `b`, folding in every bound it overlaps or touches inclusively.
    pub fn append(&mut self, b: Bound) {
        let mut merged = b;
        self.0.retain(|existing| {
            if overlaps(existing, &merged) {
                merged = existing.merge(&merged);
                false
            } else {
                true
            }
        });
        // a widened bound can reach neighbours it did not touch before
        while let Some(pos) = self.0.iter().position(|existing| overlaps(existing, &merged)) {
            let existing = self.0.remove(pos);
            merged = existing.merge(&merged);
        }
        let pos = self.0.partition_point(|x| x.start < merged.start);
        self.0.insert(pos, merged);
    }

    pub fn extend(&mut self, other: Self) {
        for b in other.0 {
            self.append(b);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bound> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Bound] {
        &self.0
    }

    /// Whether an encoded value falls inside some bound. Empty bounds contain everything.
    #[must_use]
    pub fn contains(&self, enc: &[u8]) -> bool {
        self.0.is_empty() || self.0.iter().any(|b| b.contains(enc))
    }

    /// Same ranges, ordered for a backward scan. Start and end swap roles: the
    /// scan enters each range at its end.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut out: Vec<Bound> = self.0.clone();
        out.reverse();
        Self(out)
    }
}

impl IntoIterator for Bounds {
    type Item = Bound;
    type IntoIter = std::vec::IntoIter<Bound>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Bounds {
    type Item = &'a Bound;
    type IntoIter = std::slice::Iter<'a, Bound>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Bound> for Bounds {
    fn from_iter<I: IntoIterator<Item = Bound>>(iter: I) -> Self {
        let mut bs = Self::new();
        for b in iter {
            bs.append(b);
        }
        bs
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        f.write_str("Bounds{")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{b}")?;
        }
        f.write_str("}")
    }
}
