//! Namespaced byte keys for document rows and index entries.

use std::fmt;

use crate::encoding::{self, EOS, Value};
use crate::errors::DbError;

/// A key-space prefix: the namespace name followed by a terminator, so that
/// no namespace is a byte prefix of another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: String,
    prefix: Vec<u8>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut prefix = Vec::with_capacity(name.len() + 1);
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(EOS);
        Self { name, prefix }
    }

    /// Primary rows of a collection, keyed by encoded document id.
    #[must_use]
    pub fn data(collection: &str) -> Self {
        Self::new(format!("/{collection}/data"))
    }

    #[must_use]
    pub fn index(collection: &str, index: &str) -> Self {
        Self::new(format!("/{collection}/index/{index}"))
    }

    #[must_use]
    pub fn stats(collection: &str, index: &str) -> Self {
        Self::new(format!("/{collection}/stats/{index}"))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Starts a key inside this namespace.
    #[must_use]
    pub fn key(&self) -> Key {
        Key(self.prefix.clone())
    }
}

/// Append-only key builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn with_value(mut self, v: &Value) -> Self {
        self.push_value(v);
        self
    }

    pub fn push_value(&mut self, v: &Value) {
        encoding::encode_into(v, &mut self.0);
    }

    /// Appends an already encoded segment.
    pub fn push_encoded(&mut self, segment: &[u8]) {
        self.0.extend_from_slice(segment);
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Returns the last encoded segment of `key` after `prefix_len` bytes, which
/// for both data rows and index entries is the document id.
///
/// # Errors
/// Returns `DbError::Decode` if the tail is not a sequence of encoded values.
pub fn trailing_segment(key: &[u8], prefix_len: usize) -> Result<&[u8], DbError> {
    let tail = key
        .get(prefix_len..)
        .ok_or_else(|| DbError::decode("key shorter than its namespace"))?;
    let mut last = None;
    for seg in encoding::segments(tail) {
        last = Some(seg?);
    }
    last.ok_or_else(|| DbError::decode("key has no value segments"))
}

/// Writes an encoded value the way bounds and keys display it: strings bare,
/// everything else as JSON. Bytes that do not decode are shown lossily.
pub(crate) fn fmt_segment(f: &mut fmt::Formatter<'_>, seg: &[u8]) -> fmt::Result {
    match encoding::decode_exact(seg) {
        Ok(Value::String(s)) => f.write_str(&s),
        Ok(v) => write!(f, "{v}"),
        Err(_) => write!(f, "{}", String::from_utf8_lossy(seg)),
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0.as_slice();
        if rest.first() == Some(&b'/')
            && let Some(end) = rest.iter().position(|&b| b == EOS)
        {
            f.write_str(&String::from_utf8_lossy(&rest[..end]))?;
            rest = &rest[end + 1..];
        }
        for (i, seg) in encoding::segments(rest).enumerate() {
            if i > 0 || rest.len() != self.0.len() {
                f.write_str("/")?;
            }
            match seg {
                Ok(seg) => fmt_segment(f, seg)?,
                Err(_) => return f.write_str("<?>"),
            }
        }
        Ok(())
    }
}
