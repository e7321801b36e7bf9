use std::fmt;

use crate::encoding::{self, Value, ValueType};

use super::bounds::{Bound, Bounds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

/// A comparison against an encoded literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    op: CmpOp,
    literal: Vec<u8>,
    not_array: bool,
}

impl Comparison {
    #[must_use]
    pub fn new(op: CmpOp, value: &Value) -> Self {
        Self {
            op,
            literal: encoding::encode(value),
            not_array: !matches!(value, Value::Array(_)),
        }
    }

    #[must_use]
    pub const fn op(&self) -> CmpOp {
        self.op
    }

    #[must_use]
    pub fn literal(&self) -> &[u8] {
        &self.literal
    }

    fn test(&self, enc: &[u8]) -> bool {
        let ord = self.literal.as_slice().cmp(enc);
        match self.op {
            CmpOp::Eq => ord.is_eq(),
            CmpOp::Ne => ord.is_ne(),
            CmpOp::Gt => ord.is_lt(),
            CmpOp::Gte => ord.is_le(),
            CmpOp::Lt => ord.is_gt(),
            CmpOp::Lte => ord.is_ge(),
        }
    }

    fn test_value(&self, v: &Value, buf: &mut Vec<u8>) -> bool {
        buf.clear();
        encoding::encode_into(v, buf);
        self.test(buf)
    }

    fn ok(&self, v: Option<&Value>, buf: &mut Vec<u8>) -> bool {
        let Some(v) = v else {
            return self.op == CmpOp::Ne;
        };
        let Value::Array(items) = v else {
            return self.test_value(v, buf);
        };
        if self.op == CmpOp::Ne {
            if !self.not_array && !self.test_value(v, buf) {
                return false;
            }
            items.iter().all(|item| self.test_value(item, buf))
        } else {
            if !self.not_array && self.test_value(v, buf) {
                return true;
            }
            items.iter().any(|item| self.test_value(item, buf))
        }
    }

    fn bounds(&self, multikey: bool) -> Option<Bounds> {
        // index entries of a multikey field hold elements, never the whole array
        if multikey && !self.not_array {
            return None;
        }
        let v = self.literal.clone();
        Some(match self.op {
            CmpOp::Eq => Bounds::single(Bound::point(v)),
            CmpOp::Gt => Bounds::single(Bound::above(v, false)),
            CmpOp::Gte => Bounds::single(Bound::above(v, true)),
            CmpOp::Lt => Bounds::single(Bound::below(v, false)),
            CmpOp::Lte => Bounds::single(Bound::below(v, true)),
            CmpOp::Ne => {
                let mut bs = Bounds::single(Bound::below(v.clone(), false));
                bs.append(Bound::above(v, false));
                bs
            }
        })
    }
}

/// A query predicate.
///
/// Field-less variants (`Comp`, `Exists`, `TypeIs`, `Size`, `Regex`) test the
/// value they are given; `Key` scopes its child to a document path.
#[derive(Debug, Clone)]
pub enum Filter {
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Key { path: Vec<String>, filter: Box<Filter> },
    Comp(Comparison),
    Exists,
    TypeIs(ValueType),
    Size(i64),
    #[cfg(feature = "regex")]
    Regex(regex::Regex),
}

impl Filter {
    pub fn key(path: &str, filter: Self) -> Self {
        Self::Key { path: path.split('.').map(str::to_owned).collect(), filter: Box::new(filter) }
    }

    #[must_use]
    pub fn comp(op: CmpOp, value: &Value) -> Self {
        Self::Comp(Comparison::new(op, value))
    }

    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn ok(&self, doc: &Value) -> bool {
        let mut buf = Vec::new();
        self.ok_with(Some(doc), &mut buf)
    }

    /// Evaluates against an optional value, reusing `buf` as encode scratch.
    pub fn ok_with(&self, v: Option<&Value>, buf: &mut Vec<u8>) -> bool {
        match self {
            Self::All => true,
            Self::And(fs) => fs.iter().all(|f| f.ok_with(v, buf)),
            Self::Or(fs) => fs.iter().any(|f| f.ok_with(v, buf)),
            Self::Nor(fs) => !fs.iter().any(|f| f.ok_with(v, buf)),
            Self::Not(f) => !f.ok_with(v, buf),
            Self::Key { path, filter } => {
                filter.ok_with(v.and_then(|v| v.get_path(path.as_slice())), buf)
            }
            Self::Comp(c) => c.ok(v, buf),
            Self::Exists => v.is_some(),
            Self::TypeIs(t) => v.is_some_and(|v| v.value_type() == *t),
            Self::Size(n) => v
                .and_then(Value::as_array)
                .is_some_and(|a| i64::try_from(a.len()).is_ok_and(|len| len == *n)),
            #[cfg(feature = "regex")]
            Self::Regex(re) => match v {
                Some(Value::String(s)) => re.is_match(s),
                Some(Value::Array(items)) => {
                    items.iter().any(|item| item.as_str().is_some_and(|s| re.is_match(s)))
                }
                _ => false,
            },
        }
    }

    /// Byte ranges on `field` that cover every matching document, or `None`
    /// when the filter does not constrain the field in a usable way.
    ///
    /// Sub-bounds of an `And` are unioned. The result is a superset of the
    /// matching values; the residual filter narrows it at fetch time.
    #[must_use]
    pub fn index_bounds(&self, field: &str) -> Option<Bounds> {
        self.bounds_in(Some(field), true)
    }

    /// Like [`Filter::index_bounds`], for an index whose entries are known to
    /// hold no array elements. `And` then intersects single-range sub-bounds.
    #[must_use]
    pub fn index_bounds_for(&self, field: &str, multikey: bool) -> Option<Bounds> {
        self.bounds_in(Some(field), multikey)
    }

    /// `field` is `Some` outside any path scope and `None` once a `Key` has
    /// matched the requested field.
    fn bounds_in(&self, field: Option<&str>, multikey: bool) -> Option<Bounds> {
        match self {
            Self::All | Self::Exists | Self::Not(_) | Self::Size(_) => None,
            Self::Key { path, filter } => match field {
                Some(name) if path_eq(path, name) => filter.bounds_in(None, multikey),
                _ => None,
            },
            Self::And(fs) => {
                let mut acc: Option<Bounds> = None;
                for f in fs {
                    if let Some(b) = f.bounds_in(field, multikey) {
                        acc = Some(match acc {
                            None => b,
                            Some(a) => and_bounds(a, b, multikey),
                        });
                    }
                }
                acc
            }
            Self::Or(fs) => {
                if fs.is_empty() {
                    return None;
                }
                let mut acc = Bounds::new();
                for f in fs {
                    let b = f.bounds_in(field, multikey)?;
                    if b.is_empty() {
                        return Some(Bounds::new());
                    }
                    acc.extend(b);
                }
                Some(acc)
            }
            Self::Nor(fs) => {
                for f in fs {
                    f.bounds_in(field, multikey)?;
                }
                Some(Bounds::new())
            }
            Self::Comp(c) => match field {
                None => c.bounds(multikey),
                Some(_) => None,
            },
            Self::TypeIs(t) => match (field, t) {
                (Some(_), _) | (None, ValueType::Array) => None,
                (None, t) => Some(Bounds::single(Bound {
                    start: vec![t.tag()],
                    end: vec![t.tag(), 0xff],
                    start_include: true,
                    end_include: true,
                })),
            },
            #[cfg(feature = "regex")]
            Self::Regex(re) => match field {
                None => regex_prefix_bounds(re.as_str()),
                Some(_) => None,
            },
        }
    }
}

fn path_eq(path: &[String], field: &str) -> bool {
    let mut parts = field.split('.');
    path.iter().all(|p| parts.next() == Some(p.as_str())) && parts.next().is_none()
}

fn and_bounds(a: Bounds, b: Bounds, multikey: bool) -> Bounds {
    if !multikey {
        if a.is_empty() {
            return b;
        }
        if b.is_empty() {
            return a;
        }
        if let ([x], [y]) = (a.as_slice(), b.as_slice()) {
            return Bounds::single(x.intersect(y));
        }
    }
    if a.is_empty() || b.is_empty() {
        return Bounds::new();
    }
    let mut out = a;
    out.extend(b);
    out
}

#[cfg(feature = "regex")]
fn regex_prefix_bounds(pattern: &str) -> Option<Bounds> {
    let prefix = literal_prefix(pattern)?;
    let mut start = encoding::encode(&Value::String(prefix));
    // drop the terminator so longer strings with this prefix sort inside
    start.pop();
    let mut end = start.clone();
    end.push(0xff);
    Some(Bounds::single(Bound { start, end, start_include: true, end_include: true }))
}

/// Literal text at the start of an anchored pattern, stopping at the first
/// metacharacter. A quantifier applies to the previous character, so that
/// character is dropped too.
#[cfg(feature = "regex")]
pub(crate) fn literal_prefix(pattern: &str) -> Option<String> {
    const SPECIAL: &str = "^$|*+?(){}[]\\.";
    let rest = pattern.strip_prefix('^')?;
    if rest.starts_with("(?i)") {
        return None;
    }
    if rest.contains('|') {
        return None;
    }
    let mut out = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        let lit = if c == '\\' {
            match chars.next() {
                Some(e) if SPECIAL.contains(e) => e,
                _ => break,
            }
        } else if SPECIAL.contains(c) {
            break;
        } else {
            c
        };
        // an optional or repeated character is not part of the fixed prefix
        if matches!(chars.peek(), Some('*' | '?' | '{')) {
            break;
        }
        out.push(lit);
    }
    if out.is_empty() { None } else { Some(out) }
}

fn fmt_literal(f: &mut fmt::Formatter<'_>, enc: &[u8]) -> fmt::Result {
    match encoding::decode_exact(enc) {
        Ok(v) => write!(f, "{v}"),
        Err(_) => f.write_str("?"),
    }
}

fn fmt_list(f: &mut fmt::Formatter<'_>, op: &str, fs: &[Filter]) -> fmt::Result {
    write!(f, r#"{{"{op}":["#)?;
    for (i, sub) in fs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{sub}")?;
    }
    f.write_str("]}")
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("{}"),
            Self::And(fs) => fmt_list(f, "$and", fs),
            Self::Or(fs) => fmt_list(f, "$or", fs),
            Self::Nor(fs) => fmt_list(f, "$nor", fs),
            Self::Not(inner) => write!(f, r#"{{"$not": {inner}}}"#),
            Self::Key { path, filter } => write!(f, r#"{{"{}": {filter}}}"#, path.join(".")),
            Self::Comp(c) => {
                write!(f, r#"{{"{}": "#, c.op.as_str())?;
                fmt_literal(f, &c.literal)?;
                f.write_str("}")
            }
            Self::Exists => f.write_str(r#"{"$exists": true}"#),
            Self::TypeIs(t) => write!(f, r#"{{"$type": "{t}"}}"#),
            Self::Size(n) => write!(f, r#"{{"$size": {n}}}"#),
            #[cfg(feature = "regex")]
            Self::Regex(re) => write!(f, r#"{{"$regex": "{}"}}"#, re.as_str()),
        }
    }
}
