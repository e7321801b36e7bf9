use std::cmp::Ordering;
use std::fmt;

use bson::{Bson, Document};

/// Type tags as they appear in the first byte of an encoded value.
///
/// The numeric order of the tags is the order in which values of different
/// types sort against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ValueType {
    Null = 1,
    Number = 2,
    String = 3,
    False = 4,
    True = 5,
    Array = 6,
    Object = 7,
    Binary = 8,
}

impl ValueType {
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Null,
            2 => Self::Number,
            3 => Self::String,
            4 => Self::False,
            5 => Self::True,
            6 => Self::Array,
            7 => Self::Object,
            8 => Self::Binary,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number => "number",
            Self::String => "string",
            Self::False => "false",
            Self::True => "true",
            Self::Array => "array",
            Self::Object => "object",
            Self::Binary => "binary",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Self::Null,
            "number" => Self::Number,
            "string" => Self::String,
            "false" => Self::False,
            "true" => Self::True,
            "array" => Self::Array,
            "object" => Self::Object,
            "binary" => Self::Binary,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A document value.
///
/// Equality and ordering are structural and agree with the byte order of the
/// encoded form: values of different types compare by type tag, numbers use
/// `f64::total_cmp`, strings and binaries compare bytewise, arrays and objects
/// compare element by element with the shorter sequence first.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Object(Object),
}

/// Insertion-ordered map with unique keys. Inserting an existing key replaces
/// the value in place.
#[derive(Debug, Clone, Default)]
pub struct Object {
    entries: Vec<(String, Value)>,
}

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut obj = Self::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

impl Value {
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Bool(false) => ValueType::False,
            Self::Bool(true) => ValueType::True,
            Self::Number(_) => ValueType::Number,
            Self::String(_) => ValueType::String,
            Self::Binary(_) => ValueType::Binary,
            Self::Array(_) => ValueType::Array,
            Self::Object(_) => ValueType::Object,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Looks up a field of an object value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Resolves a path of object keys; numeric segments index into arrays.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut cur = self;
        for seg in path {
            let seg = seg.as_ref();
            cur = match cur {
                Self::Object(o) => o.get(seg)?,
                Self::Array(a) => a.get(seg.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::Binary(a), Self::Binary(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y) {
                        Ordering::Equal => {}
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Object(a), Self::Object(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    match ka.as_bytes().cmp(kb.as_bytes()).then_with(|| va.compare(vb)) {
                        Ordering::Equal => {}
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.value_type().cmp(&other.value_type()),
        }
    }

    /// Converts into a JSON value. Binary payloads become arrays of bytes and
    /// non-finite numbers become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Null => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => J::String(s.clone()),
            Self::Binary(b) => J::Array(b.iter().map(|x| J::from(*x)).collect()),
            Self::Array(a) => J::Array(a.iter().map(Self::to_json).collect()),
            Self::Object(o) => J::Object(o.iter().map(|(k, v)| (k.to_owned(), v.to_json())).collect()),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() < MAX_SAFE {
        #[allow(clippy::cast_possible_truncation)]
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(b),
            J::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Self::String(s),
            J::Array(a) => Self::Array(a.into_iter().map(Self::from).collect()),
            J::Object(o) => Self::Object(o.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<&Bson> for Value {
    fn from(b: &Bson) -> Self {
        match b {
            Bson::Null | Bson::Undefined => Self::Null,
            Bson::Boolean(v) => Self::Bool(*v),
            Bson::Double(v) => Self::Number(*v),
            Bson::Int32(v) => Self::Number(f64::from(*v)),
            #[allow(clippy::cast_precision_loss)]
            Bson::Int64(v) => Self::Number(*v as f64),
            #[allow(clippy::cast_precision_loss)]
            Bson::DateTime(dt) => Self::Number(dt.timestamp_millis() as f64),
            Bson::String(s) => Self::String(s.clone()),
            Bson::ObjectId(oid) => Self::String(oid.to_hex()),
            Bson::Binary(bin) => Self::Binary(bin.bytes.clone()),
            Bson::Array(a) => Self::Array(a.iter().map(Self::from).collect()),
            Bson::Document(d) => Self::from(d),
            other => Self::String(other.to_string()),
        }
    }
}

impl From<&Document> for Value {
    fn from(d: &Document) -> Self {
        Self::Object(d.iter().map(|(k, v)| (k.clone(), Self::from(v))).collect())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_insert_is_last_write_wins() {
        let mut o = Object::new();
        o.insert("a", Value::from(1.0));
        o.insert("b", Value::from(2.0));
        o.insert("a", Value::from(3.0));
        let keys: Vec<&str> = o.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(o.get("a"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn get_path_walks_objects_and_arrays() {
        let v = Value::from(json!({"a": {"b": [10, {"c": "x"}]}}));
        assert_eq!(v.get_path(&["a", "b", "0"]), Some(&Value::Number(10.0)));
        assert_eq!(v.get_path(&["a", "b", "1", "c"]), Some(&Value::from("x")));
        assert!(v.get_path(&["a", "z"]).is_none());
        assert!(v.get_path(&["a", "b", "x"]).is_none());
    }

    #[test]
    fn mixed_types_order_by_tag() {
        let ordered = [
            Value::Null,
            Value::Number(100.0),
            Value::from("a"),
            Value::Bool(false),
            Value::Bool(true),
            Value::Array(vec![]),
            Value::Object(Object::new()),
            Value::Binary(vec![]),
        ];
        for w in ordered.windows(2) {
            assert!(w[0] < w[1], "{:?} < {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn bson_documents_convert() {
        let d = bson::doc! {"id": 7_i32, "tags": ["x", "y"], "ok": true};
        let v = Value::from(&d);
        assert_eq!(v.get("id"), Some(&Value::Number(7.0)));
        assert_eq!(v.get_path(&["tags", "1"]), Some(&Value::from("y")));
        assert_eq!(v.get("ok"), Some(&Value::Bool(true)));
    }

    #[test]
    fn display_renders_integers_without_fraction() {
        let v = Value::from(json!({"a": 1, "b": 1.5}));
        assert_eq!(v.to_string(), r#"{"a":1,"b":1.5}"#);
    }
}
