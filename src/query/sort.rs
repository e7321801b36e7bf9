use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding::{self, Value};
use crate::errors::DbError;

pub(crate) const MAX_SORT_FIELDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub path: Vec<String>,
    pub order: Order,
}

impl SortField {
    #[must_use]
    pub fn reverse(&self) -> bool {
        self.order == Order::Desc
    }
}

/// An ordered list of sort fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    fields: Vec<SortField>,
}

impl Sort {
    /// Parses field names; a leading `-` sorts that field descending.
    ///
    /// # Errors
    /// Returns `DbError::SortParse` for empty field names or too many fields.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, DbError> {
        let specs = specs
            .iter()
            .map(|s| {
                let s = s.as_ref();
                match s.strip_prefix('-') {
                    Some(field) => SortSpec { field: field.to_owned(), order: Order::Desc },
                    None => SortSpec { field: s.to_owned(), order: Order::Asc },
                }
            })
            .collect();
        Self::from_specs(specs)
    }

    /// # Errors
    /// Returns `DbError::SortParse` for empty field names or too many fields.
    pub fn from_specs(specs: Vec<SortSpec>) -> Result<Self, DbError> {
        if specs.len() > MAX_SORT_FIELDS {
            return Err(DbError::SortParse(format!(
                "at most {MAX_SORT_FIELDS} sort fields are supported"
            )));
        }
        let mut fields = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.field.is_empty() || spec.field.split('.').any(str::is_empty) {
                return Err(DbError::SortParse(format!("invalid sort field: {:?}", spec.field)));
            }
            let path = spec.field.split('.').map(str::to_owned).collect();
            fields.push(SortField { field: spec.field, path, order: spec.order });
        }
        Ok(Self { fields })
    }

    #[must_use]
    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Appends a byte key that orders documents by this sort. Missing fields
    /// sort as null; descending fields are byte-inverted.
    pub fn append_key(&self, buf: &mut Vec<u8>, doc: &Value) {
        for f in &self.fields {
            let v = doc.get_path(f.path.as_slice()).unwrap_or(&Value::Null);
            if f.reverse() {
                encoding::encode_inverted_into(v, buf);
            } else {
                encoding::encode_into(v, buf);
            }
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if field.reverse() {
                f.write_str("-")?;
            }
            f.write_str(&field.field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_directions_and_paths() {
        let s = Sort::parse(&["a", "-b.c"]).unwrap();
        assert_eq!(s.fields().len(), 2);
        assert!(!s.fields()[0].reverse());
        assert!(s.fields()[1].reverse());
        assert_eq!(s.fields()[1].path, vec!["b", "c"]);
        assert_eq!(s.to_string(), "a,-b.c");
    }

    #[test]
    fn parse_rejects_bad_fields() {
        assert!(Sort::parse(&[""]).is_err());
        assert!(Sort::parse(&["-"]).is_err());
        assert!(Sort::parse(&["a..b"]).is_err());
        let many: Vec<String> = (0..9).map(|i| format!("f{i}")).collect();
        assert!(matches!(Sort::parse(many.as_slice()), Err(DbError::SortParse(_))));
    }

    #[test]
    fn keys_order_documents() {
        let s = Sort::parse(&["a", "-b"]).unwrap();
        let key = |j: serde_json::Value| {
            let mut buf = Vec::new();
            s.append_key(&mut buf, &Value::from(j));
            buf
        };
        assert!(key(json!({"a": 1, "b": 9})) < key(json!({"a": 2, "b": 0})));
        assert!(key(json!({"a": 1, "b": 9})) < key(json!({"a": 1, "b": 3})));
        assert!(key(json!({"b": 1})) < key(json!({"a": 0})));
    }
}
