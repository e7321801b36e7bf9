use std::fmt;

use crate::encoding::{Object, Value};
use crate::errors::DbError;
use crate::planner::ID_FIELD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    /// Keep only the named fields, plus the id.
    Include,
    /// Keep everything except the named fields.
    Exclude,
}

/// Shapes result documents by keeping or dropping dotted field paths.
///
/// Paths walk nested objects only; an array on the way stops the walk, and
/// an array at the end of a path is kept or dropped whole. Non-object
/// documents pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    mode: ProjectionMode,
    fields: Vec<String>,
    paths: Vec<Vec<String>>,
}

impl Projection {
    /// # Errors
    /// Returns `DbError::ProjectionParse` for an empty list or field path segment.
    pub fn include<S: AsRef<str>>(fields: &[S]) -> Result<Self, DbError> {
        Self::new(ProjectionMode::Include, fields)
    }

    /// # Errors
    /// Returns `DbError::ProjectionParse` for an empty list or field path
    /// segment, or an attempt to drop the id.
    pub fn exclude<S: AsRef<str>>(fields: &[S]) -> Result<Self, DbError> {
        let p = Self::new(ProjectionMode::Exclude, fields)?;
        if p.fields.iter().any(|f| f == ID_FIELD) {
            return Err(DbError::ProjectionParse(format!("cannot exclude {ID_FIELD}")));
        }
        Ok(p)
    }

    fn new<S: AsRef<str>>(mode: ProjectionMode, fields: &[S]) -> Result<Self, DbError> {
        if fields.is_empty() {
            return Err(DbError::ProjectionParse("no fields given".into()));
        }
        let mut out = Self { mode, fields: Vec::new(), paths: Vec::new() };
        for f in fields {
            let f = f.as_ref();
            if f.is_empty() || f.split('.').any(str::is_empty) {
                return Err(DbError::ProjectionParse(format!("invalid field name: {f:?}")));
            }
            if out.fields.iter().any(|seen| seen == f) {
                continue;
            }
            out.paths.push(f.split('.').map(str::to_owned).collect());
            out.fields.push(f.to_owned());
        }
        Ok(out)
    }

    #[must_use]
    pub const fn mode(&self) -> ProjectionMode {
        self.mode
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn apply(&self, doc: &Value) -> Value {
        let Value::Object(src) = doc else {
            return doc.clone();
        };
        match self.mode {
            ProjectionMode::Include => {
                let mut out = Object::new();
                if let Some(id) = src.get(ID_FIELD) {
                    out.insert(ID_FIELD, id.clone());
                }
                for path in &self.paths {
                    if let Some(v) = lookup(src, path) {
                        insert_path(&mut out, path, v.clone());
                    }
                }
                Value::Object(out)
            }
            ProjectionMode::Exclude => {
                let mut out = src.clone();
                for path in &self.paths {
                    remove_path(&mut out, path);
                }
                Value::Object(out)
            }
        }
    }
}

fn lookup<'v>(obj: &'v Object, path: &[String]) -> Option<&'v Value> {
    let (last, parents) = path.split_last()?;
    let mut cur = obj;
    for seg in parents {
        cur = cur.get(seg)?.as_object()?;
    }
    cur.get(last)
}

fn insert_path(obj: &mut Object, path: &[String], value: Value) {
    match path {
        [] => {}
        [last] => obj.insert(last.as_str(), value),
        [head, rest @ ..] => {
            if !matches!(obj.get(head), Some(Value::Object(_))) {
                obj.insert(head.as_str(), Value::Object(Object::new()));
            }
            if let Some(Value::Object(child)) = obj.get_mut(head) {
                insert_path(child, rest, value);
            }
        }
    }
}

fn remove_path(obj: &mut Object, path: &[String]) {
    match path {
        [] => {}
        [last] => {
            obj.remove(last);
        }
        [head, rest @ ..] => {
            if let Some(Value::Object(child)) = obj.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.mode {
            ProjectionMode::Include => "fields",
            ProjectionMode::Exclude => "exclude",
        };
        write!(f, "{label}={}", self.fields.join(","))
    }
}
