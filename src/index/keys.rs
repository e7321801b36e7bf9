use std::collections::HashSet;

use crate::encoding::{self, Value};

/// Encoded value tuples a document contributes to an index on `fields`.
///
/// Each field contributes its value, or one branch per distinct element when
/// it holds a non-empty array; several array fields fan out as a cartesian
/// product. Missing fields encode as null, except on sparse indexes where a
/// missing or null field yields no tuples at all.
#[must_use]
pub fn generate_keys<P: AsRef<[String]>>(doc: &Value, fields: &[P], sparse: bool) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    if !expand(doc, fields, sparse, Vec::new(), &mut out) {
        out.clear();
    }
    out
}

/// Whether any indexed field of `doc` holds a non-empty array.
#[must_use]
pub fn fans_out<P: AsRef<[String]>>(doc: &Value, fields: &[P]) -> bool {
    fields.iter().any(|path| {
        doc.get_path(path.as_ref()).and_then(Value::as_array).is_some_and(|a| !a.is_empty())
    })
}

fn expand<P: AsRef<[String]>>(
    doc: &Value,
    fields: &[P],
    sparse: bool,
    prefix: Vec<u8>,
    out: &mut Vec<Vec<u8>>,
) -> bool {
    let Some((path, rest)) = fields.split_first() else {
        out.push(prefix);
        return true;
    };
    let value = doc.get_path(path.as_ref());
    match value {
        None | Some(Value::Null) if sparse => false,
        Some(Value::Array(items)) if !items.is_empty() => {
            let mut seen = HashSet::with_capacity(items.len());
            for item in items {
                let enc = encoding::encode(item);
                if !seen.insert(enc.clone()) {
                    continue;
                }
                let mut branch = prefix.clone();
                branch.extend_from_slice(&enc);
                if !expand(doc, rest, sparse, branch, out) {
                    return false;
                }
            }
            true
        }
        _ => {
            let mut branch = prefix;
            encoding::encode_into(value.unwrap_or(&Value::Null), &mut branch);
            expand(doc, rest, sparse, branch, out)
        }
    }
}
