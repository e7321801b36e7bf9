use crate::encoding::{Object, Value, ValueType};
use crate::errors::DbError;

use super::filter::{CmpOp, Filter};

/// Parses a Mongo-style filter document. `null` and `{}` match everything.
///
/// # Errors
/// Returns `DbError::FilterParse` for unknown operators, operand type
/// mismatches, or mixed operator/value objects.
pub fn parse_filter(spec: &Value) -> Result<Filter, DbError> {
    match spec {
        Value::Null => Ok(Filter::All),
        Value::Object(obj) => parse_and(obj),
        _ => Err(DbError::filter("query filter must be an object")),
    }
}

/// Parses a filter from JSON text.
///
/// # Errors
/// Returns `DbError::Json` for invalid JSON, otherwise as [`parse_filter`].
pub fn parse_filter_json(s: &str) -> Result<Filter, DbError> {
    let j: serde_json::Value = serde_json::from_str(s)?;
    parse_filter(&Value::from(j))
}

impl TryFrom<serde_json::Value> for Filter {
    type Error = DbError;

    fn try_from(j: serde_json::Value) -> Result<Self, Self::Error> {
        parse_filter(&Value::from(j))
    }
}

impl TryFrom<&Value> for Filter {
    type Error = DbError;

    fn try_from(v: &Value) -> Result<Self, Self::Error> {
        parse_filter(v)
    }
}

fn collapse(mut fs: Vec<Filter>, wrap: fn(Vec<Filter>) -> Filter) -> Filter {
    match fs.len() {
        0 => Filter::All,
        1 => fs.remove(0),
        _ => wrap(fs),
    }
}

fn parse_and(obj: &Object) -> Result<Filter, DbError> {
    let mut fs = Vec::with_capacity(obj.len());
    for (key, v) in obj.iter() {
        let f = match key {
            "$and" => Filter::And(parse_list(key, v)?),
            "$or" => Filter::Or(parse_list(key, v)?),
            "$nor" => Filter::Nor(parse_list(key, v)?),
            op if op.starts_with('$') => {
                return Err(DbError::filter(format!("unknown top level operator: {op}")));
            }
            path => Filter::key(path, parse_condition(v)?),
        };
        fs.push(f);
    }
    Ok(collapse(fs, Filter::And))
}

fn parse_list(op: &str, v: &Value) -> Result<Vec<Filter>, DbError> {
    let items = v
        .as_array()
        .ok_or_else(|| DbError::filter(format!("{op} must be an array")))?;
    if items.is_empty() {
        return Err(DbError::filter(format!("{op} must be a non-empty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Value::Object(obj) => parse_and(obj),
            _ => Err(DbError::filter(format!("{op} entries must be objects"))),
        })
        .collect()
}

/// The value of a field entry: either an operator object or a literal to
/// compare for equality.
fn parse_condition(v: &Value) -> Result<Filter, DbError> {
    match v {
        Value::Object(obj) if obj.iter().any(|(k, _)| k.starts_with('$')) => {
            if obj.iter().any(|(k, _)| !k.starts_with('$')) {
                return Err(DbError::filter("mixed operators and values"));
            }
            parse_operators(obj)
        }
        _ => Ok(Filter::comp(CmpOp::Eq, v)),
    }
}

fn parse_operators(obj: &Object) -> Result<Filter, DbError> {
    let options = match obj.get("$options") {
        None => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => return Err(DbError::filter("$options must be a string")),
    };
    if options.is_some() && obj.get("$regex").is_none() {
        return Err(DbError::filter("$options without $regex"));
    }
    let mut fs = Vec::with_capacity(obj.len());
    for (op, arg) in obj.iter() {
        let f = match op {
            "$eq" => Filter::comp(CmpOp::Eq, arg),
            "$ne" => Filter::comp(CmpOp::Ne, arg),
            "$gt" => Filter::comp(CmpOp::Gt, arg),
            "$gte" => Filter::comp(CmpOp::Gte, arg),
            "$lt" => Filter::comp(CmpOp::Lt, arg),
            "$lte" => Filter::comp(CmpOp::Lte, arg),
            "$in" => Filter::Or(eq_list(op, arg)?),
            "$nin" => Filter::Nor(eq_list(op, arg)?),
            "$all" => Filter::And(eq_list(op, arg)?),
            "$not" => parse_not(arg)?,
            "$exists" => parse_exists(arg),
            "$type" => parse_type(arg)?,
            "$size" => parse_size(arg)?,
            "$regex" => parse_regex(arg, options)?,
            "$options" => continue,
            other => return Err(DbError::filter(format!("unknown operator: {other}"))),
        };
        fs.push(f);
    }
    Ok(collapse(fs, Filter::And))
}

fn eq_list(op: &str, arg: &Value) -> Result<Vec<Filter>, DbError> {
    let items = arg
        .as_array()
        .ok_or_else(|| DbError::filter(format!("expected array for {op} operator")))?;
    Ok(items.iter().map(|item| Filter::comp(CmpOp::Eq, item)).collect())
}

fn parse_not(arg: &Value) -> Result<Filter, DbError> {
    match arg {
        Value::Object(obj) if !obj.is_empty() && obj.iter().all(|(k, _)| k.starts_with('$')) => {
            Ok(Filter::Not(Box::new(parse_operators(obj)?)))
        }
        Value::Object(_) => Err(DbError::filter("no operators found for $not")),
        _ => Err(DbError::filter("$not expects an operator object")),
    }
}

fn parse_exists(arg: &Value) -> Filter {
    let exists = match arg {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => *n != 0.0,
        _ => true,
    };
    if exists { Filter::Exists } else { Filter::Not(Box::new(Filter::Exists)) }
}

fn parse_type(arg: &Value) -> Result<Filter, DbError> {
    match arg {
        Value::String(name) if name == "bool" => Ok(Filter::Or(vec![
            Filter::TypeIs(ValueType::False),
            Filter::TypeIs(ValueType::True),
        ])),
        Value::String(name) => ValueType::from_name(name)
            .map(Filter::TypeIs)
            .ok_or_else(|| DbError::filter(format!("unknown type name: {name}"))),
        Value::Number(n) if n.fract() == 0.0 && (1.0..=255.0).contains(n) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let tag = *n as u8;
            ValueType::from_tag(tag)
                .map(Filter::TypeIs)
                .ok_or_else(|| DbError::filter(format!("unknown type code: {tag}")))
        }
        _ => Err(DbError::filter("$type expects a type name or code")),
    }
}

fn parse_size(arg: &Value) -> Result<Filter, DbError> {
    match arg {
        Value::Number(n) if n.fract() == 0.0 && (0.0..=1e15).contains(n) => {
            #[allow(clippy::cast_possible_truncation)]
            let size = *n as i64;
            Ok(Filter::Size(size))
        }
        _ => Err(DbError::filter("$size expects a non-negative integer")),
    }
}

#[cfg(feature = "regex")]
fn parse_regex(arg: &Value, options: Option<&str>) -> Result<Filter, DbError> {
    let Value::String(pattern) = arg else {
        return Err(DbError::filter("$regex expects a string"));
    };
    let pattern = match options {
        Some(flags) if !flags.is_empty() => {
            if let Some(bad) = flags.chars().find(|c| !matches!(c, 'i' | 'm' | 's' | 'x')) {
                return Err(DbError::filter(format!("unsupported regex option: {bad}")));
            }
            format!("(?{flags}){pattern}")
        }
        _ => pattern.clone(),
    };
    regex::Regex::new(&pattern)
        .map(Filter::Regex)
        .map_err(|e| DbError::filter(format!("invalid regex: {e}")))
}

#[cfg(not(feature = "regex"))]
fn parse_regex(_arg: &Value, _options: Option<&str>) -> Result<Filter, DbError> {
    Err(DbError::FeatureNotEnabled("regex".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(j: serde_json::Value) -> Result<Filter, DbError> {
        Filter::try_from(j)
    }

    fn doc(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn empty_and_null_match_everything() {
        assert!(parse(json!({})).unwrap().is_all());
        assert!(parse(json!(null)).unwrap().is_all());
        assert!(parse(json!([1])).is_err());
    }

    #[test]
    fn implicit_and_of_fields() {
        let f = parse(json!({"a": 1, "b": {"$gt": 2}})).unwrap();
        assert!(f.ok(&doc(json!({"a": 1, "b": 3}))));
        assert!(!f.ok(&doc(json!({"a": 1, "b": 2}))));
    }

    #[test]
    fn object_literal_is_equality() {
        let f = parse(json!({"a": {"x": 1}})).unwrap();
        assert!(f.ok(&doc(json!({"a": {"x": 1}}))));
        assert!(!f.ok(&doc(json!({"a": {"x": 2}}))));
    }

    #[test]
    fn in_nin_all() {
        let f = parse(json!({"a": {"$in": [1, 3]}})).unwrap();
        assert!(f.ok(&doc(json!({"a": 3}))));
        assert!(!f.ok(&doc(json!({"a": 2}))));
        let f = parse(json!({"a": {"$nin": [1, 3]}})).unwrap();
        assert!(f.ok(&doc(json!({"a": 2}))));
        assert!(f.ok(&doc(json!({}))));
        let f = parse(json!({"t": {"$all": ["x", "y"]}})).unwrap();
        assert!(f.ok(&doc(json!({"t": ["y", "z", "x"]}))));
        assert!(!f.ok(&doc(json!({"t": ["y"]}))));
    }

    #[test]
    fn logical_operators() {
        let f = parse(json!({"$or": [{"a": 1}, {"b": 1}]})).unwrap();
        assert!(f.ok(&doc(json!({"b": 1}))));
        let f = parse(json!({"$nor": [{"a": 1}, {"b": 1}]})).unwrap();
        assert!(f.ok(&doc(json!({"a": 2}))));
        assert!(!f.ok(&doc(json!({"a": 1}))));
        let f = parse(json!({"$and": [{"a": {"$gte": 1}}, {"a": {"$lte": 1}}]})).unwrap();
        assert!(f.ok(&doc(json!({"a": 1}))));
        let f = parse(json!({"a": {"$not": {"$gt": 5}}})).unwrap();
        assert!(f.ok(&doc(json!({"a": 1}))));
        assert!(f.ok(&doc(json!({}))));
    }

    #[test]
    fn exists_variants() {
        for falsy in [json!(false), json!(null), json!(0)] {
            let f = parse(json!({"a": {"$exists": falsy}})).unwrap();
            assert!(f.ok(&doc(json!({}))));
            assert!(!f.ok(&doc(json!({"a": 1}))));
        }
        let f = parse(json!({"a": {"$exists": true}})).unwrap();
        assert!(f.ok(&doc(json!({"a": null}))));
    }

    #[test]
    fn type_and_size() {
        let f = parse(json!({"a": {"$type": "bool"}})).unwrap();
        assert!(f.ok(&doc(json!({"a": false}))));
        assert!(!f.ok(&doc(json!({"a": 0}))));
        let f = parse(json!({"a": {"$type": 3}})).unwrap();
        assert!(f.ok(&doc(json!({"a": "s"}))));
        let f = parse(json!({"a": {"$size": 2}})).unwrap();
        assert!(f.ok(&doc(json!({"a": [0, 0]}))));
    }

    #[test]
    fn malformed_filters_fail_eagerly() {
        let bad = [
            json!({"$foo": 1}),
            json!({"a": {"$foo": 1}}),
            json!({"a": {"$gt": 1, "b": 2}}),
            json!({"a": {"$in": 1}}),
            json!({"$or": {}}),
            json!({"$or": []}),
            json!({"a": {"$not": {"b": 1}}}),
            json!({"a": {"$not": 5}}),
            json!({"a": {"$type": "nope"}}),
            json!({"a": {"$size": "x"}}),
            json!({"a": {"$options": "i"}}),
        ];
        for b in bad {
            assert!(
                matches!(parse(b.clone()), Err(DbError::FilterParse(_))),
                "expected parse error for {b}"
            );
        }
        assert!(matches!(parse_filter_json("{"), Err(DbError::Json(_))));
    }

    #[cfg(feature = "regex")]
    #[test]
    fn regex_with_options() {
        let f = parse(json!({"name": {"$regex": "^ab", "$options": "i"}})).unwrap();
        assert!(f.ok(&doc(json!({"name": "ABc"}))));
        assert!(parse(json!({"name": {"$regex": "("}})).is_err());
    }

    #[cfg(not(feature = "regex"))]
    #[test]
    fn regex_requires_feature() {
        let r = parse(json!({"name": {"$regex": "^ab"}}));
        assert!(matches!(r, Err(DbError::FeatureNotEnabled(_))));
    }
}
