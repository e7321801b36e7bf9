use bson::doc;
use nexuslite_query::iterator::collect;
use nexuslite_query::storage::{read_with, write_with};
use nexuslite_query::query::Projection;
use nexuslite_query::{Collection, IndexInfo, MemoryStore, Query, Value, parse_filter_json};
use serde_json::json;

fn seeded(indexes: &[&[&str]]) -> (MemoryStore, Collection) {
    let store = MemoryStore::new();
    let coll = Collection::new("items");
    write_with(&store, |txn| {
        for fields in indexes {
            coll.create_index(txn, IndexInfo::new(*fields))?;
        }
        for i in 1..=5 {
            coll.insert(txn, &Value::from(&doc! { "id": i, "a": i }))?;
        }
        Ok(())
    })
    .unwrap();
    (store, coll)
}

fn ids(store: &MemoryStore, coll: &Collection, q: &Query) -> Vec<f64> {
    read_with(store, |txn| collect(coll.find(txn, q)?))
        .unwrap()
        .into_iter()
        .map(|(_, doc)| doc.get("id").and_then(Value::as_f64).unwrap())
        .collect()
}

fn query(filter: &str, sort: &[&str]) -> Query {
    let filter: serde_json::Value = serde_json::from_str(filter).unwrap();
    Query::parse(&Value::from(filter), sort).unwrap()
}

#[test]
fn range_on_indexed_field() {
    let (store, coll) = seeded(&[&["a"]]);
    let q = query(r#"{"a": {"$gt": 1, "$lt": 4}}"#, &[]);
    assert_eq!(ids(&store, &coll, &q), vec![2.0, 3.0]);
    let plan = read_with(&store, |txn| coll.explain(txn, &q)).unwrap();
    assert!(plan.contains("INDEX(a"), "{plan}");
    assert!(plan.contains("('1','4')"), "{plan}");
}

#[test]
fn same_answers_without_an_index() {
    let (store, coll) = seeded(&[]);
    let q = query(r#"{"a": {"$gt": 1, "$lt": 4}}"#, &[]);
    assert_eq!(ids(&store, &coll, &q), vec![2.0, 3.0]);
    let plan = read_with(&store, |txn| coll.explain(txn, &q)).unwrap();
    assert_eq!(plan, "SCAN(id)");
}

#[test]
fn ne_and_in_use_several_ranges() {
    let (store, coll) = seeded(&[&["a"]]);
    let q = query(r#"{"a": {"$ne": 3}}"#, &[]);
    assert_eq!(ids(&store, &coll, &q), vec![1.0, 2.0, 4.0, 5.0]);
    let q = query(r#"{"a": {"$in": [5, 1]}}"#, &["a"]);
    assert_eq!(ids(&store, &coll, &q), vec![1.0, 5.0]);
}

#[test]
fn sort_limit_and_skip() {
    let (store, coll) = seeded(&[&["a"]]);
    let q = query("{}", &["-a"]).with_skip(1).with_limit(2);
    assert_eq!(ids(&store, &coll, &q), vec![4.0, 3.0]);
    let plan = read_with(&store, |txn| coll.explain(txn, &q)).unwrap();
    assert_eq!(plan, "LIMIT(FETCH(INDEX(a, rev)), skip=1, limit=2)");
}

#[test]
fn multikey_documents_are_returned_once() {
    let store = MemoryStore::new();
    let coll = Collection::new("posts");
    write_with(&store, |txn| {
        coll.create_index(txn, IndexInfo::new(&["tags"]))?;
        coll.insert(txn, &Value::from(json!({"id": 1, "tags": ["db", "rust", "db2"]})))?;
        coll.insert(txn, &Value::from(json!({"id": 2, "tags": ["go"]})))?;
        coll.insert(txn, &Value::from(json!({"id": 3, "tags": "rust"})))?;
        Ok(())
    })
    .unwrap();
    let q = query(r#"{"tags": {"$gte": "db"}}"#, &[]);
    assert_eq!(ids(&store, &coll, &q).len(), 3);
    let q = query(r#"{"tags": {"$in": ["rust", "db"]}}"#, &[]);
    let mut found = ids(&store, &coll, &q);
    found.sort_by(f64::total_cmp);
    assert_eq!(found, vec![1.0, 3.0]);
}

#[test]
fn nested_fields_and_logical_operators() {
    let store = MemoryStore::new();
    let coll = Collection::new("people");
    write_with(&store, |txn| {
        coll.create_index(txn, IndexInfo::new(&["addr.city"]))?;
        for (id, city, age) in [(1, "Oslo", 30), (2, "Rome", 41), (3, "Oslo", 52), (4, "Lima", 19)] {
            coll.insert(txn, &Value::from(json!({"id": id, "addr": {"city": city}, "age": age})))?;
        }
        Ok(())
    })
    .unwrap();
    let q = query(r#"{"addr.city": "Oslo", "age": {"$gt": 40}}"#, &[]);
    assert_eq!(ids(&store, &coll, &q), vec![3.0]);
    let q = query(r#"{"$or": [{"addr.city": "Lima"}, {"addr.city": "Rome"}]}"#, &["id"]);
    assert_eq!(ids(&store, &coll, &q), vec![2.0, 4.0]);
    let q = query(r#"{"$nor": [{"addr.city": "Oslo"}]}"#, &["-age"]);
    assert_eq!(ids(&store, &coll, &q), vec![2.0, 4.0]);
}

#[test]
fn malformed_filters_fail_before_iteration() {
    assert!(parse_filter_json(r#"{"a": {"$bogus": 1}}"#).is_err());
    assert!(parse_filter_json(r#"{"$or": []}"#).is_err());
    assert!(nexuslite_query::Sort::parse(&[""]).is_err());
}

fn profiles() -> (MemoryStore, Collection) {
    let store = MemoryStore::new();
    let coll = Collection::new("profiles");
    write_with(&store, |txn| {
        coll.create_index(txn, IndexInfo::new(&["age"]))?;
        for (i, city) in ["oslo", "rome", "lima"].iter().enumerate() {
            let i = i as i64;
            coll.insert(
                txn,
                &Value::from(&doc! {
                    "id": i,
                    "name": format!("user{i}"),
                    "age": 20 + i,
                    "addr": { "city": *city, "zip": 1000 + i },
                    "token": "secret",
                }),
            )?;
        }
        Ok(())
    })
    .unwrap();
    (store, coll)
}

#[test]
fn fields_keep_only_named_paths_and_id() {
    let (store, coll) = profiles();
    let q = query(r#"{"age": {"$gte": 21}}"#, &["age"])
        .with_projection(Projection::include(&["name", "addr.city"]).unwrap());
    let docs: Vec<Value> =
        read_with(&store, |txn| collect(coll.find(txn, &q)?)).unwrap().into_iter().map(|(_, d)| d).collect();
    assert_eq!(
        docs,
        vec![
            Value::from(json!({"id": 1, "name": "user1", "addr": {"city": "rome"}})),
            Value::from(json!({"id": 2, "name": "user2", "addr": {"city": "lima"}})),
        ]
    );
    let plan = read_with(&store, |txn| coll.explain(txn, &q)).unwrap();
    assert_eq!(plan, "PROJECT(FETCH(INDEX(age, Bounds{['21',inf]})), fields=name,addr.city)");
}

#[test]
fn excluded_fields_are_dropped_after_paging() {
    let (store, coll) = profiles();
    let q = query("{}", &["-age"])
        .with_limit(1)
        .with_projection(Projection::exclude(&["token", "addr.zip"]).unwrap());
    let found = read_with(&store, |txn| collect(coll.find(txn, &q)?)).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].1,
        Value::from(json!({"id": 2, "name": "user2", "age": 22, "addr": {"city": "lima"}}))
    );
    let plan = read_with(&store, |txn| coll.explain(txn, &q)).unwrap();
    assert_eq!(plan, "PROJECT(LIMIT(FETCH(INDEX(age, rev)), limit=1), exclude=token,addr.zip)");
}

#[test]
fn projection_does_not_change_filtering_or_sorting() {
    let (store, coll) = profiles();
    // filter and sort on fields the projection removes
    let q = query(r#"{"addr.city": {"$in": ["oslo", "lima"]}}"#, &["-addr.zip"])
        .with_projection(Projection::include(&["name"]).unwrap());
    let names: Vec<String> = read_with(&store, |txn| collect(coll.find(txn, &q)?))
        .unwrap()
        .into_iter()
        .map(|(_, d)| d.get("name").and_then(Value::as_str).unwrap().to_owned())
        .collect();
    assert_eq!(names, ["user2", "user0"]);
}
