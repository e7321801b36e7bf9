use std::time::Duration;

use nexuslite_query::iterator::collect;
use nexuslite_query::storage::{CancelHandle, MemoryStore, read_with, write_with};
use nexuslite_query::{Collection, DbError, IdIterator, IndexInfo, Query, Value, parse_filter_json};
use serde_json::json;

fn store_with_docs(n: i64) -> (MemoryStore, Collection) {
    let store = MemoryStore::new();
    let coll = Collection::new("s");
    write_with(&store, |txn| {
        coll.create_index(txn, IndexInfo::new(&["v"]))?;
        for i in 0..n {
            coll.insert(txn, &Value::from(json!({"id": i, "v": i * 10})))?;
        }
        Ok(())
    })
    .unwrap();
    (store, coll)
}

#[test]
fn failed_write_rolls_back_document_and_entries() {
    let (store, coll) = store_with_docs(3);
    let before = store.len();
    let res = write_with(&store, |txn| {
        coll.insert(txn, &Value::from(json!({"id": 100, "v": 5})))?;
        // duplicate id aborts the whole transaction
        coll.insert(txn, &Value::from(json!({"id": 0, "v": 6})))
    });
    assert!(matches!(res, Err(DbError::DuplicateDocument(_))));
    assert_eq!(store.len(), before);
    let got = read_with(&store, |txn| coll.get(txn, &Value::from(100.0))).unwrap();
    assert!(got.is_none());
}

#[test]
fn open_reads_see_their_snapshot() {
    let (store, coll) = store_with_docs(3);
    let reader = store.begin_txn(false);
    write_with(&store, |txn| coll.insert(txn, &Value::from(json!({"id": 7, "v": 70})))).unwrap();
    let query = Query::new(parse_filter_json(r#"{"v": {"$gte": 0}}"#).unwrap());
    let old = collect(coll.find(&reader, &query).unwrap()).unwrap();
    assert_eq!(old.len(), 3);
    let new = read_with(&store, |txn| collect(coll.find(txn, &query)?)).unwrap();
    assert_eq!(new.len(), 4);
}

#[test]
fn writes_inside_a_transaction_are_visible_to_its_queries() {
    let (store, coll) = store_with_docs(2);
    write_with(&store, |txn| {
        coll.insert(txn, &Value::from(json!({"id": 9, "v": 1})))?;
        let query = Query::new(parse_filter_json(r#"{"v": 1}"#)?);
        let found = collect(coll.find(txn, &query)?)?;
        assert_eq!(found.len(), 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn cancelled_transaction_stops_iteration() {
    let (store, coll) = store_with_docs(20);
    let handle = CancelHandle::default();
    let txn = store.begin_txn(false).with_cancel(handle.clone());
    let query = Query::new(parse_filter_json("{}").unwrap());
    let mut it = coll.find(&txn, &query).unwrap();
    assert!(it.advance());
    handle.cancel();
    assert!(!it.advance());
    assert!(matches!(it.err(), Some(DbError::Cancelled(_))));
    assert!(matches!(it.close(), Err(DbError::Cancelled(_))));
    assert!(it.close().is_ok(), "the error is reported once");
}

#[test]
fn expired_deadline_fails_sorting_queries() {
    let (store, coll) = store_with_docs(5);
    let txn = store.begin_txn(false).with_timeout(Duration::ZERO);
    let query = Query::parse(&Value::from(json!({})), &["v", "id"]).unwrap();
    let res = collect(coll.find(&txn, &query).unwrap());
    assert!(matches!(res, Err(DbError::Cancelled(_))));
}
