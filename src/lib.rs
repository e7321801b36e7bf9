//! Query core of an embedded document store.
//!
//! Values are stored with an order-preserving binary encoding, so secondary
//! indexes, primary keys and filter bounds are all plain byte ranges over a
//! transactional ordered key-value store. A small cost-based planner picks
//! a primary-key scan, one index, or a full scan, and returns a lazy
//! iterator pipeline over the caller's transaction.

pub mod collection;
pub mod config;
pub mod context;
pub mod encoding;
pub mod errors;
pub mod index;
pub mod iterator;
pub mod key;
pub mod logger;
pub mod planner;
pub mod pool;
pub mod query;
pub mod storage;

pub use collection::Collection;
pub use config::QueryConfig;
pub use encoding::Value;
pub use errors::DbError;
pub use index::IndexInfo;
pub use iterator::{IdIterator, ValueIterator};
pub use query::{Filter, Query, Sort, parse_filter, parse_filter_json};
pub use storage::{MemoryStore, Store, Transaction};
