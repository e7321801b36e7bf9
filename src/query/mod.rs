// Telemetry is a submodule of query
pub mod telemetry;

mod bounds;
mod filter;
mod parse;
mod project;
mod sort;
mod types;

pub use bounds::{Bound, Bounds};
pub(crate) use bounds::prefix_cmp;
pub use filter::{CmpOp, Comparison, Filter};
pub use parse::{parse_filter, parse_filter_json};
pub use project::{Projection, ProjectionMode};
pub use sort::{Order, Sort, SortField, SortSpec};
pub use types::Query;
