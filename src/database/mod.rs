//! Database module exports.
//!
//! MongoDB access plus the pieces that turn a cache key into a query:
//! converters, filters, executors and [`db_load`].

mod convert;
mod loader;
pub mod models;
mod mongo;
mod query;

pub use convert::{Convert, MAX_RANGE_KEYS, int64_convert, noop_convert, parse_int64, parse_range, range_convert};
pub use loader::{DEFAULT_FIELD, db_load};
pub use models::*;
pub use mongo::Database;
pub use query::{Filter, MemoryExecutor, MongoExecutor, Operator, QueryExecutor, QueryValue, Queryable, Rows};
