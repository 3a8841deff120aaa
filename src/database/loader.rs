//! Loaders backed by a query executor.

use std::sync::Arc;

use tracing::debug;

use super::convert::Convert;
use super::query::{Filter, Operator, QueryExecutor, Rows};
use crate::cache::{DELIMITER, Loader, loader_fn};
use crate::context::Context;
use crate::error::Result;

/// Field queried when none is given.
pub const DEFAULT_FIELD: &str = "id";

/// Build a loader that answers cache keys with a single-condition query.
///
/// The loader strips a leading `prefix:` from the key, converts the rest
/// with `convert`, queries `field operator value` and fills a fresh
/// `new_fn()` with the rows. An empty `field` means `id`, an empty
/// `operator` means `=`.
///
/// Conversion failures are returned as [`CacheError::Conversion`] and never
/// reach the executor. Executor errors pass through unchanged.
///
/// [`CacheError::Conversion`]: crate::error::CacheError::Conversion
pub fn db_load<R, V, E, F>(
    executor: Arc<E>,
    field: &str,
    operator: &str,
    prefix: &str,
    convert: Convert,
    new_fn: F,
) -> Result<Loader<V>>
where
    E: QueryExecutor<R> + ?Sized + 'static,
    R: Send + 'static,
    V: Rows<R> + Send + 'static,
    F: Fn() -> V + Send + Sync + 'static,
{
    let field = match field.trim() {
        "" => DEFAULT_FIELD.to_string(),
        field => field.to_string(),
    };
    let operator: Operator = operator.parse()?;
    let key_prefix = format!("{prefix}{DELIMITER}");
    let new_fn = Arc::new(new_fn);

    Ok(loader_fn(move |ctx: Context, key: String| {
        let executor = Arc::clone(&executor);
        let convert = Arc::clone(&convert);
        let new_fn = Arc::clone(&new_fn);
        let field = field.clone();
        let external = key.strip_prefix(key_prefix.as_str()).unwrap_or(&key).to_string();

        async move {
            let value = convert(&external)?;
            let filter = Filter {
                field,
                operator,
                value,
            };
            debug!("Loading {} where {}", key, filter);

            let rows = executor.find(&ctx, &filter).await?;

            let mut result = new_fn();
            result.fill(rows);
            Ok(result)
        }
    }))
}
