//! Converters from external key strings to query values.

use std::sync::Arc;

use super::query::QueryValue;
use crate::error::{CacheError, Result};

/// Most ids a single range key may expand to.
pub const MAX_RANGE_KEYS: i64 = 1_000;

/// Turns the external part of a cache key into the value bound to a query.
pub type Convert = Arc<dyn Fn(&str) -> Result<QueryValue> + Send + Sync>;

fn conversion(key: &str, reason: impl Into<String>) -> CacheError {
    CacheError::Conversion {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Parse a base-10 signed 64-bit integer.
pub fn parse_int64(key: &str) -> Result<i64> {
    key.trim()
        .parse::<i64>()
        .map_err(|e| conversion(key, format!("key must be an integer: {e}")))
}

/// Parse an inclusive `start-end` range into every integer it covers.
///
/// Ranges wider than [`MAX_RANGE_KEYS`] are rejected.
pub fn parse_range(key: &str) -> Result<Vec<i64>> {
    let (start, end) = key
        .split_once('-')
        .ok_or_else(|| conversion(key, "expected a range like 1-10"))?;

    let start = parse_int64(start).map_err(|_| conversion(key, "range start must be an integer"))?;
    let end = parse_int64(end).map_err(|_| conversion(key, "range end must be an integer"))?;

    if start > end {
        return Err(conversion(key, format!("range start {start} is after end {end}")));
    }

    match end.checked_sub(start) {
        Some(span) if span < MAX_RANGE_KEYS => Ok((start..=end).collect()),
        _ => Err(conversion(key, format!("range covers more than {MAX_RANGE_KEYS} ids"))),
    }
}

/// Integer keys, e.g. `"42"`.
pub fn int64_convert() -> Convert {
    Arc::new(|key: &str| parse_int64(key).map(QueryValue::Int))
}

/// Keys used verbatim as strings.
pub fn noop_convert() -> Convert {
    Arc::new(|key: &str| Ok(QueryValue::Str(key.to_string())))
}

/// Batch keys, e.g. `"1-10"`, for `in` lookups.
pub fn range_convert() -> Convert {
    Arc::new(|key: &str| parse_range(key).map(QueryValue::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_int64_convert() {
        let convert = int64_convert();
        assert_eq!(convert("42").unwrap(), QueryValue::Int(42));
        assert_eq!(convert("-7").unwrap(), QueryValue::Int(-7));
        assert!(matches!(convert("abc"), Err(CacheError::Conversion { .. })));
        assert!(convert("").is_err());
    }

    #[test]
    fn test_noop_convert() {
        assert_eq!(noop_convert()("ACW").unwrap(), QueryValue::Str("ACW".into()));
    }

    #[test]
    fn test_range_convert() {
        let value = range_convert()("1-10").unwrap();
        assert_eq!(value, QueryValue::from((1..=10).collect::<Vec<i64>>()));
        assert_eq!(value.as_slice().len(), 10);

        assert_eq!(parse_range("5-5").unwrap(), vec![5]);
        assert!(parse_range("10-1").is_err());
        assert!(parse_range("10").is_err());
        assert!(parse_range("a-3").is_err());
        assert!(parse_range("1-b").is_err());
    }

    #[test]
    fn test_range_width_is_bounded() {
        assert_eq!(parse_range("1-1000").unwrap().len(), 1_000);
        assert!(matches!(parse_range("1-1001"), Err(CacheError::Conversion { .. })));
        assert!(matches!(
            parse_range("0-9223372036854775807"),
            Err(CacheError::Conversion { .. })
        ));
    }

    proptest! {
        #[test]
        fn range_covers_every_integer(start in 0i64..1_000, len in 0i64..200) {
            let end = start + len;
            let ids = parse_range(&format!("{start}-{end}")).unwrap();

            prop_assert_eq!(ids.len() as i64, len + 1);
            prop_assert_eq!(ids.first().copied(), Some(start));
            prop_assert_eq!(ids.last().copied(), Some(end));
            prop_assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }
}
