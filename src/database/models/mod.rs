//! Database models.

pub mod currency;

pub use currency::{CURRENCY_COLLECTION, Currency};
