//! Currency model.

use serde::{Deserialize, Serialize};

use crate::database::query::{QueryValue, Queryable};

/// Collection the currencies live in.
pub const CURRENCY_COLLECTION: &str = "platform_currency";

/// Platform currency.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: i64,
    /// Icon id.
    #[serde(default)]
    pub img: i64,
    pub name: String,
    #[serde(default)]
    pub alias_name: String,
    /// Whether user addresses are actually created for it.
    #[serde(default)]
    pub is_true: i64,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    /// Display order.
    #[serde(default)]
    pub sort: i64,
}

impl Currency {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Queryable for Currency {
    fn field(&self, field: &str) -> Option<QueryValue> {
        let value = match field {
            "id" => QueryValue::Int(self.id),
            "img" => QueryValue::Int(self.img),
            "name" => QueryValue::Str(self.name.clone()),
            "alias_name" => QueryValue::Str(self.alias_name.clone()),
            "is_true" => QueryValue::Int(self.is_true),
            "create_time" => QueryValue::Int(self.create_time),
            "update_time" => QueryValue::Int(self.update_time),
            "sort" => QueryValue::Int(self.sort),
            _ => return None,
        };
        Some(value)
    }
}
