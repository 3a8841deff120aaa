//! Query descriptors and executors.
//!
//! A loader asks for rows with a single `field operator value` condition.
//! [`MongoExecutor`] runs it against a collection; [`MemoryExecutor`] runs it
//! over rows held in memory.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use mongodb::Collection;
use mongodb::bson::{Bson, Document, doc};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::context::Context;
use crate::error::{CacheError, Result};

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

impl Default for Operator {
    fn default() -> Self {
        Self::Eq
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = CacheError;

    /// Parse an operator; an empty string means `=`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

        match normalized.as_str() {
            "" | "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            "in" => Ok(Self::In),
            "not in" => Ok(Self::NotIn),
            _ => Err(CacheError::InvalidType(format!("unknown query operator [{s}]"))),
        }
    }
}

/// A value bound into a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Int(i64),
    Str(String),
    /// Ordered scalars, for batch lookups.
    List(Vec<QueryValue>),
}

impl QueryValue {
    /// Scalars as a one-element slice, lists as their elements.
    pub fn as_slice(&self) -> &[QueryValue] {
        match self {
            Self::List(items) => items,
            scalar => std::slice::from_ref(scalar),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<&QueryValue> for Bson {
    fn from(value: &QueryValue) -> Self {
        match value {
            QueryValue::Int(i) => Bson::Int64(*i),
            QueryValue::Str(s) => Bson::String(s.clone()),
            QueryValue::List(items) => Bson::Array(items.iter().map(Bson::from).collect()),
        }
    }
}

/// A single `field operator value` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: QueryValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<QueryValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Render as a MongoDB filter document.
    pub fn to_document(&self) -> Document {
        let field = self.field.as_str();

        match self.operator {
            Operator::Eq if !self.value.is_list() => doc! { field: Bson::from(&self.value) },
            // `= [a, b]` reads as membership.
            Operator::Eq | Operator::In => doc! { field: { "$in": self.list_bson() } },
            Operator::Ne if !self.value.is_list() => doc! { field: { "$ne": Bson::from(&self.value) } },
            Operator::Ne | Operator::NotIn => doc! { field: { "$nin": self.list_bson() } },
            Operator::Gt => doc! { field: { "$gt": Bson::from(&self.value) } },
            Operator::Gte => doc! { field: { "$gte": Bson::from(&self.value) } },
            Operator::Lt => doc! { field: { "$lt": Bson::from(&self.value) } },
            Operator::Lte => doc! { field: { "$lte": Bson::from(&self.value) } },
        }
    }

    fn list_bson(&self) -> Bson {
        Bson::Array(self.value.as_slice().iter().map(Bson::from).collect())
    }

    /// Evaluate against one field value of an in-memory row.
    pub fn matches(&self, actual: &QueryValue) -> bool {
        let candidates = self.value.as_slice();

        match self.operator {
            Operator::Eq | Operator::In => candidates.contains(actual),
            Operator::Ne | Operator::NotIn => !candidates.contains(actual),
            Operator::Gt => compare(actual, &self.value).is_some_and(|o| o.is_gt()),
            Operator::Gte => compare(actual, &self.value).is_some_and(|o| o.is_ge()),
            Operator::Lt => compare(actual, &self.value).is_some_and(|o| o.is_lt()),
            Operator::Lte => compare(actual, &self.value).is_some_and(|o| o.is_le()),
        }
    }
}

fn compare(a: &QueryValue, b: &QueryValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (QueryValue::Int(a), QueryValue::Int(b)) => Some(a.cmp(b)),
        (QueryValue::Str(a), QueryValue::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.field, self.operator, self.value)
    }
}

/// Runs a filter and returns every matching row.
#[async_trait]
pub trait QueryExecutor<R>: Send + Sync {
    async fn find(&self, ctx: &Context, filter: &Filter) -> Result<Vec<R>>;
}

/// How a loader shapes the rows a query returned.
pub trait Rows<R>: Sized {
    /// Replace the contents of `self` with `rows`.
    fn fill(&mut self, rows: Vec<R>);
}

/// Single-row lookup: the first row, or none.
impl<R> Rows<R> for Option<R> {
    fn fill(&mut self, rows: Vec<R>) {
        *self = rows.into_iter().next();
    }
}

/// Batch lookup: every row, in query order.
impl<R> Rows<R> for Vec<R> {
    fn fill(&mut self, rows: Vec<R>) {
        *self = rows;
    }
}

/// Executor over a MongoDB collection.
pub struct MongoExecutor<R: Send + Sync> {
    collection: Collection<R>,
}

impl<R: Send + Sync> MongoExecutor<R> {
    pub fn new(collection: Collection<R>) -> Self {
        Self { collection }
    }
}

impl<R: Send + Sync> Clone for MongoExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
        }
    }
}

#[async_trait]
impl<R> QueryExecutor<R> for MongoExecutor<R>
where
    R: DeserializeOwned + Unpin + Send + Sync,
{
    async fn find(&self, ctx: &Context, filter: &Filter) -> Result<Vec<R>> {
        let query = filter.to_document();
        debug!("Querying {} where {}", self.collection.name(), filter);

        ctx.run(async {
            let mut cursor = self
                .collection
                .find(query)
                .await
                .map_err(|e| CacheError::Query(e.to_string()))?;

            let mut rows = Vec::new();
            while let Some(row) = cursor.next().await {
                rows.push(row.map_err(|e| CacheError::Query(e.to_string()))?);
            }
            Ok(rows)
        })
        .await
    }
}

impl<R: Send + Sync> fmt::Debug for MongoExecutor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoExecutor")
            .field("collection", &self.collection.name())
            .finish()
    }
}

/// Rows that can be filtered in memory.
pub trait Queryable {
    /// Value of `field`, or `None` if the row has no such field.
    fn field(&self, field: &str) -> Option<QueryValue>;
}

/// Executor over rows held in memory. Counts the queries it runs.
pub struct MemoryExecutor<R> {
    rows: Vec<R>,
    queries: Arc<AtomicU64>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Queryable + Clone + Send + Sync> MemoryExecutor<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self {
            rows,
            queries: Arc::new(AtomicU64::new(0)),
            _marker: PhantomData,
        }
    }

    /// Queries run so far.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<R: Queryable + Clone + Send + Sync> QueryExecutor<R> for MemoryExecutor<R> {
    async fn find(&self, ctx: &Context, filter: &Filter) -> Result<Vec<R>> {
        ctx.check()?;
        self.queries.fetch_add(1, Ordering::Relaxed);

        let rows = self
            .rows
            .iter()
            .filter(|row| row.field(&filter.field).is_some_and(|v| filter.matches(&v)))
            .cloned()
            .collect();
        Ok(rows)
    }
}
