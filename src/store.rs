use crate::config::StoreConfig;
use crate::filter::{FilterClause, FilterOp, FindOptions};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Document store errors. Surfaced to the database tier, which wraps them in
/// its generic fatal failure code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("store failure: {0}")]
    Backend(String),
}

/// DocumentStore
///
/// The abstract contract for all persistence operations on schema-less
/// document collections. Handlers and workers interact with this trait
/// object without knowing the concrete backend, which keeps the database
/// tier testable and leaves room for a networked client behind the same
/// seam.
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn DocumentStore>`) safely shareable across task boundaries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document, assigning a fresh `_id` when the caller did not
    /// supply one. Returns the identifier of the stored document.
    async fn insert(&self, collection: &str, document: Value) -> StoreResult<String>;

    /// Returns every document matching all clauses, in insertion order,
    /// with projection and pagination applied from `options`.
    async fn find(
        &self,
        collection: &str,
        filter: &[FilterClause],
        options: &FindOptions,
    ) -> StoreResult<Vec<Value>>;

    /// Returns the first matching document, or `None`. Absence is not an
    /// error at this layer.
    async fn find_one(
        &self,
        collection: &str,
        filter: &[FilterClause],
    ) -> StoreResult<Option<Value>>;

    /// Partial-field update of the first matching document. Returns the
    /// number of documents modified (0 or 1; updates are single-document
    /// by contract).
    async fn update(
        &self,
        collection: &str,
        filter: &[FilterClause],
        changes: &Map<String, Value>,
    ) -> StoreResult<u64>;

    /// Removes the first matching document. Returns the number removed.
    async fn remove(&self, collection: &str, filter: &[FilterClause]) -> StoreResult<u64>;

    /// Total document count for the collection, unfiltered.
    async fn count(&self, collection: &str) -> StoreResult<u64>;
}

/// The concrete type used to share the store across workers.
pub type StoreState = Arc<dyn DocumentStore>;

/// Builds the store from the configured connection parameters. The seam
/// where a networked document-store client would be constructed; the
/// in-process engine ignores pooling parameters.
pub fn connect(config: &StoreConfig) -> StoreState {
    tracing::info!(
        host = %config.host,
        port = config.port,
        db = %config.db_name,
        "document store initialized (in-memory engine)"
    );
    Arc::new(MemoryStore::new())
}

/// MemoryStore
///
/// In-process document store: one `Vec` of JSON objects per collection,
/// guarded by an async RwLock. Matching is strict: no type coercion, a
/// missing or null field never matches any clause, numbers compare as f64
/// and strings lexicographically, clauses AND together.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, document: Value) -> StoreResult<String> {
        let Value::Object(mut doc) = document else {
            return Err(StoreError::NotAnObject);
        };
        let id = match doc.get("_id").and_then(Value::as_str) {
            Some(existing) => existing.to_string(),
            None => {
                let fresh = Uuid::new_v4().to_string();
                doc.insert("_id".to_string(), Value::String(fresh.clone()));
                fresh
            }
        };
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().push(doc);
        Ok(id)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &[FilterClause],
        options: &FindOptions,
    ) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().await;
        let docs = collections.get(collection).map(Vec::as_slice).unwrap_or(&[]);

        let matching = docs.iter().filter(|doc| matches(doc, filter));
        let paged: Vec<&Map<String, Value>> = match options.page {
            Some(page) => matching
                .skip(page.skip.max(0) as usize)
                .take(page.limit.max(0) as usize)
                .collect(),
            None => matching.collect(),
        };

        Ok(paged
            .into_iter()
            .map(|doc| Value::Object(project(doc, options.fields.as_deref())))
            .collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &[FilterClause],
    ) -> StoreResult<Option<Value>> {
        let collections = self.collections.read().await;
        let docs = collections.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        Ok(docs
            .iter()
            .find(|doc| matches(doc, filter))
            .map(|doc| Value::Object(doc.clone())))
    }

    async fn update(
        &self,
        collection: &str,
        filter: &[FilterClause],
        changes: &Map<String, Value>,
    ) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(doc) = docs.iter_mut().find(|doc| matches(doc, filter)) else {
            return Ok(0);
        };
        for (key, value) in changes {
            doc.insert(key.clone(), value.clone());
        }
        Ok(1)
    }

    async fn remove(&self, collection: &str, filter: &[FilterClause]) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(index) = docs.iter().position(|doc| matches(doc, filter)) else {
            return Ok(0);
        };
        docs.remove(index);
        Ok(1)
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map(Vec::len).unwrap_or(0) as u64)
    }
}

/// Checks whether a document satisfies every clause (AND semantics).
fn matches(doc: &Map<String, Value>, filter: &[FilterClause]) -> bool {
    filter.iter().all(|clause| matches_clause(doc, clause))
}

fn matches_clause(doc: &Map<String, Value>, clause: &FilterClause) -> bool {
    let Some(actual) = doc.get(&clause.field) else {
        // Missing field = no match, for every operator.
        return false;
    };
    if actual.is_null() {
        return false;
    }
    match clause.op {
        FilterOp::Eq => eq_match(actual, &clause.value),
        FilterOp::Ne => !eq_match(actual, &clause.value),
        FilterOp::Gt => order_match(actual, &clause.value, |o| o == std::cmp::Ordering::Greater),
        FilterOp::Gte => order_match(actual, &clause.value, |o| o != std::cmp::Ordering::Less),
        FilterOp::Lt => order_match(actual, &clause.value, |o| o == std::cmp::Ordering::Less),
        FilterOp::Lte => order_match(actual, &clause.value, |o| o != std::cmp::Ordering::Greater),
    }
}

/// Exact equality with one carve-out: numbers compare by value so that a
/// coerced query literal (always f64) matches integer-stored documents.
fn eq_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => actual == expected,
    }
}

/// Ordered comparison: numbers as f64, strings lexicographically, any other
/// type pairing never matches.
fn order_match(actual: &Value, bound: &Value, accept: fn(std::cmp::Ordering) -> bool) -> bool {
    match (actual, bound) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).map(accept).unwrap_or(false),
            _ => false,
        },
        (Value::String(a), Value::String(b)) => accept(a.cmp(b)),
        _ => false,
    }
}

/// Applies a projection: keeps the listed fields plus `_id`. With no
/// projection the document passes through whole.
fn project(doc: &Map<String, Value>, fields: Option<&[String]>) -> Map<String, Value> {
    match fields {
        None => doc.clone(),
        Some(fields) => doc
            .iter()
            .filter(|(key, _)| key.as_str() == "_id" || fields.iter().any(|f| f == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}
