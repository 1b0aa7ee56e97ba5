use crate::bus::{Action, DbReply, DbResult, Envelope, GatewayError};
use crate::filter::{self, FilterClause, FindOptions};
use crate::store::{StoreError, StoreState};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

/// Bounded per-entity mailbox; backpressure applies to the HTTP tier when a
/// worker falls behind.
const MAILBOX_CAPACITY: usize = 256;

/// EntityWorker
///
/// The database tier for one entity: a task consuming action messages from
/// the bus, executing them against the document store collection named after
/// the entity, and replying on each message's oneshot channel. One worker is
/// spawned per configured entity at startup.
pub struct EntityWorker {
    entity: String,
    store: StoreState,
    rx: mpsc::Receiver<Envelope>,
}

impl EntityWorker {
    /// Spawns the worker task and returns the sender half for bus
    /// registration.
    pub fn spawn(entity: impl Into<String>, store: StoreState) -> mpsc::Sender<Envelope> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let worker = Self {
            entity: entity.into(),
            store,
            rx,
        };
        tokio::spawn(worker.run());
        tx
    }

    async fn run(mut self) {
        tracing::info!(entity = %self.entity, "database worker running");
        while let Some(message) = self.rx.recv().await {
            let result = self.handle(message.action.as_deref(), message.body).await;
            if let Err(error) = &result {
                tracing::error!(entity = %self.entity, code = error.code(), %error, "request failed");
            }
            // The requester may have gone away; nothing left to do then.
            let _ = message.reply_tx.send(result);
        }
        tracing::info!(entity = %self.entity, "database worker stopped");
    }

    /// handle
    ///
    /// The dispatch contract: a message without an action header fails with
    /// `NO_ACTION_SPECIFIED` before any dispatch, and an unrecognized action
    /// name fails explicitly with `UNKNOWN_ACTION` rather than being dropped
    /// without a reply.
    async fn handle(&self, action: Option<&str>, body: Value) -> DbResult {
        let Some(name) = action else {
            return Err(GatewayError::NoActionSpecified);
        };
        let action: Action = name
            .parse()
            .map_err(|_| GatewayError::UnknownAction(name.to_string()))?;
        match action {
            Action::Create => self.create(body).await,
            Action::DeleteById => self.delete_by_id(body).await,
            Action::HideById => self.hide_by_id(body).await,
            Action::FindById => self.find_by_id(body).await,
            Action::FindAll => self.find_all(body).await,
            Action::Update => self.update(body).await,
            Action::Count => self.count().await,
        }
    }

    /// List query: filter, projection and pagination all come as raw string
    /// parameters in the message body.
    async fn find_all(&self, body: Value) -> DbResult {
        let mut options = FindOptions::default();
        if let Some(select) = body.get("select").and_then(Value::as_str) {
            options.fields = Some(filter::parse_select(select));
        }
        options.page = filter::parse_page(
            body.get("from").and_then(Value::as_str),
            body.get("to").and_then(Value::as_str),
        );
        let clauses = match body.get("query").and_then(Value::as_str) {
            Some(query) => filter::parse_query(query),
            None => Vec::new(),
        };
        let docs = self
            .store
            .find(&self.entity, &clauses, &options)
            .await
            .map_err(db_error)?;
        Ok(DbReply::Ok(Value::Array(docs)))
    }

    /// Single lookup: the message body is used as an exact-match query
    /// document (in practice `{"_id": ...}`). Absence replies null, never a
    /// not-found error.
    async fn find_by_id(&self, body: Value) -> DbResult {
        let found = self
            .store
            .find_one(&self.entity, &exact_match_filter(&body))
            .await
            .map_err(db_error)?;
        Ok(DbReply::Ok(found.unwrap_or(Value::Null)))
    }

    async fn create(&self, body: Value) -> DbResult {
        let id = self.store.insert(&self.entity, body).await.map_err(db_error)?;
        Ok(DbReply::Ok(json!({ "id": id })))
    }

    /// Partial update keyed on `_id`. The identifier is stripped from the
    /// change set; zero matches reply with the tagged warning rather than a
    /// failure, distinguishing "executed, no match" from "failed".
    async fn update(&self, body: Value) -> DbResult {
        let mut changes = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = changes.remove("_id").unwrap_or(Value::Null);
        let modified = self
            .store
            .update(&self.entity, &[FilterClause::eq("_id", id)], &changes)
            .await
            .map_err(db_error)?;
        if modified == 0 {
            Ok(DbReply::Warning("Element not found".to_string()))
        } else {
            Ok(DbReply::Ok(Value::Null))
        }
    }

    async fn delete_by_id(&self, body: Value) -> DbResult {
        let removed = self
            .store
            .remove(&self.entity, &exact_match_filter(&body))
            .await
            .map_err(db_error)?;
        if removed == 0 {
            Ok(DbReply::Warning("Element not found".to_string()))
        } else {
            Ok(DbReply::Ok(Value::Null))
        }
    }

    /// Soft delete: flips `active` to false via partial update, leaving the
    /// document in place.
    async fn hide_by_id(&self, body: Value) -> DbResult {
        let mut changes = Map::new();
        changes.insert("active".to_string(), Value::Bool(false));
        let modified = self
            .store
            .update(&self.entity, &exact_match_filter(&body), &changes)
            .await
            .map_err(db_error)?;
        if modified == 0 {
            Ok(DbReply::Warning("Element not found".to_string()))
        } else {
            Ok(DbReply::Ok(Value::Null))
        }
    }

    async fn count(&self) -> DbResult {
        let total = self.store.count(&self.entity).await.map_err(db_error)?;
        Ok(DbReply::Ok(json!(total)))
    }
}

fn db_error(error: StoreError) -> GatewayError {
    GatewayError::Db(error.to_string())
}

/// Treats a JSON object as an exact-match query: every key becomes an
/// equality clause. A non-object body produces an empty clause list, which
/// matches everything, same as an empty query document would.
fn exact_match_filter(body: &Value) -> Vec<FilterClause> {
    match body.as_object() {
        Some(map) => map
            .iter()
            .map(|(field, value)| FilterClause::eq(field, value.clone()))
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EntityBus;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn bus_with_worker(entity: &str) -> EntityBus {
        let store: StoreState = Arc::new(MemoryStore::new());
        let mut bus = EntityBus::new();
        bus.register(entity, EntityWorker::spawn(entity, store));
        bus
    }

    #[tokio::test]
    async fn missing_action_header_fails_before_dispatch() {
        let bus = bus_with_worker("items");
        let err = bus.deliver("items", None, json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoActionSpecified));
        assert_eq!(err.code(), 0);
    }

    #[tokio::test]
    async fn unknown_action_fails_explicitly() {
        let bus = bus_with_worker("items");
        let err = bus
            .deliver("items", Some("EXPLODE".to_string()), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownAction(_)));
    }

    #[tokio::test]
    async fn store_faults_surface_as_database_errors() {
        let bus = bus_with_worker("items");
        // A non-object body is rejected by the store itself, exercising
        // the fault path end to end.
        let err = bus
            .send("items", Action::Create, json!([1, 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Db(_)));
        assert_eq!(err.code(), 1);
    }

    #[tokio::test]
    async fn create_replies_with_the_new_id() {
        let bus = bus_with_worker("items");
        let reply = bus
            .send("items", Action::Create, json!({"name": "bread"}))
            .await
            .unwrap();
        let DbReply::Ok(body) = reply else {
            panic!("expected a success reply");
        };
        assert!(body["id"].is_string());
    }

    #[tokio::test]
    async fn created_document_is_findable_by_id() {
        let bus = bus_with_worker("items");
        let DbReply::Ok(created) = bus
            .send("items", Action::Create, json!({"name": "bread"}))
            .await
            .unwrap()
        else {
            panic!("create failed");
        };
        let reply = bus
            .send("items", Action::FindById, json!({"_id": created["id"]}))
            .await
            .unwrap();
        let DbReply::Ok(found) = reply else {
            panic!("expected a success reply");
        };
        assert_eq!(found["name"], json!("bread"));
    }

    #[tokio::test]
    async fn find_by_id_replies_null_when_absent() {
        let bus = bus_with_worker("items");
        let reply = bus
            .send("items", Action::FindById, json!({"_id": "missing"}))
            .await
            .unwrap();
        assert_eq!(reply, DbReply::Ok(Value::Null));
    }

    #[tokio::test]
    async fn zero_match_update_delete_hide_reply_with_the_tagged_warning() {
        let bus = bus_with_worker("items");
        for action in [Action::Update, Action::DeleteById, Action::HideById] {
            let reply = bus
                .send("items", action, json!({"_id": "missing"}))
                .await
                .unwrap();
            assert_eq!(
                reply,
                DbReply::Warning("Element not found".to_string()),
                "{action:?}"
            );
        }
    }

    #[tokio::test]
    async fn update_applies_partial_changes_without_clobbering_id() {
        let bus = bus_with_worker("items");
        let DbReply::Ok(created) = bus
            .send("items", Action::Create, json!({"name": "bread", "price": 5}))
            .await
            .unwrap()
        else {
            panic!("create failed");
        };
        let id = created["id"].clone();

        let reply = bus
            .send("items", Action::Update, json!({"_id": id, "price": 6}))
            .await
            .unwrap();
        assert_eq!(reply, DbReply::Ok(Value::Null));

        let DbReply::Ok(found) = bus
            .send("items", Action::FindById, json!({"_id": id}))
            .await
            .unwrap()
        else {
            panic!("lookup failed");
        };
        assert_eq!(found["price"], json!(6));
        assert_eq!(found["name"], json!("bread"));
    }

    #[tokio::test]
    async fn hide_sets_active_false_and_keeps_the_document() {
        let bus = bus_with_worker("items");
        let DbReply::Ok(created) = bus
            .send("items", Action::Create, json!({"name": "bread", "active": true}))
            .await
            .unwrap()
        else {
            panic!("create failed");
        };
        let id = created["id"].clone();

        let reply = bus
            .send("items", Action::HideById, json!({"_id": id}))
            .await
            .unwrap();
        assert_eq!(reply, DbReply::Ok(Value::Null));

        let DbReply::Ok(found) = bus
            .send("items", Action::FindById, json!({"_id": id}))
            .await
            .unwrap()
        else {
            panic!("lookup failed");
        };
        assert_eq!(found["active"], json!(false));
    }

    #[tokio::test]
    async fn find_all_applies_query_select_and_pagination() {
        let bus = bus_with_worker("items");
        for (name, price) in [("bread", 5), ("cheese", 20), ("wine", 60)] {
            bus.send("items", Action::Create, json!({"name": name, "price": price}))
                .await
                .unwrap();
        }

        let reply = bus
            .send(
                "items",
                Action::FindAll,
                json!({"query": "price>10", "select": "name", "from": "0", "to": "1"}),
            )
            .await
            .unwrap();
        let DbReply::Ok(Value::Array(docs)) = reply else {
            panic!("expected an array reply");
        };
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["name"], json!("cheese"));
        assert!(docs[0].get("price").is_none());
    }

    #[tokio::test]
    async fn count_reports_the_collection_total() {
        let bus = bus_with_worker("items");
        bus.send("items", Action::Create, json!({"n": 1})).await.unwrap();
        bus.send("items", Action::Create, json!({"n": 2})).await.unwrap();
        let reply = bus.send("items", Action::Count, Value::Null).await.unwrap();
        assert_eq!(reply, DbReply::Ok(json!(2)));
    }
}
