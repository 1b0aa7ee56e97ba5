use docgate::{
    AppConfig, AppState, EntityBus, EntityWorker, MemoryStore, StoreState, auth::Claims,
    create_router,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct TestApp {
    pub address: String,
}

/// Boots the full stack (store, workers, bus, router) on an ephemeral port
/// with the default test configuration: one entity `items` mounted at
/// `/items`, local environment.
async fn spawn_app() -> TestApp {
    let config = AppConfig::default();

    let store: StoreState = Arc::new(MemoryStore::new());
    let mut bus = EntityBus::new();
    for entity in &config.entities {
        bus.register(
            entity.name.clone(),
            EntityWorker::spawn(entity.name.clone(), store.clone()),
        );
    }

    let state = AppState {
        bus: Arc::new(bus),
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}

/// Creates a document as `user` and returns its assigned id.
async fn create_item(app: &TestApp, client: &reqwest::Client, user: &str, body: Value) -> String {
    let response = client
        .post(format!("{}/items", app.address))
        .header("x-user-id", user)
        .json(&body)
        .send()
        .await
        .expect("create request failed");
    assert_eq!(response.status(), 200);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("ok"), "{envelope}");
    assert_eq!(envelope["message"], json!("Created"));
    envelope["payload"]["id"]
        .as_str()
        .expect("create reply carries the new id")
        .to_string()
}

async fn fetch_item(app: &TestApp, client: &reqwest::Client, id: &str) -> Value {
    let response = client
        .get(format!("{}/items/{}", app.address, id))
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("ok"));
    envelope["payload"].clone()
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_requests_without_credentials_are_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/items", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_create_find_round_trip_with_audit_fields() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let id = create_item(
        &app,
        &client,
        "tester",
        json!({"name": "bread", "price": 5}),
    )
    .await;

    let doc = fetch_item(&app, &client, &id).await;
    // Submitted fields survive.
    assert_eq!(doc["name"], json!("bread"));
    assert_eq!(doc["price"], json!(5));
    // Injected audit fields.
    assert_eq!(doc["_id"], json!(id));
    assert_eq!(doc["created_by"], json!("tester"));
    assert_eq!(doc["active"], json!(true));
    assert!(doc["created_at"].is_number());
}

#[tokio::test]
async fn test_create_overrides_conflicting_audit_fields() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let id = create_item(
        &app,
        &client,
        "tester",
        json!({
            "name": "bread",
            "created_by": "forged",
            "created_at": 1,
            "active": false,
            "updated_at": 2,
            "updated_by": "forged"
        }),
    )
    .await;

    let doc = fetch_item(&app, &client, &id).await;
    assert_eq!(doc["created_by"], json!("tester"));
    assert_eq!(doc["active"], json!(true));
    assert!(doc["created_at"].as_i64().unwrap() > 1);
    // Update stamps are stripped on create.
    assert!(doc.get("updated_at").is_none());
    assert!(doc.get("updated_by").is_none());
}

#[tokio::test]
async fn test_create_rejects_numeric_id() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/items", app.address))
        .header("x-user-id", "tester")
        .json(&json!({"_id": 7, "name": "bread"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("warning"));
    assert_eq!(
        envelope["detail"]["property_errors"][0]["property"],
        json!("id")
    );
}

#[tokio::test]
async fn test_update_requires_a_string_id() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{}/items", app.address))
        .header("x-user-id", "tester")
        .json(&json!({"name": "renamed"}))
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("warning"));
    assert_eq!(
        envelope["detail"]["property_errors"][0]["error"],
        json!("missing_required_value")
    );
}

#[tokio::test]
async fn test_update_stamps_and_preserves_creation_audit() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let id = create_item(&app, &client, "creator", json!({"name": "bread", "price": 5})).await;

    let response = client
        .put(format!("{}/items", app.address))
        .header("x-user-id", "editor")
        .json(&json!({"_id": id, "price": 6, "created_by": "forged"}))
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("ok"));
    assert_eq!(envelope["message"], json!("Updated"));
    // Success sentinel carries no payload.
    assert!(envelope.get("payload").is_none());

    let doc = fetch_item(&app, &client, &id).await;
    assert_eq!(doc["price"], json!(6));
    assert_eq!(doc["name"], json!("bread"));
    // The creation audit cannot be rewritten through an update.
    assert_eq!(doc["created_by"], json!("creator"));
    assert_eq!(doc["updated_by"], json!("editor"));
    assert!(doc["updated_at"].is_number());
}

#[tokio::test]
async fn test_zero_match_operations_warn_instead_of_failing() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // update
    let response = client
        .put(format!("{}/items", app.address))
        .header("x-user-id", "tester")
        .json(&json!({"_id": "missing", "name": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("warning"));
    assert_eq!(envelope["message"], json!("Element not found"));

    // deleteById
    let response = client
        .delete(format!("{}/items/missing", app.address))
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("warning"));

    // hideById
    let response = client
        .delete(format!("{}/items/action/hide/missing", app.address))
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("warning"));
}

#[tokio::test]
async fn test_hide_then_delete_lifecycle() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let id = create_item(&app, &client, "tester", json!({"name": "bread"})).await;

    // Soft delete keeps the document but flips `active`.
    let response = client
        .delete(format!("{}/items/action/hide/{}", app.address, id))
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("ok"));
    assert_eq!(envelope["message"], json!("Hidden"));

    let doc = fetch_item(&app, &client, &id).await;
    assert_eq!(doc["active"], json!(false));

    // Hard delete removes it; a later lookup yields a null payload.
    let response = client
        .delete(format!("{}/items/{}", app.address, id))
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("ok"));
    assert_eq!(envelope["message"], json!("Deleted"));

    let doc = fetch_item(&app, &client, &id).await;
    assert!(doc.is_null());
}

#[tokio::test]
async fn test_listing_with_filter_query() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    for (name, price) in [("bread", 5), ("cheese", 20), ("wine", 60)] {
        create_item(&app, &client, "tester", json!({"name": name, "price": price})).await;
    }

    // Same-field clauses collapse by map-put merge: only `price<=50`
    // survives, so this is not a range query.
    let response = client
        .get(format!("{}/items", app.address))
        .query(&[("query", "price>=10,price<=50")])
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("ok"));
    let docs = envelope["payload"].as_array().unwrap();
    let names: Vec<&str> = docs.iter().map(|d| d["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["bread", "cheese"]);

    // Distinct fields AND together.
    let response = client
        .get(format!("{}/items", app.address))
        .query(&[("query", "price>=10,name!=wine")])
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    let docs = envelope["payload"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["name"], json!("cheese"));
}

#[tokio::test]
async fn test_listing_with_projection_and_pagination() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    for (name, price) in [("bread", 5), ("cheese", 20), ("wine", 60)] {
        create_item(&app, &client, "tester", json!({"name": name, "price": price})).await;
    }

    let response = client
        .get(format!("{}/items", app.address))
        .query(&[("select", "name"), ("from", "1"), ("to", "2")])
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    let docs = envelope["payload"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["name"], json!("cheese"));
    assert!(docs[0].get("price").is_none());
    assert!(docs[0].get("_id").is_some());

    // Pagination is all-or-nothing: a lone `from` is ignored.
    let response = client
        .get(format!("{}/items", app.address))
        .query(&[("from", "1")])
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["payload"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_count_reports_collection_total() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    for n in 0..4 {
        create_item(&app, &client, "tester", json!({"n": n})).await;
    }

    let response = client
        .get(format!("{}/items/action/count", app.address))
        .header("x-user-id", "tester")
        .send()
        .await
        .unwrap();
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], json!("ok"));
    assert_eq!(envelope["message"], json!("Counted"));
    assert_eq!(envelope["payload"], json!(4));
}

#[tokio::test]
async fn test_bearer_token_resolves_the_caller_identity() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "jwt-user".to_string(),
        exp: now + 600,
        iat: now,
    };
    let secret = AppConfig::default().jwt_secret;
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();

    let response = client
        .post(format!("{}/items", app.address))
        .header("Authorization", format!("Bearer {token}"))
        .json(&json!({"name": "bread"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let envelope: Value = response.json().await.unwrap();
    let id = envelope["payload"]["id"].as_str().unwrap().to_string();

    let doc = fetch_item(&app, &client, &id).await;
    assert_eq!(doc["created_by"], json!("jwt-user"));

    // A token signed with the wrong secret is rejected.
    let bad_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"wrong-secret"),
    )
    .unwrap();
    let response = client
        .get(format!("{}/items", app.address))
        .header("Authorization", format!("Bearer {bad_token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}
