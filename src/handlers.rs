use crate::{
    AppState,
    auth::AuthUser,
    bus::{Action, DbReply, DbResult},
    models::{
        ApiResponse, INVALID_PARAMETER, MISSING_REQUIRED_VALUE, PropertyError,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

/// EntityContext
///
/// Identifies which entity a route group serves. Injected as a request
/// extension by `entity_routes`, so the same seven handlers serve every
/// configured entity.
#[derive(Debug, Clone)]
pub struct EntityContext {
    pub name: String,
}

/// ListParams
///
/// The accepted query parameters for the list endpoint: `select` is a
/// comma-separated projection, `query` a comma-separated filter-clause
/// string, `from`/`to` the pagination bounds (applied both-or-neither).
#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub select: Option<String>,
    pub query: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Maps a bus reply onto the response envelope: success body with the given
/// status text, tagged warning as a warning envelope, fatal failure as a
/// generic error carrying the numeric code and message text.
fn respond(result: DbResult, ok_message: &str) -> ApiResponse {
    match result {
        Ok(DbReply::Ok(body)) => ApiResponse::ok(body, ok_message),
        Ok(DbReply::Warning(message)) => ApiResponse::warning(message),
        Err(error) => ApiResponse::error(json!({
            "code": error.code(),
            "message": error.to_string(),
        })),
    }
}

/// Same mapping for the operations whose success reply carries no body.
fn respond_empty(result: DbResult, ok_message: &str) -> ApiResponse {
    match result {
        Ok(DbReply::Ok(_)) => ApiResponse::ok_empty(ok_message),
        Ok(DbReply::Warning(message)) => ApiResponse::warning(message),
        Err(error) => ApiResponse::error(json!({
            "code": error.code(),
            "message": error.to_string(),
        })),
    }
}

/// find_all
///
/// `GET /`: lists documents with ad-hoc filtering, projection and
/// pagination. The raw string parameters travel to the database tier as-is;
/// parsing and the lenient drop of malformed clauses happen there.
pub async fn find_all(
    _user: AuthUser,
    State(state): State<AppState>,
    Extension(entity): Extension<EntityContext>,
    Query(params): Query<ListParams>,
) -> ApiResponse {
    let body = json!({
        "select": params.select,
        "query": params.query,
        "from": params.from,
        "to": params.to,
    });
    respond(
        state.bus.send(&entity.name, Action::FindAll, body).await,
        "Found",
    )
}

/// find_by_id
///
/// `GET /{id}`: single-document lookup. An absent document is a success
/// with a null payload, not an error.
pub async fn find_by_id(
    _user: AuthUser,
    State(state): State<AppState>,
    Extension(entity): Extension<EntityContext>,
    Path(id): Path<String>,
) -> ApiResponse {
    let body = json!({ "_id": id });
    respond(
        state.bus.send(&entity.name, Action::FindById, body).await,
        "Found",
    )
}

/// count
///
/// `GET /action/count`: unfiltered total for the entity's collection.
pub async fn count(
    _user: AuthUser,
    State(state): State<AppState>,
    Extension(entity): Extension<EntityContext>,
) -> ApiResponse {
    respond(
        state.bus.send(&entity.name, Action::Count, Value::Null).await,
        "Counted",
    )
}

/// create
///
/// `POST /`: inserts a new document. The caller may not pick a numeric
/// identifier; audit fields are stamped server-side and override anything
/// the caller supplied: `created_at` (epoch millis), `created_by` (the
/// authenticated identity), `active=true`, while any `updated_at`/
/// `updated_by` are stripped.
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    Extension(entity): Extension<EntityContext>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let Value::Object(mut doc) = body else {
        return ApiResponse::invalid_data(PropertyError::new("body", INVALID_PARAMETER));
    };
    if doc.get("_id").is_some_and(Value::is_number) {
        return ApiResponse::invalid_data(PropertyError::new("id", INVALID_PARAMETER));
    }

    doc.insert("created_at".to_string(), json!(Utc::now().timestamp_millis()));
    doc.insert("created_by".to_string(), json!(user.id));
    doc.insert("active".to_string(), json!(true));
    doc.remove("updated_at");
    doc.remove("updated_by");

    respond(
        state
            .bus
            .send(&entity.name, Action::Create, Value::Object(doc))
            .await,
        "Created",
    )
}

/// update
///
/// `PUT /`: partial update addressed by the `_id` carried in the body.
/// The creation audit fields are stripped so an update can never rewrite
/// them; `updated_at`/`updated_by` are stamped server-side. A zero-match
/// update comes back as a warning, distinguishing "executed, no match"
/// from "failed".
pub async fn update(
    user: AuthUser,
    State(state): State<AppState>,
    Extension(entity): Extension<EntityContext>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let Value::Object(mut doc) = body else {
        return ApiResponse::invalid_data(PropertyError::new("body", INVALID_PARAMETER));
    };
    if doc.get("_id").and_then(Value::as_str).is_none() {
        return ApiResponse::invalid_data(PropertyError::new("id", MISSING_REQUIRED_VALUE));
    }

    doc.remove("created_at");
    doc.remove("created_by");
    doc.insert("updated_at".to_string(), json!(Utc::now().timestamp_millis()));
    doc.insert("updated_by".to_string(), json!(user.id));

    respond_empty(
        state
            .bus
            .send(&entity.name, Action::Update, Value::Object(doc))
            .await,
        "Updated",
    )
}

/// delete_by_id
///
/// `DELETE /{id}`: hard delete. Zero matches reply with the not-found
/// warning.
pub async fn delete_by_id(
    _user: AuthUser,
    State(state): State<AppState>,
    Extension(entity): Extension<EntityContext>,
    Path(id): Path<String>,
) -> ApiResponse {
    let body = json!({ "_id": id });
    respond_empty(
        state.bus.send(&entity.name, Action::DeleteById, body).await,
        "Deleted",
    )
}

/// hide_by_id
///
/// `DELETE /action/hide/{id}`: soft delete: flips `active` to false and
/// keeps the document.
pub async fn hide_by_id(
    _user: AuthUser,
    State(state): State<AppState>,
    Extension(entity): Extension<EntityContext>,
    Path(id): Path<String>,
) -> ApiResponse {
    let body = json!({ "_id": id });
    respond_empty(
        state.bus.send(&entity.name, Action::HideById, body).await,
        "Hidden",
    )
}
