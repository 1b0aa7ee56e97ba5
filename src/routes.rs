use crate::{AppState, config::EntityConfig, handlers, handlers::EntityContext};
use axum::{
    Extension, Router,
    routing::{delete, get},
};

/// entity_routes
///
/// The route group every entity exposes. All seven routes require a valid
/// bearer token (enforced by the `AuthUser` extractor in each handler) and
/// forward to the entity's database worker over the bus.
///
/// `EntityContext` rides in as a request extension so the same handler set
/// serves every configured entity; the caller nests the returned router
/// under the entity's endpoint path.
pub fn entity_routes(entity: &EntityConfig) -> Router<AppState> {
    Router::new()
        // GET /?select=...&query=...&from=...&to=...
        // Filtered, projected, paginated listing.
        .route(
            "/",
            get(handlers::find_all)
                // POST /: create a document (audit fields stamped server-side).
                .post(handlers::create)
                // PUT /: partial update addressed by the body's `_id`.
                .put(handlers::update),
        )
        // GET /{id}: single lookup; DELETE /{id}: hard delete.
        .route(
            "/{id}",
            get(handlers::find_by_id).delete(handlers::delete_by_id),
        )
        // GET /action/count: unfiltered collection total.
        .route("/action/count", get(handlers::count))
        // DELETE /action/hide/{id}: soft delete (active=false).
        .route("/action/hide/{id}", delete(handlers::hide_by_id))
        .layer(Extension(EntityContext {
            name: entity.name.clone(),
        }))
}
