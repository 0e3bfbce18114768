//! FHIR route configuration.

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::handlers;
use crate::state::AppState;

/// Creates all FHIR REST API routes.
///
/// # Routes
///
/// ## System-level
/// - `GET /metadata` - CapabilityStatement
/// - `GET|POST /$code` - System operation
///
/// ## Type-level
/// - `GET /{type}` - Search
/// - `POST /{type}` - Create
/// - `POST /{type}/_search` - Search (form body)
/// - `GET|POST /{type}/$code` - Type operation
///
/// ## Instance-level
/// - `GET /{type}/{id}` - Read
/// - `PUT /{type}/{id}` - Update
/// - `DELETE /{type}/{id}` - Delete
/// - `GET|POST /{type}/{id}/$code` - Instance operation
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // System-level routes
        .route("/metadata", get(handlers::capabilities_handler))
        // Type-level routes (and system operations)
        .route("/{resource_type}", get(handlers::segment_get_handler))
        .route("/{resource_type}", post(handlers::segment_post_handler))
        .route(
            "/{resource_type}/_search",
            post(handlers::search_post_handler),
        )
        // Instance-level routes (and type operations)
        .route("/{resource_type}/{id}", get(handlers::instance_get_handler))
        .route("/{resource_type}/{id}", post(handlers::instance_post_handler))
        .route("/{resource_type}/{id}", put(handlers::update_handler))
        .route("/{resource_type}/{id}", delete(handlers::delete_handler))
        // Instance operations
        .route(
            "/{resource_type}/{id}/{operation}",
            get(handlers::instance_operation_get_handler),
        )
        .route(
            "/{resource_type}/{id}/{operation}",
            post(handlers::instance_operation_post_handler),
        )
        .fallback(handlers::fallback_handler)
        .with_state(state)
}
