//! HTTP request handlers for FHIR interactions.
//!
//! - [`capabilities`] - CapabilityStatement (`/metadata`)
//! - [`read`] - Read a resource by id
//! - [`search`] - Type-level search (GET and POST)
//! - [`create`] - Create a resource
//! - [`update`] - Update a resource
//! - [`delete`] - Delete a resource
//! - [`operation`] - System, type and instance level `$operation`s
//!
//! A few URL shapes are shared between interactions (`/{type}` is search,
//! `/$code` is a system operation); the dispatching handlers in this module
//! pick the interaction from the path segment.

pub mod capabilities;
pub mod create;
pub mod delete;
pub mod operation;
pub mod read;
pub mod search;
pub mod update;

use axum::{
    extract::{Path, RawQuery, State},
    response::Response,
};

pub use capabilities::capabilities_handler;
pub use create::create_handler;
pub use delete::delete_handler;
pub use operation::{instance_operation_get_handler, instance_operation_post_handler};
pub use read::read_handler;
pub use search::{search_get_handler, search_post_handler};
pub use update::update_handler;

use crate::error::FhirError;
use crate::extractors::{FhirBody, Negotiated, RequestContext};
use crate::middleware::prefer::PreferHeader;
use crate::operations::OperationRequest;
use crate::responses::format::{error_response, render_result};
use crate::state::AppState;

/// Decodes a raw query string into ordered pairs, keeping repeated keys.
pub(crate) fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// `GET /{segment}`: search, or a system operation when the segment is
/// `$code`.
pub async fn segment_get_handler(
    state: State<AppState>,
    Path(segment): Path<String>,
    query: RawQuery,
    negotiated: Negotiated,
    prefer: PreferHeader,
    ctx: RequestContext,
) -> Response {
    if segment.starts_with('$') {
        operation::operation_get(state, OperationRequest::system(&segment), query, negotiated, ctx)
            .await
    } else {
        search::search_get_handler(state, Path(segment), query, negotiated, prefer, ctx).await
    }
}

/// `POST /{segment}`: create, or a system operation when the segment is
/// `$code`.
pub async fn segment_post_handler(
    state: State<AppState>,
    Path(segment): Path<String>,
    negotiated: Negotiated,
    prefer: PreferHeader,
    ctx: RequestContext,
    body: FhirBody,
) -> Response {
    if segment.starts_with('$') {
        operation::operation_post(state, OperationRequest::system(&segment), negotiated, ctx, body)
            .await
    } else {
        create::create_handler(state, Path(segment), negotiated, prefer, ctx, body).await
    }
}

/// `GET /{type}/{id}`: read, or a type operation when the id is `$code`.
pub async fn instance_get_handler(
    state: State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    query: RawQuery,
    negotiated: Negotiated,
    ctx: RequestContext,
) -> Response {
    if id.starts_with('$') {
        let request = OperationRequest::type_level(&resource_type, &id);
        operation::operation_get(state, request, query, negotiated, ctx).await
    } else {
        read::read_handler(state, Path((resource_type, id)), negotiated, ctx).await
    }
}

/// `POST /{type}/{id}`: only type operations (`$code`) are accepted here.
pub async fn instance_post_handler(
    state: State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    negotiated: Negotiated,
    ctx: RequestContext,
    body: FhirBody,
) -> Response {
    if id.starts_with('$') {
        let request = OperationRequest::type_level(&resource_type, &id);
        operation::operation_post(state, request, negotiated, ctx, body).await
    } else {
        let Negotiated(format) = negotiated;
        error_response(
            &FhirError::invalid_request(format!(
                "POST is not supported on {}/{}",
                resource_type, id
            )),
            format,
        )
    }
}

/// Fallback for paths outside the FHIR URL scheme.
pub async fn fallback_handler(negotiated: Negotiated) -> Response {
    let Negotiated(format) = negotiated;
    render_result(
        Err(FhirError::invalid_request("unsupported request path")),
        format,
    )
}
