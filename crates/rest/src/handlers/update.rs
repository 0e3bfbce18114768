//! Update interaction handler.
//!
//! Implements the FHIR [update interaction](https://hl7.org/fhir/http.html#update):
//! `PUT [base]/[type]/[id]`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use tracing::debug;

use super::create::check_type;
use crate::capabilities::Interaction;
use crate::error::{FhirError, FhirResult};
use crate::extractors::{FhirBody, Negotiated, RequestContext};
use crate::middleware::prefer::PreferHeader;
use crate::responses::bundle::full_url;
use crate::responses::format::{FhirResponse, render_result};
use crate::state::AppState;

/// Handler for the update interaction.
///
/// The body's `id` must match the URL; a body without an id takes the one
/// from the URL.
///
/// # Response
///
/// - `200 OK` - the resource was updated
/// - `201 Created` - the backend created the resource (update as create)
/// - `400 Bad Request` - malformed body, type or id mismatch
/// - `501 Not Implemented` - update not supported for the type
pub async fn update_handler(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    Negotiated(format): Negotiated,
    prefer: PreferHeader,
    ctx: RequestContext,
    body: FhirBody,
) -> Response {
    render_result(
        update(&state, &ctx, &resource_type, &id, &prefer, body).await,
        format,
    )
}

async fn update(
    state: &AppState,
    ctx: &RequestContext,
    resource_type: &str,
    id: &str,
    prefer: &PreferHeader,
    body: FhirBody,
) -> FhirResult<FhirResponse> {
    debug!(
        resource_type = %resource_type,
        id = %id,
        request_id = %ctx.request_id(),
        "Processing update request"
    );

    state
        .registry()
        .ensure_supported(resource_type, Interaction::Update)?;
    let mut resource = body.into_resource()?;
    check_type(&resource, resource_type)?;
    match resource.id() {
        Some(body_id) if body_id != id => {
            return Err(FhirError::invalid_request(format!(
                "resource id '{}' does not match URL id '{}'",
                body_id, id
            )));
        }
        Some(_) => {}
        None => resource.set_id(id),
    }

    let outcome = state.registry().update(ctx, resource_type, resource).await?;
    let response = if outcome.created {
        let location = full_url(state.base_url(), &outcome.resource)?;
        FhirResponse::with_status(StatusCode::CREATED, outcome.resource.into_value())
            .location(&location)
    } else {
        FhirResponse::ok(outcome.resource.into_value())
    };

    Ok(if prefer.is_minimal() {
        response.without_body()
    } else {
        response
    })
}
