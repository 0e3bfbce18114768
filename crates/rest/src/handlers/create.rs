//! Create interaction handler.
//!
//! Implements the FHIR [create interaction](https://hl7.org/fhir/http.html#create):
//! `POST [base]/[type]`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use tracing::debug;

use crate::capabilities::Interaction;
use crate::error::{FhirError, FhirResult};
use crate::extractors::{FhirBody, Negotiated, RequestContext};
use crate::middleware::prefer::PreferHeader;
use crate::resource::Resource;
use crate::responses::bundle::full_url;
use crate::responses::format::{FhirResponse, render_result};
use crate::state::AppState;

/// Handler for the create interaction.
///
/// # Response
///
/// - `201 Created` - with `Location` set to the new resource's URL; the
///   body is omitted for `Prefer: return=minimal`
/// - `400 Bad Request` - malformed body, or a body of another type
/// - `415 Unsupported Media Type` - unknown `Content-Type`
/// - `501 Not Implemented` - create not supported for the type
pub async fn create_handler(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Negotiated(format): Negotiated,
    prefer: PreferHeader,
    ctx: RequestContext,
    body: FhirBody,
) -> Response {
    render_result(
        create(&state, &ctx, &resource_type, &prefer, body).await,
        format,
    )
}

async fn create(
    state: &AppState,
    ctx: &RequestContext,
    resource_type: &str,
    prefer: &PreferHeader,
    body: FhirBody,
) -> FhirResult<FhirResponse> {
    debug!(
        resource_type = %resource_type,
        request_id = %ctx.request_id(),
        "Processing create request"
    );

    state
        .registry()
        .ensure_supported(resource_type, Interaction::Create)?;
    let resource = body.into_resource()?;
    check_type(&resource, resource_type)?;

    let created = state.registry().create(ctx, resource_type, resource).await?;
    let location = full_url(state.base_url(), &created)?;
    debug!(location = %location, "Resource created");

    let response = FhirResponse::with_status(StatusCode::CREATED, created.into_value())
        .location(&location);
    Ok(if prefer.is_minimal() {
        response.without_body()
    } else {
        response
    })
}

/// Rejects bodies whose `resourceType` does not match the endpoint.
pub(crate) fn check_type(resource: &Resource, resource_type: &str) -> FhirResult<()> {
    if resource.resource_type() != resource_type {
        return Err(FhirError::invalid_request(format!(
            "resource type '{}' does not match endpoint '{}'",
            resource.resource_type(),
            resource_type
        )));
    }
    Ok(())
}
