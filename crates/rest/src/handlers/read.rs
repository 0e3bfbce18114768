//! Read interaction handler.
//!
//! Implements the FHIR [read interaction](https://hl7.org/fhir/http.html#read):
//! `GET [base]/[type]/[id]`

use axum::{
    extract::{Path, State},
    response::Response,
};
use tracing::debug;

use crate::error::FhirResult;
use crate::extractors::{Negotiated, RequestContext};
use crate::responses::format::{FhirResponse, render_result};
use crate::state::AppState;

/// Handler for the read interaction.
///
/// # Response
///
/// - `200 OK` - the resource
/// - `404 Not Found` - unknown type, read not supported, or no such resource
pub async fn read_handler(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    Negotiated(format): Negotiated,
    ctx: RequestContext,
) -> Response {
    render_result(read(&state, &ctx, &resource_type, &id).await, format)
}

async fn read(
    state: &AppState,
    ctx: &RequestContext,
    resource_type: &str,
    id: &str,
) -> FhirResult<FhirResponse> {
    debug!(
        resource_type = %resource_type,
        id = %id,
        request_id = %ctx.request_id(),
        "Processing read request"
    );

    let resource = state.registry().read(ctx, resource_type, id).await?;
    Ok(FhirResponse::ok(resource.into_value()))
}
