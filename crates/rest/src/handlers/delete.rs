//! Delete interaction handler.
//!
//! Implements the FHIR [delete interaction](https://hl7.org/fhir/http.html#delete):
//! `DELETE [base]/[type]/[id]`

use axum::{
    extract::{Path, State},
    response::Response,
};
use tracing::debug;

use crate::extractors::{Negotiated, RequestContext};
use crate::responses::format::{FhirResponse, render_result};
use crate::state::AppState;

/// Handler for the delete interaction. Returns `204 No Content` on success.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    Negotiated(format): Negotiated,
    ctx: RequestContext,
) -> Response {
    debug!(
        resource_type = %resource_type,
        id = %id,
        request_id = %ctx.request_id(),
        "Processing delete request"
    );

    let result = state
        .registry()
        .delete(&ctx, &resource_type, &id)
        .await
        .map(|()| FhirResponse::no_content());
    render_result(result, format)
}
