//! Capabilities (CapabilityStatement) handler.
//!
//! Implements the FHIR [capabilities interaction](https://hl7.org/fhir/http.html#capabilities):
//! `GET [base]/metadata`
//!
//! The statement is synthesized once, when the [`AppState`] is built, so
//! repeated requests return identical documents.

use axum::{extract::State, response::Response};
use tracing::debug;

use crate::extractors::Negotiated;
use crate::responses::format::FhirResponse;
use crate::state::AppState;

/// Handler for the capabilities interaction.
pub async fn capabilities_handler(
    State(state): State<AppState>,
    Negotiated(format): Negotiated,
) -> Response {
    debug!(format = %format, "Processing capabilities request");
    FhirResponse::ok(state.statement().to_json()).render(format)
}
