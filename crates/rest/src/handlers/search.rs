//! Search interaction handler.
//!
//! Implements the FHIR [search interaction](https://hl7.org/fhir/http.html#search):
//! - `GET [base]/[type]?params`
//! - `POST [base]/[type]/_search` with a form-encoded body
//!
//! Undeclared parameters are dropped, or rejected when strict handling is
//! configured or requested with `Prefer: handling=strict`.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    response::Response,
};
use tracing::debug;

use super::query_pairs;
use crate::error::FhirResult;
use crate::extractors::{Negotiated, RequestContext};
use crate::middleware::prefer::PreferHeader;
use crate::responses::format::{FhirResponse, render_result};
use crate::search;
use crate::state::AppState;

/// Handler for `GET [base]/[type]?params`.
pub async fn search_get_handler(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    RawQuery(query): RawQuery,
    Negotiated(format): Negotiated,
    prefer: PreferHeader,
    ctx: RequestContext,
) -> Response {
    let pairs = query_pairs(query.as_deref());
    render_result(
        run_search(&state, &ctx, &resource_type, &pairs, &prefer).await,
        format,
    )
}

/// Handler for `POST [base]/[type]/_search`.
///
/// Parameters from the query string and the form body are combined.
pub async fn search_post_handler(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    RawQuery(query): RawQuery,
    Negotiated(format): Negotiated,
    prefer: PreferHeader,
    ctx: RequestContext,
    body: Bytes,
) -> Response {
    let mut pairs = query_pairs(query.as_deref());
    pairs.extend(url::form_urlencoded::parse(&body).into_owned());
    render_result(
        run_search(&state, &ctx, &resource_type, &pairs, &prefer).await,
        format,
    )
}

async fn run_search(
    state: &AppState,
    ctx: &RequestContext,
    resource_type: &str,
    pairs: &[(String, String)],
    prefer: &PreferHeader,
) -> FhirResult<FhirResponse> {
    let strict = prefer.is_strict_or(state.config().strict_search);
    debug!(
        resource_type = %resource_type,
        params = pairs.len(),
        strict,
        request_id = %ctx.request_id(),
        "Processing search request"
    );

    let settings = state.search_settings(Some(strict));
    let bundle = search::execute(
        state.registry(),
        state.statement(),
        ctx,
        resource_type,
        pairs,
        &settings,
    )
    .await?;
    Ok(FhirResponse::ok(bundle))
}
