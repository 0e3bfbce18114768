//! Extended operation handlers.
//!
//! - `GET|POST [base]/$code` - system level
//! - `GET|POST [base]/[type]/$code` - type level
//! - `GET|POST [base]/[type]/[id]/$code` - instance level
//!
//! GET parameters come from the query string; POST bodies must be a
//! `Parameters` resource. A backend returning no resource yields
//! `204 No Content`.

use axum::{
    extract::{Path, RawQuery, State},
    response::Response,
};
use tracing::debug;

use super::query_pairs;
use crate::error::{FhirError, FhirResult};
use crate::extractors::{FhirBody, Negotiated, RequestContext};
use crate::operations::{self, OperationInput, OperationRequest};
use crate::resource::Resource;
use crate::responses::format::{FhirResponse, render_result};
use crate::state::AppState;

/// `GET [base]/[type]/[id]/$code`
pub async fn instance_operation_get_handler(
    state: State<AppState>,
    Path((resource_type, id, code)): Path<(String, String, String)>,
    query: RawQuery,
    negotiated: Negotiated,
    ctx: RequestContext,
) -> Response {
    match instance_request(&resource_type, &id, &code) {
        Ok(request) => operation_get(state, request, query, negotiated, ctx).await,
        Err(err) => render_result(Err(err), negotiated.0),
    }
}

/// `POST [base]/[type]/[id]/$code`
pub async fn instance_operation_post_handler(
    state: State<AppState>,
    Path((resource_type, id, code)): Path<(String, String, String)>,
    negotiated: Negotiated,
    ctx: RequestContext,
    body: FhirBody,
) -> Response {
    match instance_request(&resource_type, &id, &code) {
        Ok(request) => operation_post(state, request, negotiated, ctx, body).await,
        Err(err) => render_result(Err(err), negotiated.0),
    }
}

fn instance_request(resource_type: &str, id: &str, code: &str) -> FhirResult<OperationRequest> {
    if !code.starts_with('$') {
        return Err(FhirError::invalid_request(format!(
            "unsupported request path {}/{}/{}",
            resource_type, id, code
        )));
    }
    Ok(OperationRequest::instance(resource_type, id, code))
}

pub(crate) async fn operation_get(
    State(state): State<AppState>,
    request: OperationRequest,
    RawQuery(query): RawQuery,
    Negotiated(format): Negotiated,
    ctx: RequestContext,
) -> Response {
    let input = OperationInput::Query(query_pairs(query.as_deref()));
    render_result(invoke(&state, &ctx, request, Ok(input)).await, format)
}

pub(crate) async fn operation_post(
    State(state): State<AppState>,
    request: OperationRequest,
    Negotiated(format): Negotiated,
    ctx: RequestContext,
    body: FhirBody,
) -> Response {
    let input = if body.is_empty() {
        Ok(OperationInput::Body(Resource::new("Parameters")))
    } else {
        body.into_resource().map(OperationInput::Body)
    };
    render_result(invoke(&state, &ctx, request, input).await, format)
}

async fn invoke(
    state: &AppState,
    ctx: &RequestContext,
    request: OperationRequest,
    input: FhirResult<OperationInput>,
) -> FhirResult<FhirResponse> {
    debug!(
        code = %request.code,
        level = request.level().definition_flag(),
        resource_type = ?request.resource_type,
        id = ?request.resource_id,
        request_id = %ctx.request_id(),
        "Processing operation request"
    );

    let input = input?;
    let output =
        operations::dispatch(state.registry(), state.statement(), ctx, request, input).await?;
    Ok(match output {
        Some(resource) => FhirResponse::ok(resource.into_value()),
        None => FhirResponse::no_content(),
    })
}
