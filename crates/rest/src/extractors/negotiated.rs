//! Response format extractor.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::middleware::content_type::{FhirFormat, negotiate_format};
use crate::state::AppState;

/// The response format negotiated from `_format`, `Accept` and the
/// configured default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated(pub FhirFormat);

/// Returns the first `_format` value in a raw query string.
pub fn format_param(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "_format")
        .map(|(_, value)| value.into_owned())
}

impl FromRequestParts<AppState> for Negotiated {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let param = format_param(parts.uri.query());
        Ok(Negotiated(negotiate_format(
            &parts.headers,
            param.as_deref(),
            state.config().default_format,
        )))
    }
}
