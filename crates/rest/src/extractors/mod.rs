//! Axum extractors for FHIR-specific request data.
//!
//! - [`RequestContext`] - Request id and cancellation scope
//! - [`Negotiated`] - Negotiated response format
//! - [`FhirBody`] - Request body with its declared format

mod context;
mod fhir_resource;
mod negotiated;

pub use context::{RequestContext, X_REQUEST_ID};
pub use fhir_resource::FhirBody;
pub use negotiated::{Negotiated, format_param};
