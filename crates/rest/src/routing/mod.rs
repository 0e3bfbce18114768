//! Route configuration mapping FHIR URLs to handlers.

pub mod fhir_routes;

pub use fhir_routes::create_routes;
