//! HTTP middleware and header handling.
//!
//! - [`content_type`] - Content negotiation
//! - [`prefer`] - Prefer header handling
//! - [`logging`] - Request logging with a byte-counting response body

pub mod content_type;
pub mod logging;
pub mod prefer;

pub use content_type::FhirFormat;
pub use logging::request_logging;
pub use prefer::PreferHeader;
