//! Response building.
//!
//! - [`operation_outcome`] - OperationOutcome model and status derivation
//! - [`bundle`] - Searchset Bundle building
//! - [`format`] - Serialization in the negotiated format

pub mod bundle;
pub mod format;
pub mod operation_outcome;

pub use bundle::BundleBuilder;
pub use format::{FhirResponse, error_response, render_result};
pub use operation_outcome::{Issue, IssueSeverity, IssueType, OperationOutcome};
