//! Error types for the capability engine.
//!
//! Every failure raised by the registry, the search pipeline, operation
//! dispatch, content negotiation or a backend is a [`FhirError`]. Errors are
//! propagated unchanged and converted to an OperationOutcome exactly once, at
//! the HTTP boundary.
//!
//! # Error Mapping
//!
//! | Variant | HTTP Status | FHIR Issue Code |
//! |---------|-------------|-----------------|
//! | UnknownResourceType | 404 | not-supported |
//! | NotImplemented (read, search) | 404 | not-supported |
//! | NotImplemented (create, update, delete, operation) | 501 | not-supported |
//! | NotFound | 404 | not-found |
//! | InvalidResource | 500 | exception |
//! | Processing | 400 | processing |
//! | InvalidRequest | 400 | invalid |
//! | MissingId | 500 | exception |
//! | UnsupportedMediaType | 415 | not-supported |
//! | NotAcceptable | 406 | not-supported |
//! | Outcome | derived from issues | preserved |
//! | Remote | status received from the server | preserved |
//! | Other | 500 | exception (fatal) |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::capabilities::Interaction;
use crate::middleware::content_type::FhirFormat;
use crate::responses::operation_outcome::{Issue, IssueType, OperationOutcome};

/// Result alias used throughout the engine.
pub type FhirResult<T> = Result<T, FhirError>;

/// The error type for every engine and backend operation.
#[derive(Debug, Error)]
pub enum FhirError {
    /// The resource type is not part of the type universe.
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    /// The backend does not implement the interaction for this type.
    #[error("{interaction} not implemented for {resource_type}")]
    NotImplemented {
        /// The interaction that was requested.
        interaction: Interaction,
        /// The resource type (or `system` for system-level operations).
        resource_type: String,
    },

    /// The resource does not exist.
    #[error("resource not found: {resource_type}/{id}")]
    NotFound {
        /// The resource type.
        resource_type: String,
        /// The resource id.
        id: String,
    },

    /// A resource had an unexpected type or shape.
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// The request was well formed but could not be processed.
    #[error("{0}")]
    Processing(String),

    /// The query or body could not be parsed.
    #[error("{0}")]
    InvalidRequest(String),

    /// A resource returned by a backend carried no id.
    #[error("{resource_type} resource has no id")]
    MissingId {
        /// The resource type of the offending resource.
        resource_type: String,
    },

    /// The request body format is not supported.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// No acceptable response format could be produced.
    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    /// A structured outcome carrying one or more issues.
    #[error("{}", summarize(.0))]
    Outcome(OperationOutcome),

    /// An error response received from a remote FHIR server.
    #[error("{}", summarize(.outcome))]
    Remote {
        /// The HTTP status the server answered with.
        status: StatusCode,
        /// The server's OperationOutcome.
        outcome: OperationOutcome,
    },

    /// Any other failure, typically raised by a backend.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn summarize(outcome: &OperationOutcome) -> String {
    let parts: Vec<&str> = outcome
        .issues()
        .iter()
        .map(|issue| {
            if issue.diagnostics.is_empty() {
                issue.code.as_str()
            } else {
                issue.diagnostics.as_str()
            }
        })
        .collect();
    if parts.is_empty() {
        "operation outcome without issues".to_string()
    } else {
        parts.join("; ")
    }
}

impl FhirError {
    /// Creates a not-found error.
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        FhirError::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates an error for a malformed request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        FhirError::InvalidRequest(message.into())
    }

    /// Creates a processing error.
    pub fn processing(message: impl Into<String>) -> Self {
        FhirError::Processing(message.into())
    }

    /// Creates an outcome with a single fatal `not-supported` issue.
    pub fn not_supported(message: impl Into<String>) -> Self {
        FhirError::Outcome(OperationOutcome::single(Issue::fatal(
            IssueType::NotSupported,
            message,
        )))
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FhirError::UnknownResourceType(_) => StatusCode::NOT_FOUND,
            FhirError::NotImplemented { interaction, .. } => match interaction {
                Interaction::Read | Interaction::Search => StatusCode::NOT_FOUND,
                _ => StatusCode::NOT_IMPLEMENTED,
            },
            FhirError::NotFound { .. } => StatusCode::NOT_FOUND,
            FhirError::InvalidResource(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FhirError::Processing(_) => StatusCode::BAD_REQUEST,
            FhirError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            FhirError::MissingId { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            FhirError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            FhirError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            FhirError::Outcome(outcome) => outcome.http_status(),
            FhirError::Remote { status, .. } => *status,
            FhirError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts this error into the OperationOutcome sent on the wire.
    pub fn operation_outcome(&self) -> OperationOutcome {
        let code = match self {
            FhirError::UnknownResourceType(_)
            | FhirError::NotImplemented { .. }
            | FhirError::UnsupportedMediaType(_)
            | FhirError::NotAcceptable(_) => IssueType::NotSupported,
            FhirError::NotFound { .. } => IssueType::NotFound,
            FhirError::InvalidResource(_) | FhirError::MissingId { .. } => IssueType::Exception,
            FhirError::Processing(_) => IssueType::Processing,
            FhirError::InvalidRequest(_) => IssueType::Invalid,
            FhirError::Outcome(outcome) | FhirError::Remote { outcome, .. } => {
                return outcome.clone();
            }
            FhirError::Other(_) => {
                return OperationOutcome::new().fatal(IssueType::Exception, self.to_string());
            }
        };
        OperationOutcome::new().error(code, self.to_string())
    }
}

impl From<serde_json::Error> for FhirError {
    fn from(err: serde_json::Error) -> Self {
        FhirError::InvalidRequest(format!("invalid JSON: {}", err))
    }
}

impl IntoResponse for FhirError {
    fn into_response(self) -> Response {
        crate::responses::format::error_response(&self, FhirFormat::Json)
    }
}
