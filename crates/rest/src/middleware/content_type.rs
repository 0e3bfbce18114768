//! Content negotiation.
//!
//! The response format is chosen by `_format`, then the first recognised
//! media type in `Accept`, then the configured default. Request bodies are
//! decoded according to `Content-Type` (JSON when absent).

use std::fmt;
use std::str::FromStr;

use axum::http::{HeaderMap, header};

use crate::error::{FhirError, FhirResult};

/// Supported FHIR formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FhirFormat {
    /// JSON format (application/fhir+json)
    #[default]
    Json,
    /// XML format (application/fhir+xml)
    Xml,
}

impl FhirFormat {
    /// Returns the canonical MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            FhirFormat::Json => "application/fhir+json",
            FhirFormat::Xml => "application/fhir+xml",
        }
    }

    /// Parses a `_format` value or media type.
    ///
    /// Media-type parameters (`; charset=...`, `; fhirVersion=...`) are
    /// ignored and matching is case-insensitive.
    pub fn parse(media_type: &str) -> Option<Self> {
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "json" | "text/json" | "application/json" | "application/fhir+json" => {
                Some(FhirFormat::Json)
            }
            "xml" | "text/xml" | "application/xml" | "application/fhir+xml" => {
                Some(FhirFormat::Xml)
            }
            _ => None,
        }
    }
}

impl fmt::Display for FhirFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirFormat::Json => f.write_str("json"),
            FhirFormat::Xml => f.write_str("xml"),
        }
    }
}

impl FromStr for FhirFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FhirFormat::parse(s).ok_or_else(|| format!("unknown format: {}", s))
    }
}

/// Determines the response format.
///
/// Precedence: `_format` > `Accept` (first recognised media type) >
/// `default`. Unrecognised `_format` values fall through to `Accept`.
pub fn negotiate_format(
    headers: &HeaderMap,
    format_param: Option<&str>,
    default: FhirFormat,
) -> FhirFormat {
    if let Some(format) = format_param.and_then(FhirFormat::parse) {
        return format;
    }

    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return default;
    };

    accept
        .split(',')
        .find_map(FhirFormat::parse)
        .unwrap_or(default)
}

/// Determines the format of a request body from its `Content-Type`.
///
/// A missing header means JSON; an unrecognised one is rejected with 415.
pub fn request_format(headers: &HeaderMap) -> FhirResult<FhirFormat> {
    match headers.get(header::CONTENT_TYPE) {
        None => Ok(FhirFormat::Json),
        Some(value) => {
            let content_type = value.to_str().unwrap_or_default();
            FhirFormat::parse(content_type)
                .ok_or_else(|| FhirError::UnsupportedMediaType(content_type.to_string()))
        }
    }
}
