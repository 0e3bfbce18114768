//! Prefer header handling.
//!
//! Two directives are honoured:
//!
//! - `handling=strict|lenient` overrides the configured treatment of
//!   undeclared search parameters and includes;
//! - `return=minimal` suppresses the response body of create and update.
//!
//! See: https://hl7.org/fhir/R4/http.html#prefer

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

/// Extracted Prefer header values from a request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreferHeader {
    return_preference: Option<String>,
    handling: Option<String>,
}

impl PreferHeader {
    /// Parses the Prefer header(s) of a request.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut result = Self::default();

        for value in headers.get_all("prefer") {
            let Ok(prefer) = value.to_str() else {
                continue;
            };
            for directive in prefer.split([',', ';']) {
                let directive = directive.trim();

                if let Some(value) = directive.strip_prefix("return=") {
                    result.return_preference = Some(value.to_string());
                } else if let Some(value) = directive.strip_prefix("handling=") {
                    result.handling = Some(value.to_string());
                }
            }
        }

        result
    }

    /// Returns the handling preference, if given.
    pub fn handling(&self) -> Option<&str> {
        self.handling.as_deref()
    }

    /// Resolves strict handling, falling back to `default` when the client
    /// expressed no (or an unknown) preference.
    pub fn is_strict_or(&self, default: bool) -> bool {
        match self.handling.as_deref() {
            Some("strict") => true,
            Some("lenient") => false,
            _ => default,
        }
    }

    /// Checks if minimal return is requested.
    pub fn is_minimal(&self) -> bool {
        self.return_preference.as_deref() == Some("minimal")
    }
}

impl<S> FromRequestParts<S> for PreferHeader
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PreferHeader::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn prefer(value: &'static str) -> PreferHeader {
        let mut headers = HeaderMap::new();
        headers.insert("prefer", HeaderValue::from_static(value));
        PreferHeader::from_headers(&headers)
    }

    #[test]
    fn test_handling_strict() {
        let prefer = prefer("handling=strict");
        assert_eq!(prefer.handling(), Some("strict"));
        assert!(prefer.is_strict_or(false));
    }

    #[test]
    fn test_handling_lenient_overrides_default() {
        assert!(!prefer("handling=lenient").is_strict_or(true));
    }

    #[test]
    fn test_unknown_handling_uses_default() {
        let prefer = prefer("handling=sloppy");
        assert!(prefer.is_strict_or(true));
        assert!(!prefer.is_strict_or(false));
    }

    #[test]
    fn test_multiple_directives() {
        let prefer = prefer("return=minimal, handling=lenient");
        assert!(prefer.is_minimal());
        assert_eq!(prefer.handling(), Some("lenient"));
    }

    #[test]
    fn test_empty() {
        let prefer = PreferHeader::from_headers(&HeaderMap::new());
        assert!(prefer.handling().is_none());
        assert!(!prefer.is_minimal());
        assert!(prefer.is_strict_or(true));
    }
}
