//! Wire codecs for FHIR resources.
//!
//! JSON goes through `serde_json`; XML goes through the [`crate::xml`]
//! bridge when the `xml` feature is enabled.

use serde_json::Value;

use crate::error::{FhirError, FhirResult};
use crate::middleware::content_type::FhirFormat;
use crate::resource::Resource;

/// Serializes a FHIR JSON value in the given format.
pub fn encode(format: FhirFormat, value: &Value) -> FhirResult<Vec<u8>> {
    match format {
        FhirFormat::Json => serde_json::to_vec(value)
            .map_err(|e| FhirError::InvalidResource(format!("JSON serialization failed: {}", e))),
        #[cfg(feature = "xml")]
        FhirFormat::Xml => crate::xml::to_xml(value)
            .map(String::into_bytes)
            .map_err(|e| FhirError::InvalidResource(e.to_string())),
        #[cfg(not(feature = "xml"))]
        FhirFormat::Xml => Err(FhirError::NotAcceptable(
            "XML responses require the xml feature".to_string(),
        )),
    }
}

/// Parses a request body in the given format into FHIR JSON.
pub fn decode(format: FhirFormat, body: &[u8]) -> FhirResult<Value> {
    match format {
        FhirFormat::Json => Ok(serde_json::from_slice(body)?),
        #[cfg(feature = "xml")]
        FhirFormat::Xml => {
            let text = std::str::from_utf8(body).map_err(|e| {
                FhirError::invalid_request(format!("invalid UTF-8 in XML body: {}", e))
            })?;
            crate::xml::from_xml(text).map_err(|e| FhirError::invalid_request(e.to_string()))
        }
        #[cfg(not(feature = "xml"))]
        FhirFormat::Xml => Err(FhirError::UnsupportedMediaType(
            "XML request bodies require the xml feature".to_string(),
        )),
    }
}

/// Parses a request body into a [`Resource`].
pub fn decode_resource(format: FhirFormat, body: &[u8]) -> FhirResult<Resource> {
    if body.is_empty() {
        return Err(FhirError::invalid_request("request body is empty"));
    }
    Resource::from_value(decode(format, body)?)
}
