//! Format-aware response building.
//!
//! Handlers return a [`FhirResponse`]; it is serialized once, in the
//! negotiated format, together with any error raised along the way.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::codec;
use crate::error::FhirError;
use crate::middleware::content_type::FhirFormat;

/// A successful FHIR response before serialization.
#[derive(Debug, Clone)]
pub struct FhirResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Value>,
}

impl FhirResponse {
    /// 200 with a body.
    pub fn ok(body: Value) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    /// A response with the given status and body.
    pub fn with_status(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }

    /// 204 without a body.
    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Adds a header, ignoring values that are not valid header text.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Adds a `Location` header.
    pub fn location(self, url: &str) -> Self {
        self.header(header::LOCATION, url)
    }

    /// Drops the body, keeping status and headers.
    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the body, if any.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Serializes the response in `format`.
    ///
    /// A body that cannot be encoded turns into an error response, rendered
    /// as JSON.
    pub fn render(self, format: FhirFormat) -> Response {
        let Some(body) = self.body else {
            return (self.status, self.headers).into_response();
        };

        match codec::encode(format, &body) {
            Ok(bytes) => {
                let mut response = (self.status, self.headers, bytes).into_response();
                set_content_type(&mut response, format);
                response
            }
            Err(err) => error_response(&err, FhirFormat::Json),
        }
    }
}

fn set_content_type(response: &mut Response, format: FhirFormat) {
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.mime_type()),
    );
}

/// Renders an error as an OperationOutcome in `format`.
pub fn error_response(err: &FhirError, format: FhirFormat) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(status = %status, error = %err, "Request failed");
    } else {
        tracing::debug!(status = %status, error = %err, "Request rejected");
    }

    let outcome = err.operation_outcome().to_json();
    let (format, bytes) = match codec::encode(format, &outcome) {
        Ok(bytes) => (format, bytes),
        Err(_) => (
            FhirFormat::Json,
            serde_json::to_vec(&outcome).unwrap_or_default(),
        ),
    };

    let mut response = (status, bytes).into_response();
    set_content_type(&mut response, format);
    response
}

/// Renders a handler result in `format`.
pub fn render_result(result: Result<FhirResponse, FhirError>, format: FhirFormat) -> Response {
    match result {
        Ok(response) => response.render(format),
        Err(err) => error_response(&err, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::json;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_render_json() {
        let response = FhirResponse::ok(json!({"resourceType": "Patient", "id": "1"}))
            .render(FhirFormat::Json);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/fhir+json"
        );
        assert_eq!(body_json(response).await["id"], "1");
    }

    #[tokio::test]
    async fn test_render_created_with_location() {
        let response =
            FhirResponse::with_status(StatusCode::CREATED, json!({"resourceType": "Patient"}))
                .location("http://localhost/Patient/1")
                .render(FhirFormat::Json);

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "http://localhost/Patient/1"
        );
    }

    #[tokio::test]
    async fn test_no_content_has_no_content_type() {
        let response = FhirResponse::no_content().render(FhirFormat::Json);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_error_response_is_outcome() {
        let err = FhirError::not_found("Patient", "missing");
        let response = error_response(&err, FhirFormat::Json);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["resourceType"], "OperationOutcome");
        assert_eq!(body["issue"][0]["code"], "not-found");
    }

    #[cfg(feature = "xml")]
    #[tokio::test]
    async fn test_error_response_in_xml() {
        let err = FhirError::invalid_request("bad");
        let response = error_response(&err, FhirFormat::Xml);

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/fhir+xml"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("<OperationOutcome"));
    }

    #[cfg(not(feature = "xml"))]
    #[tokio::test]
    async fn test_xml_without_feature_is_not_acceptable() {
        let response = FhirResponse::ok(json!({"resourceType": "Patient"})).render(FhirFormat::Xml);
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }
}
