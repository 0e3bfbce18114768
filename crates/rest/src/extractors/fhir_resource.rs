//! FHIR request body extractor.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};

use crate::codec;
use crate::error::{FhirError, FhirResult};
use crate::middleware::content_type::{FhirFormat, request_format};
use crate::resource::Resource;

/// A raw request body together with its declared format.
///
/// Extraction never fails; decoding errors (unsupported `Content-Type`,
/// malformed payloads, body read failures) surface from
/// [`FhirBody::into_resource`] so they can be rendered in the negotiated
/// response format.
#[derive(Debug)]
pub struct FhirBody {
    format: FhirResult<FhirFormat>,
    bytes: FhirResult<Bytes>,
}

impl FhirBody {
    /// Returns true when the request carried no payload.
    pub fn is_empty(&self) -> bool {
        self.bytes.as_ref().map(|b| b.is_empty()).unwrap_or(false)
    }

    /// Decodes the body into a resource.
    pub fn into_resource(self) -> FhirResult<Resource> {
        let format = self.format?;
        let bytes = self.bytes?;
        codec::decode_resource(format, &bytes)
    }
}

impl<S> FromRequest<S> for FhirBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let format = request_format(req.headers());
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| FhirError::invalid_request(format!("failed to read body: {}", e)));
        Ok(Self { format, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    async fn extract(content_type: Option<&str>, body: &'static str) -> FhirBody {
        let mut builder = Request::builder().method("POST").uri("/Patient");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder.body(axum::body::Body::from(body)).unwrap();
        FhirBody::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_json_body() {
        let body = extract(
            Some("application/fhir+json; charset=utf-8"),
            r#"{"resourceType": "Patient", "id": "1"}"#,
        )
        .await;
        let resource = body.into_resource().unwrap();
        assert_eq!(resource.id(), Some("1"));
    }

    #[tokio::test]
    async fn test_missing_content_type_is_json() {
        let body = extract(None, r#"{"resourceType": "Patient"}"#).await;
        assert!(body.into_resource().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_content_type() {
        let body = extract(Some("text/plain"), "hello").await;
        assert!(matches!(
            body.into_resource(),
            Err(FhirError::UnsupportedMediaType(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let body = extract(None, "").await;
        assert!(body.is_empty());
        assert!(body.into_resource().is_err());
    }
}
