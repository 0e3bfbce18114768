//! HTTP client for FHIR servers.
//!
//! Speaks JSON, decodes error responses into [`FhirError::Remote`] (status
//! and issue list preserved) and turns searchset Bundles back into [`SearchResult`]s,
//! reading the continuation cursor from the `next` link's `_cursor`
//! parameter.
//!
//! ```rust,no_run
//! use helios_engine::client::Client;
//! use helios_engine::search::SearchOptions;
//!
//! # async fn run() -> helios_engine::FhirResult<()> {
//! let client = Client::new("http://localhost:8080")?;
//! let mut pages = client.search_pages("Patient", SearchOptions::new(50)).await?;
//! while let Some(page) = pages.next().await? {
//!     println!("{} patients", page.resources.len());
//! }
//! # Ok(())
//! # }
//! ```

mod pages;

pub use pages::{PageSource, SearchPages};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::capabilities::UpdateOutcome;
use crate::error::{FhirError, FhirResult};
use crate::resource::Resource;
use crate::responses::operation_outcome::{IssueType, OperationOutcome};
use crate::search::links::request_query;
use crate::search::{SearchOptions, SearchResult};

const FHIR_JSON: &str = "application/fhir+json";

/// HTTP client for a FHIR server.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client for `base_url`.
    pub fn new(base_url: &str) -> FhirResult<Self> {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    /// Creates a client reusing an existing `reqwest` client.
    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> FhirResult<Self> {
        url::Url::parse(base_url).map_err(|e| {
            FhirError::invalid_request(format!("invalid base URL '{}': {}", base_url, e))
        })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, FHIR_JSON)
    }

    fn with_body(builder: RequestBuilder, resource: &Resource) -> FhirResult<RequestBuilder> {
        let body = serde_json::to_vec(resource.as_value())
            .map_err(|e| FhirError::InvalidResource(e.to_string()))?;
        Ok(builder
            .header(reqwest::header::CONTENT_TYPE, FHIR_JSON)
            .body(body))
    }

    async fn send(&self, builder: RequestBuilder) -> FhirResult<(StatusCode, Option<Value>)> {
        let response = builder.send().await.map_err(anyhow::Error::from)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(anyhow::Error::from)?;
        debug!(status = %status, bytes = bytes.len(), "FHIR response");

        let body = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice::<Value>(&bytes).ok()
        };

        if !status.is_success() {
            return Err(decode_error(status, body.as_ref(), &bytes));
        }
        Ok((status, body))
    }

    async fn send_resource(&self, builder: RequestBuilder) -> FhirResult<Resource> {
        match self.send(builder).await? {
            (_, Some(body)) => Resource::from_value(body),
            (status, None) => Err(FhirError::InvalidResource(format!(
                "expected a resource in the {} response",
                status
            ))),
        }
    }

    /// Fetches the server's CapabilityStatement.
    pub async fn capabilities(&self) -> FhirResult<Resource> {
        self.send_resource(self.request(Method::GET, "metadata")).await
    }

    /// Reads a resource.
    pub async fn read(&self, resource_type: &str, id: &str) -> FhirResult<Resource> {
        self.send_resource(self.request(Method::GET, &format!("{}/{}", resource_type, id)))
            .await
    }

    /// Runs one page of a type-level search.
    pub async fn search(
        &self,
        resource_type: &str,
        options: &SearchOptions,
    ) -> FhirResult<SearchResult> {
        let path = format!("{}?{}", resource_type, request_query(options));
        let bundle = self.send_resource(self.request(Method::GET, &path)).await?;
        bundle_to_result(bundle)
    }

    /// Runs a search and returns an iterator over all of its pages.
    pub async fn search_pages(
        &self,
        resource_type: &str,
        options: SearchOptions,
    ) -> FhirResult<SearchPages<'_, Self>> {
        let seed = self.search(resource_type, &options).await?;
        Ok(SearchPages::new(self, resource_type, options, seed))
    }

    /// Creates a resource and returns the stored version.
    pub async fn create(&self, resource: &Resource) -> FhirResult<Resource> {
        let builder = Self::with_body(
            self.request(Method::POST, resource.resource_type()),
            resource,
        )?;
        self.send_resource(builder).await
    }

    /// Updates (or creates) a resource under its id.
    pub async fn update(&self, resource: &Resource) -> FhirResult<UpdateOutcome> {
        let id = resource.id().ok_or_else(|| FhirError::MissingId {
            resource_type: resource.resource_type().to_string(),
        })?;
        let path = format!("{}/{}", resource.resource_type(), id);
        let builder = Self::with_body(self.request(Method::PUT, &path), resource)?;

        let (status, body) = self.send(builder).await?;
        let resource = match body {
            Some(body) => Resource::from_value(body)?,
            None => resource.clone(),
        };
        Ok(UpdateOutcome {
            resource,
            created: status == StatusCode::CREATED,
        })
    }

    /// Deletes a resource.
    pub async fn delete(&self, resource_type: &str, id: &str) -> FhirResult<()> {
        self.send(self.request(Method::DELETE, &format!("{}/{}", resource_type, id)))
            .await
            .map(|_| ())
    }

    /// Invokes a system level operation with POST.
    pub async fn invoke_system(
        &self,
        code: &str,
        parameters: &Resource,
    ) -> FhirResult<Option<Resource>> {
        self.invoke(&format!("${}", code), parameters).await
    }

    /// Invokes a type level operation with POST.
    pub async fn invoke_type(
        &self,
        resource_type: &str,
        code: &str,
        parameters: &Resource,
    ) -> FhirResult<Option<Resource>> {
        self.invoke(&format!("{}/${}", resource_type, code), parameters)
            .await
    }

    /// Invokes an instance level operation with POST.
    pub async fn invoke_instance(
        &self,
        resource_type: &str,
        id: &str,
        code: &str,
        parameters: &Resource,
    ) -> FhirResult<Option<Resource>> {
        self.invoke(&format!("{}/{}/${}", resource_type, id, code), parameters)
            .await
    }

    async fn invoke(&self, path: &str, parameters: &Resource) -> FhirResult<Option<Resource>> {
        let builder = Self::with_body(self.request(Method::POST, path), parameters)?;
        match self.send(builder).await? {
            (_, Some(body)) => Resource::from_value(body).map(Some),
            (_, None) => Ok(None),
        }
    }
}

#[async_trait]
impl PageSource for Client {
    async fn fetch_page(
        &self,
        resource_type: &str,
        options: &SearchOptions,
    ) -> FhirResult<SearchResult> {
        self.search(resource_type, options).await
    }
}

/// Turns a non-2xx response into an error, keeping the server's status and
/// issues. A body that is not an OperationOutcome becomes a single
/// `exception` issue.
fn decode_error(status: StatusCode, body: Option<&Value>, raw: &[u8]) -> FhirError {
    let outcome = body.and_then(OperationOutcome::from_json).unwrap_or_else(|| {
        OperationOutcome::new().error(
            IssueType::Exception,
            format!("HTTP {}: {}", status, String::from_utf8_lossy(raw)),
        )
    });
    FhirError::Remote { status, outcome }
}

/// Reads the `_cursor` parameter of a link URL.
pub fn cursor_from_link(link: &str) -> Option<String> {
    let query = link.split_once('?').map(|(_, q)| q)?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "_cursor")
        .map(|(_, value)| value.into_owned())
        .filter(|cursor| !cursor.is_empty())
}

/// Decodes a searchset Bundle into a [`SearchResult`].
pub fn bundle_to_result(bundle: Resource) -> FhirResult<SearchResult> {
    bundle.expect_type("Bundle")?;

    let mut result = SearchResult::default();
    if let Some(entries) = bundle.child("entry").and_then(Value::as_array) {
        for entry in entries {
            let Some(resource) = entry.get("resource") else {
                continue;
            };
            let resource = Resource::from_value(resource.clone())?;
            let mode = entry
                .get("search")
                .and_then(|s| s.get("mode"))
                .and_then(Value::as_str);
            if mode == Some("include") {
                result.included.push(resource);
            } else {
                result.resources.push(resource);
            }
        }
    }

    result.next = bundle
        .child("link")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|link| link.get("relation").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("url").and_then(Value::as_str))
        .and_then(cursor_from_link);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_from_link() {
        assert_eq!(
            cursor_from_link("http://x/Patient?name=a&_count=2&_cursor=abc%3D%3D").as_deref(),
            Some("abc==")
        );
        assert_eq!(cursor_from_link("http://x/Patient?_count=2"), None);
        assert_eq!(cursor_from_link("http://x/Patient"), None);
    }

    #[test]
    fn test_bundle_to_result() {
        let bundle = Resource::from_value(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "link": [
                {"relation": "self", "url": "http://x/Observation?_count=1"},
                {"relation": "next", "url": "http://x/Observation?_count=1&_cursor=1"}
            ],
            "entry": [
                {
                    "fullUrl": "http://x/Observation/o1",
                    "resource": {"resourceType": "Observation", "id": "o1"},
                    "search": {"mode": "match"}
                },
                {
                    "fullUrl": "http://x/Patient/p1",
                    "resource": {"resourceType": "Patient", "id": "p1"},
                    "search": {"mode": "include"}
                }
            ]
        }))
        .unwrap();

        let result = bundle_to_result(bundle).unwrap();
        assert_eq!(result.resources.len(), 1);
        assert_eq!(result.included.len(), 1);
        assert_eq!(result.next.as_deref(), Some("1"));
    }

    #[test]
    fn test_bundle_without_next_is_last() {
        let bundle =
            Resource::from_value(json!({"resourceType": "Bundle", "type": "searchset"})).unwrap();
        assert!(bundle_to_result(bundle).unwrap().is_last());
    }

    #[test]
    fn test_decode_error_preserves_issues() {
        let body = json!({
            "resourceType": "OperationOutcome",
            "issue": [
                {"severity": "error", "code": "not-found", "diagnostics": "gone"},
                {"severity": "warning", "code": "informational"}
            ]
        });
        let err = decode_error(StatusCode::NOT_FOUND, Some(&body), b"");
        match &err {
            FhirError::Remote { status, outcome } => {
                assert_eq!(*status, StatusCode::NOT_FOUND);
                assert_eq!(outcome.issues().len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = decode_error(StatusCode::BAD_GATEWAY, None, b"upstream down");
        assert!(err.to_string().contains("upstream down"));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_decode_error_keeps_wire_status() {
        let body = json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "code": "not-supported", "diagnostics": "unknown type"}]
        });
        let err = decode_error(StatusCode::NOT_FOUND, Some(&body), b"");

        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.operation_outcome().http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(Client::new("not a url").is_err());
        assert_eq!(
            Client::new("http://localhost:8080/fhir/").unwrap().base_url(),
            "http://localhost:8080/fhir"
        );
    }
}
