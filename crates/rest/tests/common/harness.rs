//! Test harness.
//!
//! Builds an engine over a seeded [`MemoryBackend`] with a recording
//! operation handler and wraps it in an `axum_test::TestServer`.

use std::sync::{Arc, Mutex};

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestResponse, TestServer};
use serde_json::{Value, json};

use helios_engine::backends::MemoryBackend;
use helios_engine::capabilities::{CapabilityBase, Invocation};
use helios_engine::extractors::RequestContext;
use helios_engine::search::SearchParamType;
use helios_engine::{CapabilityRegistry, FhirResult, Resource, ServerConfig, create_app_with_config};

use super::fixtures;

pub const ACCEPT: HeaderName = HeaderName::from_static("accept");
pub const CONTENT_TYPE: HeaderName = HeaderName::from_static("content-type");
pub const PREFER: HeaderName = HeaderName::from_static("prefer");

pub const BASE_URL: &str = "http://localhost:8080";

/// A running test server plus handles on its backend state.
pub struct TestApp {
    /// The test server instance.
    pub server: TestServer,
    /// The backend, shared with the server.
    pub backend: MemoryBackend,
    /// Every invocation the operation handler has received.
    pub invocations: Arc<Mutex<Vec<Invocation>>>,
}

/// Backend serving Patient, Observation and Organization.
pub fn seeded_backend() -> MemoryBackend {
    let backend = MemoryBackend::new()
        .serve("Patient")
        .serve("Observation")
        .serve("Organization")
        .with_search_param("Patient", "family", SearchParamType::String, "Patient.name.family")
        .with_search_param("Patient", "gender", SearchParamType::Token, "Patient.gender")
        .with_search_param("Patient", "birthdate", SearchParamType::Date, "Patient.birthDate")
        .with_search_param("Observation", "status", SearchParamType::Token, "Observation.status")
        .with_search_param(
            "Observation",
            "value-quantity",
            SearchParamType::Quantity,
            "Observation.valueQuantity.value",
        )
        .with_search_param(
            "Observation",
            "subject",
            SearchParamType::Reference,
            "Observation.subject.reference",
        )
        .with_include("Observation", "Observation:subject");

    for value in fixtures::patients()
        .into_iter()
        .chain(fixtures::observations())
        .chain(fixtures::operation_definitions())
    {
        backend.load(value).expect("fixture loads");
    }
    backend
}

/// Capability base declaring the test operations.
pub fn capability_base() -> CapabilityBase {
    CapabilityBase::default()
        .with_software_name("engine-tests")
        .with_system_operation("ping", fixtures::PING)
        .with_type_operation("Patient", "everything", fixtures::EVERYTHING)
        .with_type_operation("Patient", "purge", fixtures::PURGE)
        .with_type_operation("Observation", "everything", fixtures::OBS_EVERYTHING)
}

/// Builds a registry over `backend` whose operation handler records every
/// invocation. `$purge` produces no output; everything else echoes a
/// Parameters resource naming the operation.
pub fn registry(
    backend: &MemoryBackend,
    invocations: Arc<Mutex<Vec<Invocation>>>,
) -> CapabilityRegistry {
    backend
        .register(CapabilityRegistry::builder().base(capability_base()))
        .invoke(move |_ctx: RequestContext, invocation: Invocation| {
            let invocations = invocations.clone();
            async move {
                let code = invocation.code.clone();
                invocations.lock().unwrap().push(invocation);
                if code == "purge" {
                    return FhirResult::Ok(None);
                }
                let output = json!({
                    "resourceType": "Parameters",
                    "parameter": [{"name": "operation", "valueString": code}]
                });
                Resource::from_value(output).map(Some)
            }
        })
        .build()
        .expect("registry builds")
}

impl TestApp {
    /// Creates a test app with the testing configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::for_testing())
    }

    /// Creates a test app with a custom configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        let backend = seeded_backend();
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&backend, invocations.clone());
        let app = create_app_with_config(registry, config);
        let server = TestServer::new(app).expect("Failed to create test server");

        Self {
            server,
            backend,
            invocations,
        }
    }

    /// Makes a GET request.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.server.get(path).await
    }

    /// Makes a POST request with a FHIR JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.server
            .post(path)
            .add_header(CONTENT_TYPE, HeaderValue::from_static("application/fhir+json"))
            .json(&body)
            .await
    }

    /// Makes a PUT request with a FHIR JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.server
            .put(path)
            .add_header(CONTENT_TYPE, HeaderValue::from_static("application/fhir+json"))
            .json(&body)
            .await
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.server.delete(path).await
    }

    /// Returns the operation codes invoked so far.
    pub fn invoked_codes(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.code.clone())
            .collect()
    }
}

/// Returns the ids of the entries with the given search mode.
pub fn entry_ids(bundle: &Value, mode: &str) -> Vec<String> {
    bundle["entry"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|e| e["search"]["mode"] == mode)
        .filter_map(|e| e["resource"]["id"].as_str().map(String::from))
        .collect()
}

/// Returns the URL of a bundle link.
pub fn link(bundle: &Value, relation: &str) -> Option<String> {
    bundle["link"]
        .as_array()?
        .iter()
        .find(|l| l["relation"] == relation)
        .and_then(|l| l["url"].as_str())
        .map(String::from)
}

/// Returns the issue codes of an OperationOutcome.
pub fn issue_codes(outcome: &Value) -> Vec<String> {
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    outcome["issue"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|i| i["code"].as_str().map(String::from))
        .collect()
}
