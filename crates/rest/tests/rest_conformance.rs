//! REST conformance tests.
//!
//! Tests the interactions the engine routes to the registry:
//! - capabilities, read, create, update and delete
//! - status codes and OperationOutcome bodies for failures
//! - Location, Content-Type and `Prefer: return=minimal`
//! - content negotiation, including XML when the feature is enabled

mod common;

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode};
use common::harness::{ACCEPT, CONTENT_TYPE, PREFER, TestApp, issue_codes};
use serde_json::{Value, json};

fn content_type(response: &axum_test::TestResponse) -> String {
    response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

mod capabilities {
    use super::*;

    #[tokio::test]
    async fn test_metadata_reflects_registry() {
        let app = TestApp::new();

        let response = app.get("/metadata").await;
        response.assert_status_ok();
        assert_eq!(content_type(&response), "application/fhir+json");

        let statement: Value = response.json();
        assert_eq!(statement["resourceType"], "CapabilityStatement");
        assert_eq!(statement["kind"], "instance");
        assert_eq!(statement["software"]["name"], "engine-tests");
        assert_eq!(statement["implementation"]["url"], "http://localhost:8080");

        let resources = statement["rest"][0]["resource"].as_array().unwrap();
        let types: Vec<&str> = resources.iter().map(|r| r["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["Observation", "Organization", "Patient"]);

        let patient = &resources[2];
        let interactions: Vec<&str> = patient["interaction"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["code"].as_str().unwrap())
            .collect();
        assert_eq!(
            interactions,
            vec!["create", "delete", "read", "search-type", "update"]
        );

        let params: Vec<&str> = patient["searchParam"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(params, vec!["_id", "birthdate", "family", "gender"]);

        let operations: Vec<&str> = patient["operation"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["name"].as_str().unwrap())
            .collect();
        assert_eq!(operations, vec!["everything", "purge"]);

        assert_eq!(resources[0]["searchInclude"], json!(["Observation:subject"]));
        assert_eq!(statement["rest"][0]["operation"][0]["name"], "ping");
    }

    #[tokio::test]
    async fn test_metadata_is_stable() {
        let app = TestApp::new();

        let first: Value = app.get("/metadata").await.json();
        let second: Value = app.get("/metadata").await.json();
        assert_eq!(first, second);
    }
}

mod read {
    use super::*;

    #[tokio::test]
    async fn test_read_existing() {
        let app = TestApp::new();

        let response = app.get("/Patient/p1").await;
        response.assert_status_ok();

        let patient: Value = response.json();
        assert_eq!(patient["id"], "p1");
        assert_eq!(patient["name"][0]["family"], "Smith");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let app = TestApp::new();

        let response = app.get("/Patient/nope").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(issue_codes(&response.json()), vec!["not-found"]);
    }

    #[tokio::test]
    async fn test_read_unknown_type() {
        let app = TestApp::new();

        let response = app.get("/Spaceship/1").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(issue_codes(&response.json()), vec!["not-supported"]);
    }

    #[tokio::test]
    async fn test_read_unserved_type() {
        let app = TestApp::new();

        let response = app.get("/Practitioner/1").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(issue_codes(&response.json()), vec!["not-supported"]);
    }
}

mod create {
    use super::*;

    #[tokio::test]
    async fn test_create_returns_location() {
        let app = TestApp::new();

        let response = app
            .post(
                "/Patient",
                json!({"resourceType": "Patient", "name": [{"family": "New"}]}),
            )
            .await;
        response.assert_status(StatusCode::CREATED);

        let created: Value = response.json();
        let id = created["id"].as_str().expect("server assigned an id");
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert_eq!(location, format!("http://localhost:8080/Patient/{}", id));

        app.get(&format!("/Patient/{}", id)).await.assert_status_ok();
        assert_eq!(app.backend.count("Patient"), 4);
    }

    #[tokio::test]
    async fn test_create_minimal_has_no_body() {
        let app = TestApp::new();

        let response = app
            .server
            .post("/Organization")
            .add_header(PREFER, HeaderValue::from_static("return=minimal"))
            .json(&json!({"resourceType": "Organization", "name": "Acme"}))
            .await;

        response.assert_status(StatusCode::CREATED);
        assert!(response.headers().get("location").is_some());
        assert!(response.as_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_create_type_mismatch() {
        let app = TestApp::new();

        let response = app
            .post("/Patient", json!({"resourceType": "Observation", "status": "final"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(issue_codes(&response.json()), vec!["invalid"]);
    }

    #[tokio::test]
    async fn test_create_malformed_json() {
        let app = TestApp::new();

        let response = app
            .server
            .post("/Patient")
            .add_header(CONTENT_TYPE, HeaderValue::from_static("application/fhir+json"))
            .bytes(Bytes::from_static(b"{not json"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_unsupported_media_type() {
        let app = TestApp::new();

        let response = app
            .server
            .post("/Patient")
            .add_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .bytes(Bytes::from_static(b"hello"))
            .await;
        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(issue_codes(&response.json()), vec!["not-supported"]);
    }

    #[tokio::test]
    async fn test_create_unknown_type_checked_before_body() {
        let app = TestApp::new();

        let response = app
            .post("/Spaceship", json!({"resourceType": "Patient"}))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(issue_codes(&response.json()), vec!["not-supported"]);
    }

    #[tokio::test]
    async fn test_create_unserved_type_not_implemented() {
        let app = TestApp::new();

        let response = app
            .post("/Practitioner", json!({"resourceType": "Practitioner"}))
            .await;
        response.assert_status(StatusCode::NOT_IMPLEMENTED);
    }
}

mod update_delete {
    use super::*;

    #[tokio::test]
    async fn test_update_existing() {
        let app = TestApp::new();

        let response = app
            .put(
                "/Patient/p1",
                json!({"resourceType": "Patient", "id": "p1", "gender": "other"}),
            )
            .await;
        response.assert_status_ok();

        let patient: Value = app.get("/Patient/p1").await.json();
        assert_eq!(patient["gender"], "other");
    }

    #[tokio::test]
    async fn test_update_creates_with_url_id() {
        let app = TestApp::new();

        let response = app
            .put("/Patient/p9", json!({"resourceType": "Patient", "active": true}))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "http://localhost:8080/Patient/p9"
        );

        let patient: Value = response.json();
        assert_eq!(patient["id"], "p9");
    }

    #[tokio::test]
    async fn test_update_id_mismatch() {
        let app = TestApp::new();

        let response = app
            .put("/Patient/p1", json!({"resourceType": "Patient", "id": "p2"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let patient: Value = app.get("/Patient/p2").await.json();
        assert_eq!(patient["name"][0]["family"], "Smithson");
    }

    #[tokio::test]
    async fn test_delete_then_read() {
        let app = TestApp::new();

        app.delete("/Patient/p3")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.get("/Patient/p3")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.delete("/Patient/p3")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

mod negotiation {
    use super::*;

    #[tokio::test]
    async fn test_default_is_json() {
        let app = TestApp::new();

        let response = app.get("/Patient/p1").await;
        assert_eq!(content_type(&response), "application/fhir+json");
    }

    #[tokio::test]
    async fn test_accept_json_alias() {
        let app = TestApp::new();

        let response = app
            .server
            .get("/Patient/p1")
            .add_header(ACCEPT, HeaderValue::from_static("text/html, application/json"))
            .await;
        response.assert_status_ok();
        assert_eq!(content_type(&response), "application/fhir+json");
    }

    #[tokio::test]
    async fn test_unknown_accept_falls_back_to_default() {
        let app = TestApp::new();

        let response = app
            .server
            .get("/Patient/p1")
            .add_header(ACCEPT, HeaderValue::from_static("text/html"))
            .await;
        response.assert_status_ok();
        assert_eq!(content_type(&response), "application/fhir+json");
    }

    #[tokio::test]
    async fn test_unsupported_path() {
        let app = TestApp::new();

        let response = app.get("/Patient/p1/_history/1").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(issue_codes(&response.json()), vec!["invalid"]);
    }
}

#[cfg(feature = "xml")]
mod xml {
    use super::*;

    #[tokio::test]
    async fn test_format_parameter_selects_xml() {
        let app = TestApp::new();

        let response = app.get("/Patient/p1?_format=xml").await;
        response.assert_status_ok();
        assert_eq!(content_type(&response), "application/fhir+xml");

        let body = response.text();
        assert!(body.contains(r#"<Patient xmlns="http://hl7.org/fhir">"#), "{}", body);
        assert!(body.contains(r#"<family value="Smith"/>"#), "{}", body);
    }

    #[tokio::test]
    async fn test_format_parameter_overrides_accept() {
        let app = TestApp::new();

        let response = app
            .server
            .get("/Patient/p1?_format=json")
            .add_header(ACCEPT, HeaderValue::from_static("application/fhir+xml"))
            .await;
        assert_eq!(content_type(&response), "application/fhir+json");
    }

    #[tokio::test]
    async fn test_accept_xml_search_bundle() {
        let app = TestApp::new();

        let response = app
            .server
            .get("/Patient?_id=p2")
            .add_header(ACCEPT, HeaderValue::from_static("application/fhir+xml"))
            .await;
        response.assert_status_ok();
        assert_eq!(content_type(&response), "application/fhir+xml");

        let body = response.text();
        assert!(body.contains("<Bundle"), "{}", body);
        assert!(body.contains(r#"<type value="searchset"/>"#), "{}", body);
        assert!(body.contains(r#"<id value="p2"/>"#), "{}", body);
    }

    #[tokio::test]
    async fn test_errors_use_negotiated_format() {
        let app = TestApp::new();

        let response = app.get("/Patient/missing?_format=xml").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(content_type(&response), "application/fhir+xml");
        assert!(response.text().contains("<OperationOutcome"));
    }

    #[tokio::test]
    async fn test_create_from_xml_body() {
        let app = TestApp::new();

        let xml = r#"<Patient xmlns="http://hl7.org/fhir"><name><family value="Xml"/><given value="Ada"/></name><birthDate value="1815-12-10"/></Patient>"#;
        let response = app
            .server
            .post("/Patient")
            .add_header(CONTENT_TYPE, HeaderValue::from_static("application/fhir+xml"))
            .bytes(Bytes::from_static(xml.as_bytes()))
            .await;
        response.assert_status(StatusCode::CREATED);

        let created: Value = response.json();
        assert_eq!(created["name"], json!([{"family": "Xml", "given": ["Ada"]}]));
        assert_eq!(created["birthDate"], "1815-12-10");
    }

    #[tokio::test]
    async fn test_operation_parameters_from_xml_body() {
        let app = TestApp::new();

        let xml = r#"<Parameters xmlns="http://hl7.org/fhir">
    <parameter>
        <name value="message"/>
        <valueString value="hello there"/>
    </parameter>
    <parameter>
        <name value="count"/>
        <valueInteger value="3"/>
    </parameter>
</Parameters>"#;
        let response = app
            .server
            .post("/$ping")
            .add_header(CONTENT_TYPE, HeaderValue::from_static("application/fhir+xml"))
            .bytes(Bytes::from_static(xml.as_bytes()))
            .await;
        response.assert_status_ok();

        let invocations = app.invocations.lock().unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].code, "ping");
        assert_eq!(
            invocations[0].parameters.as_value(),
            &json!({
                "resourceType": "Parameters",
                "parameter": [
                    {"name": "message", "valueString": "hello there"},
                    {"name": "count", "valueInteger": 3}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_narrative_survives_xml_create() {
        let app = TestApp::new();

        let xml = r#"<Patient xmlns="http://hl7.org/fhir">
    <text>
        <status value="generated"/>
        <div xmlns="http://www.w3.org/1999/xhtml"><p>Ada <b>Lovelace</b> (1815)</p></div>
    </text>
    <name><family value="Lovelace"/></name>
</Patient>"#;
        let response = app
            .server
            .post("/Patient")
            .add_header(CONTENT_TYPE, HeaderValue::from_static("application/fhir+xml"))
            .bytes(Bytes::from_static(xml.as_bytes()))
            .await;
        response.assert_status(StatusCode::CREATED);

        let created: Value = response.json();
        assert_eq!(
            created["text"]["div"],
            r#"<div xmlns="http://www.w3.org/1999/xhtml"><p>Ada <b>Lovelace</b> (1815)</p></div>"#
        );
        assert_eq!(created["name"], json!([{"family": "Lovelace"}]));
    }

    #[tokio::test]
    async fn test_malformed_xml_body() {
        let app = TestApp::new();

        let response = app
            .server
            .post("/Patient")
            .add_header(CONTENT_TYPE, HeaderValue::from_static("application/fhir+xml"))
            .bytes(Bytes::from_static(b"<Patient><name></Patient>"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metadata_advertises_xml() {
        let app = TestApp::new();

        let statement: Value = app.get("/metadata").await.json();
        let formats = statement["format"].as_array().unwrap();
        assert!(formats.contains(&json!("application/fhir+xml")));
    }
}
