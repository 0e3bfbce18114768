//! Test fixtures.
//!
//! Patients are sorted by id, which is also the order the in-memory backend
//! returns them in.

use serde_json::{Value, json};

pub const EVERYTHING: &str = "http://hl7.org/fhir/OperationDefinition/Patient-everything";
pub const PURGE: &str = "http://example.org/fhir/OperationDefinition/purge";
pub const PING: &str = "http://example.org/fhir/OperationDefinition/ping|1.0.0";
/// Declared on Observation but its definition does not list Observation.
pub const OBS_EVERYTHING: &str = EVERYTHING;

pub fn patients() -> Vec<Value> {
    vec![
        json!({
            "resourceType": "Patient",
            "id": "p1",
            "name": [{"family": "Smith", "given": ["John"]}],
            "gender": "male",
            "birthDate": "1980-01-15"
        }),
        json!({
            "resourceType": "Patient",
            "id": "p2",
            "name": [{"family": "Smithson", "given": ["Jane"]}],
            "gender": "female",
            "birthDate": "1990-05-20"
        }),
        json!({
            "resourceType": "Patient",
            "id": "p3",
            "name": [{"family": "Jones", "given": ["Robert"]}],
            "gender": "female",
            "birthDate": "2001-11-02"
        }),
    ]
}

pub fn observations() -> Vec<Value> {
    vec![
        observation("o1", "final", "Patient/p1", 72.0),
        observation("o2", "preliminary", "Patient/p1", 120.0),
        observation("o3", "final", "Patient/p2", 95.5),
    ]
}

fn observation(id: &str, status: &str, subject: &str, value: f64) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": status,
        "code": {"coding": [{"system": "http://loinc.org", "code": "8867-4"}]},
        "subject": {"reference": subject},
        "valueQuantity": {"value": value, "unit": "bpm"}
    })
}

pub fn operation_definitions() -> Vec<Value> {
    vec![
        json!({
            "resourceType": "OperationDefinition",
            "id": "Patient-everything",
            "url": "http://hl7.org/fhir/OperationDefinition/Patient-everything",
            "code": "everything",
            "system": false,
            "type": true,
            "instance": true,
            "affectsState": false,
            "resource": ["Patient"]
        }),
        json!({
            "resourceType": "OperationDefinition",
            "id": "purge",
            "url": "http://example.org/fhir/OperationDefinition/purge",
            "code": "purge",
            "system": false,
            "type": false,
            "instance": true,
            "affectsState": true,
            "resource": ["Resource"]
        }),
        json!({
            "resourceType": "OperationDefinition",
            "id": "ping",
            "url": "http://example.org/fhir/OperationDefinition/ping",
            "version": "1.0.0",
            "code": "ping",
            "system": true,
            "type": false,
            "instance": false
        }),
    ]
}

pub fn parameters(name: &str, value: &str) -> Value {
    json!({
        "resourceType": "Parameters",
        "parameter": [{"name": name, "valueString": value}]
    })
}
