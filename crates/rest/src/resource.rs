//! Generic resource wrapper.
//!
//! The engine never depends on a generated per-type model. A [`Resource`] is
//! a JSON object carrying a string `resourceType`; typed models can be moved
//! in and out through serde with [`Resource::from_typed`] and
//! [`Resource::to_typed`].

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{FhirError, FhirResult};

/// A FHIR resource held as a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    value: Value,
}

impl Resource {
    /// Wraps a JSON value, requiring an object with a string `resourceType`.
    pub fn from_value(value: Value) -> FhirResult<Self> {
        match value.get("resourceType") {
            Some(Value::String(_)) if value.is_object() => Ok(Self { value }),
            _ => Err(FhirError::invalid_request(
                "resource must be a JSON object with a string resourceType",
            )),
        }
    }

    /// Creates an empty resource of the given type.
    pub fn new(resource_type: &str) -> Self {
        Self {
            value: serde_json::json!({ "resourceType": resource_type }),
        }
    }

    /// Serializes a typed model into a resource.
    pub fn from_typed<T: Serialize>(typed: &T) -> FhirResult<Self> {
        let value = serde_json::to_value(typed)
            .map_err(|e| FhirError::InvalidResource(format!("cannot marshal resource: {}", e)))?;
        Self::from_value(value).map_err(|e| FhirError::InvalidResource(e.to_string()))
    }

    /// Deserializes this resource into a typed model.
    pub fn to_typed<T: DeserializeOwned>(&self) -> FhirResult<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            FhirError::InvalidResource(format!(
                "cannot unmarshal {} resource: {}",
                self.resource_type(),
                e
            ))
        })
    }

    /// Returns the resource type name.
    pub fn resource_type(&self) -> &str {
        self.value
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Returns the logical id, if any.
    pub fn id(&self) -> Option<&str> {
        self.value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Sets the logical id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        if let Some(obj) = self.value.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.into()));
        }
    }

    /// Returns a direct child element by name.
    pub fn child(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    /// Returns the underlying JSON.
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Consumes the wrapper and returns the JSON.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Fails with [`FhirError::InvalidResource`] unless this resource has the
    /// expected type.
    pub fn expect_type(&self, expected: &str) -> FhirResult<()> {
        if self.resource_type() == expected {
            Ok(())
        } else {
            Err(FhirError::InvalidResource(format!(
                "expected {} resource, got {}",
                expected,
                self.resource_type()
            )))
        }
    }
}

impl TryFrom<Value> for Resource {
    type Error = FhirError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Resource::from_value(value)
    }
}

impl From<Resource> for Value {
    fn from(resource: Resource) -> Self {
        resource.value
    }
}
