//! CapabilityStatement synthesis.
//!
//! The statement is derived from what a [`CapabilityRegistry`] actually has
//! registered: for each type in the universe the five per-type interactions
//! are probed, the declared search parameters are collected, and the type
//! operations from the [`CapabilityBase`] are merged in.
//!
//! Every collection in the model is sorted, and the `date` is supplied by the
//! caller, so synthesizing twice from the same registry yields identical JSON.
//!
//! [`CapabilityBase`]: super::CapabilityBase

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

use super::{CapabilityRegistry, Interaction, OperationDeclaration};
use crate::fhir_types::{get_fhir_version, get_resource_type_names};
use crate::search::SearchCapabilities;

/// Capabilities advertised for one resource type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceCapabilities {
    /// Supported interactions, sorted by code.
    pub interactions: Vec<Interaction>,
    /// Declared search parameters and includes (includes sorted).
    pub search: Option<SearchCapabilities>,
    /// Declared type and instance operations, sorted.
    pub operations: Vec<OperationDeclaration>,
}

impl ResourceCapabilities {
    fn is_empty(&self) -> bool {
        self.interactions.is_empty() && self.operations.is_empty()
    }
}

/// Synthesized server capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityStatement {
    /// Publication date.
    pub date: DateTime<Utc>,
    /// Software name.
    pub software_name: String,
    /// Software version.
    pub software_version: Option<String>,
    /// Implementation description.
    pub implementation_description: String,
    /// Implementation URL.
    pub implementation_url: Option<String>,
    /// Supported formats.
    pub formats: Vec<&'static str>,
    /// Per-type capabilities, keyed and sorted by type.
    pub resources: BTreeMap<String, ResourceCapabilities>,
    /// System level operations, sorted.
    pub system_operations: Vec<OperationDeclaration>,
}

/// Formats advertised in `CapabilityStatement.format`.
pub fn supported_formats() -> Vec<&'static str> {
    #[allow(unused_mut)]
    let mut formats = vec!["json", "application/fhir+json"];
    #[cfg(feature = "xml")]
    {
        formats.push("xml");
        formats.push("application/fhir+xml");
    }
    formats
}

impl CapabilityStatement {
    /// Synthesizes the statement for a registry.
    ///
    /// `fallback_url` is used as `implementation.url` when the base declares
    /// none.
    pub fn synthesize(
        registry: &CapabilityRegistry,
        date: DateTime<Utc>,
        fallback_url: Option<&str>,
    ) -> Self {
        let base = registry.base();
        let mut resources = BTreeMap::new();

        for resource_type in get_resource_type_names() {
            let mut interactions: Vec<Interaction> = Interaction::TYPE_INTERACTIONS
                .into_iter()
                .filter(|i| registry.supports(resource_type, *i))
                .collect();
            interactions.sort_by_key(|i| i.code());

            let search = if interactions.contains(&Interaction::Search) {
                registry.search_capabilities(resource_type).ok().map(|mut caps| {
                    caps.includes.sort();
                    caps.includes.dedup();
                    caps
                })
            } else {
                None
            };

            let mut operations = base.operations_for(resource_type).to_vec();
            operations.sort();

            let caps = ResourceCapabilities {
                interactions,
                search,
                operations,
            };
            if !caps.is_empty() {
                resources.insert(resource_type.to_string(), caps);
            }
        }

        let mut system_operations = base.system_operations.clone();
        system_operations.sort();

        Self {
            date,
            software_name: base.software_name.clone(),
            software_version: base.software_version.clone(),
            implementation_description: base.implementation_description.clone(),
            implementation_url: base
                .implementation_url
                .clone()
                .or_else(|| fallback_url.filter(|u| !u.is_empty()).map(String::from)),
            formats: supported_formats(),
            resources,
            system_operations,
        }
    }

    /// Returns the capabilities of one type.
    pub fn resource(&self, resource_type: &str) -> Option<&ResourceCapabilities> {
        self.resources.get(resource_type)
    }

    /// Returns the declared search capabilities of one type.
    pub fn search_capabilities(&self, resource_type: &str) -> Option<&SearchCapabilities> {
        self.resource(resource_type).and_then(|r| r.search.as_ref())
    }

    /// Returns the type operations declared for a type.
    pub fn type_operations(&self, resource_type: &str) -> &[OperationDeclaration] {
        self.resource(resource_type)
            .map(|r| r.operations.as_slice())
            .unwrap_or_default()
    }

    /// Renders the statement as a FHIR `CapabilityStatement` resource.
    pub fn to_json(&self) -> Value {
        let resources: Vec<Value> = self
            .resources
            .iter()
            .map(|(resource_type, caps)| render_resource(resource_type, caps))
            .collect();

        let mut software = json!({ "name": self.software_name });
        if let Some(version) = &self.software_version {
            software["version"] = json!(version);
        }

        let mut implementation = json!({ "description": self.implementation_description });
        if let Some(url) = &self.implementation_url {
            implementation["url"] = json!(url);
        }

        let mut rest = json!({
            "mode": "server",
            "resource": resources,
        });
        if !self.system_operations.is_empty() {
            rest["operation"] = render_operations(&self.system_operations);
        }

        json!({
            "resourceType": "CapabilityStatement",
            "status": "active",
            "date": self.date.to_rfc3339_opts(SecondsFormat::Secs, true),
            "kind": "instance",
            "software": software,
            "implementation": implementation,
            "fhirVersion": get_fhir_version(),
            "format": self.formats,
            "rest": [rest]
        })
    }
}

fn render_operations(operations: &[OperationDeclaration]) -> Value {
    operations
        .iter()
        .map(|op| json!({ "name": op.name, "definition": op.definition }))
        .collect()
}

fn render_resource(resource_type: &str, caps: &ResourceCapabilities) -> Value {
    let interactions: Vec<Value> = caps
        .interactions
        .iter()
        .map(|i| json!({ "code": i.code() }))
        .collect();

    let mut entry = json!({ "type": resource_type });
    if !interactions.is_empty() {
        entry["interaction"] = Value::Array(interactions);
    }

    if let Some(search) = &caps.search {
        if !search.includes.is_empty() {
            entry["searchInclude"] = json!(search.includes);
        }
        // BTreeMap order already sorts by name, and names are unique.
        let params: Vec<Value> = search
            .parameters
            .iter()
            .map(|(name, desc)| json!({ "name": name, "type": desc.param_type.as_str() }))
            .collect();
        if !params.is_empty() {
            entry["searchParam"] = Value::Array(params);
        }
    }

    if !caps.operations.is_empty() {
        entry["operation"] = render_operations(&caps.operations);
    }

    entry
}
