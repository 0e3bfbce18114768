//! Searchset Bundle building.

use serde_json::{Value, json};

use crate::error::{FhirError, FhirResult};
use crate::resource::Resource;
use crate::search::SearchResult;

/// Search mode for bundle entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Primary search result.
    Match,
    /// Included via _include.
    Include,
}

impl SearchMode {
    /// Returns the FHIR code string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Match => "match",
            SearchMode::Include => "include",
        }
    }
}

/// A link in a Bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLink {
    /// The relation type (self, next).
    pub relation: String,
    /// The URL.
    pub url: String,
}

impl BundleLink {
    /// Creates a new link.
    pub fn new(relation: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            url: url.into(),
        }
    }

    /// Creates a self link.
    pub fn self_link(url: impl Into<String>) -> Self {
        Self::new("self", url)
    }

    /// Creates a next link.
    pub fn next(url: impl Into<String>) -> Self {
        Self::new("next", url)
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        json!({
            "relation": self.relation,
            "url": self.url
        })
    }
}

/// An entry in a searchset Bundle.
#[derive(Debug, Clone)]
pub struct BundleEntry {
    /// Absolute URL of the resource.
    pub full_url: String,
    /// The resource itself.
    pub resource: Value,
    /// Why the entry is in the bundle.
    pub search_mode: SearchMode,
}

impl BundleEntry {
    /// Creates an entry for a resource, computing its full URL.
    ///
    /// Fails with [`FhirError::MissingId`] when the resource has no id.
    pub fn for_resource(base_url: &str, resource: Resource, mode: SearchMode) -> FhirResult<Self> {
        let full_url = full_url(base_url, &resource)?;
        Ok(Self {
            full_url,
            resource: resource.into_value(),
            search_mode: mode,
        })
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        json!({
            "fullUrl": self.full_url,
            "resource": self.resource,
            "search": { "mode": self.search_mode.as_str() }
        })
    }
}

/// Returns `{base}/{type}/{id}` for a resource.
pub fn full_url(base_url: &str, resource: &Resource) -> FhirResult<String> {
    let id = resource.id().ok_or_else(|| FhirError::MissingId {
        resource_type: resource.resource_type().to_string(),
    })?;
    Ok(format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        resource.resource_type(),
        id
    ))
}

/// Builder for searchset Bundle resources.
#[derive(Debug, Default)]
pub struct BundleBuilder {
    links: Vec<BundleLink>,
    entries: Vec<BundleEntry>,
}

impl BundleBuilder {
    /// Creates a searchset bundle builder.
    pub fn searchset() -> Self {
        Self::default()
    }

    /// Adds a link.
    pub fn add_link(mut self, link: BundleLink) -> Self {
        self.links.push(link);
        self
    }

    /// Adds a self link.
    pub fn self_link(self, url: impl Into<String>) -> Self {
        self.add_link(BundleLink::self_link(url))
    }

    /// Adds an entry.
    pub fn add_entry(mut self, entry: BundleEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Adds `match` entries followed by `include` entries for a result page.
    pub fn add_result(mut self, base_url: &str, result: SearchResult) -> FhirResult<Self> {
        for resource in result.resources {
            self.entries
                .push(BundleEntry::for_resource(base_url, resource, SearchMode::Match)?);
        }
        for resource in result.included {
            self.entries
                .push(BundleEntry::for_resource(base_url, resource, SearchMode::Include)?);
        }
        Ok(self)
    }

    /// Builds the Bundle resource.
    pub fn build(self) -> Value {
        let mut bundle = json!({
            "resourceType": "Bundle",
            "type": "searchset"
        });

        if !self.links.is_empty() {
            bundle["link"] = self.links.iter().map(|l| l.to_json()).collect();
        }

        if !self.entries.is_empty() {
            bundle["entry"] = self.entries.iter().map(|e| e.to_json()).collect();
        }

        bundle
    }
}
