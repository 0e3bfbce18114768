//! In-memory backend.
//!
//! Keeps resources in a shared map and serves read, search, create, update
//! and delete for the types it is configured with, plus generic read for
//! any stored type (used for OperationDefinition lookups). Search supports
//! `_id`, configured path-based parameters, reference `_include`s and
//! offset cursors. Nothing is persisted.
//!
//! ```rust
//! use helios_engine::backends::MemoryBackend;
//! use helios_engine::capabilities::CapabilityRegistry;
//! use helios_engine::search::SearchParamType;
//!
//! let backend = MemoryBackend::new()
//!     .serve("Patient")
//!     .with_search_param("Patient", "family", SearchParamType::String, "name.family");
//! let registry = backend.register(CapabilityRegistry::builder()).build().unwrap();
//! assert!(registry.supports("Patient", helios_engine::capabilities::Interaction::Search));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::capabilities::{
    CreateCapability, DeleteCapability, GenericReadCapability, ReadCapability, RegistryBuilder,
    SearchCapability, UpdateCapability, UpdateOutcome,
};
use crate::error::{FhirError, FhirResult};
use crate::extractors::RequestContext;
use crate::fhirpath;
use crate::resource::Resource;
use crate::search::cursor::paginate;
use crate::search::{
    OrList, ParameterValue, SearchCapabilities, SearchOptions, SearchParamType, SearchPrefix,
    SearchResult,
};

type Store = HashMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Clone)]
struct IndexedParam {
    param_type: SearchParamType,
    path: String,
}

#[derive(Debug, Clone, Default)]
struct TypeConfig {
    params: BTreeMap<String, IndexedParam>,
    includes: Vec<String>,
}

impl TypeConfig {
    fn capabilities(&self) -> SearchCapabilities {
        let mut caps = SearchCapabilities::new().parameter_with_modifiers(
            "_id",
            SearchParamType::Token,
            &["not"],
        );
        for (name, param) in &self.params {
            caps = match param.param_type {
                SearchParamType::String => caps.parameter_with_modifiers(
                    name.clone(),
                    param.param_type,
                    &["exact", "contains"],
                ),
                SearchParamType::Token => {
                    caps.parameter_with_modifiers(name.clone(), param.param_type, &["not"])
                }
                other => caps.parameter(name.clone(), other),
            };
        }
        for include in &self.includes {
            caps = caps.include(include.clone());
        }
        caps
    }
}

/// An in-memory resource store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<RwLock<Store>>,
    types: BTreeMap<String, TypeConfig>,
}

impl MemoryBackend {
    /// Creates an empty backend serving no types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves the CRUD and search interactions for a type.
    pub fn serve(mut self, resource_type: &str) -> Self {
        self.types.entry(resource_type.to_string()).or_default();
        self
    }

    /// Declares a search parameter evaluated on a dotted path.
    pub fn with_search_param(
        mut self,
        resource_type: &str,
        name: &str,
        param_type: SearchParamType,
        path: &str,
    ) -> Self {
        self.types
            .entry(resource_type.to_string())
            .or_default()
            .params
            .insert(
                name.to_string(),
                IndexedParam {
                    param_type,
                    path: path.to_string(),
                },
            );
        self
    }

    /// Declares a reference include such as `Observation:subject`; the
    /// part after the colon names the reference element.
    pub fn with_include(mut self, resource_type: &str, include: &str) -> Self {
        self.types
            .entry(resource_type.to_string())
            .or_default()
            .includes
            .push(include.to_string());
        self
    }

    /// Stores a resource, assigning an id when it has none.
    pub fn insert(&self, mut resource: Resource) -> Resource {
        if resource.id().is_none() {
            resource.set_id(uuid::Uuid::new_v4().to_string());
        }
        let id = resource.id().unwrap_or_default().to_string();
        self.store
            .write()
            .entry(resource.resource_type().to_string())
            .or_default()
            .insert(id, resource.as_value().clone());
        resource
    }

    /// Loads a resource, or every entry resource of a Bundle. Returns the
    /// number of resources stored.
    pub fn load(&self, value: Value) -> FhirResult<usize> {
        let resource = Resource::from_value(value)?;
        if resource.resource_type() != "Bundle" {
            self.insert(resource);
            return Ok(1);
        }

        let mut loaded = 0;
        for entry in fhirpath::evaluate(&resource, "entry.resource") {
            self.insert(Resource::from_value(entry.clone())?);
            loaded += 1;
        }
        info!(loaded, "Loaded bundle into memory backend");
        Ok(loaded)
    }

    /// Returns the number of stored resources of a type.
    pub fn count(&self, resource_type: &str) -> usize {
        self.store
            .read()
            .get(resource_type)
            .map(BTreeMap::len)
            .unwrap_or_default()
    }

    /// Registers this backend's capabilities for every served type, plus
    /// generic read.
    pub fn register(&self, mut builder: RegistryBuilder) -> RegistryBuilder {
        for (resource_type, config) in &self.types {
            let handler = MemoryType {
                store: self.store.clone(),
                resource_type: resource_type.clone(),
                config: Arc::new(config.clone()),
            };
            builder = builder
                .read(resource_type, handler.clone())
                .search(resource_type, handler.clone())
                .create(resource_type, handler.clone())
                .update(resource_type, handler.clone())
                .delete(resource_type, handler);
        }
        builder.generic_read(MemoryGenericRead {
            store: self.store.clone(),
        })
    }
}

fn read_from(store: &Store, resource_type: &str, id: &str) -> FhirResult<Resource> {
    store
        .get(resource_type)
        .and_then(|resources| resources.get(id))
        .cloned()
        .ok_or_else(|| FhirError::not_found(resource_type, id))
        .and_then(Resource::from_value)
}

#[derive(Clone)]
struct MemoryType {
    store: Arc<RwLock<Store>>,
    resource_type: String,
    config: Arc<TypeConfig>,
}

impl MemoryType {
    fn matches(&self, resource: &Resource, options: &SearchOptions) -> bool {
        options.parameters.iter().all(|(key, all_of)| {
            let modifier = key.modifier.as_deref();
            all_of.iter().all(|any_of| {
                if key.name == "_id" {
                    let id = resource.id().unwrap_or_default();
                    let hit = any_of.iter().any(|v| v.value == id);
                    return if modifier == Some("not") { !hit } else { hit };
                }
                match self.config.params.get(&key.name) {
                    Some(param) => matches_param(resource, param, modifier, any_of),
                    None => true,
                }
            })
        })
    }

    fn included(&self, store: &Store, page: &[Resource], includes: &[String]) -> Vec<Resource> {
        let mut included: Vec<Resource> = Vec::new();
        for include in includes {
            let Some((source, element)) = include.split_once(':') else {
                continue;
            };
            if source != self.resource_type {
                continue;
            }
            for resource in page {
                for reference in fhirpath::strings(resource, &format!("{}.reference", element)) {
                    let Some((target_type, target_id)) = reference.split_once('/') else {
                        continue;
                    };
                    let Ok(target) = read_from(store, target_type, target_id) else {
                        continue;
                    };
                    let duplicate = included.iter().any(|r| {
                        r.resource_type() == target.resource_type() && r.id() == target.id()
                    });
                    if !duplicate {
                        included.push(target);
                    }
                }
            }
        }
        included
    }
}

fn matches_param(
    resource: &Resource,
    param: &IndexedParam,
    modifier: Option<&str>,
    any_of: &OrList,
) -> bool {
    let values = fhirpath::evaluate(resource, &param.path);
    let hit = any_of
        .iter()
        .any(|wanted| values.iter().any(|v| matches_value(param.param_type, modifier, v, wanted)));
    if modifier == Some("not") { !hit } else { hit }
}

fn matches_value(
    param_type: SearchParamType,
    modifier: Option<&str>,
    actual: &Value,
    wanted: &ParameterValue,
) -> bool {
    match param_type {
        SearchParamType::String => {
            let Some(actual) = actual.as_str() else {
                return false;
            };
            match modifier {
                Some("exact") => actual == wanted.value,
                Some("contains") => actual
                    .to_lowercase()
                    .contains(&wanted.value.to_lowercase()),
                _ => actual
                    .to_lowercase()
                    .starts_with(&wanted.value.to_lowercase()),
            }
        }
        SearchParamType::Number | SearchParamType::Quantity => {
            let (Some(actual), Ok(target)) = (actual.as_f64(), wanted.value.parse::<f64>()) else {
                return false;
            };
            compare(wanted.prefix, actual.partial_cmp(&target))
        }
        SearchParamType::Date => {
            let Some(actual) = actual.as_str() else {
                return false;
            };
            compare(wanted.prefix, Some(actual.cmp(wanted.value.as_str())))
        }
        _ => match actual {
            Value::String(s) => *s == wanted.value,
            Value::Bool(b) => b.to_string() == wanted.value,
            Value::Number(n) => n.to_string() == wanted.value,
            _ => false,
        },
    }
}

fn compare(prefix: Option<SearchPrefix>, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    let Some(ordering) = ordering else {
        return false;
    };
    match prefix.unwrap_or(SearchPrefix::Eq) {
        SearchPrefix::Eq => ordering == Equal,
        SearchPrefix::Ne => ordering != Equal,
        SearchPrefix::Gt | SearchPrefix::Sa => ordering == Greater,
        SearchPrefix::Lt | SearchPrefix::Eb => ordering == Less,
        SearchPrefix::Ge => ordering != Less,
        SearchPrefix::Le => ordering != Greater,
    }
}

#[async_trait]
impl ReadCapability for MemoryType {
    async fn read(&self, _ctx: &RequestContext, id: &str) -> FhirResult<Resource> {
        read_from(&self.store.read(), &self.resource_type, id)
    }
}

#[async_trait]
impl SearchCapability for MemoryType {
    fn search_capabilities(&self) -> SearchCapabilities {
        self.config.capabilities()
    }

    async fn search(
        &self,
        ctx: &RequestContext,
        options: &SearchOptions,
    ) -> FhirResult<SearchResult> {
        let store = self.store.read();
        let matches: Vec<Resource> = store
            .get(&self.resource_type)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter_map(|value| Resource::from_value(value.clone()).ok())
            .filter(|resource| self.matches(resource, options))
            .collect();

        let (page, next) = paginate(&matches, options)?;
        let included = self.included(&store, &page, &options.includes);
        debug!(
            resource_type = %self.resource_type,
            total = matches.len(),
            page = page.len(),
            request_id = %ctx.request_id(),
            "Memory search"
        );

        let mut result = SearchResult::new(page).with_included(included);
        result.next = next;
        Ok(result)
    }
}

#[async_trait]
impl CreateCapability for MemoryType {
    async fn create(&self, _ctx: &RequestContext, mut resource: Resource) -> FhirResult<Resource> {
        resource.set_id(uuid::Uuid::new_v4().to_string());
        let id = resource.id().unwrap_or_default().to_string();
        self.store
            .write()
            .entry(self.resource_type.clone())
            .or_default()
            .insert(id, resource.as_value().clone());
        Ok(resource)
    }
}

#[async_trait]
impl UpdateCapability for MemoryType {
    async fn update(&self, _ctx: &RequestContext, resource: Resource) -> FhirResult<UpdateOutcome> {
        let id = resource
            .id()
            .ok_or_else(|| FhirError::MissingId {
                resource_type: self.resource_type.clone(),
            })?
            .to_string();
        let previous = self
            .store
            .write()
            .entry(self.resource_type.clone())
            .or_default()
            .insert(id, resource.as_value().clone());
        Ok(UpdateOutcome {
            resource,
            created: previous.is_none(),
        })
    }
}

#[async_trait]
impl DeleteCapability for MemoryType {
    async fn delete(&self, _ctx: &RequestContext, id: &str) -> FhirResult<()> {
        self.store
            .write()
            .get_mut(&self.resource_type)
            .and_then(|resources| resources.remove(id))
            .map(|_| ())
            .ok_or_else(|| FhirError::not_found(self.resource_type.clone(), id))
    }
}

struct MemoryGenericRead {
    store: Arc<RwLock<Store>>,
}

#[async_trait]
impl GenericReadCapability for MemoryGenericRead {
    async fn read(
        &self,
        _ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> FhirResult<Resource> {
        read_from(&self.store.read(), resource_type, id)
    }
}
