//! Capability registry and dispatcher.
//!
//! The registry is built once, at startup, from explicit registrations and
//! shared read-only across requests. Dispatch is a hash lookup by type name
//! followed by a presence check on the requested interaction:
//!
//! - a type outside the universe fails with [`FhirError::UnknownResourceType`],
//!   whatever the interaction;
//! - a known type without a handler fails with [`FhirError::NotImplemented`];
//! - otherwise the handler runs and its result is returned unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{
    CapabilityBase, CreateCapability, DeleteCapability, GenericReadCapability, Interaction,
    Invocation, InvokeCapability, ReadCapability, SearchCapability, UpdateCapability,
    UpdateOutcome,
};
use crate::error::{FhirError, FhirResult};
use crate::extractors::RequestContext;
use crate::fhir_types::is_valid_resource_type;
use crate::resource::Resource;
use crate::search::{SearchCapabilities, SearchOptions, SearchResult};

/// Errors raised while building a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A capability was registered for a type outside the universe.
    #[error("cannot register {interaction} for unknown resource type '{resource_type}'")]
    UnknownResourceType {
        /// The offending type name.
        resource_type: String,
        /// The interaction being registered.
        interaction: Interaction,
    },
}

/// Handlers registered for one resource type.
#[derive(Clone, Default)]
pub struct TypeCapabilities {
    read: Option<Arc<dyn ReadCapability>>,
    search: Option<Arc<dyn SearchCapability>>,
    create: Option<Arc<dyn CreateCapability>>,
    update: Option<Arc<dyn UpdateCapability>>,
    delete: Option<Arc<dyn DeleteCapability>>,
}

impl TypeCapabilities {
    /// Returns true if a handler is registered for the interaction.
    pub fn supports(&self, interaction: Interaction) -> bool {
        match interaction {
            Interaction::Read => self.read.is_some(),
            Interaction::Search => self.search.is_some(),
            Interaction::Create => self.create.is_some(),
            Interaction::Update => self.update.is_some(),
            Interaction::Delete => self.delete.is_some(),
            Interaction::Invoke => false,
        }
    }
}

impl std::fmt::Debug for TypeCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let supported: Vec<&str> = Interaction::TYPE_INTERACTIONS
            .iter()
            .filter(|i| self.supports(**i))
            .map(|i| i.code())
            .collect();
        f.debug_struct("TypeCapabilities")
            .field("interactions", &supported)
            .finish()
    }
}

/// Collects capability registrations and builds a [`CapabilityRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    types: HashMap<String, TypeCapabilities>,
    generic_read: Option<Arc<dyn GenericReadCapability>>,
    invoke: Option<Arc<dyn InvokeCapability>>,
    base: CapabilityBase,
    errors: Vec<RegistryError>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server-wide capability information.
    pub fn base(mut self, base: CapabilityBase) -> Self {
        self.base = base;
        self
    }

    fn slot(
        &mut self,
        resource_type: &str,
        interaction: Interaction,
    ) -> Option<&mut TypeCapabilities> {
        if !is_valid_resource_type(resource_type) {
            self.errors.push(RegistryError::UnknownResourceType {
                resource_type: resource_type.to_string(),
                interaction,
            });
            return None;
        }
        Some(self.types.entry(resource_type.to_string()).or_default())
    }

    /// Registers a read handler.
    pub fn read<H: ReadCapability + 'static>(mut self, resource_type: &str, handler: H) -> Self {
        if let Some(slot) = self.slot(resource_type, Interaction::Read) {
            slot.read = Some(Arc::new(handler));
        }
        self
    }

    /// Registers a search handler.
    pub fn search<H: SearchCapability + 'static>(
        mut self,
        resource_type: &str,
        handler: H,
    ) -> Self {
        if let Some(slot) = self.slot(resource_type, Interaction::Search) {
            slot.search = Some(Arc::new(handler));
        }
        self
    }

    /// Registers a create handler.
    pub fn create<H: CreateCapability + 'static>(
        mut self,
        resource_type: &str,
        handler: H,
    ) -> Self {
        if let Some(slot) = self.slot(resource_type, Interaction::Create) {
            slot.create = Some(Arc::new(handler));
        }
        self
    }

    /// Registers an update handler.
    pub fn update<H: UpdateCapability + 'static>(
        mut self,
        resource_type: &str,
        handler: H,
    ) -> Self {
        if let Some(slot) = self.slot(resource_type, Interaction::Update) {
            slot.update = Some(Arc::new(handler));
        }
        self
    }

    /// Registers a delete handler.
    pub fn delete<H: DeleteCapability + 'static>(
        mut self,
        resource_type: &str,
        handler: H,
    ) -> Self {
        if let Some(slot) = self.slot(resource_type, Interaction::Delete) {
            slot.delete = Some(Arc::new(handler));
        }
        self
    }

    /// Registers a read handler covering every type.
    pub fn generic_read<H: GenericReadCapability + 'static>(mut self, handler: H) -> Self {
        self.generic_read = Some(Arc::new(handler));
        self
    }

    /// Registers the operation handler.
    pub fn invoke<H: InvokeCapability + 'static>(mut self, handler: H) -> Self {
        self.invoke = Some(Arc::new(handler));
        self
    }

    /// Builds the registry, failing on the first registration for an
    /// unknown resource type.
    pub fn build(mut self) -> Result<CapabilityRegistry, RegistryError> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }
        Ok(CapabilityRegistry {
            types: self.types,
            generic_read: self.generic_read,
            invoke: self.invoke,
            base: self.base,
        })
    }
}

/// Dispatches requests to registered capabilities.
pub struct CapabilityRegistry {
    types: HashMap<String, TypeCapabilities>,
    generic_read: Option<Arc<dyn GenericReadCapability>>,
    invoke: Option<Arc<dyn InvokeCapability>>,
    base: CapabilityBase,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("types", &self.types)
            .field("generic_read", &self.generic_read.is_some())
            .field("invoke", &self.invoke.is_some())
            .finish()
    }
}

fn not_implemented(interaction: Interaction, resource_type: &str) -> FhirError {
    FhirError::NotImplemented {
        interaction,
        resource_type: resource_type.to_string(),
    }
}

impl CapabilityRegistry {
    /// Returns a builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Returns the server-wide capability information.
    pub fn base(&self) -> &CapabilityBase {
        &self.base
    }

    fn type_capabilities(&self, resource_type: &str) -> FhirResult<Option<&TypeCapabilities>> {
        if !is_valid_resource_type(resource_type) {
            return Err(FhirError::UnknownResourceType(resource_type.to_string()));
        }
        Ok(self.types.get(resource_type))
    }

    /// Returns true if the type is known and has a handler for the
    /// interaction. `Invoke` reports whether an operation handler exists.
    pub fn supports(&self, resource_type: &str, interaction: Interaction) -> bool {
        if !is_valid_resource_type(resource_type) {
            return false;
        }
        if interaction == Interaction::Invoke {
            return self.invoke.is_some();
        }
        self.types
            .get(resource_type)
            .is_some_and(|caps| caps.supports(interaction))
    }

    /// Fails with the same error the interaction itself would raise when the
    /// type is unknown or has no handler for it.
    pub fn ensure_supported(
        &self,
        resource_type: &str,
        interaction: Interaction,
    ) -> FhirResult<()> {
        self.type_capabilities(resource_type)?;
        if self.supports(resource_type, interaction) {
            Ok(())
        } else {
            Err(not_implemented(interaction, resource_type))
        }
    }

    /// Reads a resource.
    pub async fn read(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> FhirResult<Resource> {
        let handler = self
            .type_capabilities(resource_type)?
            .and_then(|caps| caps.read.as_ref())
            .ok_or_else(|| not_implemented(Interaction::Read, resource_type))?;

        debug!(resource_type = %resource_type, id = %id, "Dispatching read");
        handler.read(ctx, id).await
    }

    /// Returns the declared search parameters for a type.
    pub fn search_capabilities(&self, resource_type: &str) -> FhirResult<SearchCapabilities> {
        let handler = self
            .type_capabilities(resource_type)?
            .and_then(|caps| caps.search.as_ref())
            .ok_or_else(|| not_implemented(Interaction::Search, resource_type))?;
        Ok(handler.search_capabilities())
    }

    /// Runs a search.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        options: &SearchOptions,
    ) -> FhirResult<SearchResult> {
        let handler = self
            .type_capabilities(resource_type)?
            .and_then(|caps| caps.search.as_ref())
            .ok_or_else(|| not_implemented(Interaction::Search, resource_type))?;

        debug!(
            resource_type = %resource_type,
            params = options.parameters.len(),
            count = options.count,
            "Dispatching search"
        );
        handler.search(ctx, options).await
    }

    /// Creates a resource.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Resource,
    ) -> FhirResult<Resource> {
        let handler = self
            .type_capabilities(resource_type)?
            .and_then(|caps| caps.create.as_ref())
            .ok_or_else(|| not_implemented(Interaction::Create, resource_type))?;

        debug!(resource_type = %resource_type, "Dispatching create");
        handler.create(ctx, resource).await
    }

    /// Updates a resource.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Resource,
    ) -> FhirResult<UpdateOutcome> {
        let handler = self
            .type_capabilities(resource_type)?
            .and_then(|caps| caps.update.as_ref())
            .ok_or_else(|| not_implemented(Interaction::Update, resource_type))?;

        debug!(resource_type = %resource_type, id = ?resource.id(), "Dispatching update");
        handler.update(ctx, resource).await
    }

    /// Deletes a resource.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> FhirResult<()> {
        let handler = self
            .type_capabilities(resource_type)?
            .and_then(|caps| caps.delete.as_ref())
            .ok_or_else(|| not_implemented(Interaction::Delete, resource_type))?;

        debug!(resource_type = %resource_type, id = %id, "Dispatching delete");
        handler.delete(ctx, id).await
    }

    /// Reads a resource through the generic read handler, falling back to
    /// the per-type read handler.
    pub async fn read_generic(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> FhirResult<Resource> {
        match &self.generic_read {
            Some(handler) => {
                if !is_valid_resource_type(resource_type) {
                    return Err(FhirError::UnknownResourceType(resource_type.to_string()));
                }
                debug!(resource_type = %resource_type, id = %id, "Dispatching generic read");
                handler.read(ctx, resource_type, id).await
            }
            None => self.read(ctx, resource_type, id).await,
        }
    }

    /// Invokes an operation.
    pub async fn invoke(
        &self,
        ctx: &RequestContext,
        invocation: Invocation,
    ) -> FhirResult<Option<Resource>> {
        if let Some(resource_type) = &invocation.resource_type {
            if !is_valid_resource_type(resource_type) {
                return Err(FhirError::UnknownResourceType(resource_type.clone()));
            }
        }
        let handler = self.invoke.as_ref().ok_or_else(|| {
            not_implemented(
                Interaction::Invoke,
                invocation.resource_type.as_deref().unwrap_or("system"),
            )
        })?;

        debug!(
            code = %invocation.code,
            resource_type = ?invocation.resource_type,
            id = ?invocation.resource_id,
            "Dispatching operation"
        );
        handler.invoke(ctx, invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhir_types::get_resource_type_names;
    use crate::search::SearchParamType;
    use async_trait::async_trait;
    use serde_json::json;

    struct PatientSearch;

    #[async_trait]
    impl SearchCapability for PatientSearch {
        fn search_capabilities(&self) -> SearchCapabilities {
            SearchCapabilities::new().parameter("_id", SearchParamType::Token)
        }

        async fn search(
            &self,
            _ctx: &RequestContext,
            _options: &SearchOptions,
        ) -> FhirResult<SearchResult> {
            Ok(SearchResult::new(vec![Resource::new("Patient")]))
        }
    }

    fn patient_registry() -> CapabilityRegistry {
        RegistryBuilder::new()
            .read("Patient", |_ctx: RequestContext, id: String| async move {
                let mut patient = Resource::new("Patient");
                patient.set_id(id);
                FhirResult::Ok(patient)
            })
            .search("Patient", PatientSearch)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_dispatch() {
        let registry = patient_registry();
        let ctx = RequestContext::background();

        let patient = registry.read(&ctx, "Patient", "p1").await.unwrap();
        assert_eq!(patient.id(), Some("p1"));
    }

    #[tokio::test]
    async fn test_unknown_type_checked_first() {
        let registry = patient_registry();
        let ctx = RequestContext::background();

        let err = registry.read(&ctx, "Unicorn", "1").await.unwrap_err();
        assert!(matches!(err, FhirError::UnknownResourceType(t) if t == "Unicorn"));

        let err = registry
            .delete(&ctx, "Unicorn", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, FhirError::UnknownResourceType(_)));
    }

    #[tokio::test]
    async fn test_not_implemented() {
        let registry = patient_registry();
        let ctx = RequestContext::background();

        let err = registry.read(&ctx, "Observation", "1").await.unwrap_err();
        assert!(matches!(
            err,
            FhirError::NotImplemented { interaction: Interaction::Read, ref resource_type }
                if resource_type == "Observation"
        ));

        let err = registry
            .create(&ctx, "Patient", Resource::new("Patient"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FhirError::NotImplemented {
                interaction: Interaction::Create,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dispatch_totality() {
        let registry = patient_registry();
        let ctx = RequestContext::background();

        for resource_type in get_resource_type_names() {
            let result = registry.read(&ctx, resource_type, "x").await;
            match result {
                Ok(_) => assert_eq!(*resource_type, "Patient"),
                Err(FhirError::NotImplemented { .. }) => assert_ne!(*resource_type, "Patient"),
                Err(other) => panic!("unexpected error for {}: {}", resource_type, other),
            }
        }
    }

    #[test]
    fn test_supports() {
        let registry = patient_registry();

        assert!(registry.supports("Patient", Interaction::Read));
        assert!(registry.supports("Patient", Interaction::Search));
        assert!(!registry.supports("Patient", Interaction::Update));
        assert!(!registry.supports("Observation", Interaction::Read));
        assert!(!registry.supports("Unicorn", Interaction::Read));
        assert!(!registry.supports("Patient", Interaction::Invoke));
    }

    #[test]
    fn test_build_rejects_unknown_type() {
        let result = RegistryBuilder::new()
            .delete("Nonsense", |_ctx: RequestContext, _id: String| async move {
                FhirResult::Ok(())
            })
            .build();

        assert_eq!(
            result.unwrap_err(),
            RegistryError::UnknownResourceType {
                resource_type: "Nonsense".to_string(),
                interaction: Interaction::Delete,
            }
        );
    }

    #[tokio::test]
    async fn test_read_generic_prefers_generic_handler() {
        let registry = RegistryBuilder::new()
            .read("OperationDefinition", |_ctx: RequestContext, _id: String| async move {
                FhirResult::<Resource>::Err(FhirError::not_found("OperationDefinition", "typed"))
            })
            .generic_read(
                |_ctx: RequestContext, resource_type: String, id: String| async move {
                    Resource::from_value(json!({"resourceType": resource_type, "id": id}))
                },
            )
            .build()
            .unwrap();
        let ctx = RequestContext::background();

        let def = registry
            .read_generic(&ctx, "OperationDefinition", "op")
            .await
            .unwrap();
        assert_eq!(def.id(), Some("op"));
    }

    #[tokio::test]
    async fn test_read_generic_falls_back() {
        let registry = patient_registry();
        let ctx = RequestContext::background();

        let patient = registry.read_generic(&ctx, "Patient", "p9").await.unwrap();
        assert_eq!(patient.id(), Some("p9"));

        let err = registry
            .read_generic(&ctx, "OperationDefinition", "op")
            .await
            .unwrap_err();
        assert!(matches!(err, FhirError::NotImplemented { .. }));
    }

    #[tokio::test]
    async fn test_invoke_without_handler() {
        let registry = patient_registry();
        let ctx = RequestContext::background();
        let invocation = Invocation {
            resource_type: None,
            resource_id: None,
            code: "ping".to_string(),
            parameters: Resource::new("Parameters"),
        };

        let err = registry.invoke(&ctx, invocation).await.unwrap_err();
        assert!(matches!(
            err,
            FhirError::NotImplemented { interaction: Interaction::Invoke, ref resource_type }
                if resource_type == "system"
        ));
    }
}
