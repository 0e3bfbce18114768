//! Backend capability contracts.
//!
//! A backend is described by a set of per-type capabilities registered on a
//! [`RegistryBuilder`]. Each capability is a small `async_trait` with a
//! single job; closures of the matching shape implement the single-method
//! traits directly, so a backend can be assembled from plain functions:
//!
//! ```rust,ignore
//! use helios_engine::{RegistryBuilder, RequestContext, Resource, FhirResult};
//!
//! let registry = RegistryBuilder::new()
//!     .read("Patient", |_ctx: RequestContext, id: String| async move {
//!         FhirResult::Ok(Resource::new("Patient"))
//!     })
//!     .build()?;
//! ```
//!
//! The [`CapabilityRegistry`] dispatches requests to those capabilities and
//! the [`statement`] module turns the same registrations into a
//! CapabilityStatement.

mod registry;
pub mod statement;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::error::FhirResult;
use crate::extractors::RequestContext;
use crate::resource::Resource;
use crate::search::{SearchCapabilities, SearchOptions, SearchResult};

pub use registry::{CapabilityRegistry, RegistryBuilder, RegistryError, TypeCapabilities};
pub use statement::CapabilityStatement;

/// Interactions a backend may implement for a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Interaction {
    /// read - Read the current state of a resource.
    Read,
    /// search-type - Search resources of a type.
    Search,
    /// create - Create a new resource.
    Create,
    /// update - Update an existing resource.
    Update,
    /// delete - Delete a resource.
    Delete,
    /// operation - Invoke a named operation.
    Invoke,
}

impl Interaction {
    /// The per-type interactions advertised in a CapabilityStatement.
    pub const TYPE_INTERACTIONS: [Interaction; 5] = [
        Interaction::Read,
        Interaction::Search,
        Interaction::Create,
        Interaction::Update,
        Interaction::Delete,
    ];

    /// Returns the FHIR interaction code.
    pub fn code(&self) -> &'static str {
        match self {
            Interaction::Read => "read",
            Interaction::Search => "search-type",
            Interaction::Create => "create",
            Interaction::Update => "update",
            Interaction::Delete => "delete",
            Interaction::Invoke => "operation",
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// The stored resource.
    pub resource: Resource,
    /// True if the update created the resource.
    pub created: bool,
}

/// An operation invocation handed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Target type for type and instance level operations.
    pub resource_type: Option<String>,
    /// Target id for instance level operations.
    pub resource_id: Option<String>,
    /// Operation code without the leading `$`.
    pub code: String,
    /// Input parameters as a `Parameters` resource.
    pub parameters: Resource,
}

/// Reads a resource of one type by id.
#[async_trait]
pub trait ReadCapability: Send + Sync {
    /// Returns the resource or [`FhirError::NotFound`](crate::FhirError::NotFound).
    async fn read(&self, ctx: &RequestContext, id: &str) -> FhirResult<Resource>;
}

/// Searches resources of one type.
#[async_trait]
pub trait SearchCapability: Send + Sync {
    /// Declares the parameters and includes this search understands.
    fn search_capabilities(&self) -> SearchCapabilities;

    /// Runs a search with validated options.
    async fn search(&self, ctx: &RequestContext, options: &SearchOptions)
    -> FhirResult<SearchResult>;
}

/// Creates resources of one type.
#[async_trait]
pub trait CreateCapability: Send + Sync {
    /// Stores a new resource and returns it with its assigned id.
    async fn create(&self, ctx: &RequestContext, resource: Resource) -> FhirResult<Resource>;
}

/// Updates resources of one type.
#[async_trait]
pub trait UpdateCapability: Send + Sync {
    /// Stores the resource under its id.
    async fn update(&self, ctx: &RequestContext, resource: Resource) -> FhirResult<UpdateOutcome>;
}

/// Deletes resources of one type.
#[async_trait]
pub trait DeleteCapability: Send + Sync {
    /// Deletes the resource with the given id.
    async fn delete(&self, ctx: &RequestContext, id: &str) -> FhirResult<()>;
}

/// Reads a resource of any type.
#[async_trait]
pub trait GenericReadCapability: Send + Sync {
    /// Returns the resource or [`FhirError::NotFound`](crate::FhirError::NotFound).
    async fn read(&self, ctx: &RequestContext, resource_type: &str, id: &str)
    -> FhirResult<Resource>;
}

/// Invokes named operations.
#[async_trait]
pub trait InvokeCapability: Send + Sync {
    /// Runs the operation; `None` means no output body.
    async fn invoke(
        &self,
        ctx: &RequestContext,
        invocation: Invocation,
    ) -> FhirResult<Option<Resource>>;
}

#[async_trait]
impl<F, Fut> ReadCapability for F
where
    F: Fn(RequestContext, String) -> Fut + Send + Sync,
    Fut: Future<Output = FhirResult<Resource>> + Send,
{
    async fn read(&self, ctx: &RequestContext, id: &str) -> FhirResult<Resource> {
        self(ctx.clone(), id.to_string()).await
    }
}

#[async_trait]
impl<F, Fut> CreateCapability for F
where
    F: Fn(RequestContext, Resource) -> Fut + Send + Sync,
    Fut: Future<Output = FhirResult<Resource>> + Send,
{
    async fn create(&self, ctx: &RequestContext, resource: Resource) -> FhirResult<Resource> {
        self(ctx.clone(), resource).await
    }
}

#[async_trait]
impl<F, Fut> UpdateCapability for F
where
    F: Fn(RequestContext, Resource) -> Fut + Send + Sync,
    Fut: Future<Output = FhirResult<UpdateOutcome>> + Send,
{
    async fn update(&self, ctx: &RequestContext, resource: Resource) -> FhirResult<UpdateOutcome> {
        self(ctx.clone(), resource).await
    }
}

#[async_trait]
impl<F, Fut> DeleteCapability for F
where
    F: Fn(RequestContext, String) -> Fut + Send + Sync,
    Fut: Future<Output = FhirResult<()>> + Send,
{
    async fn delete(&self, ctx: &RequestContext, id: &str) -> FhirResult<()> {
        self(ctx.clone(), id.to_string()).await
    }
}

#[async_trait]
impl<F, Fut> GenericReadCapability for F
where
    F: Fn(RequestContext, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = FhirResult<Resource>> + Send,
{
    async fn read(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> FhirResult<Resource> {
        self(ctx.clone(), resource_type.to_string(), id.to_string()).await
    }
}

#[async_trait]
impl<F, Fut> InvokeCapability for F
where
    F: Fn(RequestContext, Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = FhirResult<Option<Resource>>> + Send,
{
    async fn invoke(
        &self,
        ctx: &RequestContext,
        invocation: Invocation,
    ) -> FhirResult<Option<Resource>> {
        self(ctx.clone(), invocation).await
    }
}

/// A declared operation: its code and the canonical URL of its
/// OperationDefinition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationDeclaration {
    /// Operation code without the leading `$`.
    pub name: String,
    /// Canonical URL of the OperationDefinition, optionally `|version`.
    pub definition: String,
}

impl OperationDeclaration {
    /// Creates a declaration.
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
        }
    }
}

/// Server-wide capability information supplied by the integrator.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityBase {
    /// Software name advertised in the CapabilityStatement.
    pub software_name: String,
    /// Software version, if any.
    pub software_version: Option<String>,
    /// Implementation description.
    pub implementation_description: String,
    /// Implementation base URL, if any.
    pub implementation_url: Option<String>,
    /// System level operations.
    pub system_operations: Vec<OperationDeclaration>,
    /// Type level and instance level operations, by resource type.
    pub type_operations: BTreeMap<String, Vec<OperationDeclaration>>,
}

impl Default for CapabilityBase {
    fn default() -> Self {
        Self {
            software_name: "Helios FHIR Engine".to_string(),
            software_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            implementation_description: "Helios FHIR Engine".to_string(),
            implementation_url: None,
            system_operations: Vec::new(),
            type_operations: BTreeMap::new(),
        }
    }
}

impl CapabilityBase {
    /// Sets the software name.
    pub fn with_software_name(mut self, name: impl Into<String>) -> Self {
        self.software_name = name.into();
        self
    }

    /// Sets the implementation description and URL.
    pub fn with_implementation(
        mut self,
        description: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        self.implementation_description = description.into();
        self.implementation_url = url;
        self
    }

    /// Declares a system level operation.
    pub fn with_system_operation(mut self, name: &str, definition: &str) -> Self {
        self.system_operations
            .push(OperationDeclaration::new(name, definition));
        self
    }

    /// Declares a type or instance level operation for a resource type.
    pub fn with_type_operation(
        mut self,
        resource_type: &str,
        name: &str,
        definition: &str,
    ) -> Self {
        self.type_operations
            .entry(resource_type.to_string())
            .or_default()
            .push(OperationDeclaration::new(name, definition));
        self
    }

    /// Returns the operations declared for a type.
    pub fn operations_for(&self, resource_type: &str) -> &[OperationDeclaration] {
        self.type_operations
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
