//! Extended operation dispatch (`$operation`).
//!
//! An operation request goes through five steps:
//!
//! 1. **Resolve** the code against the type's declared operations, then the
//!    system operations.
//! 2. **Fetch** the OperationDefinition named by the declaration's canonical
//!    URL through the generic read capability.
//! 3. **Validate the level**: the definition must allow system, type or
//!    instance invocation, and list the target type (or `Resource`).
//! 4. **Validate the method**: operations that affect state cannot be
//!    invoked with GET.
//! 5. **Invoke** the backend with the assembled `Parameters` resource.

use serde_json::{Value, json};
use tracing::debug;

use crate::capabilities::{
    CapabilityRegistry, CapabilityStatement, Invocation, OperationDeclaration,
};
use crate::error::{FhirError, FhirResult};
use crate::extractors::RequestContext;
use crate::fhir_types::is_valid_resource_type;
use crate::fhirpath;
use crate::resource::Resource;

/// The level an operation is invoked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationLevel {
    /// `[base]/$code`
    System,
    /// `[base]/[type]/$code`
    Type,
    /// `[base]/[type]/[id]/$code`
    Instance,
}

impl OperationLevel {
    /// The OperationDefinition flag that enables this level.
    pub fn definition_flag(&self) -> &'static str {
        match self {
            OperationLevel::System => "system",
            OperationLevel::Type => "type",
            OperationLevel::Instance => "instance",
        }
    }
}

/// The target of an operation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    /// Target type, absent for system operations.
    pub resource_type: Option<String>,
    /// Target id, present for instance operations.
    pub resource_id: Option<String>,
    /// Operation code without the leading `$`.
    pub code: String,
}

impl OperationRequest {
    /// A system level request.
    pub fn system(code: &str) -> Self {
        Self {
            resource_type: None,
            resource_id: None,
            code: strip_dollar(code),
        }
    }

    /// A type level request.
    pub fn type_level(resource_type: &str, code: &str) -> Self {
        Self {
            resource_type: Some(resource_type.to_string()),
            resource_id: None,
            code: strip_dollar(code),
        }
    }

    /// An instance level request.
    pub fn instance(resource_type: &str, id: &str, code: &str) -> Self {
        Self {
            resource_type: Some(resource_type.to_string()),
            resource_id: Some(id.to_string()),
            code: strip_dollar(code),
        }
    }

    /// Returns the invocation level.
    pub fn level(&self) -> OperationLevel {
        match (&self.resource_type, &self.resource_id) {
            (None, _) => OperationLevel::System,
            (Some(_), None) => OperationLevel::Type,
            (Some(_), Some(_)) => OperationLevel::Instance,
        }
    }
}

fn strip_dollar(code: &str) -> String {
    code.strip_prefix('$').unwrap_or(code).to_string()
}

/// How the operation's input parameters arrived.
#[derive(Debug, Clone)]
pub enum OperationInput {
    /// GET: query pairs, each becoming a string parameter.
    Query(Vec<(String, String)>),
    /// POST: a decoded request body, which must be `Parameters`.
    Body(Resource),
}

impl OperationInput {
    fn is_get(&self) -> bool {
        matches!(self, OperationInput::Query(_))
    }
}

/// Finds the declaration for a request: type operations first, then system
/// operations.
pub fn resolve<'a>(
    statement: &'a CapabilityStatement,
    request: &OperationRequest,
) -> FhirResult<&'a OperationDeclaration> {
    let type_operations = request
        .resource_type
        .as_deref()
        .map(|t| statement.type_operations(t))
        .unwrap_or_default();

    type_operations
        .iter()
        .chain(statement.system_operations.iter())
        .find(|op| op.name == request.code)
        .ok_or_else(|| {
            FhirError::processing(format!("operation '${}' not declared", request.code))
        })
}

/// Extracts the OperationDefinition id from a canonical URL, dropping any
/// `|version` suffix.
pub fn definition_id(canonical: &str) -> FhirResult<&str> {
    let url = canonical.split('|').next().unwrap_or_default();
    url.rsplit_once("OperationDefinition/")
        .map(|(_, id)| id.trim_end_matches('/'))
        .filter(|id| !id.is_empty() && !id.contains('/'))
        .ok_or_else(|| {
            FhirError::processing(format!(
                "operation definition reference '{}' is not an OperationDefinition URL",
                canonical
            ))
        })
}

/// Checks that the definition allows the request's level and target type.
pub fn validate_level(definition: &Resource, request: &OperationRequest) -> FhirResult<()> {
    let level = request.level();
    if fhirpath::boolean(definition, level.definition_flag()) != Some(true) {
        return Err(FhirError::not_supported(format!(
            "operation '${}' cannot be invoked at {} level",
            request.code,
            level.definition_flag()
        )));
    }

    if let Some(resource_type) = &request.resource_type {
        let allowed = fhirpath::strings(definition, "resource");
        if !allowed
            .iter()
            .any(|t| *t == "Resource" || *t == resource_type.as_str())
        {
            return Err(FhirError::not_supported(format!(
                "operation '${}' is not defined for resource type '{}'",
                request.code, resource_type
            )));
        }
    }

    Ok(())
}

/// Rejects GET for operations that affect state.
pub fn validate_method(definition: &Resource, code: &str, is_get: bool) -> FhirResult<()> {
    if is_get && fhirpath::boolean(definition, "affectsState") == Some(true) {
        return Err(FhirError::not_supported(format!(
            "operation '${}' affects state and cannot be invoked with GET",
            code
        )));
    }
    Ok(())
}

/// Builds the `Parameters` resource passed to the backend.
pub fn assemble_parameters(input: OperationInput) -> FhirResult<Resource> {
    match input {
        OperationInput::Query(pairs) => {
            let parameter: Vec<Value> = pairs
                .into_iter()
                .filter(|(name, _)| name != "_format")
                .map(|(name, value)| json!({ "name": name, "valueString": value }))
                .collect();

            let mut parameters = json!({ "resourceType": "Parameters" });
            if !parameter.is_empty() {
                parameters["parameter"] = Value::Array(parameter);
            }
            Resource::from_value(parameters)
        }
        OperationInput::Body(resource) => {
            if resource.resource_type() != "Parameters" {
                return Err(FhirError::invalid_request(format!(
                    "operation body must be a Parameters resource, got {}",
                    resource.resource_type()
                )));
            }
            Ok(resource)
        }
    }
}

/// Runs an operation request end to end.
pub async fn dispatch(
    registry: &CapabilityRegistry,
    statement: &CapabilityStatement,
    ctx: &RequestContext,
    request: OperationRequest,
    input: OperationInput,
) -> FhirResult<Option<Resource>> {
    if let Some(resource_type) = &request.resource_type {
        if !is_valid_resource_type(resource_type) {
            return Err(FhirError::UnknownResourceType(resource_type.clone()));
        }
    }

    let declaration = resolve(statement, &request)?;
    let id = definition_id(&declaration.definition)?;
    debug!(
        code = %request.code,
        definition = %declaration.definition,
        "Resolved operation"
    );

    let definition = registry
        .read_generic(ctx, "OperationDefinition", id)
        .await?;
    definition.expect_type("OperationDefinition")?;

    validate_level(&definition, &request)?;
    validate_method(&definition, &request.code, input.is_get())?;

    let parameters = assemble_parameters(input)?;
    registry
        .invoke(
            ctx,
            Invocation {
                resource_type: request.resource_type,
                resource_id: request.resource_id,
                code: request.code,
                parameters,
            },
        )
        .await
}
