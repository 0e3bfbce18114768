//! Search pipeline.
//!
//! `raw query → parsed options → validated options → backend result → Bundle`.
//!
//! - [`params`] - Parameter, option and result types
//! - [`parse`] - Query parsing and validation against declared capabilities
//! - [`links`] - Self/next link construction
//! - [`cursor`] - Offset cursor helpers for simple backends

pub mod cursor;
pub mod links;
pub mod params;
pub mod parse;

use tracing::debug;

pub use params::{
    AllOf, OrList, ParameterKey, ParameterValue, SearchCapabilities, SearchOptions,
    SearchParamType, SearchParameterDesc, SearchPrefix, SearchResult,
};
pub use parse::{PageLimits, parse_search, validate_search};

use crate::capabilities::{CapabilityRegistry, CapabilityStatement};
use crate::error::FhirResult;
use crate::extractors::RequestContext;
use crate::responses::bundle::{BundleBuilder, BundleLink};

/// Settings applied to every search request.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Base URL used in `fullUrl` and links.
    pub base_url: String,
    /// Page size limits.
    pub limits: PageLimits,
    /// Reject undeclared parameters and includes instead of dropping them.
    pub strict: bool,
}

/// Runs a type-level search and returns the searchset Bundle.
///
/// Parameters are filtered against the capabilities cached in `statement`;
/// types missing from it are resolved through the registry, which yields
/// the unknown-type and not-implemented errors.
pub async fn execute(
    registry: &CapabilityRegistry,
    statement: &CapabilityStatement,
    ctx: &RequestContext,
    resource_type: &str,
    pairs: &[(String, String)],
    settings: &SearchSettings,
) -> FhirResult<serde_json::Value> {
    let declared;
    let capabilities = match statement.search_capabilities(resource_type) {
        Some(capabilities) => capabilities,
        None => {
            declared = registry.search_capabilities(resource_type)?;
            &declared
        }
    };

    let options = parse_search(pairs, capabilities, &settings.limits)?;
    let options = validate_search(options, capabilities, settings.strict)?;

    let result = registry.search(ctx, resource_type, &options).await?;
    debug!(
        resource_type = %resource_type,
        matches = result.resources.len(),
        included = result.included.len(),
        has_next = result.next.is_some(),
        "Search completed"
    );

    let mut builder = BundleBuilder::searchset().self_link(links::self_link(
        &settings.base_url,
        resource_type,
        &options,
        capabilities,
    ));
    if let Some(next) = result.next.as_deref().filter(|n| !n.is_empty()) {
        builder = builder.add_link(BundleLink::next(links::next_link(
            &settings.base_url,
            resource_type,
            &options,
            capabilities,
            next,
        )));
    }

    Ok(builder.add_result(&settings.base_url, result)?.build())
}
