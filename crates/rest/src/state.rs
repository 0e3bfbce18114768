//! Application state shared by all request handlers.
//!
//! Holds the capability registry, the CapabilityStatement synthesized from
//! it and the configuration. Everything is behind `Arc`, so cloning the
//! state per request is cheap.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::capabilities::{CapabilityRegistry, CapabilityStatement};
use crate::config::ServerConfig;
use crate::search::SearchSettings;

/// Shared application state.
///
/// # Example
///
/// ```rust
/// use helios_engine::{AppState, ServerConfig};
/// use helios_engine::capabilities::CapabilityRegistry;
///
/// let registry = CapabilityRegistry::builder().build().unwrap();
/// let state = AppState::new(registry, ServerConfig::default());
/// assert!(state.statement().resources.is_empty());
/// ```
#[derive(Clone)]
pub struct AppState {
    registry: Arc<CapabilityRegistry>,
    statement: Arc<CapabilityStatement>,
    config: Arc<ServerConfig>,
}

impl AppState {
    /// Creates the state, synthesizing the CapabilityStatement with the
    /// current time as its date.
    pub fn new(registry: CapabilityRegistry, config: ServerConfig) -> Self {
        Self::with_date(registry, config, Utc::now())
    }

    /// Creates the state with an explicit CapabilityStatement date.
    pub fn with_date(
        registry: CapabilityRegistry,
        config: ServerConfig,
        date: DateTime<Utc>,
    ) -> Self {
        let statement = CapabilityStatement::synthesize(&registry, date, Some(config.base_url()));
        tracing::info!(
            resource_types = statement.resources.len(),
            system_operations = statement.system_operations.len(),
            "Synthesized CapabilityStatement"
        );
        Self {
            registry: Arc::new(registry),
            statement: Arc::new(statement),
            config: Arc::new(config),
        }
    }

    /// Returns the capability registry.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Returns the cached CapabilityStatement.
    pub fn statement(&self) -> &CapabilityStatement {
        &self.statement
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Search settings for one request; `strict` overrides the configured
    /// default when given.
    pub fn search_settings(&self, strict: Option<bool>) -> SearchSettings {
        SearchSettings {
            base_url: self.base_url().to_string(),
            limits: self.config.page_limits(),
            strict: strict.unwrap_or(self.config.strict_search),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FhirResult;
    use crate::extractors::RequestContext;
    use crate::resource::Resource;
    use chrono::TimeZone;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::builder()
            .read("Patient", |_ctx: RequestContext, id: String| async move {
                let mut patient = Resource::new("Patient");
                patient.set_id(id);
                FhirResult::Ok(patient)
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_statement_synthesized_once() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let state = AppState::with_date(registry(), ServerConfig::for_testing(), date);
        let cloned = state.clone();

        assert!(std::ptr::eq(state.statement(), cloned.statement()));
        assert_eq!(state.statement().date, date);
        assert!(state.statement().resource("Patient").is_some());
    }

    #[test]
    fn test_search_settings_override() {
        let config = ServerConfig {
            strict_search: true,
            base_url: "http://example.com/fhir/".to_string(),
            ..ServerConfig::for_testing()
        };
        let state = AppState::new(registry(), config);

        assert!(state.search_settings(None).strict);
        assert!(!state.search_settings(Some(false)).strict);
        assert_eq!(state.search_settings(None).base_url, "http://example.com/fhir");
    }

    #[test]
    fn test_implementation_url_falls_back_to_base_url() {
        let state = AppState::new(registry(), ServerConfig::for_testing());
        assert_eq!(
            state.statement().implementation_url.as_deref(),
            Some("http://localhost:8080")
        );
    }
}
