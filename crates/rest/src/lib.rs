//! # helios-engine - FHIR capability negotiation and dispatch
//!
//! A generic engine for the [FHIR RESTful API](https://hl7.org/fhir/http.html).
//! An integrator registers resource-type specific capabilities (read,
//! search, create, update, delete, operation invocation); the engine
//! advertises them in a synthesized CapabilityStatement, routes requests to
//! them and enforces the protocol's search, paging and operation rules.
//!
//! ## Features
//!
//! - **Capability registry**: per-type handlers behind `async` traits, with
//!   closure implementations for quick wiring
//! - **CapabilityStatement**: synthesized once, deterministic
//! - **Search**: `name:modifier=value` parsing with OR lists, AND repeats,
//!   prefixes and cursor paging into searchset Bundles
//! - **Operations**: `$code` resolution, OperationDefinition-based level and
//!   method checks
//! - **Content negotiation**: JSON and (feature `xml`) XML
//! - **Client**: HTTP client with a lazy page iterator
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use helios_engine::capabilities::CapabilityRegistry;
//! use helios_engine::extractors::RequestContext;
//! use helios_engine::{FhirResult, Resource, ServerConfig, create_app_with_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = CapabilityRegistry::builder()
//!         .read("Patient", |_ctx: RequestContext, id: String| async move {
//!             let mut patient = Resource::new("Patient");
//!             patient.set_id(id);
//!             FhirResult::Ok(patient)
//!         })
//!         .build()?;
//!
//!     let app = create_app_with_config(registry, ServerConfig::default());
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Interaction | HTTP Method | URL Pattern |
//! |------------|-------------|-------------|
//! | capabilities | GET | `/metadata` |
//! | read | GET | `/[type]/[id]` |
//! | search | GET/POST | `/[type]?params` or `/[type]/_search` |
//! | create | POST | `/[type]` |
//! | update | PUT | `/[type]/[id]` |
//! | delete | DELETE | `/[type]/[id]` |
//! | operation | GET/POST | `/$op`, `/[type]/$op`, `/[type]/[id]/$op` |
//!
//! ## Error Handling
//!
//! Every failure is returned as an
//! [OperationOutcome](https://hl7.org/fhir/operationoutcome.html) in the
//! negotiated format. See [`error::FhirError`] for the status mapping.
//!
//! ## Architecture
//!
//! - [`capabilities`] - Registry, dispatcher and CapabilityStatement
//! - [`search`] - Search parsing, validation, links and cursors
//! - [`operations`] - `$operation` resolution and validation
//! - [`handlers`] / [`routing`] - HTTP surface
//! - [`client`] - HTTP client and page iterator
//! - [`backends`] - In-memory backend for demos and tests

// Enforce documentation
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod capabilities;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod extractors;
pub mod fhir_types;
pub mod fhirpath;
pub mod handlers;
pub mod middleware;
pub mod operations;
pub mod resource;
pub mod responses;
pub mod routing;
pub mod search;
pub mod state;
#[cfg(feature = "xml")]
pub mod xml;

// Re-export commonly used types
pub use capabilities::{CapabilityBase, CapabilityRegistry, CapabilityStatement};
pub use config::ServerConfig;
pub use error::{FhirError, FhirResult};
pub use resource::Resource;
pub use state::AppState;

use axum::{Router, extract::DefaultBodyLimit, middleware::from_fn};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the Axum application with default configuration.
pub fn create_app(registry: CapabilityRegistry) -> Router {
    create_app_with_config(registry, ServerConfig::default())
}

/// Creates the Axum application with custom configuration.
///
/// Synthesizes the CapabilityStatement, builds the routes and applies the
/// middleware stack (tracing, request logging, timeout, body limit and
/// optional CORS).
pub fn create_app_with_config(registry: CapabilityRegistry, config: ServerConfig) -> Router {
    create_app_with_state(AppState::new(registry, config))
}

/// Creates the Axum application from a prepared [`AppState`].
pub fn create_app_with_state(state: AppState) -> Router {
    let config = state.config().clone();
    info!(
        base_url = %config.base_url(),
        strict_search = config.strict_search,
        default_format = %config.default_format,
        "Creating FHIR engine"
    );

    let router = routing::fhir_routes::create_routes(state);

    // Build middleware stack
    let service_builder = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(middleware::request_logging))
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            std::time::Duration::from_secs(config.request_timeout),
        ))
        .layer(DefaultBodyLimit::max(config.max_body_size));

    // Add CORS if enabled
    let router = if config.enable_cors {
        router.layer(build_cors_layer(&config))
    } else {
        router
    };

    router.layer(service_builder)
}

/// Builds the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let mut cors = CorsLayer::new();

    if config.cors_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    if config.cors_methods == "*" {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Vec<_> = config
            .cors_methods
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_methods(methods);
    }

    if config.cors_headers == "*" {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<_> = config
            .cors_headers
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    cors
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence; otherwise the engine logs at `level` and
/// `tower_http` at debug. Call once at startup.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("helios_engine={},tower_http=debug", level)));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
