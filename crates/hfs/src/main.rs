//! Helios FHIR Engine server (hfe)
//!
//! Serves the capability engine over an in-memory backend, optionally seeded
//! from a JSON resource or Bundle file.

use std::path::PathBuf;

use clap::Parser;
use helios_engine::backends::MemoryBackend;
use helios_engine::search::SearchParamType;
use helios_engine::{
    CapabilityBase, CapabilityRegistry, ServerConfig, create_app_with_config, init_logging,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "hfe", version, about = "Helios FHIR capability engine server")]
struct Cli {
    #[command(flatten)]
    server: ServerConfig,

    /// JSON resource or Bundle loaded into the store at startup.
    #[arg(long, env = "HFE_DATA_FILE")]
    data_file: Option<PathBuf>,

    /// Resource types served by the in-memory backend.
    #[arg(
        long,
        env = "HFE_RESOURCE_TYPES",
        value_delimiter = ',',
        default_value = "Patient,Observation,Encounter,Practitioner,Organization"
    )]
    resource_types: Vec<String>,
}

/// Builds the in-memory backend with a common set of search parameters.
fn memory_backend(resource_types: &[String]) -> MemoryBackend {
    let mut backend = MemoryBackend::new();
    for resource_type in resource_types {
        backend = backend.serve(resource_type);
    }

    let served = |t: &str| resource_types.iter().any(|r| r == t);
    if served("Patient") {
        backend = backend
            .with_search_param("Patient", "family", SearchParamType::String, "Patient.name.family")
            .with_search_param("Patient", "given", SearchParamType::String, "Patient.name.given")
            .with_search_param("Patient", "gender", SearchParamType::Token, "Patient.gender")
            .with_search_param("Patient", "birthdate", SearchParamType::Date, "Patient.birthDate");
    }
    if served("Observation") {
        backend = backend
            .with_search_param(
                "Observation",
                "status",
                SearchParamType::Token,
                "Observation.status",
            )
            .with_search_param(
                "Observation",
                "date",
                SearchParamType::Date,
                "Observation.effectiveDateTime",
            )
            .with_search_param(
                "Observation",
                "value-quantity",
                SearchParamType::Quantity,
                "Observation.valueQuantity.value",
            )
            .with_search_param(
                "Observation",
                "subject",
                SearchParamType::Reference,
                "Observation.subject.reference",
            );
        if served("Patient") {
            backend = backend.with_include("Observation", "Observation:subject");
        }
    }
    backend
}

fn load_data(backend: &MemoryBackend, path: &PathBuf) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let loaded = backend
        .load(value)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?;
    info!(file = %path.display(), resources = loaded, "Loaded seed data");
    Ok(())
}

/// Starts the Axum HTTP server.
async fn serve(app: axum::Router, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr();
    info!(address = %addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.server;
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let backend = memory_backend(&cli.resource_types);
    if let Some(path) = &cli.data_file {
        load_data(&backend, path)?;
    }

    let base = CapabilityBase::default().with_implementation(
        "Helios FHIR Engine in-memory server",
        Some(config.base_url().to_string()),
    );
    let registry = backend
        .register(CapabilityRegistry::builder().base(base))
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid capability registration: {}", e))?;

    info!(
        port = config.port,
        host = %config.host,
        resource_types = ?cli.resource_types,
        default_format = %config.default_format,
        "Starting Helios FHIR Engine"
    );

    let app = create_app_with_config(registry, config.clone());
    serve(app, &config).await
}
