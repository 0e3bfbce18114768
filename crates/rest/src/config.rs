//! Engine configuration.
//!
//! Configuration can be built programmatically, parsed from command line
//! arguments, or read from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HFE_SERVER_PORT` | 8080 | Server port |
//! | `HFE_SERVER_HOST` | 127.0.0.1 | Host to bind |
//! | `HFE_LOG_LEVEL` | info | Log level |
//! | `HFE_MAX_BODY_SIZE` | 10485760 | Max request body (bytes) |
//! | `HFE_REQUEST_TIMEOUT` | 30 | Request timeout (seconds) |
//! | `HFE_ENABLE_CORS` | true | Enable CORS |
//! | `HFE_CORS_ORIGINS` | * | Allowed origins |
//! | `HFE_CORS_METHODS` | GET,POST,PUT,DELETE,OPTIONS | Allowed methods |
//! | `HFE_CORS_HEADERS` | Content-Type,Authorization,Accept,Prefer | Allowed headers |
//! | `HFE_BASE_URL` | http://localhost:8080 | Base URL used in links and `Location` |
//! | `HFE_DEFAULT_PAGE_SIZE` | 20 | `_count` when none is given |
//! | `HFE_MAX_PAGE_SIZE` | 1000 | Upper bound for `_count` |
//! | `HFE_STRICT_SEARCH` | false | Reject undeclared search parameters |
//! | `HFE_DEFAULT_FORMAT` | json | Response format when nothing is negotiated |
//!
//! # Example
//!
//! ```rust
//! use helios_engine::ServerConfig;
//!
//! let config = ServerConfig {
//!     port: 3000,
//!     strict_search: true,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use clap::Parser;

use crate::middleware::content_type::FhirFormat;
use crate::search::PageLimits;

/// Engine configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "hfe")]
#[command(about = "Helios FHIR capability engine")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(short, long, env = "HFE_SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "HFE_SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "HFE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum request body size in bytes.
    #[arg(long, env = "HFE_MAX_BODY_SIZE", default_value = "10485760")]
    pub max_body_size: usize,

    /// Request timeout in seconds.
    #[arg(long, env = "HFE_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Enable CORS.
    #[arg(long, env = "HFE_ENABLE_CORS", default_value = "true")]
    pub enable_cors: bool,

    /// Allowed CORS origins (comma-separated, or * for all).
    #[arg(long, env = "HFE_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Allowed CORS methods (comma-separated, or * for all).
    #[arg(long, env = "HFE_CORS_METHODS", default_value = "GET,POST,PUT,DELETE,OPTIONS")]
    pub cors_methods: String,

    /// Allowed CORS headers (comma-separated, or * for all).
    #[arg(
        long,
        env = "HFE_CORS_HEADERS",
        default_value = "Content-Type,Authorization,Accept,Prefer"
    )]
    pub cors_headers: String,

    /// Base URL for the server (used in Location headers and Bundle links).
    #[arg(long, env = "HFE_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Default page size for search results.
    #[arg(long, env = "HFE_DEFAULT_PAGE_SIZE", default_value = "20")]
    pub default_page_size: usize,

    /// Maximum page size for search results.
    #[arg(long, env = "HFE_MAX_PAGE_SIZE", default_value = "1000")]
    pub max_page_size: usize,

    /// Reject undeclared search parameters and includes with 400 instead of
    /// ignoring them. Can be overridden per request with `Prefer: handling=`.
    #[arg(long, env = "HFE_STRICT_SEARCH", default_value = "false")]
    pub strict_search: bool,

    /// Response format used when neither `_format` nor `Accept` selects one.
    #[arg(long, env = "HFE_DEFAULT_FORMAT", default_value = "json")]
    pub default_format: FhirFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
            request_timeout: 30,
            enable_cors: true,
            cors_origins: "*".to_string(),
            cors_methods: "GET,POST,PUT,DELETE,OPTIONS".to_string(),
            cors_headers: "Content-Type,Authorization,Accept,Prefer".to_string(),
            base_url: "http://localhost:8080".to_string(),
            default_page_size: 20,
            max_page_size: 1000,
            strict_search: false,
            default_format: FhirFormat::Json,
        }
    }
}

impl ServerConfig {
    /// Creates a new ServerConfig from environment variables, falling back
    /// to defaults when they do not parse.
    pub fn from_env() -> Self {
        Self::try_parse_from(["hfe"]).unwrap_or_default()
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Returns the `_count` limits.
    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_count: self.default_page_size,
            max_count: self.max_page_size,
        }
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_body_size == 0 {
            errors.push("Max body size cannot be 0".to_string());
        }

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.default_page_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }

        if self.default_page_size > self.max_page_size {
            errors.push("Default page size cannot exceed max page size".to_string());
        }

        if url::Url::parse(&self.base_url).is_err() {
            errors.push(format!("Base URL is not absolute: {}", self.base_url));
        }

        if cfg!(not(feature = "xml")) && self.default_format == FhirFormat::Xml {
            errors.push("Default format xml requires the xml feature".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    pub fn for_testing() -> Self {
        Self {
            port: 0,
            log_level: "debug".to_string(),
            request_timeout: 5,
            enable_cors: false,
            cors_methods: "*".to_string(),
            cors_headers: "*".to_string(),
            base_url: "http://localhost:8080".to_string(),
            default_page_size: 10,
            max_page_size: 100,
            ..Default::default()
        }
    }
}
