//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `RECONGW_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `RECONGW_` override YAML values
//! 3. **FLASK_API_URL** - Legacy alias: overrides `upstream.url` if set
//! 4. **UPSTREAM_URL** - Special case: overrides `upstream.url` if set, winning over `FLASK_API_URL`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `RECONGW_UPSTREAM__REQUEST_TIMEOUT=90s` sets the `upstream.request_timeout` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Point the gateway at the reconciliation service
//! UPSTREAM_URL="http://localhost:5000"
//!
//! # Override server port
//! RECONGW_PORT=8080
//!
//! # Allow larger uploads
//! RECONGW_UPLOADS__MAX_FILE_SIZE=104857600
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;
use crate::gateway::FileRole;

const MIB: u64 = 1024 * 1024;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "RECONGW_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults; only `upstream.url` must be supplied.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// The document-reconciliation service files are forwarded to
    pub upstream: UpstreamConfig,
    /// Limits applied to inbound uploads
    pub uploads: UploadConfig,
    /// CORS settings for the browser UI
    pub security: SecurityConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            upstream: UpstreamConfig::default(),
            uploads: UploadConfig::default(),
            security: SecurityConfig::default(),
            enable_metrics: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL of the reconciliation service (e.g. `http://localhost:5000`)
    pub url: Option<Url>,
    /// Path of the processing endpoint, relative to `url`
    pub process_path: String,
    /// Deadline for one complete upstream call, including reading the reply
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Accept certificates that fail validation. Only for self-signed test deployments.
    pub accept_invalid_certs: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            process_path: "/process".to_string(),
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            accept_invalid_certs: false,
        }
    }
}

impl UpstreamConfig {
    /// Full URL of the processing endpoint.
    pub fn endpoint(&self) -> Result<Url, Error> {
        let base = self.url.as_ref().ok_or_else(|| Error::Configuration {
            message: "upstream.url is not set. Set UPSTREAM_URL or add upstream.url to the config file.".to_string(),
        })?;

        ensure_slash(base)
            .join(self.process_path.trim_start_matches('/'))
            .map_err(|e| Error::Configuration {
                message: format!("upstream.process_path '{}' is not a valid path: {e}", self.process_path),
            })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Maximum size of a single uploaded file in bytes
    pub max_file_size: u64,
    pub max_pdf_files: usize,
    pub max_eml_files: usize,
    /// Require each file to carry its role's extension
    pub enforce_extensions: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * MIB,
            max_pdf_files: 10,
            max_eml_files: 10,
            enforce_extensions: true,
        }
    }
}

impl UploadConfig {
    pub fn max_files(&self, role: FileRole) -> usize {
        match role {
            FileRole::Pdf => self.max_pdf_files,
            FileRole::Eml => self.max_eml_files,
            FileRole::Xlsx => 1,
        }
    }

    /// Largest request body that can hold a batch within limits, plus room for multipart framing.
    pub fn max_request_size(&self) -> usize {
        let files = (self.max_pdf_files as u64).saturating_add(self.max_eml_files as u64).saturating_add(1);
        let bytes = self.max_file_size.saturating_mul(files).saturating_add(MIB);
        usize::try_from(bytes).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    pub cors: CorsConfig,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://recon.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let endpoint = self.upstream.endpoint()?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::Configuration {
                message: format!("upstream.url must use http or https, got '{}'", endpoint.scheme()),
            });
        }

        if self.upstream.request_timeout.is_zero() || self.upstream.connect_timeout.is_zero() {
            return Err(Error::Configuration {
                message: "upstream timeouts must be greater than zero".to_string(),
            });
        }

        if self.uploads.max_file_size == 0 {
            return Err(Error::Configuration {
                message: "uploads.max_file_size must be greater than zero".to_string(),
            });
        }

        if self.uploads.max_pdf_files == 0 && self.uploads.max_eml_files == 0 {
            return Err(Error::Configuration {
                message: "uploads.max_pdf_files and uploads.max_eml_files cannot both be zero".to_string(),
            });
        }

        if self.security.cors.allowed_origins.is_empty() {
            return Err(Error::Configuration {
                message: "security.cors.allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values. RECONGW_CONFIG names the
            // file itself and is not a config key.
            .merge(Env::prefixed("RECONGW_").ignore(&["config"]).split("__"))
            // Legacy name for the upstream URL from earlier deployments
            .merge(Env::raw().only(&["FLASK_API_URL"]).map(|_| "upstream.url".into()))
            // Plain UPSTREAM_URL, as used by the reconciliation service's own tooling
            .merge(Env::raw().only(&["UPSTREAM_URL"]).map(|_| "upstream.url".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Makes sure a url has a trailing slash, so that `join` appends to the path instead of
/// replacing its last segment.
pub(crate) fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}
