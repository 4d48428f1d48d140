//! External service configuration

use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_timeout() -> u64 {
    30
}

/// One external service reachable from `externalEventEval` and
/// `EXTERNAL_EVENT_HANDLER`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalServiceConfig {
    /// Name used by rules to address the service
    pub name: String,

    /// Base URL; the optional route is appended as a path segment
    pub url: String,

    /// Sent as the `Api-Key` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(
        default,
        rename = "mutualTLSConfig",
        skip_serializing_if = "Option::is_none"
    )]
    pub mutual_tls: Option<MutualTlsConfig>,
}

/// PEM files for mutual TLS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutualTlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    /// Extra root certificate for the service, if it is not publicly trusted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ExternalServicesFile {
    #[serde(default)]
    services: Vec<ExternalServiceConfig>,
}

/// Parse external service definitions from YAML content
///
/// ```yaml
/// services:
///   - name: scoring
///     url: https://scoring.example.org/api
///     apiKey: secret
///     timeout: 10
/// ```
pub fn load_external_services(yaml_content: &str) -> Result<Vec<ExternalServiceConfig>> {
    let file: ExternalServicesFile = serde_yaml::from_str(yaml_content).map_err(|e| {
        RuntimeError::Config(format!("Failed to parse external service config: {}", e))
    })?;
    Ok(file.services)
}

/// Read and parse an external service YAML file
pub fn load_external_services_file(path: impl AsRef<Path>) -> Result<Vec<ExternalServiceConfig>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        RuntimeError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    load_external_services(&content)
}
