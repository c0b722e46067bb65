use std::{path::PathBuf, time::Duration};

use rama::{
    error::{ErrorContext as _, OpaqueError},
    http::StatusCode,
};
use serde::Deserialize;

/// Server side process configuration.
/// These values are fixed at startup and echoed verbatim in response bodies.
#[derive(Debug, Clone, clap::Args)]
pub struct ServerConfig {
    /// Path of the endpoints configuration file.
    #[arg(
        long,
        value_name = "PATH",
        env = "DYNBENCH_CONFIG",
        default_value = "./config.json"
    )]
    pub config: PathBuf,

    /// Version string echoed in every response body.
    #[arg(
        long = "version-label",
        value_name = "VERSION",
        env = "DYNBENCH_VERSION",
        default_value = "0.1.0"
    )]
    pub version: String,

    /// Hostname label echoed in every response body.
    #[arg(long, value_name = "NAME", env = "HOSTNAME", default_value = "")]
    pub hostname: String,

    /// Presence of a file at this path forces every response to be a 500.
    #[arg(
        long,
        value_name = "PATH",
        env = "DYNBENCH_ERROR_FILE",
        default_value = "/tmp/dynbench_error"
    )]
    pub error_file: PathBuf,
}

/// On-disk shape of the endpoints configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsFile {
    pub endpoints: Vec<EndpointEntry>,
}

/// One configured endpoint, as written in the configuration file.
///
/// `delay` and `http_500_probability` default to zero, `response_code` to 200,
/// so a minimal entry only needs a `path`.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointEntry {
    pub path: String,

    /// Seconds to suspend before responding.
    #[serde(default)]
    pub delay: f64,

    /// Probability in [0, 1] of answering with a simulated 500.
    #[serde(default)]
    pub http_500_probability: f64,

    /// Status code of the normal (non-error) response.
    #[serde(default = "default_response_code")]
    pub response_code: u16,
}

fn default_response_code() -> u16 {
    200
}

/// A validated endpoint, ready to serve.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Leading-slash normalized request path.
    pub path: String,
    pub delay: Duration,
    pub http_500_probability: f64,
    pub status: StatusCode,
}

impl Endpoint {
    fn try_from_entry(entry: EndpointEntry) -> Result<Self, OpaqueError> {
        if !entry.delay.is_finite() || entry.delay < 0. {
            return Err(OpaqueError::from_display(format!(
                "endpoint '{}': delay must be a finite number of seconds >= 0",
                entry.path,
            )));
        }
        if !(0. ..=1.).contains(&entry.http_500_probability) {
            return Err(OpaqueError::from_display(format!(
                "endpoint '{}': http_500_probability must be within [0, 1]",
                entry.path,
            )));
        }
        let status = StatusCode::from_u16(entry.response_code)
            .with_context(|| format!("endpoint '{}': invalid response_code", entry.path))?;

        Ok(Self {
            path: normalize_path(entry.path),
            delay: Duration::from_secs_f64(entry.delay),
            http_500_probability: entry.http_500_probability,
            status,
        })
    }
}

/// Immutable mapping from request path to endpoint behavior,
/// built once at startup. No writer exists after construction,
/// so lookups require no locking.
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    endpoints: Vec<Endpoint>,
}

impl EndpointTable {
    /// Load and validate the endpoints configuration document at `path`.
    pub async fn load(path: &std::path::Path) -> Result<Self, OpaqueError> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("read endpoints config at path '{}'", path.display()))?;
        let file: EndpointsFile = serde_json::from_slice(&raw)
            .with_context(|| format!("parse endpoints config at path '{}'", path.display()))?;
        Self::try_from_entries(file.endpoints)
    }

    pub fn try_from_entries(entries: Vec<EndpointEntry>) -> Result<Self, OpaqueError> {
        let endpoints = entries
            .into_iter()
            .map(Endpoint::try_from_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { endpoints })
    }

    /// Exact, case-sensitive match of a request path
    /// against the configured endpoints.
    ///
    /// Linear scan: endpoint counts are expected to stay small.
    pub fn lookup(&self, path: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.path == path)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}
