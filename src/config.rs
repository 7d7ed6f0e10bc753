use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::trace;

use crate::error::ConfigError;

/// Configuration as read from a file or assembled from command line flags
///
/// Empty strings are treated like absent values, so flags that were not
/// passed can be forwarded verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub compartment_id: Option<String>,

    #[serde(default)]
    pub root_compartment_id: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_use_instance_principals")]
    pub use_instance_principals: bool,

    /// Deadline for a single provider call, in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout: u64,

    /// Region used to derive the provider endpoints (e.g. `eu-frankfurt-1`)
    #[serde(default)]
    pub region: Option<String>,

    /// Upper bound on instance pages followed per compartment
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

/// Upper bound for the refresh interval and the call timeout, in seconds (one week)
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

fn default_refresh_interval() -> u64 {
    60
}

fn default_port() -> u16 {
    80
}

fn default_use_instance_principals() -> bool {
    true
}

fn default_call_timeout() -> u64 {
    30
}

fn default_page_limit() -> usize {
    1000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            compartment_id: None,
            root_compartment_id: None,
            display_name: None,
            refresh_interval: default_refresh_interval(),
            port: default_port(),
            use_instance_principals: default_use_instance_principals(),
            call_timeout: default_call_timeout(),
            region: None,
            page_limit: default_page_limit(),
        }
    }
}

/// Which compartments a refresh cycle scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Exactly this compartment
    Compartment(String),

    /// The direct children of this compartment (grandchildren are not scanned)
    ChildrenOf(String),
}

/// How the provider client authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Ambient identity of the instance the adapter runs on
    InstancePrincipal,

    /// Externally supplied API key credentials
    ApiKey,
}

/// Validated configuration; immutable once the discovery engine is built
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub scope: Scope,
    pub display_name: Option<String>,
    pub refresh_interval: Duration,
    pub port: u16,
    pub auth: AuthMode,
    pub call_timeout: Duration,
    pub region: Option<String>,
    pub page_limit: usize,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn bounded_secs(field: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    match secs {
        0 => Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        }),
        secs if secs > MAX_DURATION_SECS => Err(ConfigError::InvalidValue {
            field,
            reason: format!("must not exceed {MAX_DURATION_SECS} seconds"),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

impl DiscoveryConfig {
    /// Validate the configuration and turn it into a [`ResolvedConfig`]
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let scope = match (
            non_empty(&self.compartment_id),
            non_empty(&self.root_compartment_id),
        ) {
            (Some(id), None) => Scope::Compartment(id),
            (None, Some(root)) => Scope::ChildrenOf(root),
            (Some(_), Some(_)) => return Err(ConfigError::ScopeConflict),
            (None, None) => return Err(ConfigError::ScopeMissing),
        };

        let refresh_interval = bounded_secs("refresh_interval", self.refresh_interval)?;
        let call_timeout = bounded_secs("call_timeout", self.call_timeout)?;

        if self.page_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "page_limit",
                reason: "must be greater than zero".to_string(),
            });
        }

        let auth = if self.use_instance_principals {
            AuthMode::InstancePrincipal
        } else {
            AuthMode::ApiKey
        };

        Ok(ResolvedConfig {
            scope,
            display_name: non_empty(&self.display_name),
            refresh_interval,
            port: self.port,
            auth,
            call_timeout,
            region: non_empty(&self.region),
            page_limit: self.page_limit,
        })
    }
}

/// Read a configuration file; `.json` files are parsed as JSON, anything else as TOML
pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<DiscoveryConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?
    };

    trace!("loaded config: {config:?}");
    Ok(config)
}
