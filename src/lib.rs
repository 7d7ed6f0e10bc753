//! Periodic OCI compute discovery for Prometheus
//!
//! A [`discovery::Refresher`] walks the configured compartments, lists their
//! running instances, resolves private addresses and turns every instance into
//! a [`model::TargetGroup`]. The [`actors::DiscoveryHandle`] runs it on a
//! timer and hands each successful snapshot to a consumer such as the
//! [`file_sd::FileSdWriter`].

pub mod actors;
pub mod config;
pub mod discovery;
pub mod error;
#[cfg(feature = "exporter")]
pub mod exporter;
pub mod file_sd;
pub mod metrics;
pub mod model;
pub mod provider;

pub use actors::{DiscoveryHandle, LoopState};
pub use config::{DiscoveryConfig, ResolvedConfig, Scope};
pub use discovery::{RefreshOutcome, Refresher};
pub use error::{ConfigError, DiscoveryError, ProviderError};
pub use model::{Instance, LabelSet, TargetGroup};
pub use provider::CloudProvider;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
