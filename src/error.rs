//! Error types for configuration, provider calls and refresh cycles

use std::time::Duration;

use thiserror::Error;

/// Invalid or contradictory configuration, detected before discovery starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "OCI SD configuration requires either a specific compartment id or the root compartment id (not both)"
    )]
    ScopeConflict,

    #[error(
        "OCI SD configuration requires either a specific compartment id or the root compartment id"
    )]
    ScopeMissing,

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failure of a single call against the cloud provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error("pagination failed: {0}")]
    Pagination(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Raised by the in-memory provider when a failure is injected
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Reason a refresh cycle was aborted
///
/// Every variant names the pipeline step that failed so the log line of a
/// failed cycle is self-explanatory.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("error retrieving compartment ids below {root_id}: {source}")]
    CompartmentListing {
        root_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("error retrieving compartment {compartment_id}: {source}")]
    CompartmentName {
        compartment_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("error retrieving instances of compartment {compartment_id}: {source}")]
    InstanceListing {
        compartment_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("error retrieving vnic attachments of instance {instance_id}: {source}")]
    VnicAttachments {
        instance_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("error retrieving vnic {vnic_id}: {source}")]
    Vnic {
        vnic_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("pagination of compartment {compartment_id} stalled on repeated cursor {cursor}")]
    PaginationStalled {
        compartment_id: String,
        cursor: String,
    },

    #[error("instance listing of compartment {compartment_id} exceeded {limit} pages")]
    PageLimitExceeded { compartment_id: String, limit: usize },

    #[error("{step} did not complete within {timeout:?}")]
    Timeout { step: String, timeout: Duration },
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
