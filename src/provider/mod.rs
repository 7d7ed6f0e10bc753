//! Cloud provider boundary
//!
//! The refresh pipeline only talks to the provider through the [`CloudProvider`]
//! trait, which keeps the orchestrator independent of any concrete client.
//!
//! ## Implementations
//!
//! - [`oci::OciClient`]: REST client against the OCI identity and core services
//! - [`memory::MemoryProvider`]: deterministic in-memory inventory for tests
//!
//! ## Pagination
//!
//! Instance listing is paginated. A request carries the cursor returned by the
//! previous page; [`InstancePage::next_page`] is `None` once the listing is
//! exhausted. An empty cursor string is never produced by the implementations.

pub mod memory;
pub mod oci;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Opaque continuation token of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request for one page of running instances in a compartment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePageRequest {
    pub compartment_id: String,

    /// Exact-match display name filter
    pub display_name: Option<String>,

    /// Cursor of the page to fetch, `None` for the first page
    pub page: Option<PageCursor>,
}

impl InstancePageRequest {
    pub fn first(compartment_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            compartment_id: compartment_id.into(),
            display_name,
            page: None,
        }
    }

    /// The request for the page following `cursor`
    pub fn next(&self, cursor: PageCursor) -> Self {
        Self {
            page: Some(cursor),
            ..self.clone()
        }
    }
}

/// Instance as returned by the listing call, before address resolution
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub id: String,
    pub display_name: String,
    pub compartment_id: String,

    #[serde(default)]
    pub freeform_tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct InstancePage {
    pub items: Vec<InstanceSummary>,
    pub next_page: Option<PageCursor>,
}

/// Attachment of a network interface to an instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnicAttachment {
    pub id: String,

    /// Unset while the attachment is still being created
    #[serde(default)]
    pub vnic_id: Option<String>,
}

/// Network interface with its primary private address
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vnic {
    pub id: String,

    #[serde(default)]
    pub private_ip: Option<String>,
}

/// Capabilities the refresh pipeline requires from a cloud provider
///
/// All calls are awaited one at a time by the orchestrator. Implementations must
/// be `Send + Sync` since the orchestrator runs inside a spawned task.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Identifiers of the compartments directly beneath `parent_id`
    async fn list_child_compartments(&self, parent_id: &str) -> ProviderResult<Vec<String>>;

    /// Display name of a compartment
    async fn compartment_name(&self, compartment_id: &str) -> ProviderResult<String>;

    /// One page of instances in the running lifecycle state
    async fn list_instances(&self, request: &InstancePageRequest) -> ProviderResult<InstancePage>;

    /// Network interface attachments of an instance
    async fn list_vnic_attachments(
        &self,
        instance_id: &str,
        compartment_id: &str,
    ) -> ProviderResult<Vec<VnicAttachment>>;

    /// A single network interface
    async fn get_vnic(&self, vnic_id: &str) -> ProviderResult<Vnic>;
}
