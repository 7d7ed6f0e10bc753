//! REST client for the OCI identity and core services
//!
//! Talks to the `20160918` API version of both services. Listing calls follow
//! the `opc-next-page` response header; instance listing exposes the cursor to
//! the caller, the other listings are drained here.
//!
//! Requests pass through a [`RequestSigner`] before they are sent. Obtaining
//! credentials is not this module's concern: a signer receives the finished
//! request and adds whatever the deployment needs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};
use url::Url;

use super::{
    CloudProvider, InstancePage, InstancePageRequest, InstanceSummary, PageCursor,
    ProviderResult, Vnic, VnicAttachment,
};
use crate::error::ProviderError;

const API_VERSION: &str = "20160918";

/// Response header carrying the continuation cursor
const NEXT_PAGE_HEADER: &str = "opc-next-page";

const RUNNING_STATE: &str = "RUNNING";

/// Guard for the listings drained inside this client
const MAX_DRAINED_PAGES: usize = 1000;

/// Base URLs of the services the client talks to
///
/// Both bases always end in `/`, so a path prefix such as a proxy mount point
/// survives joining the API paths onto it.
#[derive(Debug, Clone)]
pub struct OciEndpoints {
    identity: Url,
    core: Url,
}

impl OciEndpoints {
    /// Public endpoints of a region, e.g. `eu-frankfurt-1`
    pub fn for_region(region: &str) -> ProviderResult<Self> {
        Self::new(
            &format!("https://identity.{region}.oraclecloud.com/"),
            &format!("https://iaas.{region}.oraclecloud.com/"),
        )
    }

    /// Explicit endpoints, e.g. a signing proxy or a mock server
    pub fn new(identity: &str, core: &str) -> ProviderResult<Self> {
        Ok(Self {
            identity: base_url(identity)?,
            core: base_url(core)?,
        })
    }

    pub fn identity(&self) -> &Url {
        &self.identity
    }

    pub fn core(&self) -> &Url {
        &self.core
    }
}

fn base_url(raw: &str) -> ProviderResult<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Authenticates an outgoing request
#[async_trait]
pub trait RequestSigner: Send + Sync {
    async fn sign(&self, request: &mut reqwest::Request) -> ProviderResult<()>;
}

/// Signer attaching a fixed set of pre-obtained headers
///
/// Suits deployments where the credential exchange happens outside the
/// adapter, e.g. behind a local signing proxy that forwards to OCI.
#[derive(Debug, Clone, Default)]
pub struct HeaderSigner {
    headers: HeaderMap,
}

impl HeaderSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: &str) -> ProviderResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProviderError::Signing(format!("invalid header name {name}: {e}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| ProviderError::Signing(format!("invalid value for {name}: {e}")))?;
        value.set_sensitive(true);

        self.headers.insert(name, value);
        Ok(self)
    }
}

#[async_trait]
impl RequestSigner for HeaderSigner {
    async fn sign(&self, request: &mut reqwest::Request) -> ProviderResult<()> {
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Compartment {
    id: String,
    name: String,
}

/// Client for the OCI REST API
pub struct OciClient {
    client: reqwest::Client,
    endpoints: OciEndpoints,
    signer: Arc<dyn RequestSigner>,
}

impl OciClient {
    /// Create a client; `timeout` bounds every single HTTP request
    pub fn new(
        endpoints: OciEndpoints,
        signer: Arc<dyn RequestSigner>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoints,
            signer,
        })
    }

    fn url(base: &Url, path: &str, query: &[(&str, &str)]) -> ProviderResult<Url> {
        let mut url = base.join(&format!("{API_VERSION}/{path}"))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET a JSON document, returning it with the next-page cursor if present
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> ProviderResult<(T, Option<PageCursor>)> {
        trace!("requesting {url}");

        let mut request = self.client.get(url).build()?;
        self.signer.sign(&mut request).await?;

        let response = self.client.execute(request).await?;
        let status = response.status();
        let next_page = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(PageCursor::new);

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok((serde_json::from_str(&body)?, next_page))
    }

    /// Follow a listing to its last page
    async fn drain<T: DeserializeOwned>(
        &self,
        base: &Url,
        path: &str,
        query: &[(&str, &str)],
    ) -> ProviderResult<Vec<T>> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut page: Option<PageCursor> = None;

        for _ in 0..MAX_DRAINED_PAGES {
            let mut pairs = query.to_vec();
            if let Some(cursor) = &page {
                pairs.push(("page", cursor.as_str()));
            }

            let (batch, next): (Vec<T>, _) =
                self.get_json(Self::url(base, path, &pairs)?).await?;
            items.extend(batch);

            match next {
                None => return Ok(items),
                Some(cursor) if !seen.insert(cursor.clone()) => {
                    return Err(ProviderError::Pagination(format!(
                        "{path} returned cursor {cursor} twice"
                    )));
                }
                Some(cursor) => page = Some(cursor),
            }
        }

        Err(ProviderError::Pagination(format!(
            "{path} exceeded {MAX_DRAINED_PAGES} pages"
        )))
    }
}

#[async_trait]
impl CloudProvider for OciClient {
    #[instrument(skip(self))]
    async fn list_child_compartments(&self, parent_id: &str) -> ProviderResult<Vec<String>> {
        let compartments: Vec<Compartment> = self
            .drain(
                &self.endpoints.identity,
                "compartments",
                &[("compartmentId", parent_id)],
            )
            .await?;

        debug!("found {} child compartments", compartments.len());
        Ok(compartments.into_iter().map(|c| c.id).collect())
    }

    #[instrument(skip(self))]
    async fn compartment_name(&self, compartment_id: &str) -> ProviderResult<String> {
        let url = Self::url(
            &self.endpoints.identity,
            &format!("compartments/{compartment_id}"),
            &[],
        )?;
        let (compartment, _): (Compartment, _) = self.get_json(url).await?;
        Ok(compartment.name)
    }

    #[instrument(skip(self), fields(compartment_id = %request.compartment_id))]
    async fn list_instances(&self, request: &InstancePageRequest) -> ProviderResult<InstancePage> {
        let mut query = vec![
            ("compartmentId", request.compartment_id.as_str()),
            ("lifecycleState", RUNNING_STATE),
        ];
        if let Some(display_name) = &request.display_name {
            query.push(("displayName", display_name.as_str()));
        }
        if let Some(cursor) = &request.page {
            query.push(("page", cursor.as_str()));
        }

        let url = Self::url(&self.endpoints.core, "instances", &query)?;
        let (items, next_page): (Vec<InstanceSummary>, _) = self.get_json(url).await?;

        Ok(InstancePage { items, next_page })
    }

    #[instrument(skip(self))]
    async fn list_vnic_attachments(
        &self,
        instance_id: &str,
        compartment_id: &str,
    ) -> ProviderResult<Vec<VnicAttachment>> {
        self.drain(
            &self.endpoints.core,
            "vnicAttachments",
            &[("compartmentId", compartment_id), ("instanceId", instance_id)],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_vnic(&self, vnic_id: &str) -> ProviderResult<Vnic> {
        let url = Self::url(&self.endpoints.core, &format!("vnics/{vnic_id}"), &[])?;
        let (vnic, _) = self.get_json(url).await?;
        Ok(vnic)
    }
}
