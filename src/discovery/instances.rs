//! Instance enumeration with explicit cursor threading
//!
//! The pager owns the request of the next page. Each response's cursor is fed
//! into the following request; a missing cursor ends the listing. A cursor seen
//! twice, or more pages than the configured limit, aborts the listing instead
//! of looping forever.

use std::collections::HashSet;
use std::time::Duration;

use tracing::trace;

use super::with_deadline;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::provider::{CloudProvider, InstancePageRequest, InstanceSummary, PageCursor};

/// Lazily pages through the running instances of one compartment
pub struct InstancePager<'a> {
    provider: &'a dyn CloudProvider,
    timeout: Duration,
    page_limit: usize,

    /// Request of the next page; `None` once the listing is exhausted
    next: Option<InstancePageRequest>,

    seen: HashSet<PageCursor>,
    pages: usize,
}

impl<'a> InstancePager<'a> {
    pub fn new(
        provider: &'a dyn CloudProvider,
        compartment_id: &str,
        display_name: Option<String>,
        timeout: Duration,
        page_limit: usize,
    ) -> Self {
        Self {
            provider,
            timeout,
            page_limit,
            next: Some(InstancePageRequest::first(compartment_id, display_name)),
            seen: HashSet::new(),
            pages: 0,
        }
    }

    /// Fetch the next page; `Ok(None)` once all pages were returned
    pub async fn next_page(&mut self) -> DiscoveryResult<Option<Vec<InstanceSummary>>> {
        let Some(request) = self.next.take() else {
            return Ok(None);
        };

        if self.pages >= self.page_limit {
            return Err(DiscoveryError::PageLimitExceeded {
                compartment_id: request.compartment_id,
                limit: self.page_limit,
            });
        }
        self.pages += 1;

        let page = with_deadline(
            self.timeout,
            || format!("listing instances of {}", request.compartment_id),
            self.provider.list_instances(&request),
        )
        .await?
        .map_err(|source| DiscoveryError::InstanceListing {
            compartment_id: request.compartment_id.clone(),
            source,
        })?;

        trace!(
            compartment_id = %request.compartment_id,
            page = self.pages,
            items = page.items.len(),
            "received instance page"
        );

        if let Some(cursor) = page.next_page {
            if !self.seen.insert(cursor.clone()) {
                return Err(DiscoveryError::PaginationStalled {
                    compartment_id: request.compartment_id,
                    cursor: cursor.to_string(),
                });
            }
            self.next = Some(request.next(cursor));
        }

        Ok(Some(page.items))
    }

    /// Drain all remaining pages into one list
    pub async fn collect_all(mut self) -> DiscoveryResult<Vec<InstanceSummary>> {
        let mut instances = Vec::new();
        while let Some(page) = self.next_page().await? {
            instances.extend(page);
        }
        Ok(instances)
    }
}
