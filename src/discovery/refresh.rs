//! Refresh orchestrator: one full pass over the configured scope

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, trace};

use super::{InstancePager, resolve_compartments, resolve_private_ip, synthesize, with_deadline};
use crate::config::ResolvedConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::metrics::DiscoveryMetrics;
use crate::model::{Instance, TargetGroup};
use crate::provider::CloudProvider;

/// Result of one refresh call
///
/// On failure `groups` holds whatever was produced before the failing step,
/// letting the caller decide whether partial results are of any use.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub groups: Vec<TargetGroup>,
    pub error: Option<DiscoveryError>,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Drop partial results of a failed cycle
    pub fn into_result(self) -> DiscoveryResult<Vec<TargetGroup>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.groups),
        }
    }
}

/// Runs the discovery pipeline against a provider
pub struct Refresher {
    provider: Arc<dyn CloudProvider>,
    config: ResolvedConfig,
    metrics: Arc<dyn DiscoveryMetrics>,
}

impl Refresher {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        config: ResolvedConfig,
        metrics: Arc<dyn DiscoveryMetrics>,
    ) -> Self {
        Self {
            provider,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Run one cycle, recording its duration and counting it once if it failed
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> RefreshOutcome {
        let start = Instant::now();
        let mut groups = Vec::new();

        let result = self.run_cycle(&mut groups).await;

        self.metrics
            .observe_refresh_duration(start.elapsed().as_secs_f64());
        if result.is_err() {
            self.metrics.inc_refresh_failures();
        }

        debug!(
            groups = groups.len(),
            elapsed = ?start.elapsed(),
            success = result.is_ok(),
            "refresh finished"
        );

        RefreshOutcome {
            groups,
            error: result.err(),
        }
    }

    /// Compartments in order, instances in listing order, one group per instance
    async fn run_cycle(&self, groups: &mut Vec<TargetGroup>) -> DiscoveryResult<()> {
        let provider = self.provider.as_ref();
        let timeout = self.config.call_timeout;

        let compartment_ids = resolve_compartments(provider, &self.config.scope, timeout).await?;

        for compartment_id in &compartment_ids {
            let compartment_name = with_deadline(
                timeout,
                || format!("fetching compartment {compartment_id}"),
                provider.compartment_name(compartment_id),
            )
            .await?
            .map_err(|source| DiscoveryError::CompartmentName {
                compartment_id: compartment_id.clone(),
                source,
            })?;

            trace!(compartment_id = %compartment_id, compartment_name = %compartment_name, "scanning compartment");

            let mut pager = InstancePager::new(
                provider,
                compartment_id,
                self.config.display_name.clone(),
                timeout,
                self.config.page_limit,
            );

            while let Some(page) = pager.next_page().await? {
                for summary in page {
                    let private_ip =
                        resolve_private_ip(provider, &summary.id, compartment_id, timeout).await?;

                    let instance = Instance {
                        id: summary.id,
                        display_name: summary.display_name,
                        compartment_id: summary.compartment_id,
                        private_ip,
                        freeform_tags: summary.freeform_tags,
                    };

                    groups.push(synthesize(&instance, &compartment_name, self.config.port));
                }
            }
        }

        Ok(())
    }
}
