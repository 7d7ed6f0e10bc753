//! The refresh pipeline
//!
//! ```text
//! Scope ─▶ compartments ─▶ for each: name ─▶ instance pages ─▶ private ip ─▶ labels ─▶ TargetGroup
//! ```
//!
//! Every step runs sequentially and every provider call is bounded by the
//! configured call timeout. The first failing step aborts the cycle.

pub mod compartments;
pub mod instances;
pub mod labels;
pub mod network;
pub mod refresh;

use std::future::Future;
use std::time::Duration;

pub use compartments::resolve_compartments;
pub use instances::InstancePager;
pub use labels::{group_source, sanitize_label_name, synthesize};
pub use network::resolve_private_ip;
pub use refresh::{RefreshOutcome, Refresher};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::provider::ProviderResult;

/// Await a provider call, failing with [`DiscoveryError::Timeout`] once `timeout` elapses
///
/// The provider's own result is passed through untouched so the caller can
/// attach step-specific context to it.
pub(crate) async fn with_deadline<T, F>(
    timeout: Duration,
    step: impl FnOnce() -> String,
    call: F,
) -> DiscoveryResult<ProviderResult<T>>
where
    F: Future<Output = ProviderResult<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| DiscoveryError::Timeout {
            step: step(),
            timeout,
        })
}
