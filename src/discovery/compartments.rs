use std::time::Duration;

use tracing::debug;

use super::with_deadline;
use crate::config::Scope;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::provider::CloudProvider;

/// Compartment ids a refresh cycle scans, in provider order
///
/// A single-compartment scope is returned as-is without asking the provider.
/// A root scope yields the direct children of the root only; compartments
/// nested deeper are not discovered.
pub async fn resolve_compartments(
    provider: &dyn CloudProvider,
    scope: &Scope,
    timeout: Duration,
) -> DiscoveryResult<Vec<String>> {
    match scope {
        Scope::Compartment(id) => Ok(vec![id.clone()]),
        Scope::ChildrenOf(root_id) => {
            let ids = with_deadline(
                timeout,
                || format!("listing compartments below {root_id}"),
                provider.list_child_compartments(root_id),
            )
            .await?
            .map_err(|source| DiscoveryError::CompartmentListing {
                root_id: root_id.clone(),
                source,
            })?;

            debug!(root_id = %root_id, "resolved {} compartments", ids.len());
            Ok(ids)
        }
    }
}
