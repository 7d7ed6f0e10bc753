use std::time::Duration;

use tracing::{trace, warn};

use super::with_deadline;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::provider::CloudProvider;

/// Private IP of an instance, walked through its VNIC attachments
///
/// Every attachment is visited in provider order and the last interface that
/// reports a private IP wins, so a secondary VNIC listed after the primary one
/// replaces the primary address. Attachments without a VNIC yet are skipped.
/// Returns an empty string when no interface has an address.
pub async fn resolve_private_ip(
    provider: &dyn CloudProvider,
    instance_id: &str,
    compartment_id: &str,
    timeout: Duration,
) -> DiscoveryResult<String> {
    let attachments = with_deadline(
        timeout,
        || format!("listing vnic attachments of {instance_id}"),
        provider.list_vnic_attachments(instance_id, compartment_id),
    )
    .await?
    .map_err(|source| DiscoveryError::VnicAttachments {
        instance_id: instance_id.to_string(),
        source,
    })?;

    let mut private_ip = String::new();

    for attachment in attachments {
        let Some(vnic_id) = attachment.vnic_id else {
            trace!(attachment_id = %attachment.id, "attachment has no vnic yet");
            continue;
        };

        let vnic = with_deadline(
            timeout,
            || format!("fetching vnic {vnic_id}"),
            provider.get_vnic(&vnic_id),
        )
        .await?
        .map_err(|source| DiscoveryError::Vnic {
            vnic_id: vnic_id.clone(),
            source,
        })?;

        if let Some(ip) = vnic.private_ip.filter(|ip| !ip.is_empty()) {
            private_ip = ip;
        }
    }

    if private_ip.is_empty() {
        warn!(instance_id, "no private ip resolved, emitting target with empty host");
    }

    Ok(private_ip)
}
