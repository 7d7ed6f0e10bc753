//! Refresh cycles against the in-memory provider

use std::sync::Arc;

use assert_matches::assert_matches;
use oci_sd::DiscoveryError;
use oci_sd::config::Scope;
use oci_sd::provider::memory::{LifecycleState, MemoryInstance, MemoryProvider, Operation};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_end_to_end_single_instance() {
    let provider = Arc::new(create_stub_provider());
    let (refresher, metrics) = create_refresher(provider, single_compartment("compartment_id1", 9100));

    let groups = refresher.refresh().await.into_result().unwrap();

    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.source, "OCI_instance_id1_");
    assert_eq!(group.addresses().collect::<Vec<_>>(), vec!["127.0.0.1:9100"]);

    let label = |name: &str| group.labels.get(name).map(String::as_str);
    assert_eq!(label("__meta_oci_instance_id"), Some("instance_id1"));
    assert_eq!(label("__meta_oci_display_name"), Some("instance_name1"));
    assert_eq!(label("__meta_oci_compartment_id"), Some("compartment_id1"));
    assert_eq!(label("__meta_oci_compartment_name"), Some("compartment_name1"));
    assert_eq!(label("__address__"), Some("127.0.0.1:9100"));

    assert_eq!(metrics.refreshes(), 1);
    assert_eq!(metrics.failures(), 0);
}

#[tokio::test]
async fn test_only_running_instances_become_groups() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_compartment("c1", "one")
            .with_instance(MemoryInstance::running("i1", "a", "c1", "10.0.0.1"))
            .with_instance(
                MemoryInstance::running("i2", "b", "c1", "10.0.0.2")
                    .with_state(LifecycleState::Stopped),
            )
            .with_instance(
                MemoryInstance::running("i3", "c", "c1", "10.0.0.3")
                    .with_state(LifecycleState::Provisioning),
            )
            .with_instance(MemoryInstance::running("i4", "d", "c1", "10.0.0.4"))
            .with_instance(
                MemoryInstance::running("i5", "e", "c1", "10.0.0.5")
                    .with_state(LifecycleState::Terminated),
            ),
    );
    let (refresher, _) = create_refresher(provider, single_compartment("c1", 80));

    let groups = refresher.refresh().await.into_result().unwrap();
    let sources: Vec<_> = groups.iter().map(|g| g.source.as_str()).collect();

    assert_eq!(sources, vec!["OCI_i1_", "OCI_i4_"]);
}

#[tokio::test]
async fn test_display_name_filter_is_exact() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_compartment("c1", "one")
            .with_instance(MemoryInstance::running("i1", "web", "c1", "10.0.0.1"))
            .with_instance(MemoryInstance::running("i2", "web-2", "c1", "10.0.0.2"))
            .with_instance(MemoryInstance::running("i3", "my-web", "c1", "10.0.0.3")),
    );
    let mut config = single_compartment("c1", 80);
    config.display_name = Some("web".to_string());
    let (refresher, _) = create_refresher(provider, config);

    let groups = refresher.refresh().await.into_result().unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].source, "OCI_i1_");
}

#[tokio::test]
async fn test_tags_are_sanitized_into_labels() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_compartment("c1", "one")
            .with_instance(
                MemoryInstance::running("i1", "web", "c1", "10.0.0.1")
                    .with_tag("My-Tag!", "Mixed Case value")
                    .with_tag("1st", "first"),
            ),
    );
    let (refresher, _) = create_refresher(provider, single_compartment("c1", 80));

    let groups = refresher.refresh().await.into_result().unwrap();
    let labels = &groups[0].labels;

    assert_eq!(
        labels.get("__meta_oci_tag_my_tag_").map(String::as_str),
        Some("Mixed Case value")
    );
    assert_eq!(
        labels.get("__meta_oci_tag__1st").map(String::as_str),
        Some("first")
    );
}

#[tokio::test]
async fn test_children_are_scanned_but_not_grandchildren() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_compartment("root", "tenancy")
            .with_child_compartment("root", "c1", "one")
            .with_child_compartment("c1", "c1a", "nested")
            .with_instance(MemoryInstance::running("i1", "a", "c1", "10.0.0.1"))
            .with_instance(MemoryInstance::running("i2", "b", "c1a", "10.0.0.2"))
            .with_instance(MemoryInstance::running("i3", "c", "root", "10.0.0.3")),
    );
    let (refresher, _) =
        create_refresher(provider, create_test_config(Scope::ChildrenOf("root".to_string()), 80));

    let groups = refresher.refresh().await.into_result().unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].source, "OCI_i1_");
}

#[tokio::test]
async fn test_paginated_listing_is_exhausted() {
    let mut provider = MemoryProvider::new().with_compartment("c1", "one");
    for n in 0..7 {
        provider = provider.with_instance(MemoryInstance::running(
            format!("i{n}"),
            format!("web-{n}"),
            "c1",
            format!("10.0.0.{n}"),
        ));
    }
    let provider = Arc::new(provider.with_page_size(3));
    let (refresher, _) = create_refresher(provider.clone(), single_compartment("c1", 80));

    let groups = refresher.refresh().await.into_result().unwrap();

    assert_eq!(groups.len(), 7);
    assert_eq!(provider.calls(Operation::ListInstances), 3);
}

#[tokio::test]
async fn test_stuck_cursor_fails_cycle() {
    let provider = Arc::new(create_stub_provider().with_sticky_cursor());
    let (refresher, metrics) =
        create_refresher(provider.clone(), single_compartment("compartment_id1", 80));

    let outcome = refresher.refresh().await;

    assert_matches!(outcome.error, Some(DiscoveryError::PaginationStalled { .. }));
    assert_eq!(provider.calls(Operation::ListInstances), 2);
    assert_eq!(metrics.failures(), 1);
}

#[tokio::test]
async fn test_network_failure_aborts_cycle() {
    let provider = Arc::new(create_stub_provider());
    provider.fail(Operation::ListVnicAttachments);
    let (refresher, metrics) =
        create_refresher(provider, single_compartment("compartment_id1", 80));

    let outcome = refresher.refresh().await;

    assert!(!outcome.is_success());
    assert!(outcome.groups.is_empty());
    assert_matches!(outcome.error, Some(DiscoveryError::VnicAttachments { .. }));
    assert_eq!(metrics.failures(), 1);
}

#[tokio::test]
async fn test_no_state_survives_between_cycles() {
    let provider = Arc::new(create_stub_provider());
    let (refresher, _) =
        create_refresher(provider.clone(), single_compartment("compartment_id1", 80));

    let first = refresher.refresh().await.into_result().unwrap();
    let second = refresher.refresh().await.into_result().unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.calls(Operation::CompartmentName), 2);
}
