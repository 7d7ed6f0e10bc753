//! Delivery loop behavior seen from its consumer

use std::sync::Arc;
use std::time::Duration;

use oci_sd::actors::{DiscoveryHandle, LoopState};
use oci_sd::file_sd::FileSdWriter;
use oci_sd::provider::memory::Operation;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

#[tokio::test]
async fn test_cancel_after_first_delivery_does_not_hang() {
    let provider = Arc::new(create_stub_provider());
    let (refresher, metrics) =
        create_refresher(provider, single_compartment("compartment_id1", 9100));
    let (tx, mut rx) = mpsc::channel(1);

    let handle = DiscoveryHandle::spawn(refresher, INTERVAL, tx);

    let groups = rx.recv().await.expect("first snapshot");
    assert_eq!(groups[0].source, "OCI_instance_id1_");

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle.join())
        .await
        .expect("loop should stop promptly")
        .unwrap();

    assert_eq!(metrics.refreshes(), 1);
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_counts_once_and_loop_continues() {
    let provider = Arc::new(create_stub_provider());
    provider.fail(Operation::CompartmentName);
    let (refresher, metrics) =
        create_refresher(provider.clone(), single_compartment("compartment_id1", 9100));
    let (tx, mut rx) = mpsc::channel(1);

    let handle = DiscoveryHandle::spawn(refresher, INTERVAL, tx);
    let mut state = handle.subscribe_state();
    state.wait_for(|s| *s == LoopState::Waiting).await.unwrap();

    assert_eq!(metrics.failures(), 1);
    assert!(rx.try_recv().is_err(), "failed cycle must not deliver");

    provider.recover();
    let groups = rx.recv().await.expect("next tick delivers");

    assert_eq!(groups.len(), 1);
    assert_eq!(metrics.failures(), 1);
    assert_eq!(metrics.refreshes(), 2);

    handle.shutdown();
    handle.join().await.unwrap();
    assert_eq!(*state.borrow(), LoopState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_failures_accumulate_across_ticks() {
    let provider = Arc::new(create_stub_provider());
    provider.fail(Operation::ListInstances);
    let (refresher, metrics) =
        create_refresher(provider, single_compartment("compartment_id1", 9100));
    let (tx, mut rx) = mpsc::channel(1);

    let handle = DiscoveryHandle::spawn(refresher, INTERVAL, tx);

    tokio::time::sleep(INTERVAL * 3 + Duration::from_secs(1)).await;

    assert_eq!(metrics.refreshes(), 4);
    assert_eq!(metrics.failures(), 4);
    assert!(rx.try_recv().is_err());
    assert_eq!(handle.state(), LoopState::Waiting);

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_reaches_target_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom_sd.json");

    let provider = Arc::new(create_stub_provider());
    let (refresher, _) = create_refresher(provider, single_compartment("compartment_id1", 9100));

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(1);

    let writer = FileSdWriter::new(&path);
    let mut last_write = writer.last_write();
    let writer_task = tokio::spawn(writer.run(rx, cancel.clone()));
    let handle = DiscoveryHandle::spawn_with_token(refresher, INTERVAL, tx, cancel.clone());

    tokio::time::timeout(Duration::from_secs(5), last_write.wait_for(Option::is_some))
        .await
        .expect("target file written")
        .unwrap();

    cancel.cancel();
    handle.join().await.unwrap();
    writer_task.await.unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(written[0]["targets"], serde_json::json!(["127.0.0.1:9100"]));
    assert_eq!(written[0]["labels"]["__meta_oci_instance_id"], "instance_id1");
    assert_eq!(
        written[0]["labels"]["__meta_oci_compartment_name"],
        "compartment_name1"
    );
}
