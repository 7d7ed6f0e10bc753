//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use oci_sd::config::{AuthMode, ResolvedConfig, Scope};
use oci_sd::discovery::Refresher;
use oci_sd::metrics::RecordingMetrics;
use oci_sd::provider::CloudProvider;
use oci_sd::provider::memory::{MemoryInstance, MemoryProvider};

pub const INTERVAL: Duration = Duration::from_secs(60);

pub fn create_test_config(scope: Scope, port: u16) -> ResolvedConfig {
    ResolvedConfig {
        scope,
        display_name: None,
        refresh_interval: INTERVAL,
        port,
        auth: AuthMode::InstancePrincipal,
        call_timeout: Duration::from_secs(5),
        region: None,
        page_limit: 100,
    }
}

pub fn single_compartment(id: &str, port: u16) -> ResolvedConfig {
    create_test_config(Scope::Compartment(id.to_string()), port)
}

/// The single instance used by the end-to-end scenario
pub fn create_stub_provider() -> MemoryProvider {
    MemoryProvider::new()
        .with_compartment("compartment_id1", "compartment_name1")
        .with_instance(MemoryInstance::running(
            "instance_id1",
            "instance_name1",
            "compartment_id1",
            "127.0.0.1",
        ))
}

pub fn create_refresher(
    provider: Arc<dyn CloudProvider>,
    config: ResolvedConfig,
) -> (Refresher, Arc<RecordingMetrics>) {
    let metrics = Arc::new(RecordingMetrics::new());
    let refresher = Refresher::new(provider, config, metrics.clone());
    (refresher, metrics)
}
