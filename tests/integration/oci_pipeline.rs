//! Full refresh cycles through the REST client against a mock OCI API

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use oci_sd::DiscoveryError;
use oci_sd::config::Scope;
use oci_sd::provider::oci::{HeaderSigner, OciClient, OciEndpoints};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn client_for(server: &MockServer, timeout: Duration) -> OciClient {
    let endpoints = OciEndpoints::new(&server.uri(), &server.uri()).unwrap();
    OciClient::new(endpoints, Arc::new(HeaderSigner::new()), timeout).unwrap()
}

async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_inventory(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/20160918/compartments"))
        .and(query_param("compartmentId", "root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "c1", "name": "one", "lifecycleState": "ACTIVE" }
        ])))
        .mount(server)
        .await;

    mount_json(server, "/20160918/compartments/c1", json!({ "id": "c1", "name": "one" })).await;

    // Second page, matched first
    Mock::given(method("GET"))
        .and(path("/20160918/instances"))
        .and(query_param("compartmentId", "c1"))
        .and(query_param("page", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "i2", "displayName": "db", "compartmentId": "c1" }
        ])))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/20160918/instances"))
        .and(query_param("compartmentId", "c1"))
        .and(query_param("lifecycleState", "RUNNING"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("opc-next-page", "p2")
                .set_body_json(json!([
                    {
                        "id": "i1",
                        "displayName": "web",
                        "compartmentId": "c1",
                        "freeformTags": { "Team": "infra" }
                    }
                ])),
        )
        .with_priority(2)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/20160918/vnicAttachments"))
        .and(query_param("instanceId", "i1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a1", "vnicId": "v1" }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/20160918/vnicAttachments"))
        .and(query_param("instanceId", "i2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a2", "vnicId": "v2" },
            { "id": "a3", "vnicId": "v3" },
            { "id": "a4" }
        ])))
        .mount(server)
        .await;

    mount_json(server, "/20160918/vnics/v1", json!({ "id": "v1", "privateIp": "10.0.0.1" })).await;
    mount_json(server, "/20160918/vnics/v2", json!({ "id": "v2", "privateIp": "10.0.0.2" })).await;
    mount_json(server, "/20160918/vnics/v3", json!({ "id": "v3", "privateIp": "10.0.0.3" })).await;
}

#[tokio::test]
async fn test_refresh_through_rest_client() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;

    let client = Arc::new(client_for(&server, Duration::from_secs(5)));
    let (refresher, metrics) = create_refresher(
        client,
        create_test_config(Scope::ChildrenOf("root".to_string()), 9100),
    );

    let groups = refresher.refresh().await.into_result().unwrap();

    let summary: Vec<_> = groups
        .iter()
        .map(|g| (g.source.as_str(), g.addresses().next().unwrap()))
        .collect();
    assert_eq!(
        summary,
        vec![("OCI_i1_", "10.0.0.1:9100"), ("OCI_i2_", "10.0.0.3:9100")]
    );
    assert_eq!(
        groups[0].labels.get("__meta_oci_tag_team").map(String::as_str),
        Some("infra")
    );
    assert_eq!(metrics.failures(), 0);
}

#[tokio::test]
async fn test_api_error_fails_cycle_with_context() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/20160918/compartments"))
        .respond_with(ResponseTemplate::new(404).set_body_string("NotAuthorizedOrNotFound"))
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server, Duration::from_secs(5)));
    let (refresher, metrics) = create_refresher(
        client,
        create_test_config(Scope::ChildrenOf("root".to_string()), 9100),
    );

    let outcome = refresher.refresh().await;

    assert_matches!(
        outcome.error,
        Some(DiscoveryError::CompartmentListing { ref root_id, .. }) if root_id == "root"
    );
    assert_eq!(metrics.failures(), 1);
}

#[tokio::test]
async fn test_hung_call_hits_deadline() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/20160918/compartments/c1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "c1", "name": "one" }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server, Duration::from_secs(30)));
    let mut config = single_compartment("c1", 9100);
    config.call_timeout = Duration::from_millis(200);
    let (refresher, metrics) = create_refresher(client, config);

    let outcome = refresher.refresh().await;

    assert_matches!(outcome.error, Some(DiscoveryError::Timeout { .. }));
    assert_eq!(metrics.failures(), 1);
}
