//! Scenario: Docker source against a mocked Engine API.
//!
//! GREEN when:
//! - every running container is inspected and mapped per exposed TCP port
//! - a container that disappears between list and inspect is skipped
//! - list failures surface as Api/Transport errors, bad JSON as Decode

use httpmock::prelude::*;
use pencil_docker::DockerInstanceSource;
use pencil_reconcile::{AdapterError, InstanceRecord, InstanceSource};
use serde_json::json;

#[tokio::test]
async fn maps_running_containers_to_records() {
    let server = MockServer::start_async().await;
    let list = server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/json");
            then.status(200)
                .json_body(json!([{"Id": "c2"}, {"Id": "c1"}, {"Id": "gone"}]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/c1/json");
            then.status(200).json_body(json!({
                "Id": "c1",
                "Name": "/sshd_1",
                "Config": {
                    "Image": "library/sshd:latest",
                    "Env": ["PATH=/usr/bin"],
                    "Labels": {"tags": "tag1, tag2"}
                },
                "NetworkSettings": {"Ports": {"22/tcp": null, "8000/tcp": null, "53/udp": null}}
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/c2/json");
            then.status(200).json_body(json!({
                "Id": "c2",
                "Config": {"Image": "nginx", "Env": ["SRV_NAME=frontend"], "Labels": null},
                "NetworkSettings": {"Ports": {"80/tcp": [{"HostIp": "0.0.0.0", "HostPort": "8080"}]}}
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/gone/json");
            then.status(404).body(r#"{"message":"No such container: gone"}"#);
        })
        .await;

    let src = DockerInstanceSource::new(server.base_url()).unwrap();
    let records = src.list_running().await.unwrap();

    assert_eq!(
        records,
        vec![
            InstanceRecord::new("c1", "sshd", 22).with_tags(["tag1", "tag2"]),
            InstanceRecord::new("c1", "sshd", 8000).with_tags(["tag1", "tag2"]),
            InstanceRecord::new("c2", "frontend", 80),
        ]
    );
    list.assert_hits_async(1).await;
}

#[tokio::test]
async fn empty_engine_yields_no_records() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/json");
            then.status(200).json_body(json!([]));
        })
        .await;

    let src = DockerInstanceSource::new(server.base_url()).unwrap();
    assert!(src.list_running().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_failure_is_an_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/json");
            then.status(500).body("daemon unavailable");
        })
        .await;

    let src = DockerInstanceSource::new(server.base_url()).unwrap();
    let err = src.list_running().await.unwrap_err();
    assert_eq!(
        err,
        AdapterError::Api {
            status: 500,
            message: "daemon unavailable".to_string()
        }
    );
}

#[tokio::test]
async fn inspect_failure_other_than_404_fails_the_listing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/json");
            then.status(200).json_body(json!([{"Id": "c1"}]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/c1/json");
            then.status(500).body("boom");
        })
        .await;

    let src = DockerInstanceSource::new(server.base_url()).unwrap();
    let err = src.list_running().await.unwrap_err();
    assert!(matches!(err, AdapterError::Api { status: 500, .. }));
}

#[tokio::test]
async fn malformed_list_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/containers/json");
            then.status(200).body("not json");
        })
        .await;

    let src = DockerInstanceSource::new(server.base_url()).unwrap();
    let err = src.list_running().await.unwrap_err();
    assert!(matches!(err, AdapterError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_engine_is_a_transport_error() {
    // Port 9 (discard) on localhost is closed in test environments.
    let src = DockerInstanceSource::new("http://127.0.0.1:9").unwrap();
    let err = src.list_running().await.unwrap_err();
    assert!(matches!(err, AdapterError::Transport(_)), "got {err:?}");
}
