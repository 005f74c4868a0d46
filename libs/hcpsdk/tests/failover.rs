#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Requests keep working while one node address of the target is dead

mod common;

use std::net::{IpAddr, Ipv4Addr};

use hcpsdk::objects::Objects;
use hcpsdk::{ConnectionConfig, NativeAuthorization, Target};
use httpmock::Method::GET;
use httpmock::MockServer;
use secrecy::SecretString;

/// Nothing listens on 127.0.0.2 at the mock server's port
async fn target_with_dead_node(server: &MockServer) -> Target {
    Target::builder(common::NAMESPACE_FQDN)
        .port(server.port())
        .insecure_http()
        .config(ConnectionConfig::for_testing())
        .addresses(vec![
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        ])
        .authorization(
            NativeAuthorization::new("service", &SecretString::from("service01".to_owned())).unwrap(),
        )
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn dead_address_is_skipped() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/rest/a.txt")
            .header_includes("host", common::NAMESPACE_FQDN);
        then.status(200).body("content");
    });

    let target = target_with_dead_node(&server).await;
    assert_eq!(target.addresses().len(), 2);

    let objects = Objects::new(target.connection().unwrap());
    for _ in 0..3 {
        let body = objects.get_object("/rest/a.txt").await.unwrap();
        assert_eq!(body.as_ref(), b"content");
    }
    mock.assert_calls(3);
}

#[tokio::test]
async fn every_fresh_connection_fails_over() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/rest/a.txt");
        then.status(200).body("content");
    });

    let target = target_with_dead_node(&server).await;
    for _ in 0..3 {
        let objects = Objects::new(target.connection().unwrap());
        objects.get_object("/rest/a.txt").await.unwrap();
    }
    mock.assert_calls(3);
}
