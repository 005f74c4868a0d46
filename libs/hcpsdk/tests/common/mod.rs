#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};

use hcpsdk::{Connection, ConnectionConfig, NativeAuthorization, Target};
use httpmock::MockServer;
use secrecy::SecretString;

pub const NAMESPACE_FQDN: &str = "ns1.tenant1.hcp.test";
pub const ADMIN_FQDN: &str = "admin.hcp.test";

/// Target pinned to the mock server: the FQDN stays in `Host`, connections
/// go to 127.0.0.1
pub async fn target(server: &MockServer, fqdn: &str) -> Target {
    Target::builder(fqdn)
        .port(server.port())
        .insecure_http()
        .config(ConnectionConfig::for_testing())
        .addresses(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
        .authorization(
            NativeAuthorization::new("service", &SecretString::from("service01".to_owned()))
                .expect("valid credentials"),
        )
        .build()
        .await
        .expect("target")
}

pub async fn connection(server: &MockServer, fqdn: &str) -> Connection {
    target(server, fqdn).await.connection().expect("connection")
}
