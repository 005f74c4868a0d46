#![allow(clippy::unwrap_used, clippy::expect_used, clippy::non_ascii_literal)]

//! Namespace information against a mocked `/proc` interface

mod common;

use hcpsdk::HcpError;
use hcpsdk::namespace::NamespaceInfo;
use hcpsdk::xml::Value;
use httpmock::Method::GET;
use httpmock::MockServer;

const STATISTICS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<statistics xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xsi:noNamespaceSchemaLocation="/static/xsd/ns-statistics.xsd"
    namespaceName="ns1" totalCapacityBytes="10737418240" usedCapacityBytes="123456"
    objectCount="42" shredObjectCount="0" customMetadataObjectCount="3"
    softQuotaPercent="85"/>"#;

const NAMESPACES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<namespaces xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <namespace name="ns1" nameIDNA="ns1" versioningEnabled="true" searchEnabled="false"
      retentionMode="enterprise" defaultShredValue="false" dpl="2" hashScheme="SHA-256">
    <description><![CDATA[Primary archive°Owned by team A]]></description>
  </namespace>
  <namespace name="ns2" versioningEnabled="false" dpl="1">
    <description>Scratch</description>
  </namespace>
</namespaces>"#;

#[tokio::test]
async fn statistics_drop_schema_attributes_and_cast_values() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/proc/statistics")
            .header_exists("authorization");
        then.status(200)
            .header("content-type", "application/xml")
            .body(STATISTICS);
    });

    let info = NamespaceInfo::new(common::connection(&server, common::NAMESPACE_FQDN).await);
    let stats = info.statistics().await.unwrap();

    mock.assert();
    assert_eq!(stats.len(), 7);
    assert_eq!(stats["namespaceName"], Value::Str("ns1".to_owned()));
    assert_eq!(stats["objectCount"], Value::Int(42));
    assert_eq!(stats["totalCapacityBytes"], Value::Int(10_737_418_240));
    assert!(!stats.keys().any(|k| k.contains("noNamespaceSchemaLocation")));
}

#[tokio::test]
async fn list_all_namespaces() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/proc");
        then.status(200).body(NAMESPACES);
    });

    let info = NamespaceInfo::new(common::connection(&server, common::NAMESPACE_FQDN).await);
    let namespaces = info.list_accessible(true).await.unwrap();

    mock.assert();
    assert_eq!(namespaces.len(), 2);
    let ns1 = &namespaces["ns1"];
    assert_eq!(ns1.get("versioningEnabled"), Some(&Value::Bool(true)));
    assert_eq!(ns1.get("dpl"), Some(&Value::Int(2)));
    assert_eq!(ns1.description, vec!["Primary archive", "Owned by team A"]);
    assert_eq!(namespaces["ns2"].description, vec!["Scratch"]);
}

#[tokio::test]
async fn list_current_namespace_only() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/proc").query_param("single", "true");
        then.status(200).body(
            r#"<namespaces><namespace name="ns1" dpl="2"><description/></namespace></namespaces>"#,
        );
    });

    let info = NamespaceInfo::new(common::connection(&server, common::NAMESPACE_FQDN).await);
    let namespaces = info.list_accessible(false).await.unwrap();

    mock.assert();
    assert_eq!(namespaces.len(), 1);
    assert_eq!(namespaces["ns1"].description, vec![String::new()]);
}

#[tokio::test]
async fn retention_classes_keep_description_whole() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/proc/retentionClasses");
        then.status(200).body(
            r#"<retentionClasses>
                 <retentionClass name="legal" value="A+7y" autoDelete="false">
                   <description>Seven years°then review</description>
                 </retentionClass>
                 <retentionClass name="temp" value="A+30d" autoDelete="true"/>
               </retentionClasses>"#,
        );
    });

    let info = NamespaceInfo::new(common::connection(&server, common::NAMESPACE_FQDN).await);
    let classes = info.retention_classes().await.unwrap();

    assert_eq!(classes.len(), 2);
    let legal = &classes["legal"];
    assert_eq!(legal.attributes["value"], Value::Str("A+7y".to_owned()));
    assert_eq!(legal.attributes["autoDelete"], Value::Bool(false));
    assert_eq!(legal.description.as_deref(), Some("Seven years°then review"));
    assert_eq!(classes["temp"].description, None);
}

#[tokio::test]
async fn permissions_keyed_by_domain() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/proc/permissions");
        then.status(200).body(
            r#"<permissions>
                 <namespacePermissions read="true" write="true" delete="false"/>
                 <userPermissions read="true" write="false" delete="false"/>
                 <userEffectivePermissions read="true" write="false" delete="false"/>
               </permissions>"#,
        );
    });

    let info = NamespaceInfo::new(common::connection(&server, common::NAMESPACE_FQDN).await);
    let permissions = info.permissions().await.unwrap();

    assert_eq!(permissions.len(), 3);
    assert_eq!(permissions["namespacePermissions"]["write"], Value::Bool(true));
    assert_eq!(permissions["userPermissions"]["write"], Value::Bool(false));
}

#[tokio::test]
async fn forbidden_is_authentication_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/proc/statistics");
        then.status(403)
            .header("X-HCP-ErrorMessage", "Access denied for user");
    });

    let info = NamespaceInfo::new(common::connection(&server, common::NAMESPACE_FQDN).await);
    match info.statistics().await.unwrap_err() {
        HcpError::Authentication {
            status,
            hcp_error_message,
        } => {
            assert_eq!(status, http::StatusCode::FORBIDDEN);
            assert_eq!(hcp_error_message.as_deref(), Some("Access denied for user"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
