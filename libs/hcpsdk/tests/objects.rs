#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Object and directory access against a mocked `/rest` interface

mod common;

use hcpsdk::HcpError;
use hcpsdk::objects::{ObjectKind, Objects};
use hcpsdk::pathbuilder::PathBuilder;
use httpmock::Method::{DELETE, GET, HEAD, PUT};
use httpmock::MockServer;

async fn objects(server: &MockServer) -> Objects {
    Objects::new(common::connection(server, common::NAMESPACE_FQDN).await)
}

#[tokio::test]
async fn put_expects_created() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/rest/docs/hello.txt")
            .body("hello");
        then.status(201)
            .header("X-HCP-Hash", "SHA-256 2CF24DBA5FB0A30E")
            .header("X-HCP-IngestTime", "1700000000");
    });

    let objects = objects(&server).await;
    let path = PathBuilder::object_path(&["docs"], "hello.txt");
    let meta = objects.put_object(&path, "hello").await.unwrap();

    mock.assert();
    assert_eq!(meta.hash_scheme.as_deref(), Some("SHA-256"));
    assert_eq!(meta.ingest_time.unwrap().timestamp(), 1_700_000_000);
}

#[tokio::test]
async fn put_existing_object_conflicts() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(PUT).path("/rest/a.txt");
        then.status(409)
            .header("X-HCP-ErrorMessage", "Object already exists");
    });

    let err = objects(&server)
        .await
        .put_object("/rest/a.txt", "x")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(http::StatusCode::CONFLICT));
}

#[tokio::test]
async fn get_and_head_object() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/a.txt");
        then.status(200).body("content");
    });
    server.mock(|when, then| {
        when.method(HEAD).path("/rest/a.txt");
        then.status(200)
            .header("X-HCP-Type", "object")
            .header("X-HCP-Size", "7")
            .header("X-HCP-Custom-Metadata", "false")
            .header("X-HCP-RetentionString", "Deletion Allowed");
    });

    let objects = objects(&server).await;
    assert_eq!(objects.get_object("/rest/a.txt").await.unwrap().as_ref(), b"content");

    let meta = objects.head_object("/rest/a.txt").await.unwrap();
    assert_eq!(meta.kind, ObjectKind::Object);
    assert_eq!(meta.size, Some(7));
    assert!(!meta.custom_metadata);
    assert_eq!(meta.retention.as_deref(), Some("Deletion Allowed"));
}

#[tokio::test]
async fn missing_object() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(HEAD).path("/rest/missing");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(GET).path("/rest/missing");
        then.status(404);
    });

    let objects = objects(&server).await;
    assert!(!objects.exists("/rest/missing").await.unwrap());
    let err = objects.get_object("/rest/missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, HcpError::HttpStatus { .. }));
}

#[tokio::test]
async fn delete_object() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE).path("/rest/a.txt");
        then.status(200);
    });

    objects(&server).await.delete_object("/rest/a.txt").await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn create_and_list_directory() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(PUT)
            .path("/rest/docs")
            .query_param("type", "directory");
        then.status(201);
    });
    server.mock(|when, then| {
        when.method(GET).path("/rest/docs");
        then.status(200).body(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<directory path="/rest/docs" parentDir="/rest" dirDeleted="false" showDeleted="false">
  <entry urlName="report%201.pdf" utf8Name="report 1.pdf" type="object" size="2048"
         ingestTime="1700000000" hash="SHA-256 AB12" retentionString="Deletion Allowed"
         customMetadata="false" state="created"/>
  <entry urlName="2024" type="directory" state="created"/>
</directory>"#,
        );
    });

    let objects = objects(&server).await;
    objects.create_directory("/rest/docs").await.unwrap();
    create.assert();

    let entries = objects.list_directory("/rest/docs").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "report 1.pdf");
    assert_eq!(entries[0].size, Some(2048));
    assert_eq!(entries[1].kind, ObjectKind::Directory);
}

#[tokio::test]
async fn listing_an_object_is_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/a.xml");
        then.status(200).body("<invoice/>");
    });

    let err = objects(&server).await.list_directory("/rest/a.xml").await.unwrap_err();
    assert!(matches!(err, HcpError::Xml(_)));
}

#[tokio::test]
async fn large_object_streams_past_body_limit() {
    let content = vec![b'x'; 2 * 1024 * 1024];
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/rest/big.bin");
        then.status(200).body(content.clone());
    });

    let objects = objects(&server).await;
    let err = objects.get_object("/rest/big.bin").await.unwrap_err();
    assert!(matches!(err, HcpError::BodyTooLarge { .. }), "{err:?}");

    let mut out = Vec::new();
    let total = objects.get_object_to("/rest/big.bin", &mut out).await.unwrap();
    assert_eq!(total, content.len() as u64);
    assert_eq!(out, content);
    mock.assert_calls(2);
}

#[tokio::test]
async fn streaming_a_missing_object_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/gone.txt");
        then.status(404);
    });

    let mut out = Vec::new();
    let err = objects(&server)
        .await
        .get_object_to("/rest/gone.txt", &mut out)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(out.is_empty());
}

#[tokio::test]
async fn annotation_is_stored_as_custom_metadata() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/rest/archive/obj")
            .query_param("type", "custom-metadata")
            .header("content-type", "application/xml")
            .body_includes("<hcpsdk_fileobject");
        then.status(201);
    });

    let unique = PathBuilder::new("/rest/archive/")
        .annotation(true)
        .get_unique("report.pdf")
        .unwrap();
    objects(&server)
        .await
        .put_annotation("/rest/archive/obj", unique.annotation.unwrap())
        .await
        .unwrap();
    mock.assert();
}
