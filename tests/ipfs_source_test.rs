mod common;

use common::ArchiveBuilder;
use httpmock::prelude::*;
use nocloud_provision::adapters::IpfsHttpSource;
use nocloud_provision::core::ByteSource;
use nocloud_provision::utils::error::ErrorCategory;
use nocloud_provision::{Manifest, Package, PackageKind, PackageState, ProvisionEngine, ProvisionError};
use std::io::Read;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cat_streams_object() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let cat_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v0/cat")
                .query_param("arg", "bafyhello");
            then.status(200).body("hello from ipfs");
        })
        .await;

    let source = IpfsHttpSource::new(&server.address().to_string())?;
    let body = tokio::task::spawn_blocking(move || -> nocloud_provision::Result<Vec<u8>> {
        let mut stream = source.open("bafyhello")?;
        let mut body = Vec::new();
        stream.read_to_end(&mut body)?;
        Ok(body)
    })
    .await??;

    cat_mock.assert_async().await;
    assert_eq!(body, b"hello from ipfs");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_api_error_is_fetch_error() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v0/cat");
            then.status(500)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "Message": "merkledag: not found",
                    "Code": 0,
                    "Type": "error"
                }));
        })
        .await;

    let source = IpfsHttpSource::new(&server.base_url())?;
    let result = tokio::task::spawn_blocking(move || source.open("bafymissing").map(|_| ())).await?;

    match result {
        Err(ProvisionError::FetchError {
            content_id,
            message,
        }) => {
            assert_eq!(content_id, "bafymissing");
            assert!(message.contains("merkledag: not found"), "{}", message);
        }
        other => panic!("expected FetchError, got {:?}", other),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_over_ipfs_api() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let archive = ArchiveBuilder::new()
        .dir("opt/agent", 0o755)
        .file("opt/agent/agent", 0o755, b"#!/bin/sh\n")
        .into_tar_xz();

    let agent_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v0/cat")
                .query_param("arg", "bafyagent");
            then.status(200).body(archive);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v0/cat")
                .query_param("arg", "bafygone");
            then.status(500).body("{\"Message\": \"block was not found locally\"}");
        })
        .await;

    let temp_dir = TempDir::new()?;
    let source = IpfsHttpSource::new(&server.address().to_string())?;
    let engine = ProvisionEngine::new(source, temp_dir.path());

    let manifest = Manifest {
        packages: vec![
            Package::new("gone", "bafygone", PackageKind::Plain),
            Package::new("agent", "bafyagent", PackageKind::Service),
        ],
        ..Manifest::default()
    };
    let results = engine.run(&manifest).await;

    agent_mock.assert_async().await;
    assert_eq!(results[0].state, PackageState::Failed(ErrorCategory::Fetch));
    assert!(results[1].is_success(), "{:?}", results[1].error);
    assert!(temp_dir.path().join("opt/agent/agent").exists());
    Ok(())
}
