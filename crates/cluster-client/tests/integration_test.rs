//! Integration tests for the cluster client
//!
//! These tests require a reachable cluster via the ambient kubeconfig
//! (KUBECONFIG or ~/.kube/config).

use cluster_client::{kinds, ClusterClientTrait, KubeClusterClient, LabelSelector};
use serde_json::json;

async fn connect() -> KubeClusterClient {
    let _ = rustls::crypto::ring::default_provider().install_default();
    KubeClusterClient::try_default()
        .await
        .expect("Failed to build client from kubeconfig")
}

#[tokio::test]
#[ignore] // Requires a running cluster
async fn test_list_namespaces() {
    let client = connect().await;
    let namespaces = client
        .list(&kinds::namespaces(), None, None)
        .await
        .expect("Failed to list namespaces");
    assert!(namespaces.iter().any(|ns| ns.metadata.name.as_deref() == Some("default")));
}

#[tokio::test]
#[ignore]
async fn test_list_with_selector() {
    let client = connect().await;
    let selector = LabelSelector::new().eq("app.kubernetes.io/name", "kubeblocks");
    let deployments = client
        .list(&kinds::deployments(), None, Some(&selector))
        .await
        .expect("Failed to list deployments");
    println!("Found {} KubeBlocks deployments", deployments.len());
}

#[tokio::test]
#[ignore]
async fn test_configmap_lifecycle() {
    let client = connect().await;
    let kind = kinds::configmaps();
    let mut cm = kube::api::DynamicObject::new("kblifecycle-it", &kind.api_resource()).within("default");
    cm.data = json!({"data": {"k": "v"}});

    let _ = client.delete(&kind, Some("default"), "kblifecycle-it", true).await;
    client.create(&kind, Some("default"), &cm).await.expect("create");
    let err = client.create(&kind, Some("default"), &cm).await.unwrap_err();
    assert!(err.is_already_exists());

    let patched = client
        .patch_merge(&kind, Some("default"), "kblifecycle-it", &json!({"metadata": {"labels": {"it": "yes"}}}))
        .await
        .expect("patch");
    assert_eq!(
        patched.metadata.labels.unwrap_or_default().get("it").map(String::as_str),
        Some("yes")
    );

    client.delete(&kind, Some("default"), "kblifecycle-it", true).await.expect("delete");
    let err = client.get(&kind, Some("default"), "kblifecycle-it").await.unwrap_err();
    assert!(err.is_not_found());
}
