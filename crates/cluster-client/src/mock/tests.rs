use super::*;
use serde_json::json;

fn configmaps() -> Gvr {
    Gvr::new("", "v1", "configmaps")
}

fn config_map(name: &str, labels: Value) -> Document {
    Document::new(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "labels": labels },
        "data": { "key": "value" }
    }))
}

#[tokio::test]
async fn test_create_rejects_existing_object() {
    let client = MockClusterClient::new();
    let gvr = configmaps();
    let created = client.create(&gvr, "ns", &config_map("cm", json!({}))).await.unwrap();
    assert_eq!(created.namespace(), Some("ns"));
    assert!(created.resource_version().is_some());

    let err = client.create(&gvr, "ns", &config_map("cm", json!({}))).await.unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_update_requires_current_resource_version() {
    let client = MockClusterClient::new();
    let gvr = configmaps();
    client.create(&gvr, "ns", &config_map("cm", json!({}))).await.unwrap();

    let blind = config_map("cm", json!({}));
    assert!(matches!(client.update(&gvr, "ns", &blind).await, Err(ClusterError::Conflict(_))));

    let mut fresh = client.get(&gvr, "ns", "cm").await.unwrap();
    fresh.set_nested(&["data", "key"], json!("changed"));
    let updated = client.update(&gvr, "ns", &fresh).await.unwrap();
    assert_ne!(updated.resource_version(), fresh.resource_version());

    // The version we just used is now stale
    assert!(matches!(client.update(&gvr, "ns", &fresh).await, Err(ClusterError::Conflict(_))));
}

#[tokio::test]
async fn test_list_filters_by_namespace_and_labels() {
    let client = MockClusterClient::new();
    let gvr = configmaps();
    client.insert(&gvr, "a", config_map("one", json!({ "suite": "cis" })));
    client.insert(&gvr, "a", config_map("two", json!({ "suite": "moderate" })));
    client.insert(&gvr, "b", config_map("three", json!({ "suite": "cis" })));

    let in_a = client.list(&gvr, "a", None).await.unwrap();
    assert_eq!(in_a.len(), 2);

    let cis = client.list(&gvr, "a", Some("suite=cis")).await.unwrap();
    assert_eq!(cis.len(), 1);
    assert_eq!(cis[0].name(), "one");

    let everywhere = client.list(&gvr, "", Some("suite=cis")).await.unwrap();
    assert_eq!(everywhere.len(), 2);
}

#[tokio::test]
async fn test_merge_patch_removes_null_fields() {
    let client = MockClusterClient::new();
    let gvr = configmaps();
    let mut doc = config_map("cm", json!({}));
    doc.set_nested(&["metadata", "finalizers"], json!(["compliance.openshift.io/finalizer"]));
    client.insert(&gvr, "ns", doc);

    let patched = client
        .merge_patch(&gvr, "ns", "cm", &json!({ "metadata": { "finalizers": null }, "spec": { "apply": true } }))
        .await
        .unwrap();
    assert!(patched.nested(&["metadata", "finalizers"]).is_none());
    assert_eq!(patched.nested_bool(&["spec", "apply"]), Some(true));
    assert_eq!(patched.name(), "cm");
}

#[tokio::test]
async fn test_injected_failure_and_call_log() {
    let client = MockClusterClient::new();
    let gvr = configmaps();
    client.fail("get", "configmaps", MockFailure::Api(500, "boom".to_string()));

    let err = client.get(&gvr, "ns", "cm").await.unwrap_err();
    assert!(matches!(err, ClusterError::Api { code: 500, .. }));

    client.clear_failure("get", "configmaps");
    assert!(client.get(&gvr, "ns", "cm").await.unwrap_err().is_not_found());
    assert_eq!(client.calls(), vec!["get configmaps cm", "get configmaps cm"]);
}

#[tokio::test]
async fn test_create_reaction_converges_object() {
    let client = MockClusterClient::new();
    let gvr = Gvr::new("operators.coreos.com", "v1alpha1", "subscriptions");
    client.on_create("subscriptions", json!({ "status": { "installedCSV": "compliance-operator.v1.7.0" } }));

    client
        .create(&gvr, "ns", &Document::with_type("operators.coreos.com/v1alpha1", "Subscription", "sub"))
        .await
        .unwrap();
    let stored = client.object(&gvr, "ns", "sub").unwrap();
    assert_eq!(stored.nested_str(&["status", "installedCSV"]), Some("compliance-operator.v1.7.0"));
}

#[tokio::test]
async fn test_namespace_lifecycle() {
    let client = MockClusterClient::new();
    client.create_namespace("ns").await.unwrap();
    assert!(client.create_namespace("ns").await.unwrap_err().is_already_exists());

    client.make_namespace_sticky("ns");
    client.delete_namespace("ns").await.unwrap();
    assert!(client.get_namespace("ns").await.is_ok());
}

#[tokio::test]
async fn test_scripted_watch_sessions() {
    let client = MockClusterClient::new();
    let gvr = configmaps();
    client.push_watch("configmaps", MockWatch::Fail(MockFailure::NotRecognized));
    client.push_watch(
        "configmaps",
        MockWatch::Events(vec![ClusterWatchEvent::Added(config_map("cm", json!({}))), ClusterWatchEvent::Other]),
    );

    assert!(matches!(
        client.watch(&gvr, "ns").await,
        Err(ClusterError::ResourceNotRecognized(_))
    ));

    let events: Vec<_> = client.watch(&gvr, "ns").await.unwrap().collect().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Ok(ClusterWatchEvent::Added(_))));
    assert_eq!(client.watch_opens("configmaps").len(), 2);
}
