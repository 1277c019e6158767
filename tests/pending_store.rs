//! Cross-process behavior of the pending-operation store: two independent
//! store instances (producer and approval server) sharing one JSON document.

use std::collections::HashMap;

use vaultgate::pending::ActionKind;
use vaultgate::PendingOperationStore;

const ORIGIN: &str = "http://localhost:8091";

fn secrets(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn producer_and_server_share_one_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending-operations.json");

    let producer = PendingOperationStore::new(path.clone(), ORIGIN.to_string()).await;
    let server = PendingOperationStore::new(path, ORIGIN.to_string()).await;

    let (op_id, _url) = producer
        .create(
            "billing",
            ActionKind::Update,
            secrets(&[("STRIPE_KEY", "sk-live-123")]),
            vec!["Overwrites existing key STRIPE_KEY".to_string()],
        )
        .await;

    // The server instance opened before the create still sees it.
    let op = server.get(&op_id).await.unwrap();
    assert_eq!(op.service, "billing");
    assert_eq!(op.action, ActionKind::Update);
    assert_eq!(op.warnings.len(), 1);
    assert!(!op.approved);

    // Approval on the server side becomes visible to the producer.
    server.approve(&op_id).await.unwrap();
    assert!(producer.is_approved(&op_id).await);

    // The producer consumes the operation; the server no longer finds it.
    producer.remove(&op_id).await;
    assert!(server.get(&op_id).await.is_err());
}

#[tokio::test]
async fn operations_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending-operations.json");

    let op_id = {
        let store = PendingOperationStore::new(path.clone(), ORIGIN.to_string()).await;
        let (op_id, _url) = store
            .create(
                "svc",
                ActionKind::Create,
                secrets(&[("KEY", "value")]),
                vec![],
            )
            .await;
        op_id
    };

    let reopened = PendingOperationStore::new(path, ORIGIN.to_string()).await;
    let op = reopened.get(&op_id).await.unwrap();
    assert_eq!(op.op_id, op_id);
    assert_eq!(reopened.pending_count().await, 1);
}

#[tokio::test]
async fn expired_operations_are_purged_for_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending-operations.json");

    let producer = PendingOperationStore::with_ttl(path.clone(), ORIGIN.to_string(), 0).await;
    let server = PendingOperationStore::with_ttl(path, ORIGIN.to_string(), 0).await;

    let (op_id, _url) = producer
        .create(
            "svc",
            ActionKind::Create,
            secrets(&[("KEY", "value")]),
            vec![],
        )
        .await;

    // ttl 0 expires the operation immediately on the next load.
    assert!(server.approve(&op_id).await.is_err());
    assert!(!producer.is_approved(&op_id).await);
    assert_eq!(producer.pending_count().await, 0);
}
