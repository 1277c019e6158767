//! Pending vault operations awaiting approval.
//!
//! A producer process records the operation it wants to perform; a human
//! approves it out of band; the producer polls [`PendingOperationStore::is_approved`]
//! until the flag flips, performs the write, and calls
//! [`PendingOperationStore::remove`].
//!
//! State is shared across independent processes through a flat JSON document:
//! every observation reloads the document first, every mutation rewrites it
//! whole. No cross-process lock is taken; concurrent writers can race and the
//! last writer wins, which is accepted for the single-administrator workload.
//!
//! Per-operation state machine: `CREATED → APPROVED → CONSUMED(removed)`,
//! with an independent `CREATED → EXPIRED` edge driven purely by elapsed
//! time. Expired records are never approvable and are purged on load.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ApprovalError;
use crate::util::random_token;

/// Operations expire five minutes after creation.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Operation id entropy (16 bytes = 128 bits).
const OP_ID_BYTES: usize = 16;

/// What the producer intends to do to the target service's secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Create,
    Update,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
        }
    }
}

/// A proposed vault write awaiting out-of-band approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation {
    pub op_id: String,
    /// Target service whose secrets are being written
    pub service: String,
    pub action: ActionKind,
    /// Key → secret value mapping to be written once approved
    pub secrets: HashMap<String, String>,
    /// Security warnings to surface on the approval page, in order
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

/// Durable store of pending operations, keyed by operation id.
pub struct PendingOperationStore {
    ops: RwLock<HashMap<String, PendingOperation>>,
    storage_path: PathBuf,
    /// Origin used to build approval URLs
    origin: String,
    ttl: Duration,
}

impl PendingOperationStore {
    /// Open the store with the default five-minute TTL.
    pub async fn new(storage_path: PathBuf, origin: String) -> Self {
        Self::with_ttl(storage_path, origin, DEFAULT_TTL_SECS).await
    }

    /// Open the store with a custom TTL in seconds.
    pub async fn with_ttl(storage_path: PathBuf, origin: String, ttl_secs: i64) -> Self {
        let store = Self {
            ops: RwLock::new(HashMap::new()),
            storage_path,
            origin,
            ttl: Duration::seconds(ttl_secs),
        };
        store.load().await;
        store
    }

    /// TTL in seconds (used in expiry error messages).
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    fn is_expired(&self, op: &PendingOperation, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(op.created_at) > self.ttl
    }

    /// Read the persisted document. Malformed entries are skipped with a
    /// warning; an unreadable file yields the empty map.
    fn read_document(&self) -> HashMap<String, PendingOperation> {
        if !self.storage_path.exists() {
            return HashMap::new();
        }

        let contents = match std::fs::read_to_string(&self.storage_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Could not load pending operations: {}", e);
                return HashMap::new();
            }
        };

        let raw: HashMap<String, serde_json::Value> = match serde_json::from_str(&contents) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Could not parse pending operations: {}", e);
                return HashMap::new();
            }
        };

        let mut ops = HashMap::new();
        for (op_id, value) in raw {
            match serde_json::from_value::<PendingOperation>(value) {
                Ok(op) => {
                    ops.insert(op_id, op);
                }
                Err(e) => {
                    tracing::warn!(op_id = %op_id, error = %e, "Skipping malformed pending operation");
                }
            }
        }

        ops
    }

    /// Rewrite the whole document. Failures are logged, never fatal; the
    /// in-memory state keeps serving.
    fn write_document(&self, ops: &HashMap<String, PendingOperation>) {
        let write = || -> Result<(), std::io::Error> {
            if let Some(parent) = self.storage_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(ops)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(&self.storage_path, contents)
        };

        if let Err(e) = write() {
            tracing::warn!("Could not save pending operations: {}", e);
        }
    }

    /// Record a new pending operation and persist it for cross-process
    /// visibility. Returns `(op_id, approval_url)`.
    pub async fn create(
        &self,
        service: &str,
        action: ActionKind,
        secrets: HashMap<String, String>,
        warnings: Vec<String>,
    ) -> (String, String) {
        let op_id = random_token(OP_ID_BYTES);
        let op = PendingOperation {
            op_id: op_id.clone(),
            service: service.to_string(),
            action,
            secrets,
            warnings,
            created_at: Utc::now(),
            approved: false,
            approved_at: None,
        };

        let mut ops = self.ops.write().await;
        ops.insert(op_id.clone(), op);
        self.write_document(&ops);

        let approval_url = format!("{}/approve/{}", self.origin, op_id);
        (op_id, approval_url)
    }

    /// Reload from durable storage, observing writes from other processes,
    /// and purge expired records. Re-persists only when purging occurred.
    pub async fn load(&self) {
        let mut ops = self.ops.write().await;
        *ops = self.read_document();

        let now = Utc::now();
        let before = ops.len();
        ops.retain(|_, op| !self.is_expired(op, now));
        if ops.len() != before {
            self.write_document(&ops);
        }
    }

    /// Look up a live operation, distinguishing "expired" from "unknown".
    ///
    /// An expired record found here is purged before returning the error; an
    /// absent one is `OperationNotFound`.
    pub async fn get(&self, op_id: &str) -> Result<PendingOperation, ApprovalError> {
        let mut ops = self.ops.write().await;
        *ops = self.read_document();

        match ops.get(op_id) {
            Some(op) if self.is_expired(op, Utc::now()) => {
                ops.remove(op_id);
                self.write_document(&ops);
                Err(ApprovalError::OperationExpired(self.ttl.num_seconds()))
            }
            Some(op) => Ok(op.clone()),
            None => Err(ApprovalError::OperationNotFound),
        }
    }

    /// Flip the approval flag, persisting before returning. Unknown and
    /// expired ids both fail with `OperationNotFound`. Re-approving an
    /// already-approved operation is idempotent; the flag never reverts.
    pub async fn approve(&self, op_id: &str) -> Result<PendingOperation, ApprovalError> {
        let mut ops = self.ops.write().await;
        *ops = self.read_document();

        let now = Utc::now();
        match ops.get_mut(op_id) {
            Some(op) if self.is_expired(op, now) => {
                ops.remove(op_id);
                self.write_document(&ops);
                Err(ApprovalError::OperationNotFound)
            }
            Some(op) => {
                if !op.approved {
                    op.approved = true;
                    op.approved_at = Some(now);
                }
                let approved = op.clone();
                self.write_document(&ops);
                Ok(approved)
            }
            None => Err(ApprovalError::OperationNotFound),
        }
    }

    /// Whether the operation has been approved. Reloads from durable storage
    /// first so approvals written by another process are observed. Unknown
    /// and expired operations both report `false`.
    pub async fn is_approved(&self, op_id: &str) -> bool {
        self.load().await;
        let ops = self.ops.read().await;
        ops.get(op_id).map(|op| op.approved).unwrap_or(false)
    }

    /// Remove an operation after the producer has consumed it. Idempotent.
    pub async fn remove(&self, op_id: &str) {
        let mut ops = self.ops.write().await;
        *ops = self.read_document();
        if ops.remove(op_id).is_some() {
            self.write_document(&ops);
        }
    }

    /// Number of live pending operations (status page).
    pub async fn pending_count(&self) -> usize {
        self.load().await;
        let ops = self.ops.read().await;
        ops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://vault-approve.example.com";

    async fn open(dir: &tempfile::TempDir) -> PendingOperationStore {
        PendingOperationStore::new(dir.path().join("pending.json"), ORIGIN.to_string()).await
    }

    fn payload() -> HashMap<String, String> {
        HashMap::from([("API_KEY".to_string(), "v1".to_string())])
    }

    #[tokio::test]
    async fn create_returns_approval_url_under_origin() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let (op_id, url) = store
            .create("svc-a", ActionKind::Create, payload(), vec![])
            .await;
        assert_eq!(url, format!("{}/approve/{}", ORIGIN, op_id));
    }

    #[tokio::test]
    async fn created_operation_is_not_approved() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let (op_id, _) = store
            .create("svc-a", ActionKind::Create, payload(), vec![])
            .await;
        assert!(!store.is_approved(&op_id).await);
    }

    #[tokio::test]
    async fn approve_flips_flag_and_sets_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let (op_id, _) = store
            .create("svc-a", ActionKind::Update, payload(), vec![])
            .await;
        let op = store.approve(&op_id).await.unwrap();
        assert!(op.approved);
        assert!(op.approved_at.is_some());
        assert!(store.is_approved(&op_id).await);
    }

    #[tokio::test]
    async fn approve_is_idempotent_and_keeps_first_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let (op_id, _) = store
            .create("svc-a", ActionKind::Create, payload(), vec![])
            .await;
        let first = store.approve(&op_id).await.unwrap();
        let second = store.approve(&op_id).await.unwrap();
        assert_eq!(first.approved_at, second.approved_at);
        assert!(second.approved);
    }

    #[tokio::test]
    async fn approve_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        assert!(matches!(
            store.approve("missing").await,
            Err(ApprovalError::OperationNotFound)
        ));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let (op_id, _) = store
            .create("svc-a", ActionKind::Create, payload(), vec![])
            .await;
        store.remove(&op_id).await;
        store.remove(&op_id).await;
        assert!(!store.is_approved(&op_id).await);
        assert!(matches!(
            store.get(&op_id).await,
            Err(ApprovalError::OperationNotFound)
        ));
    }

    #[tokio::test]
    async fn expired_operation_is_never_approvable_and_purged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let store =
            PendingOperationStore::with_ttl(path.clone(), ORIGIN.to_string(), 0).await;

        let (op_id, _) = store
            .create("svc-a", ActionKind::Create, payload(), vec![])
            .await;
        // TTL of zero: anything already created is older than the window.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(!store.is_approved(&op_id).await);
        assert!(matches!(
            store.approve(&op_id).await,
            Err(ApprovalError::OperationNotFound)
        ));

        // Purged from the persisted document as well.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains(&op_id));
    }

    #[tokio::test]
    async fn get_distinguishes_expired_from_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            PendingOperationStore::with_ttl(dir.path().join("p.json"), ORIGIN.to_string(), 0)
                .await;

        let (op_id, _) = store
            .create("svc-a", ActionKind::Create, payload(), vec![])
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(matches!(
            store.get(&op_id).await,
            Err(ApprovalError::OperationExpired(_))
        ));
        // Once purged, the same id is unknown.
        assert!(matches!(
            store.get(&op_id).await,
            Err(ApprovalError::OperationNotFound)
        ));
    }

    #[tokio::test]
    async fn approval_is_visible_to_an_independent_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");

        let producer =
            PendingOperationStore::new(path.clone(), ORIGIN.to_string()).await;
        let server = PendingOperationStore::new(path, ORIGIN.to_string()).await;

        let (op_id, _) = producer
            .create("svc-a", ActionKind::Create, payload(), vec![])
            .await;

        // The server process observes the new op and approves it.
        server.approve(&op_id).await.unwrap();

        // The producer observes the approval through the shared file.
        assert!(producer.is_approved(&op_id).await);
    }

    #[tokio::test]
    async fn roundtrip_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");

        let store = PendingOperationStore::new(path.clone(), ORIGIN.to_string()).await;
        let (op_id, _) = store
            .create(
                "svc-a",
                ActionKind::Update,
                payload(),
                vec!["value looks like a test key".to_string()],
            )
            .await;

        let reopened = PendingOperationStore::new(path, ORIGIN.to_string()).await;
        let op = reopened.get(&op_id).await.unwrap();
        assert_eq!(op.op_id, op_id);
        assert_eq!(op.service, "svc-a");
        assert_eq!(op.action, ActionKind::Update);
        assert_eq!(op.secrets.get("API_KEY").unwrap(), "v1");
        assert_eq!(op.warnings, vec!["value looks like a test key"]);
        assert!(!op.approved);
    }

    #[tokio::test]
    async fn malformed_entry_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        std::fs::write(
            &path,
            r#"{
                "good": {
                    "op_id": "good",
                    "service": "svc-a",
                    "action": "CREATE",
                    "secrets": {},
                    "warnings": [],
                    "created_at": "2099-01-01T00:00:00Z",
                    "approved": false
                },
                "bad": { "service": 42 }
            }"#,
        )
        .unwrap();

        let store = PendingOperationStore::new(path, ORIGIN.to_string()).await;
        assert!(store.get("good").await.is_ok());
        assert!(matches!(
            store.get("bad").await,
            Err(ApprovalError::OperationNotFound)
        ));
    }
}
