//! Registered authenticator credentials.
//!
//! Durable mapping from an owner identity to one registered WebAuthn
//! credential. The whole document is read into memory on load and rewritten
//! on save; per-entry deserialization quarantines malformed records instead
//! of failing the whole load.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A registered public-key authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatorCredential {
    /// Opaque credential handle reported by the authenticator
    #[serde(with = "hex_bytes")]
    pub credential_id: Vec<u8>,
    /// Opaque verifier key material (COSE-encoded public key)
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Authenticator-reported use counter, updated on successful authentication
    pub sign_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Hex-encode binary fields so the persisted document stays inspectable.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Durable owner → credential store backed by a flat JSON document.
pub struct CredentialStore {
    credentials: RwLock<HashMap<String, AuthenticatorCredential>>,
    storage_path: PathBuf,
}

impl CredentialStore {
    /// Open the store, loading any previously persisted credentials.
    pub async fn new(storage_path: PathBuf) -> Self {
        let store = Self {
            credentials: RwLock::new(HashMap::new()),
            storage_path,
        };

        match store.load_from_disk() {
            Ok(loaded) => {
                let mut credentials = store.credentials.write().await;
                *credentials = loaded;
            }
            Err(e) => {
                tracing::warn!("Could not load credentials: {}", e);
            }
        }

        store
    }

    /// Load the full document. Malformed entries are skipped with a warning.
    fn load_from_disk(&self) -> Result<HashMap<String, AuthenticatorCredential>, std::io::Error> {
        if !self.storage_path.exists() {
            return Ok(HashMap::new());
        }

        let contents = std::fs::read_to_string(&self.storage_path)?;
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut credentials = HashMap::new();
        for (owner, value) in raw {
            match serde_json::from_value::<AuthenticatorCredential>(value) {
                Ok(credential) => {
                    credentials.insert(owner, credential);
                }
                Err(e) => {
                    tracing::warn!(owner = %owner, error = %e, "Skipping malformed credential entry");
                }
            }
        }

        Ok(credentials)
    }

    /// Persist the full mapping. The file handle is scoped to this call; the
    /// write flushes and closes on all paths.
    async fn save_to_disk(&self) -> Result<(), std::io::Error> {
        let credentials = self.credentials.read().await;

        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(&*credentials)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&self.storage_path, contents)?;
        Ok(())
    }

    pub async fn get(&self, owner: &str) -> Option<AuthenticatorCredential> {
        let credentials = self.credentials.read().await;
        credentials.get(owner).cloned()
    }

    /// Number of registered owners (status page).
    pub async fn count(&self) -> usize {
        let credentials = self.credentials.read().await;
        credentials.len()
    }

    /// Insert or overwrite the credential for `owner`. At most one active
    /// credential per owner.
    pub async fn register(&self, owner: &str, credential: AuthenticatorCredential) {
        {
            let mut credentials = self.credentials.write().await;
            credentials.insert(owner.to_string(), credential);
        }

        if let Err(e) = self.save_to_disk().await {
            tracing::warn!("Could not save credentials: {}", e);
        }
    }

    /// Record the authenticator-reported sign count after a successful
    /// authentication, persisting before returning.
    pub async fn update_sign_count(&self, owner: &str, sign_count: u32) {
        {
            let mut credentials = self.credentials.write().await;
            if let Some(credential) = credentials.get_mut(owner) {
                credential.sign_count = sign_count;
            } else {
                return;
            }
        }

        if let Err(e) = self.save_to_disk().await {
            tracing::warn!("Could not save credentials: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credential() -> AuthenticatorCredential {
        AuthenticatorCredential {
            credential_id: vec![1, 2, 3, 4],
            public_key: vec![0xA5, 0x01, 0x02],
            sign_count: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn register_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json")).await;

        assert!(store.get("vault-admin").await.is_none());
        store.register("vault-admin", sample_credential()).await;

        let loaded = store.get("vault-admin").await.unwrap();
        assert_eq!(loaded.credential_id, vec![1, 2, 3, 4]);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn register_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");

        {
            let store = CredentialStore::new(path.clone()).await;
            store.register("vault-admin", sample_credential()).await;
        }

        let reopened = CredentialStore::new(path).await;
        let loaded = reopened.get("vault-admin").await.unwrap();
        assert_eq!(loaded.public_key, vec![0xA5, 0x01, 0x02]);
    }

    #[tokio::test]
    async fn register_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json")).await;

        store.register("vault-admin", sample_credential()).await;
        let mut replacement = sample_credential();
        replacement.credential_id = vec![9, 9];
        store.register("vault-admin", replacement).await;

        assert_eq!(store.count().await, 1);
        assert_eq!(
            store.get("vault-admin").await.unwrap().credential_id,
            vec![9, 9]
        );
    }

    #[tokio::test]
    async fn update_sign_count_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");

        let store = CredentialStore::new(path.clone()).await;
        store.register("vault-admin", sample_credential()).await;
        store.update_sign_count("vault-admin", 7).await;

        let reopened = CredentialStore::new(path).await;
        assert_eq!(reopened.get("vault-admin").await.unwrap().sign_count, 7);
    }

    #[tokio::test]
    async fn malformed_entry_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");

        std::fs::write(
            &path,
            r#"{
                "vault-admin": {
                    "credential_id": "01020304",
                    "public_key": "a50102",
                    "sign_count": 3,
                    "created_at": "2026-01-01T00:00:00Z"
                },
                "broken": { "credential_id": "not hex" }
            }"#,
        )
        .unwrap();

        let store = CredentialStore::new(path).await;
        assert_eq!(store.count().await, 1);
        assert_eq!(store.get("vault-admin").await.unwrap().sign_count, 3);
        assert!(store.get("broken").await.is_none());
    }
}
