//! Single-use WebAuthn challenge storage.
//!
//! Challenges are issued for one ceremony and consumed exactly once; a second
//! consume attempt for the same session fails with `InvalidSession`. The store
//! is memory-only by design: a process restart mid-ceremony forces the client
//! to restart the ceremony.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::error::ApprovalError;
use crate::util::{random_bytes, random_token};

/// Maximum age of an unconsumed challenge, in seconds.
const CHALLENGE_TTL_SECS: i64 = 300;

/// Session id entropy (32 bytes = 256 bits).
const SESSION_ID_BYTES: usize = 32;

/// Challenge entropy (32 bytes = 256 bits).
const CHALLENGE_BYTES: usize = 32;

struct IssuedChallenge {
    bytes: Vec<u8>,
    issued_at: DateTime<Utc>,
}

/// In-memory store of outstanding ceremony challenges, keyed by session id.
#[derive(Default)]
pub struct ChallengeStore {
    challenges: RwLock<HashMap<String, IssuedChallenge>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh challenge, returning `(session_id, challenge_bytes)`.
    pub async fn issue(&self) -> (String, Vec<u8>) {
        let session_id = random_token(SESSION_ID_BYTES);
        let bytes = random_bytes(CHALLENGE_BYTES);

        let mut challenges = self.challenges.write().await;
        challenges.insert(
            session_id.clone(),
            IssuedChallenge {
                bytes: bytes.clone(),
                issued_at: Utc::now(),
            },
        );

        (session_id, bytes)
    }

    /// Consume a challenge. Check-and-remove happens under a single write
    /// lock, so concurrent consumers of the same session cannot both succeed.
    pub async fn consume(&self, session_id: &str) -> Result<Vec<u8>, ApprovalError> {
        let mut challenges = self.challenges.write().await;
        let issued = challenges
            .remove(session_id)
            .ok_or(ApprovalError::InvalidSession)?;

        if Utc::now().signed_duration_since(issued.issued_at)
            > Duration::seconds(CHALLENGE_TTL_SECS)
        {
            return Err(ApprovalError::InvalidSession);
        }

        Ok(issued.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issue_then_consume_returns_same_bytes() {
        let store = ChallengeStore::new();
        let (session_id, bytes) = store.issue().await;
        let consumed = store.consume(&session_id).await.unwrap();
        assert_eq!(consumed, bytes);
    }

    #[tokio::test]
    async fn second_consume_fails() {
        let store = ChallengeStore::new();
        let (session_id, _) = store.issue().await;
        store.consume(&session_id).await.unwrap();
        assert!(matches!(
            store.consume(&session_id).await,
            Err(ApprovalError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn unknown_session_fails() {
        let store = ChallengeStore::new();
        assert!(matches!(
            store.consume("nope").await,
            Err(ApprovalError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn challenges_are_independent() {
        let store = ChallengeStore::new();
        let (s1, b1) = store.issue().await;
        let (s2, b2) = store.issue().await;
        assert_ne!(s1, s2);
        assert_ne!(b1, b2);
        assert_eq!(store.consume(&s2).await.unwrap(), b2);
        assert_eq!(store.consume(&s1).await.unwrap(), b1);
    }
}
