//! Approval ceremony orchestration.
//!
//! The coordinator runs the two WebAuthn ceremonies end to end: it issues
//! single-use challenges, hands authenticator responses to the
//! [`CeremonyVerifier`] bound to the configured relying party and origin,
//! and applies the outcome to the credential and pending-operation stores.
//! Every failure is returned synchronously as a structured rejection; a
//! retry is always a fresh ceremony initiated by the client.

pub mod types;
pub mod verifier;

use std::sync::Arc;

use chrono::Utc;

use crate::challenge::ChallengeStore;
use crate::config::Config;
use crate::credentials::{AuthenticatorCredential, CredentialStore};
use crate::error::ApprovalError;
use crate::pending::{PendingOperation, PendingOperationStore};
use self::types::{
    encode_base64url, AllowCredential, AuthenticationOptions, AuthenticationResponse,
    AuthenticatorSelection, PubKeyCredParam, RegistrationOptions, RegistrationResponse,
    RelyingParty, UserEntity,
};
use self::verifier::{CeremonyExpectations, CeremonyVerifier};

/// Single administrator identity for the base deployment. Storage is keyed
/// by owner, so additional identities are an extension, not a rewrite.
pub const DEFAULT_OWNER: &str = "vault-admin";

const RP_NAME: &str = "Vaultgate Approval";
const OWNER_DISPLAY_NAME: &str = "Vaultgate Admin";
const CEREMONY_TIMEOUT_MS: u32 = 60_000;

/// How to treat the authenticator-reported sign counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignCountPolicy {
    /// Reject a non-increasing counter whenever either side is non-zero —
    /// the standard clone-detection signal. Counters that are both zero
    /// pass, since many platform authenticators never count.
    #[default]
    Strict,
    /// Store whatever the authenticator reports.
    Permissive,
}

/// Orchestrates registration and authentication ceremonies.
pub struct CeremonyCoordinator {
    rp_id: String,
    origin: String,
    owner: String,
    sign_count_policy: SignCountPolicy,
    challenges: ChallengeStore,
    credentials: Arc<CredentialStore>,
    pending: Arc<PendingOperationStore>,
    verifier: Arc<dyn CeremonyVerifier>,
}

impl CeremonyCoordinator {
    pub fn new(
        config: &Config,
        credentials: Arc<CredentialStore>,
        pending: Arc<PendingOperationStore>,
        verifier: Arc<dyn CeremonyVerifier>,
    ) -> Self {
        Self {
            rp_id: config.rp_id.clone(),
            origin: config.origin.clone(),
            owner: DEFAULT_OWNER.to_string(),
            sign_count_policy: SignCountPolicy::default(),
            challenges: ChallengeStore::new(),
            credentials,
            pending,
            verifier,
        }
    }

    pub fn with_sign_count_policy(mut self, policy: SignCountPolicy) -> Self {
        self.sign_count_policy = policy;
        self
    }

    fn expectations(&self, challenge: Vec<u8>) -> CeremonyExpectations {
        CeremonyExpectations {
            challenge,
            rp_id: self.rp_id.clone(),
            origin: self.origin.clone(),
        }
    }

    /// Start a registration ceremony: issue a challenge and return the
    /// parameters for `navigator.credentials.create` plus the session id.
    pub async fn registration_challenge(&self) -> (RegistrationOptions, String) {
        let (session_id, challenge) = self.challenges.issue().await;

        let options = RegistrationOptions {
            rp: RelyingParty {
                id: self.rp_id.clone(),
                name: RP_NAME.to_string(),
            },
            user: UserEntity {
                id: encode_base64url(self.owner.as_bytes()),
                name: self.owner.clone(),
                display_name: OWNER_DISPLAY_NAME.to_string(),
            },
            challenge: encode_base64url(&challenge),
            pub_key_cred_params: vec![PubKeyCredParam {
                credential_type: "public-key",
                alg: -7,
            }],
            timeout: CEREMONY_TIMEOUT_MS,
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: "platform",
                user_verification: "required",
            },
            attestation: "none",
        };

        (options, session_id)
    }

    /// Complete a registration ceremony: consume the challenge, verify the
    /// attestation, and store the credential. No partial state survives a
    /// failure — the credential is only written after verification passes.
    pub async fn complete_registration(
        &self,
        session_id: &str,
        response: &RegistrationResponse,
    ) -> Result<(), ApprovalError> {
        let challenge = self.challenges.consume(session_id).await?;

        let registered = self
            .verifier
            .verify_registration(response, &self.expectations(challenge))?;

        tracing::info!(
            owner = %self.owner,
            credential_id = %hex::encode(&registered.credential_id),
            "Registered authenticator"
        );

        self.credentials
            .register(
                &self.owner,
                AuthenticatorCredential {
                    credential_id: registered.credential_id,
                    public_key: registered.public_key,
                    sign_count: registered.sign_count,
                    created_at: Utc::now(),
                },
            )
            .await;

        Ok(())
    }

    /// Start an authentication ceremony. Fails with `NoCredential` if no
    /// authenticator has been registered; otherwise the allow-list is
    /// restricted to the one registered credential handle.
    pub async fn authentication_challenge(
        &self,
    ) -> Result<(AuthenticationOptions, String), ApprovalError> {
        let credential = self
            .credentials
            .get(&self.owner)
            .await
            .ok_or_else(|| ApprovalError::NoCredential(self.owner.clone()))?;

        let (session_id, challenge) = self.challenges.issue().await;

        let options = AuthenticationOptions {
            challenge: encode_base64url(&challenge),
            timeout: CEREMONY_TIMEOUT_MS,
            rp_id: self.rp_id.clone(),
            allow_credentials: vec![AllowCredential {
                credential_type: "public-key",
                id: encode_base64url(&credential.credential_id),
            }],
            user_verification: "required",
        };

        Ok((options, session_id))
    }

    /// Complete an authentication ceremony and approve the operation.
    ///
    /// Order matters for crash safety: the sign counter is persisted first,
    /// then the approval flag. A crash in between leaves an unapproved
    /// operation and a fresh ceremony re-derives the rest; re-approval is
    /// idempotent.
    pub async fn complete_authentication(
        &self,
        session_id: &str,
        op_id: &str,
        response: &AuthenticationResponse,
    ) -> Result<PendingOperation, ApprovalError> {
        let challenge = self.challenges.consume(session_id).await?;

        // The operation must be live before we touch the authenticator
        // response.
        self.pending.get(op_id).await.map_err(|_| ApprovalError::OperationNotFound)?;

        let credential = self
            .credentials
            .get(&self.owner)
            .await
            .ok_or_else(|| ApprovalError::NoCredential(self.owner.clone()))?;

        let new_sign_count = self.verifier.verify_authentication(
            response,
            &self.expectations(challenge),
            &credential,
        )?;

        if self.sign_count_policy == SignCountPolicy::Strict
            && (new_sign_count != 0 || credential.sign_count != 0)
            && new_sign_count <= credential.sign_count
        {
            return Err(ApprovalError::VerificationFailed(format!(
                "sign counter did not increase ({} -> {}); possible cloned authenticator",
                credential.sign_count, new_sign_count
            )));
        }

        self.credentials
            .update_sign_count(&self.owner, new_sign_count)
            .await;

        let op = self.pending.approve(op_id).await?;
        tracing::info!(op_id = %op.op_id, service = %op.service, "Operation approved");

        Ok(op)
    }
}
