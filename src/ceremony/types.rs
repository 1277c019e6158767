//! Wire types for WebAuthn ceremonies.
//!
//! Options structs serialize to the JSON shape `navigator.credentials`
//! expects (camelCase, base64url binary fields); response structs accept the
//! envelope the approval pages post back.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ApprovalError;

/// Decode base64 accepting both the url-safe alphabet used in WebAuthn JSON
/// and the standard alphabet produced by `btoa` in the browser pages.
pub fn decode_base64(value: &str) -> Result<Vec<u8>, ApprovalError> {
    let trimmed = value.trim();
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| URL_SAFE.decode(trimmed))
        .or_else(|_| STANDARD.decode(trimmed))
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|e| ApprovalError::VerificationFailed(format!("invalid base64: {}", e)))
}

/// Encode bytes as base64url without padding (WebAuthn JSON convention).
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

// ─── Ceremony parameters (server → browser) ─────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// base64url user handle
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub credential_type: &'static str,
    /// COSE algorithm identifier (-7 = ES256)
    pub alg: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub authenticator_attachment: &'static str,
    pub user_verification: &'static str,
}

/// Parameters for `navigator.credentials.create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub rp: RelyingParty,
    pub user: UserEntity,
    /// base64url challenge
    pub challenge: String,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub timeout: u32,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllowCredential {
    #[serde(rename = "type")]
    pub credential_type: &'static str,
    /// base64url credential id
    pub id: String,
}

/// Parameters for `navigator.credentials.get`, restricted to the one
/// registered credential handle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    /// base64url challenge
    pub challenge: String,
    pub timeout: u32,
    pub rp_id: String,
    pub allow_credentials: Vec<AllowCredential>,
    pub user_verification: &'static str,
}

// ─── Authenticator responses (browser → server) ─────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationPayload {
    /// base64 clientDataJSON bytes
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    /// base64 CBOR attestation object
    pub attestation_object: String,
}

/// Response of a registration ceremony.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String,
    pub response: AttestationPayload,
    #[serde(rename = "type")]
    pub credential_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionPayload {
    /// base64 clientDataJSON bytes
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    /// base64 authenticator data
    pub authenticator_data: String,
    /// base64 DER-encoded signature
    pub signature: String,
    #[serde(default)]
    pub user_handle: Option<String>,
}

/// Response of an authentication (approval) ceremony.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: String,
    pub response: AssertionPayload,
    #[serde(rename = "type")]
    pub credential_type: String,
}

/// The collected clientDataJSON fields checked during verification.
#[derive(Debug, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    /// base64url of the challenge bytes
    pub challenge: String,
    pub origin: String,
}
