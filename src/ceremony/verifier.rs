//! Authenticator-ceremony verification.
//!
//! [`CeremonyVerifier`] is the seam between the approval protocol and the
//! raw cryptographic checks: the coordinator hands it the authenticator's
//! response plus what this ceremony was bound to (challenge, relying-party
//! id, origin) and gets back either the extracted credential material or a
//! `VerificationFailed` rejection. Nothing behind this trait is retried.
//!
//! [`FidoVerifier`] is the production implementation for ES256 / P-256
//! credentials: clientDataJSON checks, authenticator-data parsing (rpIdHash,
//! UP/UV flags, sign count), COSE EC2 key extraction, and DER ECDSA
//! signature verification over `authenticatorData || SHA-256(clientDataJSON)`.

use ciborium::value::Value;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};

use super::types::{
    decode_base64, AuthenticationResponse, CollectedClientData, RegistrationResponse,
};
use crate::credentials::AuthenticatorCredential;
use crate::error::ApprovalError;

/// Authenticator-data flag bits.
const FLAG_UP: u8 = 0x01;
const FLAG_UV: u8 = 0x04;
const FLAG_AT: u8 = 0x40;

/// What the current ceremony is cryptographically bound to.
#[derive(Debug, Clone)]
pub struct CeremonyExpectations {
    pub challenge: Vec<u8>,
    pub rp_id: String,
    pub origin: String,
}

/// Credential material extracted from a verified registration.
#[derive(Debug, Clone)]
pub struct RegisteredCredential {
    pub credential_id: Vec<u8>,
    /// COSE-encoded public key, stored opaquely
    pub public_key: Vec<u8>,
    pub sign_count: u32,
}

/// Verifies attestation and assertion responses for the coordinator.
pub trait CeremonyVerifier: Send + Sync {
    /// Verify a registration (attestation) response against the ceremony
    /// bindings, returning the credential to store.
    fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &CeremonyExpectations,
    ) -> Result<RegisteredCredential, ApprovalError>;

    /// Verify an authentication (assertion) response against the ceremony
    /// bindings and the stored credential, returning the authenticator's
    /// reported sign count.
    fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &CeremonyExpectations,
        credential: &AuthenticatorCredential,
    ) -> Result<u32, ApprovalError>;
}

fn fail(msg: impl Into<String>) -> ApprovalError {
    ApprovalError::VerificationFailed(msg.into())
}

/// ES256-only verifier for platform authenticators and security keys.
#[derive(Debug, Default)]
pub struct FidoVerifier;

impl FidoVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl CeremonyVerifier for FidoVerifier {
    fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &CeremonyExpectations,
    ) -> Result<RegisteredCredential, ApprovalError> {
        if response.credential_type != "public-key" {
            return Err(fail("credential type is not public-key"));
        }

        let client_data = decode_base64(&response.response.client_data_json)?;
        check_client_data(&client_data, "webauthn.create", expected)?;

        let attestation = decode_base64(&response.response.attestation_object)?;
        let (fmt, att_stmt, auth_data) = parse_attestation_object(&attestation)?;

        let (flags, sign_count) = check_auth_data_header(&auth_data, &expected.rp_id)?;
        if flags & FLAG_AT == 0 {
            return Err(fail("no attested credential data"));
        }

        let (credential_id, public_key) = parse_attested_credential(&auth_data)?;

        // The COSE key must be a usable ES256 key even though we store it
        // opaquely.
        let verifying_key = cose_p256_key(&public_key)?;

        match fmt.as_str() {
            // Browsers strip attestation when the options request "none".
            "none" => {}
            // Packed self-attestation: signed with the freshly minted
            // credential key itself. Certificate chains (x5c) are not
            // supported.
            "packed" => {
                verify_packed_self_attestation(
                    &att_stmt,
                    &auth_data,
                    &client_data,
                    &verifying_key,
                )?;
            }
            other => {
                return Err(fail(format!("unsupported attestation format '{}'", other)));
            }
        }

        Ok(RegisteredCredential {
            credential_id,
            public_key,
            sign_count,
        })
    }

    fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &CeremonyExpectations,
        credential: &AuthenticatorCredential,
    ) -> Result<u32, ApprovalError> {
        if response.credential_type != "public-key" {
            return Err(fail("credential type is not public-key"));
        }

        let raw_id = decode_base64(&response.raw_id)?;
        if raw_id != credential.credential_id {
            return Err(fail("assertion is for an unknown credential"));
        }

        let client_data = decode_base64(&response.response.client_data_json)?;
        check_client_data(&client_data, "webauthn.get", expected)?;

        let auth_data = decode_base64(&response.response.authenticator_data)?;
        let (_, sign_count) = check_auth_data_header(&auth_data, &expected.rp_id)?;

        let verifying_key = cose_p256_key(&credential.public_key)?;
        let signature_der = decode_base64(&response.response.signature)?;
        let signature =
            Signature::from_der(&signature_der).map_err(|e| fail(format!("bad signature encoding: {}", e)))?;

        // Signed message: authenticatorData || SHA-256(clientDataJSON).
        let client_hash = Sha256::digest(&client_data);
        let mut message = Vec::with_capacity(auth_data.len() + client_hash.len());
        message.extend_from_slice(&auth_data);
        message.extend_from_slice(&client_hash);

        verifying_key
            .verify(&message, &signature)
            .map_err(|_| fail("assertion signature does not verify"))?;

        Ok(sign_count)
    }
}

/// Parse and check clientDataJSON: ceremony type, challenge binding, and
/// strict origin equality.
fn check_client_data(
    client_data: &[u8],
    expected_type: &str,
    expected: &CeremonyExpectations,
) -> Result<(), ApprovalError> {
    let collected: CollectedClientData = serde_json::from_slice(client_data)
        .map_err(|e| fail(format!("bad clientDataJSON: {}", e)))?;

    if collected.ceremony_type != expected_type {
        return Err(fail(format!(
            "ceremony type mismatch: got '{}', expected '{}'",
            collected.ceremony_type, expected_type
        )));
    }

    let challenge = decode_base64(&collected.challenge)?;
    if challenge != expected.challenge {
        return Err(fail("challenge mismatch"));
    }

    if collected.origin != expected.origin {
        return Err(fail(format!(
            "origin mismatch: got '{}', expected '{}'",
            collected.origin, expected.origin
        )));
    }

    Ok(())
}

/// Validate the 37-byte authenticator-data header: rpIdHash must match the
/// relying party, user presence and user verification are both required.
/// Returns `(flags, sign_count)`.
fn check_auth_data_header(auth_data: &[u8], rp_id: &str) -> Result<(u8, u32), ApprovalError> {
    if auth_data.len() < 37 {
        return Err(fail("authenticator data too short"));
    }

    let rp_id_hash = Sha256::digest(rp_id.as_bytes());
    if rp_id_hash.as_slice() != &auth_data[..32] {
        return Err(fail("relying-party id mismatch"));
    }

    let flags = auth_data[32];
    if flags & FLAG_UP == 0 {
        return Err(fail("user presence not asserted"));
    }
    if flags & FLAG_UV == 0 {
        return Err(fail("user verification required but not performed"));
    }

    let sign_count = u32::from_be_bytes([auth_data[33], auth_data[34], auth_data[35], auth_data[36]]);
    Ok((flags, sign_count))
}

/// Split an attestation object into `(fmt, attStmt, authData)`.
fn parse_attestation_object(
    bytes: &[u8],
) -> Result<(String, Vec<(Value, Value)>, Vec<u8>), ApprovalError> {
    let value: Value = ciborium::from_reader(bytes)
        .map_err(|e| fail(format!("bad attestation object: {}", e)))?;
    let Value::Map(map) = value else {
        return Err(fail("attestation object is not a CBOR map"));
    };

    let mut fmt = None;
    let mut att_stmt = None;
    let mut auth_data = None;
    for (key, val) in map {
        let Value::Text(key) = key else { continue };
        match (key.as_str(), val) {
            ("fmt", Value::Text(s)) => fmt = Some(s),
            ("attStmt", Value::Map(m)) => att_stmt = Some(m),
            ("authData", Value::Bytes(b)) => auth_data = Some(b),
            _ => {}
        }
    }

    match (fmt, att_stmt, auth_data) {
        (Some(fmt), Some(att_stmt), Some(auth_data)) => Ok((fmt, att_stmt, auth_data)),
        _ => Err(fail("attestation object missing fmt/attStmt/authData")),
    }
}

/// Extract `(credential_id, cose_key_bytes)` from attested credential data
/// (everything after the 37-byte header: AAGUID, length-prefixed id, key).
fn parse_attested_credential(auth_data: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ApprovalError> {
    let attested = &auth_data[37..];
    if attested.len() < 18 {
        return Err(fail("attested credential data too short"));
    }

    let cred_id_len = u16::from_be_bytes([attested[16], attested[17]]) as usize;
    if attested.len() < 18 + cred_id_len {
        return Err(fail("credential id length out of range"));
    }

    let credential_id = attested[18..18 + cred_id_len].to_vec();
    let public_key = attested[18 + cred_id_len..].to_vec();
    if public_key.is_empty() {
        return Err(fail("missing credential public key"));
    }

    Ok((credential_id, public_key))
}

/// Look up an integer-keyed entry in a COSE map.
fn cose_get(map: &[(Value, Value)], key: i64) -> Option<&Value> {
    map.iter().find_map(|(k, v)| {
        if let Value::Integer(i) = k {
            if i128::from(*i) == i128::from(key) {
                return Some(v);
            }
        }
        None
    })
}

/// Decode a COSE EC2 / P-256 / ES256 key (kty=2, alg=-7, crv=1) into a
/// verifying key. Anything else is rejected.
fn cose_p256_key(cose_bytes: &[u8]) -> Result<VerifyingKey, ApprovalError> {
    let value: Value =
        ciborium::from_reader(cose_bytes).map_err(|e| fail(format!("bad COSE key: {}", e)))?;
    let Value::Map(map) = value else {
        return Err(fail("COSE key is not a CBOR map"));
    };

    let kty = cose_get(&map, 1);
    if !matches!(kty, Some(Value::Integer(i)) if i128::from(*i) == 2) {
        return Err(fail("unsupported COSE key type (want EC2)"));
    }
    let alg = cose_get(&map, 3);
    if !matches!(alg, Some(Value::Integer(i)) if i128::from(*i) == -7) {
        return Err(fail("unsupported COSE algorithm (want ES256)"));
    }
    let crv = cose_get(&map, -1);
    if !matches!(crv, Some(Value::Integer(i)) if i128::from(*i) == 1) {
        return Err(fail("unsupported COSE curve (want P-256)"));
    }

    let (Some(Value::Bytes(x)), Some(Value::Bytes(y))) =
        (cose_get(&map, -2), cose_get(&map, -3))
    else {
        return Err(fail("COSE key missing coordinates"));
    };
    if x.len() != 32 || y.len() != 32 {
        return Err(fail("COSE key coordinates must be 32 bytes"));
    }

    // Uncompressed SEC1 point: 0x04 || x || y.
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(x);
    sec1.extend_from_slice(y);

    VerifyingKey::from_sec1_bytes(&sec1).map_err(|e| fail(format!("invalid P-256 key: {}", e)))
}

/// Verify packed self-attestation: alg must be ES256 and the signature over
/// `authData || SHA-256(clientDataJSON)` must verify with the credential key.
fn verify_packed_self_attestation(
    att_stmt: &[(Value, Value)],
    auth_data: &[u8],
    client_data: &[u8],
    verifying_key: &VerifyingKey,
) -> Result<(), ApprovalError> {
    let get = |name: &str| {
        att_stmt.iter().find_map(|(k, v)| match k {
            Value::Text(t) if t == name => Some(v),
            _ => None,
        })
    };

    if get("x5c").is_some() {
        return Err(fail("packed attestation with certificate chain is not supported"));
    }

    let alg_ok = matches!(get("alg"), Some(Value::Integer(i)) if i128::from(*i) == -7);
    if !alg_ok {
        return Err(fail("unsupported attestation algorithm (want ES256)"));
    }

    let Some(Value::Bytes(sig)) = get("sig") else {
        return Err(fail("packed attestation missing signature"));
    };
    let signature =
        Signature::from_der(sig).map_err(|e| fail(format!("bad attestation signature: {}", e)))?;

    let client_hash = Sha256::digest(client_data);
    let mut message = Vec::with_capacity(auth_data.len() + client_hash.len());
    message.extend_from_slice(auth_data);
    message.extend_from_slice(&client_hash);

    verifying_key
        .verify(&message, &signature)
        .map_err(|_| fail("attestation signature does not verify"))
}
