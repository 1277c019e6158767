//! Request and response types for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::ceremony::types::{AuthenticationResponse, RegistrationResponse};

/// Envelope returned by both `options` endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyOptionsResponse<T: Serialize> {
    pub options: T,
    pub session_id: String,
}

/// Body of `POST /webauthn/register/verify`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVerifyRequest {
    pub session_id: String,
    pub credential: RegistrationResponse,
}

/// Body of `POST /webauthn/authenticate/verify`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateVerifyRequest {
    pub session_id: String,
    pub op_id: String,
    pub credential: AuthenticationResponse,
}

/// Outcome of a completed ceremony.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
}

/// Body of `GET /status/{op_id}`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
