//! Ceremony and status endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::ceremony::types::{AuthenticationOptions, RegistrationOptions};
use crate::error::ApprovalError;

use super::routes::AppState;
use super::types::{
    AuthenticateVerifyRequest, CeremonyOptionsResponse, RegisterVerifyRequest, StatusResponse,
    VerifyResponse,
};

/// Map a ceremony rejection to an HTTP status + message pair.
fn reject(e: ApprovalError) -> (StatusCode, String) {
    let status = match e {
        ApprovalError::OperationNotFound => StatusCode::NOT_FOUND,
        ApprovalError::OperationExpired(_) => StatusCode::GONE,
        ApprovalError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ApprovalError::InvalidSession
        | ApprovalError::NoCredential(_)
        | ApprovalError::VerificationFailed(_) => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

/// POST /webauthn/register/options
pub async fn register_options(
    State(state): State<Arc<AppState>>,
) -> Json<CeremonyOptionsResponse<RegistrationOptions>> {
    let (options, session_id) = state.coordinator.registration_challenge().await;
    Json(CeremonyOptionsResponse {
        options,
        session_id,
    })
}

/// POST /webauthn/register/verify
pub async fn register_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterVerifyRequest>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    state
        .coordinator
        .complete_registration(&req.session_id, &req.credential)
        .await
        .map_err(reject)?;

    Ok(Json(VerifyResponse {
        success: true,
        message: "Authenticator registered successfully!".to_string(),
    }))
}

/// POST /webauthn/authenticate/options
pub async fn authenticate_options(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CeremonyOptionsResponse<AuthenticationOptions>>, (StatusCode, String)> {
    let (options, session_id) = state
        .coordinator
        .authentication_challenge()
        .await
        .map_err(reject)?;

    Ok(Json(CeremonyOptionsResponse {
        options,
        session_id,
    }))
}

/// POST /webauthn/authenticate/verify
pub async fn authenticate_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthenticateVerifyRequest>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    let op = state
        .coordinator
        .complete_authentication(&req.session_id, &req.op_id, &req.credential)
        .await
        .map_err(reject)?;

    Ok(Json(VerifyResponse {
        success: true,
        message: format!(
            "Operation approved! Vault write to '{}' is now authorized.",
            op.service
        ),
    }))
}

/// GET /status/{op_id} — polled by the producer. Unknown and expired
/// operations both report `approved: false`, with the reason in `error`.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(op_id): Path<String>,
) -> Json<StatusResponse> {
    match state.pending.get(&op_id).await {
        Ok(op) => Json(StatusResponse {
            approved: op.approved,
            error: None,
        }),
        Err(e) => Json(StatusResponse {
            approved: false,
            error: Some(e.to_string()),
        }),
    }
}
