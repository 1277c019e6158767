//! HTTP API for the approval server.
//!
//! ## Endpoints
//!
//! - `GET /` - Server status page
//! - `GET /register` - Authenticator registration page
//! - `GET /approve/{op_id}` - Approval page for a pending operation
//! - `POST /webauthn/register/options` - Start a registration ceremony
//! - `POST /webauthn/register/verify` - Complete a registration ceremony
//! - `POST /webauthn/authenticate/options` - Start an approval ceremony
//! - `POST /webauthn/authenticate/verify` - Complete an approval ceremony
//! - `GET /status/{op_id}` - Approval status, polled by the producer

mod pages;
mod routes;
mod types;
mod webauthn;

pub use routes::{serve, AppState};
pub use types::*;
