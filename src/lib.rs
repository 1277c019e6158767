//! Vaultgate — a WebAuthn approval gate for vault secret writes.
//!
//! A producer (typically a vault CLI or MCP server) records a pending write
//! as an operation, hands the returned approval URL to a human, and polls
//! for approval. The human opens the URL in a browser and approves with a
//! platform authenticator (Touch ID, Windows Hello, a security key). Only
//! after a successful WebAuthn ceremony does the operation flip to approved.

pub mod api;
pub mod ceremony;
pub mod challenge;
pub mod config;
pub mod credentials;
pub mod error;
pub mod pending;
pub mod util;

pub use config::Config;
pub use credentials::{AuthenticatorCredential, CredentialStore};
pub use error::ApprovalError;
pub use pending::{ActionKind, PendingOperation, PendingOperationStore};
