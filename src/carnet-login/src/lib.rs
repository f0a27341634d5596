//! Carnet Login - session management for the vehicle connectivity backends.
//!
//! Provides:
//! - The scripted identity provider login flow (PKCE, page scraping, code exchange)
//! - The token ledger with primary and OAuth scope tokens
//! - A persisted credential store (cookie jar and access record)
//! - The transport seam every backend call goes through
//!
//! Security features:
//! - Secrets held in `secrecy` wrappers and masked in logs
//! - File permissions enforcement (0600)

// Core modules
pub mod constants;
pub mod error;
pub mod types;
mod utils;

// Protocol plumbing
pub mod clock;
pub mod cookies;
pub mod html;
pub mod pkce;
pub mod transport;

// Session state
pub mod ledger;
pub mod store;

// High-level APIs
pub mod login;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use cookies::CookieBlob;
pub use error::{Error, Result};
pub use ledger::{LedgerStatus, TokenEntry, TokenLedger, TokenScope};
pub use session::Session;
pub use store::{AccessRecord, CredentialStore};
pub use transport::{Body, HttpRequest, HttpResponse, HttpTransport, Method, Transport};
pub use types::{Credentials, IdentityContext, SecurityPin};
pub use utils::mask_secret;
