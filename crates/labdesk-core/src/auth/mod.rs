//! Authentication module for managing the client session and credentials.
//!
//! This module provides:
//! - `SessionStore`: bearer token plus a fixed 24 hour client-side expiry,
//!   cleared on expiry, on a 401 from the server, or on logout
//! - `CredentialStore`: login passwords kept in the OS keychain, per backend
//!
//! The store is injected wherever it is needed (usually as an
//! `Arc<SessionStore>`) rather than read from ambient global state.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{
    Clock, FileStorage, ManualClock, MemoryStorage, Session, SessionStorage, SessionStore,
    SystemClock, EXPIRATION_KEY, SESSION_FILE, TOKEN_KEY,
};
