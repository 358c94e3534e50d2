//! labdesk-core: session handling, the authenticated request pipeline and
//! typed access to the laboratory records backend.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiError, AuthError, AuthenticatedClient, LabClient, RequestOptions};
pub use auth::{CredentialStore, SessionStore};
pub use config::Config;
