//! REST API client module for the laboratory backend.
//!
//! This module provides:
//! - `AuthenticatedClient`: the request pipeline that attaches the bearer
//!   token and turns a 401 into session teardown
//! - `LabClient`: typed wrappers for patients, bilans, results, listings
//!   and reference data
//! - `Transport`: the HTTP seam, implemented with reqwest in production
//!
//! The API uses bearer token authentication obtained through `login.php`.

pub mod client;
pub mod error;
pub mod pipeline;
pub mod transport;

pub use client::LabClient;
pub use error::{ApiError, AuthError, TransportError};
pub use pipeline::{AuthenticatedClient, RequestOptions};
pub use transport::{ApiResponse, HttpRequest, ReqwestTransport, Transport};
