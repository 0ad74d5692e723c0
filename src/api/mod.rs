//! HTTP surface for the syllabus parser.
//!
//! Routes are nested under `/api/`. Every response passes through the
//! access log middleware and carries `Cache-Control: no-store`.
//!
//! The router is composable: `api_router()` returns a `Router` that can
//! be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_server, ApiServer, ServerError};
pub use types::AppState;
