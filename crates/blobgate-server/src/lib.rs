//! HTTP gateway for Blobgate.
//!
//! Exposes per-caller file storage over a small REST surface:
//!
//! | Route            | Purpose                                        |
//! |------------------|------------------------------------------------|
//! | `GET /health`    | liveness, unauthenticated                      |
//! | `POST /push`     | store one multipart file                       |
//! | `GET /pull`      | stream one file back                           |
//! | `GET /list`      | every key in the caller's namespace            |
//! | `POST /push-dir` | unpack an uploaded `.tar.gz` into objects      |
//! | `GET /pull-dir`  | stream a directory back as a `.tar.gz`         |
//!
//! Every authenticated route resolves the caller's [`Identity`] from the
//! `X-User-ID` header and confines all keys to that identity's namespace.
//! The transfer core is blocking; handlers run it on the blocking pool and
//! connect it to HTTP bodies through temp-file spools and in-memory pipes
//! (see [`stream`]).
//!
//! [`Identity`]: blobgate_types::Identity

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod response;
pub mod router;
pub mod server;
pub mod state;
pub mod stream;

pub use auth::{AuthProvider, Credentials, HeaderAuth, USER_ID_HEADER};
pub use config::{GatewayConfig, LimitsConfig, StorageBackend, StorageConfig};
pub use error::{ServerError, ServerResult};
pub use response::{ApiResponse, ListResponse};
pub use router::build_router;
pub use server::GatewayServer;
pub use state::AppState;
