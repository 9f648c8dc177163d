//! HTTP surface for the notebox notes API.
//!
//! `notebox_core` owns storage and note rules; this crate maps them onto
//! axum routes, the request interceptors and the server lifecycle.
pub mod config;
pub mod error;
pub mod interceptor;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::ApiError;
pub use server::{build_router, start_server, ServerError};
pub use state::AppState;
pub use store::NoteStore;
