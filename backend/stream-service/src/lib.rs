//! Stream lifecycle service
//!
//! Keeps locally stored live streams consistent with a remote media provider
//! (Livepeer or a Janus gateway), fans streams out to third-party platforms,
//! and applies signed provider callbacks.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod security;
pub mod services;

pub use error::{AppError, Result};
pub use handlers::{configure, AppState};
