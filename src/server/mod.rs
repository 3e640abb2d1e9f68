//! HTTP surface for the broker, built on Axum.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use xero_sync::server::{AppConfig, app_routes};
//!
//! let config = AppConfig::from_env()?;
//! let addr = config.bind_addr()?;
//! let app = app_routes(config.into_state()?);
//!
//! let listener = tokio::net::TcpListener::bind(addr).await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! [`AppState::new`] accepts any [`OAuthProvider`](crate::OAuthProvider) and
//! [`AccountingApi`](crate::AccountingApi), so the same router can run against
//! in-memory fakes.

mod config;
mod error;
mod routes;
mod state;

pub use config::{AppConfig, ServerSettings};
pub use error::ApiError;
pub use routes::app_routes;
pub use state::AppState;
