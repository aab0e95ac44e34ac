//! Multitenant OpenID Connect authentication for axum services
//!
//! This crate drives the authorization code flow against one or many OIDC
//! issuers and keeps the resulting user in a server-side session:
//!
//! - **Single-tenant**: one statically configured issuer, discovered at startup
//! - **Multitenant**: one issuer per `{tenant_id}/{channel_type}`, discovered on
//!   first use and cached for the lifetime of the process
//!
//! # Example
//!
//! ```rust,no_run
//! use oidcgate_auth::axum::{AuthState, router};
//! use oidcgate_auth::config::OidcModuleOptions;
//! use oidcgate_auth::service::OidcService;
//! use oidcgate_auth::session::MemorySessionStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let options = OidcModuleOptions::from_env()?;
//! let ttl = Duration::from_secs(options.session.ttl_secs);
//! let state = AuthState {
//!     service: Arc::new(OidcService::init(options).await?),
//!     sessions: Arc::new(MemorySessionStore::new(ttl)),
//! };
//! let app = router(state);
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

/// Tenant, channel and session user types
pub mod types;

/// Module configuration
pub mod config;

pub mod errors;

/// Issuer discovery
pub mod issuer;

/// Authorization code flow per issuer and client
pub mod strategy;

pub mod cache;

/// Access token expiry and refresh grant
pub mod refresh;

/// Server-side sessions
pub mod session;

/// Strategy resolution and request dispatching
pub mod service;

pub mod outcome;

/// Axum routes and session middleware
pub mod axum;
