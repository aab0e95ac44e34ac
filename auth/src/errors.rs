use http::StatusCode;

/// Errors raised while resolving strategies and handling auth requests
///
/// None of these escape to the framework: the dispatcher turns each of them
/// into an HTTP outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OidcError {
    /// Issuer discovery failed for one tenant/channel
    #[error("issuer discovery failed for {key}: {message}")]
    Discovery { key: String, message: String },

    /// Tenant id that is not a plain path segment, never echoed back
    #[error("tenant id must only contain ASCII letters, digits, '-' or '_'")]
    InvalidTenant,

    #[error("no client configured for channel {0}")]
    ClientNotConfigured(String),

    #[error("invalid oidc configuration: {0}")]
    Configuration(String),

    /// Expired token without a known token endpoint
    #[error("cannot refresh tokens without a token endpoint")]
    RefreshEndpointMissing,

    #[error("cannot refresh tokens without a refresh token")]
    RefreshTokenMissing,

    /// Token endpoint answered the refresh grant with a non-200 status
    #[error("token endpoint rejected the refresh grant with status {status}")]
    RefreshRejected { status: StatusCode },

    #[error("refresh grant request failed: {0}")]
    RefreshTransport(String),

    /// Callback state does not match the pending authorization
    #[error("invalid authorization state")]
    InvalidState,

    #[error("token exchange failed: {0}")]
    TokenExchange(String),
}

/// Startup failure the hosting process cannot recover from
///
/// Returned by `OidcService::init` when the single-tenant issuer cannot be
/// discovered: a server without an authentication backend must not accept
/// traffic.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("single-tenant issuer discovery failed: {0}")]
    Discovery(#[source] OidcError),

    #[error("oidc service initialization failed: {0}")]
    Initialization(#[source] anyhow::Error),
}
