//! Token refresh engine
//!
//! Decides whether the session's access token is expired and, if so,
//! re-issues a `refresh_token` grant against the token endpoint recorded at
//! login, using the client credentials of the user's channel.

use crate::config::OidcModuleOptions;
use crate::errors::OidcError;
use crate::types::SessionUser;
use chrono::Utc;
use http::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Lifetime given to a refreshed token when the token endpoint omits both
/// `expires_in` and `expires_at`
pub const DEFAULT_REFRESHED_LIFETIME_SECS: i64 = 60;

/// Current time in seconds since Unix epoch
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// True iff `expires_at` is known and the current time has reached it
pub fn is_expired(expires_at: Option<i64>) -> bool {
    is_expired_at(expires_at, now_secs())
}

/// `is_expired` against an explicit clock
pub fn is_expired_at(expires_at: Option<i64>, now: i64) -> bool {
    match expires_at {
        Some(expires_at) => now >= expires_at,
        None => false,
    }
}

/// What a successful refresh call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// The session user holds no tokens
    NoTokens,
    /// The access token has not expired yet
    StillValid,
    /// New tokens were stored on the session user
    Refreshed,
}

/// Token endpoint answer to a refresh grant
#[derive(Debug, Default, Deserialize)]
struct RefreshTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Refresh the user's tokens if they are expired
///
/// The user is only mutated after a 200 answer; every failure leaves the
/// stored tokens as they were.
pub async fn refresh_session_tokens(
    options: &OidcModuleOptions,
    http_client: &reqwest::Client,
    user: &mut SessionUser,
) -> Result<RefreshStatus, OidcError> {
    let Some(tokens) = user.auth_tokens.as_ref() else {
        return Ok(RefreshStatus::NoTokens);
    };
    if !is_expired(tokens.expires_at) {
        return Ok(RefreshStatus::StillValid);
    }

    let token_endpoint = tokens
        .token_endpoint
        .clone()
        .filter(|endpoint| !endpoint.is_empty())
        .ok_or(OidcError::RefreshEndpointMissing)?;
    let refresh_token = tokens
        .refresh_token
        .clone()
        .filter(|token| !token.is_empty())
        .ok_or(OidcError::RefreshTokenMissing)?;
    let credentials = options.client_credentials(user.userinfo.channel)?;

    let mut form = vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token),
        ("client_id", credentials.client_id),
    ];
    if let Some(client_secret) = credentials.client_secret {
        form.push(("client_secret", client_secret));
    }

    debug!("refreshing tokens at {token_endpoint}");
    let response = http_client
        .post(&token_endpoint)
        .timeout(options.http_timeout())
        .form(&form)
        .send()
        .await
        .map_err(|e| OidcError::RefreshTransport(format!("{e:?}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        warn!("token endpoint {token_endpoint} rejected refresh grant: {status}");
        return Err(OidcError::RefreshRejected { status });
    }

    let body: RefreshTokenResponse = response
        .json()
        .await
        .map_err(|e| OidcError::RefreshTransport(format!("Invalid token response: {e:?}")))?;

    let now = now_secs();
    let expires_at = match (body.expires_in, body.expires_at) {
        (Some(expires_in), _) => now + expires_in,
        (None, Some(expires_at)) => expires_at,
        (None, None) => now + DEFAULT_REFRESHED_LIFETIME_SECS,
    };

    let tokens = user.auth_tokens.get_or_insert_with(Default::default);
    if let Some(access_token) = body.access_token {
        tokens.access_token = Some(access_token);
    }
    if let Some(refresh_token) = body.refresh_token {
        tokens.refresh_token = Some(refresh_token);
    }
    tokens.expires_at = Some(expires_at);
    if let Some(id_token) = body.id_token {
        user.id_token = Some(id_token);
    }

    info!(
        "refreshed tokens for subject={} expires_at={expires_at}",
        user.userinfo.sub
    );
    Ok(RefreshStatus::Refreshed)
}
