//! OIDC service: strategy resolution and request dispatching
//!
//! Owns the module options, the outbound HTTP client and the strategy cache.
//! Every dispatcher operation returns an [`AuthOutcome`]; no error reaches the
//! framework's generic error handling.

use crate::cache::StrategyCache;
use crate::config::OidcModuleOptions;
use crate::errors::{FatalError, OidcError};
use crate::outcome::AuthOutcome;
use crate::refresh::{RefreshStatus, refresh_session_tokens};
use crate::session::Session;
use crate::strategy::{Strategy, build_strategy};
use crate::types::{ChannelKey, TenantParams};
use anyhow::{Result, anyhow};
use askama::Template;
use http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Logged-out confirmation page, path segments are HTML escaped
#[derive(Template)]
#[template(path = "loggedout.html")]
struct LoggedOutPage {
    segments: Vec<String>,
}

/// Query parameters of the login callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Create HTTP client for discovery and token endpoint calls
fn create_http_client(options: &OidcModuleOptions) -> Result<reqwest::Client> {
    // no redirects: discovery and token responses must come from the configured hosts
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(options.http_timeout())
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {e:?}"))
}

/// Append `id_token_hint` to the end session endpoint
fn end_session_url(endpoint: &str, id_token: &str) -> String {
    match Url::parse(endpoint) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("id_token_hint", id_token);
            url.to_string()
        }
        Err(_) => format!("{endpoint}?id_token_hint={id_token}"),
    }
}

/// OIDC authentication service
pub struct OidcService {
    options: Arc<OidcModuleOptions>,
    http_client: reqwest::Client,
    strategies: StrategyCache,
}

impl std::fmt::Debug for OidcService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcService")
            .field("multitenant", &self.options.is_multitenant())
            .finish()
    }
}

impl OidcService {
    /// Create the service without discovering anything
    pub fn new(options: OidcModuleOptions) -> Result<Self> {
        options.validate()?;
        let http_client = create_http_client(&options)?;
        Ok(Self {
            options: Arc::new(options),
            http_client,
            strategies: StrategyCache::new(),
        })
    }

    /// Create the service and, in single-tenant mode, build its only strategy
    ///
    /// A single-tenant discovery failure is fatal: the caller is expected to
    /// stop the process. Multitenant issuers are discovered lazily.
    pub async fn init(options: OidcModuleOptions) -> Result<Self, FatalError> {
        let service = Self::new(options).map_err(FatalError::Initialization)?;
        if service.options.is_multitenant() {
            info!("multitenant mode: issuers will be discovered on first use");
        } else {
            let strategy = service
                .resolve_strategy(&ChannelKey::Single)
                .await
                .map_err(FatalError::Discovery)?;
            info!(
                "single-tenant issuer ready: issuer={} client_id={}",
                strategy.issuer().issuer(),
                strategy.client_id()
            );
        }
        Ok(service)
    }

    pub fn options(&self) -> &OidcModuleOptions {
        &self.options
    }

    /// Channel key for a request: single-tenant mode ignores path params
    pub fn channel_key(&self, params: &TenantParams) -> ChannelKey {
        if self.options.is_multitenant() {
            params.tenant_key().unwrap_or(ChannelKey::Single)
        } else {
            ChannelKey::Single
        }
    }

    pub async fn cached_strategy(&self, key: &ChannelKey) -> Option<Arc<Strategy>> {
        self.strategies.get(key).await
    }

    /// Return the cached strategy for `key`, building it on first use
    pub async fn resolve_strategy(&self, key: &ChannelKey) -> Result<Arc<Strategy>, OidcError> {
        let options = self.options.clone();
        let http_client = self.http_client.clone();
        let build_key = key.clone();
        self.strategies
            .get_or_try_build(key.clone(), async move {
                let strategy = build_strategy(&options, &build_key, &http_client).await?;
                info!(
                    "strategy built for {build_key}: redirect_uri={}",
                    strategy.redirect_uri()
                );
                Ok(Arc::new(strategy))
            })
            .await
    }

    /// Drop the cached strategy of one key, the next request rebuilds it
    pub async fn invalidate(&self, key: &ChannelKey) {
        self.strategies.invalidate(key).await;
    }

    /// Start the authorization code flow
    pub async fn login(&self, session: &mut Session, params: &TenantParams) -> AuthOutcome {
        let key = self.channel_key(params);
        let strategy = match self.resolve_strategy(&key).await {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!("login unavailable for {key}: {e}");
                return AuthOutcome::Status(StatusCode::NOT_FOUND);
            }
        };

        let redirect = strategy.authorize();
        session.set_pending(redirect.pending);
        debug!("redirecting to authorization endpoint for {key}");
        AuthOutcome::Redirect(redirect.url.to_string())
    }

    /// Complete the authorization code flow and store the user in the session
    pub async fn login_callback(
        &self,
        session: &mut Session,
        params: &TenantParams,
        query: CallbackQuery,
    ) -> AuthOutcome {
        let Some(pending) = session.take_pending() else {
            warn!("login callback without pending authorization");
            return AuthOutcome::Status(StatusCode::BAD_REQUEST);
        };
        let key = self.channel_key(params);
        if pending.key != key || query.state.as_deref() != Some(pending.csrf_state.as_str()) {
            warn!("login callback for {key}: {}", OidcError::InvalidState);
            return AuthOutcome::Status(StatusCode::BAD_REQUEST);
        }
        if let Some(error) = query.error {
            warn!(
                "issuer returned an error for {key}: {error} {}",
                query.error_description.unwrap_or_default()
            );
            return AuthOutcome::Status(StatusCode::UNAUTHORIZED);
        }
        let Some(code) = query.code else {
            return AuthOutcome::Status(StatusCode::BAD_REQUEST);
        };

        let strategy = match self.resolve_strategy(&key).await {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!("login callback unavailable for {key}: {e}");
                return AuthOutcome::Status(StatusCode::NOT_FOUND);
            }
        };

        match strategy
            .exchange_code(&self.http_client, &pending, code)
            .await
        {
            Ok(user) => {
                info!(
                    "authenticated: subject={} email={:?} channel={key}",
                    user.userinfo.sub, user.userinfo.email
                );
                // new id once authenticated, the pre-login cookie must not carry the user
                if let Err(e) = session.regenerate().await {
                    error!("failed to regenerate session: {e:?}");
                    return AuthOutcome::Status(StatusCode::INTERNAL_SERVER_ERROR);
                }
                session.set_user(user);
                AuthOutcome::Redirect(format!("{}/", key.path_prefix()))
            }
            Err(e) => {
                warn!("login callback failed for {key}: {e}");
                AuthOutcome::Status(StatusCode::UNAUTHORIZED)
            }
        }
    }

    /// Destroy the session and send the browser to the right logout target
    pub async fn logout(&self, session: &mut Session, params: &TenantParams) -> AuthOutcome {
        if !session.is_authenticated() {
            return AuthOutcome::Status(StatusCode::NOT_FOUND);
        }
        let id_token = session.user().and_then(|user| user.id_token.clone());

        session.logout();
        if let Err(e) = session.destroy().await {
            error!("failed to destroy session: {e:?}");
            return AuthOutcome::Status(StatusCode::INTERNAL_SERVER_ERROR);
        }

        if let Some(redirect_uri_logout) = &self.options.redirect_uri_logout {
            return AuthOutcome::Redirect(redirect_uri_logout.clone());
        }

        let key = self.channel_key(params);
        let end_session_endpoint = match self.resolve_strategy(&key).await {
            Ok(strategy) => strategy.issuer().end_session_endpoint().map(str::to_string),
            Err(e) => {
                warn!("no issuer for logout of {key}: {e}");
                None
            }
        };

        match (end_session_endpoint, id_token) {
            (Some(endpoint), Some(id_token)) => {
                AuthOutcome::Redirect(end_session_url(&endpoint, &id_token))
            }
            (Some(endpoint), None) => AuthOutcome::Redirect(endpoint),
            (None, _) => AuthOutcome::Redirect(format!("{}/loggedout", params.path_prefix())),
        }
    }

    /// Logged-out confirmation page
    pub fn logged_out(&self, params: &TenantParams) -> AuthOutcome {
        let page = LoggedOutPage {
            segments: params
                .tenant_key()
                .map(|key| key.path_segments())
                .unwrap_or_default(),
        };
        match page.render() {
            Ok(html) => AuthOutcome::Page(html),
            Err(e) => {
                error!("failed to render logged-out page: {e:?}");
                AuthOutcome::Status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Refresh the session's access token when it has expired
    pub async fn refresh_tokens(&self, session: &mut Session) -> AuthOutcome {
        let Some(user) = session.user_mut() else {
            return AuthOutcome::Status(StatusCode::OK);
        };
        match refresh_session_tokens(&self.options, &self.http_client, user).await {
            Ok(RefreshStatus::Refreshed) => AuthOutcome::Status(StatusCode::OK),
            Ok(status) => {
                debug!("no refresh needed: {status:?}");
                AuthOutcome::Status(StatusCode::OK)
            }
            Err(OidcError::RefreshRejected { status }) => AuthOutcome::Status(status),
            Err(e) => {
                warn!("token refresh failed: {e}");
                AuthOutcome::Status(StatusCode::UNAUTHORIZED)
            }
        }
    }

    /// Identity of the session user
    pub fn user(&self, session: &Session) -> AuthOutcome {
        match session.user() {
            Some(user) => AuthOutcome::User(user.userinfo.clone()),
            None => AuthOutcome::Status(StatusCode::UNAUTHORIZED),
        }
    }
}
