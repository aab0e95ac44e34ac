//! Authorization code strategies
//!
//! A strategy binds a discovered issuer, the client credentials of a channel
//! and the callback URL into an executable authorization code flow:
//! - `authorize` builds the redirect to the issuer (state, nonce, PKCE)
//! - `exchange_code` completes the flow on callback and yields the session user

use crate::config::{AuthParams, ClientMetadata, OidcModuleOptions};
use crate::errors::OidcError;
use crate::issuer::{TrustIssuer, discover, tenant_issuer_url};
use crate::types::{AuthTokens, ChannelKey, SessionUser, UserInfo};
use chrono::Utc;
use openidconnect::core::{CoreClient, CoreResponseType};
use openidconnect::{
    AuthenticationFlow, AuthorizationCode, ClientId, ClientSecret, CsrfToken, Nonce,
    OAuth2TokenResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// OIDC client with endpoints set from provider metadata
pub type ConfiguredCoreClient = openidconnect::Client<
    openidconnect::EmptyAdditionalClaims,
    openidconnect::core::CoreAuthDisplay,
    openidconnect::core::CoreGenderClaim,
    openidconnect::core::CoreJweContentEncryptionAlgorithm,
    openidconnect::core::CoreJsonWebKey,
    openidconnect::core::CoreAuthPrompt,
    openidconnect::StandardErrorResponse<openidconnect::core::CoreErrorResponseType>,
    openidconnect::core::CoreTokenResponse,
    openidconnect::core::CoreTokenIntrospectionResponse,
    openidconnect::core::CoreRevocableToken,
    openidconnect::core::CoreRevocationErrorResponse,
    openidconnect::EndpointSet,
    openidconnect::EndpointNotSet,
    openidconnect::EndpointNotSet,
    openidconnect::EndpointNotSet,
    openidconnect::EndpointMaybeSet,
    openidconnect::EndpointMaybeSet,
>;

/// Authorization in progress, kept in the session until the callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub key: ChannelKey,
    /// CSRF token sent as the `state` parameter
    pub csrf_state: String,
    pub nonce: String,
    pub pkce_verifier: Option<String>,
}

/// Redirect to the issuer and the matching pending authorization
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub url: Url,
    pub pending: PendingAuthorization,
}

/// Executable authorization code flow for one issuer/client/channel
pub struct Strategy {
    key: ChannelKey,
    issuer: TrustIssuer,
    client: ConfiguredCoreClient,
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    auth_params: AuthParams,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("key", &self.key)
            .field("issuer", &self.issuer.issuer())
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("client_secret", &"(not printed)")
            .finish()
    }
}

/// Callback URL for a channel key
///
/// Multitenant keys prefix the path of `redirect_uri_login` with
/// `/{tenant_id}/{channel_type}`.
pub fn redirect_uri_for(redirect_uri_login: &str, key: &ChannelKey) -> Result<String, OidcError> {
    let mut url = Url::parse(redirect_uri_login)
        .map_err(|e| OidcError::Configuration(format!("Invalid redirect_uri_login: {e:?}")))?;
    let prefix = key.path_prefix();
    if !prefix.is_empty() {
        let path = format!("{prefix}{}", url.path());
        url.set_path(&path);
    }
    Ok(url.to_string())
}

/// Discover the issuer of `key` and wire a strategy for it
///
/// Only reads shared state: the caller decides whether to cache the result.
pub async fn build_strategy(
    options: &OidcModuleOptions,
    key: &ChannelKey,
    http_client: &reqwest::Client,
) -> Result<Strategy, OidcError> {
    let issuer_url = match (&options.issuer_origin, &options.issuer) {
        (Some(origin), _) => tenant_issuer_url(origin, key)
            .map_err(|e| OidcError::Configuration(e.to_string()))?,
        (None, Some(issuer)) => issuer.clone(),
        (None, None) => {
            return Err(OidcError::Configuration(
                "either issuer or issuer_origin must be set".to_string(),
            ));
        }
    };
    let credentials = options.client_credentials(key.channel())?;
    let redirect_uri = redirect_uri_for(&options.redirect_uri_login, key)?;

    debug!("discovering issuer {issuer_url} for {key}");
    let issuer = discover(&issuer_url, http_client)
        .await
        .map_err(|e| OidcError::Discovery {
            key: key.to_string(),
            message: format!("{e:?}"),
        })?;

    Strategy::new(
        key.clone(),
        issuer,
        credentials,
        redirect_uri,
        options.scope_list(),
        options.auth_params.clone(),
    )
}

impl Strategy {
    pub fn new(
        key: ChannelKey,
        issuer: TrustIssuer,
        credentials: ClientMetadata,
        redirect_uri: String,
        scopes: Vec<String>,
        auth_params: AuthParams,
    ) -> Result<Self, OidcError> {
        let redirect_url = RedirectUrl::new(redirect_uri.clone())
            .map_err(|e| OidcError::Configuration(format!("Invalid redirect URI: {e:?}")))?;
        let client = CoreClient::from_provider_metadata(
            (*issuer.metadata).clone(),
            ClientId::new(credentials.client_id.clone()),
            credentials.client_secret.clone().map(ClientSecret::new),
        )
        .set_redirect_uri(redirect_url);

        Ok(Self {
            key,
            issuer,
            client,
            client_id: credentials.client_id,
            redirect_uri,
            scopes,
            auth_params,
        })
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn issuer(&self) -> &TrustIssuer {
        &self.issuer
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the authorization request redirect
    pub fn authorize(&self) -> AuthorizationRedirect {
        let mut request = self.client.authorize_url(
            AuthenticationFlow::<CoreResponseType>::AuthorizationCode,
            CsrfToken::new_random,
            Nonce::new_random,
        );
        // openid is always requested by the client
        for scope in self.scopes.iter().filter(|scope| *scope != "openid") {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        if let Some(prompt) = &self.auth_params.prompt {
            request = request.add_extra_param("prompt", prompt.clone());
        }
        for (name, value) in &self.auth_params.extra {
            request = request.add_extra_param(name.clone(), value.clone());
        }

        let pkce_verifier = if self.auth_params.use_pkce {
            let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
            request = request.set_pkce_challenge(pkce_challenge);
            Some(pkce_verifier.secret().to_string())
        } else {
            None
        };

        let (url, csrf_token, nonce) = request.url();
        AuthorizationRedirect {
            url,
            pending: PendingAuthorization {
                key: self.key.clone(),
                csrf_state: csrf_token.secret().to_string(),
                nonce: nonce.secret().to_string(),
                pkce_verifier,
            },
        }
    }

    /// Exchange the authorization code and build the session user
    pub async fn exchange_code(
        &self,
        http_client: &reqwest::Client,
        pending: &PendingAuthorization,
        code: String,
    ) -> Result<SessionUser, OidcError> {
        let mut exchange = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .map_err(|e| OidcError::TokenExchange(format!("{e:?}")))?;
        if let Some(verifier) = &pending.pkce_verifier {
            exchange = exchange.set_pkce_verifier(PkceCodeVerifier::new(verifier.clone()));
        }
        let token_response = exchange.request_async(http_client).await.map_err(|e| {
            warn!("token exchange failed for {}: {e:?}", self.key);
            OidcError::TokenExchange(format!("{e:?}"))
        })?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| OidcError::TokenExchange("token response has no id_token".into()))?;
        let verifier = self.client.id_token_verifier();
        let expected_nonce = Nonce::new(pending.nonce.clone());
        let claims = if self.auth_params.nonce_enabled() {
            id_token.claims(&verifier, &expected_nonce)
        } else {
            id_token.claims(&verifier, |_: Option<&Nonce>| Ok::<(), String>(()))
        }
        .map_err(|e| OidcError::TokenExchange(format!("Invalid id_token: {e:?}")))?;

        let userinfo = UserInfo {
            sub: claims.subject().as_str().to_string(),
            email: claims.email().map(|email| email.as_str().to_string()),
            name: claims
                .name()
                .and_then(|name| name.get(None))
                .map(|name| name.as_str().to_string()),
            preferred_username: claims
                .preferred_username()
                .map(|username| username.as_str().to_string()),
            channel: self.key.channel(),
        };

        let expires_at = token_response
            .expires_in()
            .map(|expires_in| Utc::now().timestamp() + expires_in.as_secs() as i64);

        Ok(SessionUser {
            userinfo,
            id_token: Some(id_token.to_string()),
            auth_tokens: Some(AuthTokens {
                access_token: Some(token_response.access_token().secret().to_string()),
                refresh_token: token_response
                    .refresh_token()
                    .map(|token| token.secret().to_string()),
                token_endpoint: self.issuer.token_endpoint().map(str::to_string),
                expires_at,
            }),
        })
    }
}
