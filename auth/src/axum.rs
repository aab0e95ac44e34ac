//! Axum routes and middleware for session based OIDC authentication
//!
//! Routes exposed by [`router`]:
//! - `/login`, `/{tenant_id}/{channel_type}/login` - start the OIDC login
//! - `/login/callback`, `/{tenant_id}/{channel_type}/login/callback` - complete it
//! - `/logout`, `/{tenant_id}/{channel_type}/logout` - destroy the session
//! - `/loggedout`, `/{tenant_id}/{channel_type}/loggedout` - confirmation page
//! - `/refresh` - refresh expired tokens
//! - `/user` - current user info

use crate::outcome::AuthOutcome;
use crate::service::{CallbackQuery, OidcService};
use crate::session::{Session, SessionStore};
use crate::types::{ChannelType, SessionUser, TenantId, TenantParams};
use axum::{
    Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};

/// State shared by the auth routes
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<OidcService>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Tenant segments of multitenant routes
///
/// Tenant ids outside `[A-Za-z0-9_-]+` fail extraction with 400.
#[derive(Debug, Deserialize)]
pub struct TenantPath {
    tenant_id: TenantId,
    channel_type: ChannelType,
}

impl From<TenantPath> for TenantParams {
    fn from(path: TenantPath) -> Self {
        TenantParams::new(path.tenant_id.into_inner(), path.channel_type)
    }
}

/// Build the auth router
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/{tenant_id}/{channel_type}/login", get(tenant_login))
        .route("/login/callback", get(login_callback))
        .route(
            "/{tenant_id}/{channel_type}/login/callback",
            get(tenant_login_callback),
        )
        .route("/logout", get(logout))
        .route("/{tenant_id}/{channel_type}/logout", get(tenant_logout))
        .route("/loggedout", get(logged_out))
        .route("/{tenant_id}/{channel_type}/loggedout", get(tenant_logged_out))
        .route("/refresh", get(refresh_tokens).post(refresh_tokens))
        .route("/user", get(user))
        .with_state(state)
}

/// Create a cookie with common settings
fn create_cookie<'a>(name: String, value: String, state: &AuthState) -> Cookie<'a> {
    let options = &state.service.options().session;
    let mut cookie = Cookie::build((name, value))
        .http_only(true)
        .secure(options.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(options.ttl_secs as i64));

    if let Some(domain) = &options.cookie_domain {
        cookie = cookie.domain(domain.clone());
    }

    cookie.build()
}

/// Create an expired cookie to clear it
fn clear_cookie<'a>(name: String, state: &AuthState) -> Cookie<'a> {
    let options = &state.service.options().session;
    let mut cookie = Cookie::build((name, ""))
        .http_only(true)
        .secure(options.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(0));

    if let Some(domain) = &options.cookie_domain {
        cookie = cookie.domain(domain.clone());
    }

    cookie.build()
}

async fn open_session(state: &AuthState, jar: &CookieJar) -> Result<Session, Response> {
    let cookie_name = &state.service.options().session.cookie_name;
    let id = jar.get(cookie_name).map(|cookie| cookie.value().to_string());
    Session::load(state.sessions.clone(), id.as_deref())
        .await
        .map_err(|e| {
            error!("failed to load session: {e:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

/// Persist the session and attach the matching cookie to the outcome
async fn close_session(
    state: &AuthState,
    jar: CookieJar,
    mut session: Session,
    outcome: AuthOutcome,
) -> Response {
    let cookie_name = state.service.options().session.cookie_name.clone();
    if session.is_destroyed() {
        return (jar.add(clear_cookie(cookie_name, state)), outcome).into_response();
    }
    match session.save().await {
        Ok(true) => {
            let cookie = create_cookie(cookie_name, session.id().to_string(), state);
            (jar.add(cookie), outcome).into_response()
        }
        Ok(false) => (jar, outcome).into_response(),
        Err(e) => {
            error!("failed to save session: {e:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn do_login(state: AuthState, jar: CookieJar, params: TenantParams) -> Response {
    let mut session = match open_session(&state, &jar).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let outcome = state.service.login(&mut session, &params).await;
    close_session(&state, jar, session, outcome).await
}

async fn do_login_callback(
    state: AuthState,
    jar: CookieJar,
    params: TenantParams,
    query: CallbackQuery,
) -> Response {
    let mut session = match open_session(&state, &jar).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let outcome = state
        .service
        .login_callback(&mut session, &params, query)
        .await;
    close_session(&state, jar, session, outcome).await
}

async fn do_logout(state: AuthState, jar: CookieJar, params: TenantParams) -> Response {
    let mut session = match open_session(&state, &jar).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let outcome = state.service.logout(&mut session, &params).await;
    close_session(&state, jar, session, outcome).await
}

/// GET /login - Start the OIDC login
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AuthState>, jar: CookieJar) -> Response {
    do_login(state, jar, TenantParams::default()).await
}

/// GET /{tenant_id}/{channel_type}/login - Start a tenant OIDC login
#[tracing::instrument(skip_all)]
pub async fn tenant_login(
    State(state): State<AuthState>,
    Path(path): Path<TenantPath>,
    jar: CookieJar,
) -> Response {
    do_login(state, jar, path.into()).await
}

/// GET /login/callback - Handle the OIDC callback
#[tracing::instrument(skip_all)]
pub async fn login_callback(
    State(state): State<AuthState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    do_login_callback(state, jar, TenantParams::default(), query).await
}

/// GET /{tenant_id}/{channel_type}/login/callback - Handle a tenant OIDC callback
#[tracing::instrument(skip_all)]
pub async fn tenant_login_callback(
    State(state): State<AuthState>,
    Path(path): Path<TenantPath>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    do_login_callback(state, jar, path.into(), query).await
}

/// GET /logout - Destroy the session
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AuthState>, jar: CookieJar) -> Response {
    do_logout(state, jar, TenantParams::default()).await
}

/// GET /{tenant_id}/{channel_type}/logout - Destroy a tenant session
#[tracing::instrument(skip_all)]
pub async fn tenant_logout(
    State(state): State<AuthState>,
    Path(path): Path<TenantPath>,
    jar: CookieJar,
) -> Response {
    do_logout(state, jar, path.into()).await
}

/// GET /loggedout - Logged-out page
pub async fn logged_out(State(state): State<AuthState>) -> Response {
    state
        .service
        .logged_out(&TenantParams::default())
        .into_response()
}

/// GET /{tenant_id}/{channel_type}/loggedout - Tenant logged-out page
pub async fn tenant_logged_out(
    State(state): State<AuthState>,
    Path(path): Path<TenantPath>,
) -> Response {
    state.service.logged_out(&path.into()).into_response()
}

/// GET|POST /refresh - Refresh expired tokens
#[tracing::instrument(skip_all)]
pub async fn refresh_tokens(State(state): State<AuthState>, jar: CookieJar) -> Response {
    let mut session = match open_session(&state, &jar).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let outcome = state.service.refresh_tokens(&mut session).await;
    close_session(&state, jar, session, outcome).await
}

/// GET /user - Current user info
pub async fn user(State(state): State<AuthState>, jar: CookieJar) -> Response {
    match open_session(&state, &jar).await {
        Ok(session) => state.service.user(&session).into_response(),
        Err(response) => response,
    }
}

/// Session authentication middleware
///
/// Rejects requests without an authenticated session and injects the
/// [`SessionUser`] into request extensions for downstream handlers.
#[tracing::instrument(skip_all)]
pub async fn require_session(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    let session = match open_session(&state, &jar).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let Some(user) = session.user().cloned() else {
        warn!("request without an authenticated session: {}", req.uri());
        return StatusCode::UNAUTHORIZED.into_response();
    };
    req.extensions_mut().insert::<SessionUser>(user);
    next.run(req).await
}
