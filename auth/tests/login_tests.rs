mod test_utils;

use http::StatusCode;
use oidcgate_auth::config::NonceSetting;
use oidcgate_auth::outcome::AuthOutcome;
use oidcgate_auth::service::{CallbackQuery, OidcService};
use oidcgate_auth::session::{MemorySessionStore, Session, SessionStore};
use oidcgate_auth::strategy::PendingAuthorization;
use oidcgate_auth::types::{ChannelType, TenantParams};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use test_utils::*;
use url::Url;

fn store() -> Arc<dyn SessionStore> {
    Arc::new(MemorySessionStore::new(Duration::from_secs(60)))
}

fn query_params(location: &str) -> HashMap<String, String> {
    Url::parse(location)
        .expect("absolute redirect")
        .query_pairs()
        .into_owned()
        .collect()
}

fn pending(session: &Session) -> PendingAuthorization {
    session
        .data()
        .pending
        .clone()
        .expect("pending authorization stored")
}

fn callback(code: &str, state: &str) -> CallbackQuery {
    CallbackQuery {
        code: Some(code.to_string()),
        state: Some(state.to_string()),
        ..Default::default()
    }
}

async fn single_tenant_service(idp: &MockIdp) -> OidcService {
    idp.mount_issuer(SINGLE_ISSUER_PATH, true).await;
    OidcService::init(single_tenant_options(idp))
        .await
        .expect("init")
}

#[tokio::test]
async fn test_login_redirects_to_authorization_endpoint() {
    let idp = MockIdp::start().await;
    let service = single_tenant_service(&idp).await;
    let mut session = Session::fresh(store());

    let outcome = service.login(&mut session, &TenantParams::default()).await;
    assert_eq!(outcome.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = outcome.location().expect("redirect");
    assert!(location.starts_with(&format!("{}/authorize?", idp.issuer(SINGLE_ISSUER_PATH))));

    let params = query_params(location);
    let pending = pending(&session);
    assert_eq!(params.get("client_id").map(String::as_str), Some(DEFAULT_CLIENT_ID));
    assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
    assert_eq!(params.get("redirect_uri").map(String::as_str), Some(REDIRECT_URI_LOGIN));
    assert_eq!(params.get("state"), Some(&pending.csrf_state));
    assert_eq!(params.get("nonce"), Some(&pending.nonce));
    assert!(params.contains_key("code_challenge"));
    assert!(pending.pkce_verifier.is_some());

    let scopes = params.get("scope").expect("scope");
    assert!(scopes.split(' ').any(|scope| scope == "openid"));
    assert!(scopes.split(' ').any(|scope| scope == "email"));
}

#[tokio::test]
async fn test_login_adds_prompt_and_extra_params() {
    let idp = MockIdp::start().await;
    idp.mount_issuer(SINGLE_ISSUER_PATH, false).await;
    let mut options = single_tenant_options(&idp);
    options.auth_params.prompt = Some("login".to_string());
    options.auth_params.use_pkce = false;
    options
        .auth_params
        .extra
        .insert("ui_locales".to_string(), "fr".to_string());
    let service = OidcService::init(options).await.expect("init");
    let mut session = Session::fresh(store());

    let outcome = service.login(&mut session, &TenantParams::default()).await;
    let params = query_params(outcome.location().expect("redirect"));
    assert_eq!(params.get("prompt").map(String::as_str), Some("login"));
    assert_eq!(params.get("ui_locales").map(String::as_str), Some("fr"));
    assert!(!params.contains_key("code_challenge"));
    assert!(pending(&session).pkce_verifier.is_none());
}

#[tokio::test]
async fn test_multitenant_login_uses_tenant_issuer() {
    let idp = MockIdp::start().await;
    idp.mount_issuer("/acme/b2c", false).await;
    let service = OidcService::init(multitenant_options(&idp))
        .await
        .expect("init");
    let mut session = Session::fresh(store());

    let outcome = service
        .login(&mut session, &TenantParams::new("acme", ChannelType::B2c))
        .await;
    let location = outcome.location().expect("redirect");
    assert!(location.starts_with(&format!("{}/authorize?", idp.issuer("/acme/b2c"))));
    let params = query_params(location);
    assert_eq!(params.get("client_id").map(String::as_str), Some(B2C_CLIENT_ID));
    assert_eq!(
        params.get("redirect_uri").map(String::as_str),
        Some("http://localhost:3000/acme/b2c/login/callback")
    );
}

#[tokio::test]
async fn test_login_with_unreachable_issuer_is_not_found() {
    let idp = MockIdp::start().await;
    let service = OidcService::init(multitenant_options(&idp))
        .await
        .expect("init");
    let mut session = Session::fresh(store());

    let outcome = service
        .login(&mut session, &TenantParams::new("unknown", ChannelType::B2c))
        .await;
    assert_eq!(outcome, AuthOutcome::Status(StatusCode::NOT_FOUND));
    assert!(session.data().pending.is_none());
}

#[tokio::test]
async fn test_login_callback_authenticates_session() {
    let idp = MockIdp::start().await;
    let service = single_tenant_service(&idp).await;
    let mut session = Session::fresh(store());
    service.login(&mut session, &TenantParams::default()).await;
    let pending = pending(&session);

    let issuer = idp.issuer(SINGLE_ISSUER_PATH);
    let mut claims = TestClaims::new(&issuer, DEFAULT_CLIENT_ID, "user123");
    claims.email = Some("user@example.com".to_string());
    claims.nonce = Some(pending.nonce.clone());
    idp.mount_token_response(SINGLE_ISSUER_PATH, &KEYS.create_id_token(&claims))
        .await;

    let outcome = service
        .login_callback(
            &mut session,
            &TenantParams::default(),
            callback("auth-code", &pending.csrf_state),
        )
        .await;
    assert_eq!(outcome, AuthOutcome::Redirect("/".to_string()));
    assert!(session.data().pending.is_none());

    let user = session.user().expect("authenticated");
    assert_eq!(user.userinfo.sub, "user123");
    assert_eq!(user.userinfo.email.as_deref(), Some("user@example.com"));
    assert_eq!(user.userinfo.channel, None);
    assert!(user.id_token.is_some());

    let tokens = user.auth_tokens.as_ref().expect("tokens");
    assert_eq!(tokens.access_token.as_deref(), Some("access-token"));
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-token"));
    let token_endpoint = format!("{issuer}/token");
    assert_eq!(tokens.token_endpoint.as_deref(), Some(token_endpoint.as_str()));
    let expires_at = tokens.expires_at.expect("expiry");
    let now = chrono::Utc::now().timestamp();
    assert!(expires_at > now + 290 && expires_at <= now + 300);
}

#[tokio::test]
async fn test_multitenant_callback_tags_channel() {
    let idp = MockIdp::start().await;
    idp.mount_issuer("/acme/b2e", false).await;
    let service = OidcService::init(multitenant_options(&idp))
        .await
        .expect("init");
    let params = TenantParams::new("acme", ChannelType::B2e);
    let mut session = Session::fresh(store());
    service.login(&mut session, &params).await;
    let pending = pending(&session);

    let claims = TestClaims::new(&idp.issuer("/acme/b2e"), B2E_CLIENT_ID, "employee");
    idp.mount_token_response("/acme/b2e", &KEYS.create_id_token(&claims))
        .await;

    let outcome = service
        .login_callback(&mut session, &params, callback("code", &pending.csrf_state))
        .await;
    assert_eq!(outcome, AuthOutcome::Redirect("/acme/b2e/".to_string()));
    let user = session.user().expect("authenticated");
    assert_eq!(user.userinfo.sub, "employee");
    assert_eq!(user.userinfo.channel, Some(ChannelType::B2e));
}

#[tokio::test]
async fn test_callback_without_pending_authorization() {
    let idp = MockIdp::start().await;
    let service = single_tenant_service(&idp).await;
    let mut session = Session::fresh(store());

    let outcome = service
        .login_callback(&mut session, &TenantParams::default(), callback("code", "state"))
        .await;
    assert_eq!(outcome, AuthOutcome::Status(StatusCode::BAD_REQUEST));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_callback_with_wrong_state() {
    let idp = MockIdp::start().await;
    let service = single_tenant_service(&idp).await;
    let mut session = Session::fresh(store());
    service.login(&mut session, &TenantParams::default()).await;

    let outcome = service
        .login_callback(
            &mut session,
            &TenantParams::default(),
            callback("code", "forged-state"),
        )
        .await;
    assert_eq!(outcome, AuthOutcome::Status(StatusCode::BAD_REQUEST));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_callback_with_issuer_error() {
    let idp = MockIdp::start().await;
    let service = single_tenant_service(&idp).await;
    let mut session = Session::fresh(store());
    service.login(&mut session, &TenantParams::default()).await;
    let pending = pending(&session);

    let query = CallbackQuery {
        state: Some(pending.csrf_state),
        error: Some("access_denied".to_string()),
        error_description: Some("user cancelled".to_string()),
        ..Default::default()
    };
    let outcome = service
        .login_callback(&mut session, &TenantParams::default(), query)
        .await;
    assert_eq!(outcome, AuthOutcome::Status(StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn test_callback_rejects_wrong_nonce_when_enabled() {
    let idp = MockIdp::start().await;
    idp.mount_issuer(SINGLE_ISSUER_PATH, false).await;
    let mut options = single_tenant_options(&idp);
    options.auth_params.nonce = Some(NonceSetting::Text("true".to_string()));
    let service = OidcService::init(options).await.expect("init");
    let mut session = Session::fresh(store());
    service.login(&mut session, &TenantParams::default()).await;
    let pending = pending(&session);

    let mut claims = TestClaims::new(
        &idp.issuer(SINGLE_ISSUER_PATH),
        DEFAULT_CLIENT_ID,
        "user123",
    );
    claims.nonce = Some("replayed-nonce".to_string());
    idp.mount_token_response(SINGLE_ISSUER_PATH, &KEYS.create_id_token(&claims))
        .await;

    let outcome = service
        .login_callback(
            &mut session,
            &TenantParams::default(),
            callback("code", &pending.csrf_state),
        )
        .await;
    assert_eq!(outcome, AuthOutcome::Status(StatusCode::UNAUTHORIZED));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_callback_rejects_token_for_other_audience() {
    let idp = MockIdp::start().await;
    let service = single_tenant_service(&idp).await;
    let mut session = Session::fresh(store());
    service.login(&mut session, &TenantParams::default()).await;
    let pending = pending(&session);

    let claims = TestClaims::new(&idp.issuer(SINGLE_ISSUER_PATH), "other-client", "user123");
    idp.mount_token_response(SINGLE_ISSUER_PATH, &KEYS.create_id_token(&claims))
        .await;

    let outcome = service
        .login_callback(
            &mut session,
            &TenantParams::default(),
            callback("code", &pending.csrf_state),
        )
        .await;
    assert_eq!(outcome, AuthOutcome::Status(StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn test_user_requires_authentication() {
    let idp = MockIdp::start().await;
    let service = single_tenant_service(&idp).await;
    let mut session = Session::fresh(store());
    assert_eq!(
        service.user(&session),
        AuthOutcome::Status(StatusCode::UNAUTHORIZED)
    );

    let user = session_user(None, None, None);
    session.set_user(user.clone());
    assert_eq!(service.user(&session), AuthOutcome::User(user.userinfo));
}
