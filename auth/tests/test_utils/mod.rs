#![allow(dead_code)]

use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oidcgate_auth::config::{ChannelConfig, ChannelConfigs, ClientMetadata, OidcModuleOptions};
use oidcgate_auth::types::{AuthTokens, ChannelType, SessionUser, UserInfo};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::LazyLock;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY_ID: &str = "test-key";
pub const SINGLE_ISSUER_PATH: &str = "/single";
pub const REDIRECT_URI_LOGIN: &str = "http://localhost:3000/login/callback";
pub const DEFAULT_CLIENT_ID: &str = "web";
pub const B2C_CLIENT_ID: &str = "b2c-client";
pub const B2E_CLIENT_ID: &str = "b2e-client";

/// RSA key generation is slow, share one pair per test binary
pub static KEYS: LazyLock<TestKeyPair> = LazyLock::new(TestKeyPair::generate);

/// ID token claims
#[derive(Debug, Serialize)]
pub struct TestClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl TestClaims {
    pub fn new(issuer: &str, audience: &str, subject: &str) -> Self {
        let now = Utc::now();
        Self {
            sub: subject.to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            email: None,
            nonce: None,
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

/// Test key pair for signing ID tokens and publishing the JWKS
pub struct TestKeyPair {
    pub encoding_key: EncodingKey,
    pub jwk: Value,
}

impl TestKeyPair {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate RSA private key");
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("failed to encode private key as PEM");
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .expect("failed to create encoding key");

        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let jwk = json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": TEST_KEY_ID,
            "n": b64.encode(public_key.n().to_bytes_be()),
            "e": b64.encode(public_key.e().to_bytes_be()),
        });

        Self { encoding_key, jwk }
    }

    pub fn create_id_token(&self, claims: &TestClaims) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(TEST_KEY_ID.to_string());
        encode(&header, claims, &self.encoding_key).expect("failed to encode token")
    }
}

/// Identity provider backed by a wiremock server
///
/// Every issuer lives under a path of the server, tenant issuers under
/// `/{tenant_id}/{channel_type}`.
pub struct MockIdp {
    pub server: MockServer,
}

impl MockIdp {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [KEYS.jwk.clone()]
            })))
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn issuer(&self, issuer_path: &str) -> String {
        format!("{}{issuer_path}", self.server.uri())
    }

    pub fn end_session_endpoint(&self, issuer_path: &str) -> String {
        format!("{}/logout", self.issuer(issuer_path))
    }

    pub fn discovery_document(&self, issuer: &str, end_session_endpoint: Option<&str>) -> Value {
        let mut document = json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/authorize"),
            "token_endpoint": format!("{issuer}/token"),
            "jwks_uri": format!("{}/jwks", self.server.uri()),
            "response_types_supported": ["code"],
            "subject_types_supported": ["public"],
            "id_token_signing_alg_values_supported": ["RS256"],
        });
        if let Some(endpoint) = end_session_endpoint {
            document["end_session_endpoint"] = json!(endpoint);
        }
        document
    }

    /// Discovery mock for the issuer at `issuer_path`, left unmounted
    pub fn discovery_mock(&self, issuer_path: &str, with_end_session: bool) -> Mock {
        let issuer = self.issuer(issuer_path);
        let end_session = with_end_session.then(|| self.end_session_endpoint(issuer_path));
        let document = self.discovery_document(&issuer, end_session.as_deref());
        Mock::given(method("GET"))
            .and(path(format!("{issuer_path}/.well-known/openid-configuration")))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
    }

    pub async fn mount_issuer(&self, issuer_path: &str, with_end_session: bool) {
        self.discovery_mock(issuer_path, with_end_session)
            .mount(&self.server)
            .await;
    }

    /// Token endpoint answering every code exchange with `id_token`
    pub async fn mount_token_response(&self, issuer_path: &str, id_token: &str) {
        Mock::given(method("POST"))
            .and(path(format!("{issuer_path}/token")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-token",
                "token_type": "Bearer",
                "expires_in": 300,
                "refresh_token": "refresh-token",
                "id_token": id_token,
            })))
            .mount(&self.server)
            .await;
    }
}

pub fn single_tenant_options(idp: &MockIdp) -> OidcModuleOptions {
    OidcModuleOptions {
        issuer: Some(idp.issuer(SINGLE_ISSUER_PATH)),
        client_id: Some(DEFAULT_CLIENT_ID.to_string()),
        client_secret: Some("secret".to_string()),
        redirect_uri_login: REDIRECT_URI_LOGIN.to_string(),
        ..Default::default()
    }
}

pub fn multitenant_options(idp: &MockIdp) -> OidcModuleOptions {
    OidcModuleOptions {
        issuer_origin: Some(idp.uri()),
        client_id: Some(DEFAULT_CLIENT_ID.to_string()),
        client_secret: Some("secret".to_string()),
        redirect_uri_login: REDIRECT_URI_LOGIN.to_string(),
        channels: ChannelConfigs {
            b2c: Some(channel(B2C_CLIENT_ID, "456")),
            b2e: Some(channel(B2E_CLIENT_ID, "789")),
        },
        ..Default::default()
    }
}

pub fn channel(client_id: &str, client_secret: &str) -> ChannelConfig {
    ChannelConfig {
        client_metadata: ClientMetadata {
            client_id: client_id.to_string(),
            client_secret: Some(client_secret.to_string()),
        },
    }
}

/// Authenticated user holding tokens issued by `token_endpoint`
pub fn session_user(
    token_endpoint: Option<String>,
    expires_at: Option<i64>,
    channel: Option<ChannelType>,
) -> SessionUser {
    SessionUser {
        userinfo: UserInfo {
            sub: "user123".to_string(),
            email: Some("user@example.com".to_string()),
            channel,
            ..Default::default()
        },
        id_token: Some("id-token".to_string()),
        auth_tokens: Some(AuthTokens {
            access_token: Some("access-token".to_string()),
            refresh_token: Some("refresh-token".to_string()),
            token_endpoint,
            expires_at,
        }),
    }
}
