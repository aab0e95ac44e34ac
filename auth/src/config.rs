use crate::errors::OidcError;
use crate::types::ChannelType;
use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Environment variable holding the JSON module configuration
pub const OIDC_CONFIG_ENV_VAR: &str = "OIDCGATE_OIDC_CONFIG";

/// Timeout applied to discovery and token calls when none is configured
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 3500;

const DEFAULT_SCOPES: &str = "openid profile email";
const DEFAULT_SESSION_COOKIE: &str = "oidcgate_session";
const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 3600;

/// Client credentials registered with an issuer
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ClientMetadata {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Per-channel configuration used in multitenant mode
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    pub client_metadata: ClientMetadata,
}

/// Channel configurations, one optional entry per channel type
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfigs {
    pub b2c: Option<ChannelConfig>,
    pub b2e: Option<ChannelConfig>,
}

impl ChannelConfigs {
    pub fn get(&self, channel: ChannelType) -> Option<&ChannelConfig> {
        match channel {
            ChannelType::B2c => self.b2c.as_ref(),
            ChannelType::B2e => self.b2e.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.b2c.is_none() && self.b2e.is_none()
    }
}

/// Nonce setting, accepted as a JSON boolean or as the strings "true"/"false"
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NonceSetting {
    Flag(bool),
    Text(String),
}

impl NonceSetting {
    pub fn enabled(&self) -> bool {
        match self {
            NonceSetting::Flag(flag) => *flag,
            NonceSetting::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        }
    }
}

/// Parameters added to the authorization request
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthParams {
    /// Whether the `nonce` claim of the ID token is checked against the stored nonce
    ///
    /// A nonce is generated and sent with every authorization request
    /// regardless of this setting; disabling it only skips verification.
    pub nonce: Option<NonceSetting>,
    pub prompt: Option<String>,
    pub use_pkce: bool,
    /// Additional query parameters passed verbatim to the authorization endpoint
    pub extra: HashMap<String, String>,
}

impl Default for AuthParams {
    fn default() -> Self {
        Self {
            nonce: None,
            prompt: None,
            use_pkce: true,
            extra: HashMap::new(),
        }
    }
}

impl AuthParams {
    /// True when the ID token nonce claim must be verified
    pub fn nonce_enabled(&self) -> bool {
        self.nonce.as_ref().map(NonceSetting::enabled).unwrap_or(false)
    }
}

/// Options for outbound HTTP calls
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpOptions {
    /// Request timeout in milliseconds, 0 means library default
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Session cookie settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub cookie_name: String,
    pub cookie_domain: Option<String>,
    pub secure_cookies: bool,
    pub ttl_secs: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            cookie_domain: None,
            secure_cookies: false,
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

/// OIDC module configuration
///
/// Exactly one of `issuer` (single-tenant) or `issuer_origin` (multitenant)
/// must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OidcModuleOptions {
    /// Static issuer URL, selects single-tenant mode
    pub issuer: Option<String>,
    /// Origin that tenant issuers are derived from, selects multitenant mode
    pub issuer_origin: Option<String>,
    /// Default client, used in single-tenant mode and for untagged sessions
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Space separated scopes
    pub scopes: String,
    pub redirect_uri_login: String,
    pub redirect_uri_logout: Option<String>,
    pub auth_params: AuthParams,
    pub default_http_options: Option<HttpOptions>,
    pub channels: ChannelConfigs,
    pub session: SessionOptions,
}

impl Default for OidcModuleOptions {
    fn default() -> Self {
        Self {
            issuer: None,
            issuer_origin: None,
            client_id: None,
            client_secret: None,
            scopes: DEFAULT_SCOPES.to_string(),
            redirect_uri_login: String::new(),
            redirect_uri_logout: None,
            auth_params: AuthParams::default(),
            default_http_options: None,
            channels: ChannelConfigs::default(),
            session: SessionOptions::default(),
        }
    }
}

impl OidcModuleOptions {
    /// Load the module configuration from the environment
    pub fn from_env() -> Result<Self> {
        let json = std::env::var(OIDC_CONFIG_ENV_VAR)
            .map_err(|_| anyhow!("{OIDC_CONFIG_ENV_VAR} environment variable not set"))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let options: OidcModuleOptions = serde_json::from_str(json)
            .map_err(|e| anyhow!("Failed to parse {OIDC_CONFIG_ENV_VAR}: {e:?}"))?;
        options.validate()?;
        Ok(options)
    }

    /// Check that the options describe exactly one usable mode
    pub fn validate(&self) -> Result<()> {
        match (&self.issuer, &self.issuer_origin) {
            (Some(_), Some(_)) => {
                return Err(anyhow!("issuer and issuer_origin are mutually exclusive"));
            }
            (None, None) => return Err(anyhow!("either issuer or issuer_origin must be set")),
            (Some(_), None) => {
                if self.client_id.as_deref().unwrap_or_default().is_empty() {
                    return Err(anyhow!("client_id is required for a single-tenant issuer"));
                }
            }
            (None, Some(_)) => {
                if self.channels.is_empty() {
                    return Err(anyhow!(
                        "at least one channel must be configured when issuer_origin is set"
                    ));
                }
            }
        }
        url::Url::parse(&self.redirect_uri_login)
            .map_err(|e| anyhow!("Invalid redirect_uri_login: {e:?}"))?;
        Ok(())
    }

    pub fn is_multitenant(&self) -> bool {
        self.issuer_origin.is_some()
    }

    pub fn scope_list(&self) -> Vec<String> {
        self.scopes
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Timeout for discovery and token endpoint calls
    pub fn http_timeout(&self) -> Duration {
        let millis = self
            .default_http_options
            .as_ref()
            .and_then(|options| options.timeout_ms)
            .filter(|millis| *millis > 0)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    /// Client credentials for a channel, or the default client when untagged
    pub fn client_credentials(
        &self,
        channel: Option<ChannelType>,
    ) -> Result<ClientMetadata, OidcError> {
        match channel {
            Some(channel) => self
                .channels
                .get(channel)
                .map(|config| config.client_metadata.clone())
                .ok_or_else(|| OidcError::ClientNotConfigured(channel.to_string())),
            None => {
                let client_id = self
                    .client_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| OidcError::ClientNotConfigured("default".to_string()))?;
                Ok(ClientMetadata {
                    client_id,
                    client_secret: self.client_secret.clone(),
                })
            }
        }
    }
}
