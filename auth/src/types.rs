use crate::errors::OidcError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel a tenant is served on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Business to consumer
    B2c,
    /// Business to employee
    B2e,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::B2c => "b2c",
            ChannelType::B2e => "b2e",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies which issuer/client pair applies to a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKey {
    /// Single-tenant mode: the statically configured issuer
    Single,
    /// Multitenant mode: one issuer per tenant and channel
    Tenant {
        tenant_id: String,
        channel: ChannelType,
    },
}

impl ChannelKey {
    /// Path prefix used for callback, login and logged-out URLs
    ///
    /// Empty for the single-tenant key, `/{tenant_id}/{channel}` otherwise.
    pub fn path_prefix(&self) -> String {
        match self {
            ChannelKey::Single => String::new(),
            ChannelKey::Tenant { tenant_id, channel } => format!("/{tenant_id}/{channel}"),
        }
    }

    /// Path segments of [`ChannelKey::path_prefix`], unescaped
    pub fn path_segments(&self) -> Vec<String> {
        match self {
            ChannelKey::Single => Vec::new(),
            ChannelKey::Tenant { tenant_id, channel } => {
                vec![tenant_id.clone(), channel.as_str().to_string()]
            }
        }
    }

    pub fn channel(&self) -> Option<ChannelType> {
        match self {
            ChannelKey::Single => None,
            ChannelKey::Tenant { channel, .. } => Some(*channel),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Single => f.write_str("single-tenant"),
            ChannelKey::Tenant { tenant_id, channel } => write!(f, "{tenant_id}/{channel}"),
        }
    }
}

/// True when `tenant_id` is a plain path segment: ASCII letters, digits, `-` or `_`
pub fn is_valid_tenant_id(tenant_id: &str) -> bool {
    !tenant_id.is_empty()
        && tenant_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Tenant id taken from a request path, rejected at extraction when invalid
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = OidcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_tenant_id(&value) {
            Ok(Self(value))
        } else {
            Err(OidcError::InvalidTenant)
        }
    }
}

/// Tenant and channel extracted from the request path
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TenantParams {
    pub tenant_id: Option<String>,
    pub channel_type: Option<ChannelType>,
}

impl TenantParams {
    pub fn new(tenant_id: impl Into<String>, channel_type: ChannelType) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            channel_type: Some(channel_type),
        }
    }

    /// Tenant key when both tenant and channel are present and the tenant id is valid
    pub fn tenant_key(&self) -> Option<ChannelKey> {
        match (&self.tenant_id, self.channel_type) {
            (Some(tenant_id), Some(channel)) if is_valid_tenant_id(tenant_id) => {
                Some(ChannelKey::Tenant {
                    tenant_id: tenant_id.clone(),
                    channel,
                })
            }
            _ => None,
        }
    }

    /// `/{tenant_id}/{channel_type}` when multitenant params were supplied, empty otherwise
    pub fn path_prefix(&self) -> String {
        self.tenant_key()
            .map(|key| key.path_prefix())
            .unwrap_or_default()
    }
}

/// Tokens held by an authenticated session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Token endpoint of the issuer that delivered these tokens
    pub token_endpoint: Option<String>,
    /// Access token expiration, seconds since Unix epoch
    pub expires_at: Option<i64>,
}

/// Identity of the session user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Channel the user logged in through, selects refresh credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelType>,
}

/// User stored in the session after a successful login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub userinfo: UserInfo,
    pub id_token: Option<String>,
    pub auth_tokens: Option<AuthTokens>,
}
