use crate::types::ChannelKey;
use anyhow::{Result, anyhow};
use openidconnect::core::{
    CoreAuthDisplay, CoreClaimName, CoreClaimType, CoreClientAuthMethod, CoreGrantType,
    CoreJsonWebKey, CoreJweContentEncryptionAlgorithm, CoreJweKeyManagementAlgorithm,
    CoreResponseMode, CoreResponseType, CoreSubjectIdentifierType,
};
use openidconnect::{AdditionalProviderMetadata, IssuerUrl, ProviderMetadata};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Discovery fields outside of the core OIDC metadata
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EndSessionMetadata {
    /// RP-initiated logout endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
}

impl AdditionalProviderMetadata for EndSessionMetadata {}

/// Provider metadata including the end session endpoint
pub type TrustIssuerMetadata = ProviderMetadata<
    EndSessionMetadata,
    CoreAuthDisplay,
    CoreClientAuthMethod,
    CoreClaimName,
    CoreClaimType,
    CoreGrantType,
    CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm,
    CoreJsonWebKey,
    CoreResponseMode,
    CoreResponseType,
    CoreSubjectIdentifierType,
>;

/// Discovered issuer, kept for the lifetime of its strategy
#[derive(Clone, Debug)]
pub struct TrustIssuer {
    pub metadata: Arc<TrustIssuerMetadata>,
}

impl TrustIssuer {
    pub fn issuer(&self) -> &str {
        self.metadata.issuer().as_str()
    }

    pub fn authorization_endpoint(&self) -> &str {
        self.metadata.authorization_endpoint().as_str()
    }

    pub fn token_endpoint(&self) -> Option<&str> {
        self.metadata.token_endpoint().map(|url| url.as_str())
    }

    pub fn end_session_endpoint(&self) -> Option<&str> {
        self.metadata
            .additional_metadata()
            .end_session_endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.is_empty())
    }
}

/// Issuer URL for a tenant: `{issuer_origin}/{tenant_id}/{channel_type}`
pub fn tenant_issuer_url(issuer_origin: &str, key: &ChannelKey) -> Result<String> {
    match key {
        ChannelKey::Single => Err(anyhow!(
            "tenant id and channel type are required in multitenant mode"
        )),
        ChannelKey::Tenant { tenant_id, channel } => Ok(format!(
            "{}/{tenant_id}/{channel}",
            issuer_origin.trim_end_matches('/')
        )),
    }
}

/// Fetch the issuer metadata and JWKS through openidconnect's discovery
pub async fn discover(issuer: &str, http_client: &reqwest::Client) -> Result<TrustIssuer> {
    let issuer_url = IssuerUrl::new(issuer.to_string())
        .map_err(|e| anyhow!("Invalid issuer URL '{issuer}': {e:?}"))?;

    let metadata = TrustIssuerMetadata::discover_async(issuer_url, http_client)
        .await
        .map_err(|e| anyhow!("Failed to discover OIDC metadata from {issuer}: {e:?}"))?;

    Ok(TrustIssuer {
        metadata: Arc::new(metadata),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelType;

    #[test]
    fn test_tenant_issuer_url() {
        let key = ChannelKey::Tenant {
            tenant_id: "acme".to_string(),
            channel: ChannelType::B2e,
        };
        assert_eq!(
            tenant_issuer_url("https://login.example.com/", &key).expect("tenant url"),
            "https://login.example.com/acme/b2e"
        );
    }

    #[test]
    fn test_tenant_issuer_url_requires_tenant() {
        assert!(tenant_issuer_url("https://login.example.com", &ChannelKey::Single).is_err());
    }
}
