//! # Issuer and Authorization-Server Metadata
//!
//! Resolves a Credential Issuer's metadata document and, concurrently, the
//! metadata of every authorization server it names, per §4.2. Discovery
//! tries `/.well-known/oauth-authorization-server` first and falls back to
//! `/.well-known/openid-configuration`, logging a `debug!` on each miss
//! rather than failing until every candidate is exhausted — the same
//! try-then-fall-through shape used by metadata discovery elsewhere in the
//! ecosystem.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::callback::{Fetcher, HttpRequest};
use crate::core::strings::issuer_eq;
use crate::error::Result;
use crate::invalid;

/// A single credential configuration entry, as published by the issuer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialConfiguration {
    /// The credential format identifier (e.g. `"jwt_vc_json"`, `"vc+sd-jwt"`).
    pub format: String,

    /// Cryptographic binding methods the issuer supports for this
    /// configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cryptographic_binding_methods_supported: Option<Vec<String>>,

    /// Signing algorithms the issuer supports for this configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_signing_alg_values_supported: Option<Vec<String>>,

    /// Proof types the issuer accepts for this configuration, keyed by
    /// proof type (e.g. `"jwt"`), with per-type signing algorithms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_types_supported: Option<HashMap<String, ProofTypeSupported>>,

    /// Any remaining format-specific members (`vct`, `credential_definition`,
    /// `doctype`, ...), which this layer treats opaquely.
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// Proof-type support descriptor within a credential configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProofTypeSupported {
    /// Signing algorithms accepted for this proof type.
    pub proof_signing_alg_values_supported: Vec<String>,
}

/// The Credential Issuer's published metadata document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialIssuerMetadata {
    /// The issuer's identifier. Must equal the URL it was fetched from,
    /// modulo canonicalization (§4.2).
    pub credential_issuer: String,

    /// Authorization servers the issuer accepts tokens from. Defaults to
    /// `[credential_issuer]` when absent (the issuer is its own AS).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_servers: Option<Vec<String>>,

    /// The credential endpoint URL.
    pub credential_endpoint: String,

    /// The deferred-credential endpoint URL, if supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deferred_credential_endpoint: Option<String>,

    /// The notification endpoint URL, if supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_endpoint: Option<String>,

    /// Supported configurations, keyed by configuration id.
    pub credential_configurations_supported: HashMap<String, CredentialConfiguration>,
}

impl CredentialIssuerMetadata {
    /// The authorization servers this issuer accepts tokens from,
    /// defaulting to itself when the field is absent.
    #[must_use]
    pub fn authorization_servers(&self) -> Vec<String> {
        self.authorization_servers.clone().unwrap_or_else(|| vec![self.credential_issuer.clone()])
    }
}

/// An authorization server's published metadata (RFC 8414 /
/// OpenID Connect Discovery 1.0 — the two documents share the members this
/// layer cares about).
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthorizationServerMetadata {
    /// The authorization server's identifier.
    pub issuer: String,

    /// The token endpoint URL.
    pub token_endpoint: String,

    /// The authorization endpoint URL, if the server supports the
    /// `authorization_code` grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// The pushed-authorization-request endpoint, if supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<String>,

    /// The Authorization Challenge endpoint, if supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_challenge_endpoint: Option<String>,

    /// The server's JWKS URL, used to verify access tokens it mints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Whether PAR is required for every authorization request.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub require_pushed_authorization_requests: bool,

    /// PKCE code-challenge methods the server supports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,

    /// Whether the server supports RFC 9449 DPoP, and with which signing
    /// algorithms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dpop_signing_alg_values_supported: Vec<String>,

    /// Grant types the server supports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types_supported: Vec<String>,

    /// Client authentication methods accepted at the token endpoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

/// Fetch and parse a Credential Issuer's metadata document from
/// `<issuer>/.well-known/openid-credential-issuer`.
///
/// The returned document's `credential_issuer` must match `issuer` up to
/// canonicalization (§4.2); mismatches are rejected rather than silently
/// accepted, since the issuer identity is load-bearing for subsequent
/// token audience checks.
#[instrument(level = "debug", skip(fetcher))]
pub async fn resolve_issuer_metadata(
    issuer: &str, fetcher: &impl Fetcher,
) -> Result<CredentialIssuerMetadata> {
    let url = format!("{}/.well-known/openid-credential-issuer", issuer.trim_end_matches('/'));
    let response = fetcher.fetch(HttpRequest::get(url)).await?;
    if !response.is_success() {
        return Err(invalid!("issuer metadata fetch failed with status {}", response.status));
    }
    let metadata: CredentialIssuerMetadata = response.json()?;

    if !issuer_eq(&metadata.credential_issuer, issuer) {
        return Err(invalid!(
            "issuer metadata credential_issuer {} does not match requested issuer {issuer}",
            metadata.credential_issuer
        ));
    }

    Ok(metadata)
}

/// Resolve every authorization server an issuer's metadata names,
/// concurrently, via `Vec<_>::into_iter().map(..).collect::<FuturesUnordered>`-
/// style fan-out — here expressed directly against the futures each
/// `Fetcher` call returns, since the core depends on no executor of its
/// own (§5).
///
/// A server that fails both the RFC 8414 and OIDC discovery document is
/// dropped with a `tracing::warn!`, not treated as a hard failure: the
/// caller may still have usable servers left in the result.
#[instrument(level = "debug", skip(fetcher))]
pub async fn resolve_authorization_servers(
    servers: &[String], fetcher: &impl Fetcher,
) -> Result<Vec<AuthorizationServerMetadata>> {
    let futures = servers.iter().map(|server| discover_one(server, fetcher));
    let results = futures::future::join_all(futures).await;

    let mut resolved = Vec::new();
    for (server, result) in servers.iter().zip(results) {
        match result {
            Ok(metadata) => resolved.push(metadata),
            Err(e) => tracing::warn!("authorization server {server} discovery failed: {e}"),
        }
    }

    if resolved.is_empty() {
        return Err(invalid!("no authorization server metadata could be resolved"));
    }
    Ok(resolved)
}

async fn discover_one(server: &str, fetcher: &impl Fetcher) -> Result<AuthorizationServerMetadata> {
    let base = server.trim_end_matches('/');

    let as_url = format!("{base}/.well-known/oauth-authorization-server");
    match fetcher.fetch(HttpRequest::get(as_url)).await {
        Ok(response) if response.is_success() => return response.json(),
        Ok(response) => {
            tracing::debug!(
                "oauth-authorization-server discovery for {server} returned {}",
                response.status
            );
        }
        Err(e) => tracing::debug!("oauth-authorization-server discovery for {server} failed: {e}"),
    }

    let oidc_url = format!("{base}/.well-known/openid-configuration");
    let response = fetcher.fetch(HttpRequest::get(oidc_url)).await?;
    if !response.is_success() {
        return Err(invalid!("openid-configuration discovery for {server} returned {}", response.status));
    }
    response.json()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_issuer() -> CredentialIssuerMetadata {
        CredentialIssuerMetadata {
            credential_issuer: "https://issuer.example.com".into(),
            authorization_servers: None,
            credential_endpoint: "https://issuer.example.com/credential".into(),
            deferred_credential_endpoint: None,
            notification_endpoint: None,
            credential_configurations_supported: HashMap::new(),
        }
    }

    #[test]
    fn authorization_servers_defaults_to_self() {
        crate::test_support::init_tracer();
        let meta = sample_issuer();
        assert_eq!(meta.authorization_servers(), vec!["https://issuer.example.com".to_string()]);
    }

    #[test]
    fn metadata_roundtrips() {
        let meta = sample_issuer();
        let json = serde_json::to_string(&meta).unwrap();
        let meta2: CredentialIssuerMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, meta2);
    }
}
