//! # Resource-Request Verification
//!
//! Verifies an inbound request to a resource server (the credential
//! endpoint, the deferred-credential endpoint, ...): decodes its bearer
//! or DPoP-bound access token, resolves the issuing authorization
//! server's JWKS, and checks audience/expiry/DPoP binding (§4.9).

use crate::callback::{Fetcher, Hasher, HttpRequest, JwtVerifier};
use crate::dpop;
use crate::error::{Error, Result};
use crate::invalid;
use crate::metadata::AuthorizationServerMetadata;

/// Authentication schemes a resource server accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthenticationScheme {
    /// A plain bearer token, not sender-constrained.
    Bearer,
    /// A DPoP-bound token.
    Dpop,
}

/// The `Authorization` header, parsed.
struct ParsedAuthorization<'a> {
    scheme: AuthenticationScheme,
    token: &'a str,
}

fn parse_authorization_header(
    header: &str, allowed: &[AuthenticationScheme],
) -> Result<ParsedAuthorization<'_>> {
    let (scheme_str, token) =
        header.split_once(' ').ok_or_else(|| invalid!("malformed Authorization header"))?;
    let scheme = match scheme_str {
        "Bearer" => AuthenticationScheme::Bearer,
        "DPoP" => AuthenticationScheme::Dpop,
        other => return Err(invalid!("unsupported authentication scheme: {other}")),
    };
    if !allowed.contains(&scheme) {
        return Err(invalid!("authentication scheme {scheme_str} is not allowed here"));
    }
    Ok(ParsedAuthorization { scheme, token })
}

/// Inputs to [`verify_resource_request`].
pub struct VerifyResourceRequestParams<'a> {
    /// The `Authorization` header value.
    pub authorization_header: &'a str,
    /// The `DPoP` header value, if present.
    pub dpop_header: Option<&'a str>,
    /// The request method, for DPoP binding.
    pub htm: &'a str,
    /// The request URL, for DPoP binding.
    pub htu: &'a str,
    /// Authorization servers this resource server accepts tokens from.
    pub authorization_servers: &'a [AuthorizationServerMetadata],
    /// This resource server's own identifier (`aud`).
    pub resource_server: &'a str,
    /// Authentication schemes this resource server accepts.
    pub allowed_authentication_schemes: &'a [AuthenticationScheme],
    /// Current time, Unix seconds.
    pub now: i64,
    /// Acceptable clock skew, seconds.
    pub skew: i64,
}

/// The outcome of a successful resource-request verification.
#[derive(Clone, Debug)]
pub struct VerifiedResourceRequest {
    /// Decoded access-token payload.
    pub token_payload: serde_json::Map<String, serde_json::Value>,
    /// The DPoP key thumbprint bound to the token, if DPoP was used.
    pub dpop_jkt: Option<String>,
}

/// Verify an inbound resource request's access token and (if used) its
/// DPoP proof.
///
/// # Errors
///
/// [`Error::ValidationError`] for a malformed or disallowed
/// `Authorization` header or an unrecognized token issuer.
/// [`Error::InvalidDpopProof`] if the scheme is DPoP and no `DPoP` header
/// is present, if the proof fails verification, or if the token's
/// `cnf.jkt` does not match the proof's key. [`Error::InvalidGrant`] for
/// an expired/premature token or an audience mismatch.
pub async fn verify_resource_request(
    params: VerifyResourceRequestParams<'_>, hasher: &dyn Hasher, fetcher: &impl Fetcher,
    jwt_verifier: &impl JwtVerifier,
) -> Result<VerifiedResourceRequest> {
    let parsed = parse_authorization_header(
        params.authorization_header,
        params.allowed_authentication_schemes,
    )?;

    let compact = crate::jose::jwt::decode(parsed.token)?;

    let iss = compact
        .payload
        .get("iss")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| invalid!("access token missing iss"))?;
    let server = params
        .authorization_servers
        .iter()
        .find(|s| crate::core::strings::issuer_eq(&s.issuer, iss))
        .ok_or_else(|| invalid!("access token issuer {iss} is not an accepted authorization server"))?;

    verify_token_signature(&compact, server, fetcher, jwt_verifier).await?;

    let aud = compact.payload.get("aud").and_then(serde_json::Value::as_str);
    if aud != Some(params.resource_server) {
        return Err(Error::InvalidGrant("access token aud does not match resource server".to_string()));
    }

    let exp = compact.payload.get("exp").and_then(serde_json::Value::as_i64);
    match exp {
        Some(exp) if exp > params.now => {}
        _ => return Err(Error::InvalidGrant("access token is expired".to_string())),
    }
    let iat = compact.payload.get("iat").and_then(serde_json::Value::as_i64);
    if let Some(iat) = iat {
        if iat > params.now + params.skew {
            return Err(Error::InvalidGrant("access token iat is in the future".to_string()));
        }
    }

    let cnf_jkt = compact
        .payload
        .get("cnf")
        .and_then(|cnf| cnf.get("jkt"))
        .and_then(serde_json::Value::as_str);

    let dpop_jkt = match parsed.scheme {
        AuthenticationScheme::Bearer => {
            if cnf_jkt.is_some() {
                return Err(invalid!("bearer token carries cnf.jkt but was presented as Bearer"));
            }
            None
        }
        AuthenticationScheme::Dpop => {
            let proof = params
                .dpop_header
                .ok_or_else(|| Error::InvalidDpopProof("DPoP scheme requires a DPoP header".to_string()))?;
            let verified = dpop::verify(
                dpop::VerifyParams {
                    proof,
                    htm: params.htm,
                    htu: params.htu,
                    access_token: Some(parsed.token),
                    expected_nonce: None,
                    expected_jkt: cnf_jkt,
                    now: params.now,
                    skew: params.skew,
                },
                hasher,
                jwt_verifier,
            )
            .await?;
            Some(verified.jkt)
        }
    };

    Ok(VerifiedResourceRequest { token_payload: compact.payload, dpop_jkt })
}

/// Confirms `jwks_uri` is reachable, then delegates the actual key
/// resolution and signature check to the injected [`JwtVerifier`], which
/// owns whatever JWKS cache or fetch strategy it likes (§5: the core
/// requests no cache of its own).
async fn verify_token_signature(
    compact: &crate::callback::CompactJwt, server: &AuthorizationServerMetadata, fetcher: &impl Fetcher,
    jwt_verifier: &impl JwtVerifier,
) -> Result<()> {
    let jwks_uri =
        server.jwks_uri.as_deref().ok_or_else(|| invalid!("authorization server has no jwks_uri"))?;
    let response = fetcher.fetch(HttpRequest::get(jwks_uri)).await?;
    if !response.is_success() {
        return Err(Error::InvalidFetchResponse(format!("jwks fetch returned {}", response.status)));
    }

    let verified = jwt_verifier.verify_jwt(None, compact).await?;
    if !verified.valid {
        return Err(Error::InvalidGrant("access token signature verification failed".to_string()));
    }
    Ok(())
}
