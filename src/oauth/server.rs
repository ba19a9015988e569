//! # OAuth 2.0 Server — Token Issuance
//!
//! Parses an incoming access-token request, verifies it against
//! caller-supplied expected state (this crate persists nothing itself,
//! §5), and mints the resulting access-token JWT and response body.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::callback::{Hasher, JwtSigner, RandomSource, Signer};
use crate::core::generate;
use crate::core::pkce::CodeChallengeMethod;
use crate::core::strings::constant_time_eq;
use crate::dpop;
use crate::error::{Error, Result};
use crate::{invalid, oauth2_error};

/// The `pre-authorized_code` grant identifier, as it appears on the wire.
pub const GRANT_PRE_AUTHORIZED_CODE: &str =
    "urn:ietf:params:oauth:grant-type:pre-authorized_code";

/// The `authorization_code` grant identifier.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// A parsed access-token request, dispatched by `grant_type`.
#[derive(Clone, Debug)]
pub enum AccessTokenRequest {
    /// `urn:ietf:params:oauth:grant-type:pre-authorized_code`.
    PreAuthorizedCode {
        /// The pre-authorized code presented.
        pre_authorized_code: String,
        /// The transaction code (PIN), if the offer required one.
        tx_code: Option<String>,
        /// Legacy draft-11 `user_pin` form field, carried separately so
        /// callers targeting a draft-11 server can still populate it
        /// (§8 scenario 2). Mutually interchangeable with `tx_code` on
        /// the wire; this crate never emits both.
        user_pin: Option<String>,
        /// Raw `DPoP` header, if present, pre-validated for JWT shape.
        dpop_proof: Option<String>,
    },
    /// `authorization_code`.
    AuthorizationCode {
        /// The authorization code presented.
        code: String,
        /// The redirect URI the code was originally issued against.
        redirect_uri: Option<String>,
        /// The PKCE verifier.
        code_verifier: Option<String>,
        /// Raw `DPoP` header, if present, pre-validated for JWT shape.
        dpop_proof: Option<String>,
    },
}

/// Parse a form-encoded access-token request body.
///
/// Validates only the request's own shape: a known `grant_type` with its
/// required parameters present, and (if a `DPoP` header was supplied)
/// that it is a structurally valid three-segment JWT. It does not check
/// the request against any stored state — that is
/// [`verify_pre_authorized_code_access_token_request`] /
/// [`verify_authorization_code_access_token_request`]'s job.
///
/// # Errors
///
/// [`Error::UnsupportedGrantType`] for an unrecognized or missing
/// `grant_type`; [`Error::ValidationError`] for a missing required
/// parameter; [`Error::InvalidDpopProof`] if a `DPoP` header is present
/// but not a well-formed JWT.
#[instrument(level = "debug", skip(body))]
pub fn parse_access_token_request(
    body: &str, dpop_header: Option<&str>,
) -> Result<AccessTokenRequest> {
    let form: HashMap<String, String> = crate::core::urlencode::from_str(body).into_iter().collect();

    if let Some(dpop_proof) = dpop_header {
        crate::jose::jwt::decode(dpop_proof)
            .map_err(|_| Error::InvalidDpopProof("DPoP header is not a well-formed JWT".to_string()))?;
    }

    let Some(grant_type) = form.get("grant_type") else {
        return Err(Error::UnsupportedGrantType("grant_type is required".to_string()));
    };

    match grant_type.as_str() {
        GRANT_PRE_AUTHORIZED_CODE => {
            let pre_authorized_code = form
                .get("pre-authorized_code")
                .cloned()
                .ok_or_else(|| invalid!("pre-authorized_code is required"))?;
            Ok(AccessTokenRequest::PreAuthorizedCode {
                pre_authorized_code,
                tx_code: form.get("tx_code").cloned(),
                user_pin: form.get("user_pin").cloned(),
                dpop_proof: dpop_header.map(ToString::to_string),
            })
        }
        GRANT_AUTHORIZATION_CODE => {
            let code = form.get("code").cloned().ok_or_else(|| invalid!("code is required"))?;
            Ok(AccessTokenRequest::AuthorizationCode {
                code,
                redirect_uri: form.get("redirect_uri").cloned(),
                code_verifier: form.get("code_verifier").cloned(),
                dpop_proof: dpop_header.map(ToString::to_string),
            })
        }
        other => Err(Error::UnsupportedGrantType(other.to_string())),
    }
}

/// The expected out-of-band state a caller persisted for a pre-authorized
/// code.
#[derive(Clone, Debug)]
pub struct ExpectedPreAuthorizedCode<'a> {
    /// The code as originally issued.
    pub code: &'a str,
    /// The tx_code (PIN) expected, if the offer required one.
    pub tx_code: Option<&'a str>,
    /// The method and target URL the DPoP proof (if any) must be bound
    /// to — normally the token endpoint.
    pub htm: &'a str,
    /// Target URL the DPoP proof must be bound to.
    pub htu: &'a str,
    /// The nonce this caller expects on the DPoP proof, if the nonce
    /// handshake is already in progress for this client.
    pub expected_dpop_nonce: Option<&'a str>,
    /// Current time, Unix seconds.
    pub now: i64,
    /// Acceptable clock skew in seconds.
    pub skew: i64,
}

/// The expected out-of-band state a caller persisted for an
/// authorization code.
#[derive(Clone, Debug)]
pub struct ExpectedAuthorizationCode<'a> {
    /// The code as originally issued.
    pub code: &'a str,
    /// The redirect URI the code was issued against, if one was used.
    pub redirect_uri: Option<&'a str>,
    /// The PKCE challenge stored at authorization time.
    pub code_challenge: &'a str,
    /// The PKCE method stored at authorization time.
    pub code_challenge_method: CodeChallengeMethod,
    /// See [`ExpectedPreAuthorizedCode::htm`].
    pub htm: &'a str,
    /// See [`ExpectedPreAuthorizedCode::htu`].
    pub htu: &'a str,
    /// See [`ExpectedPreAuthorizedCode::expected_dpop_nonce`].
    pub expected_dpop_nonce: Option<&'a str>,
    /// Current time, Unix seconds.
    pub now: i64,
    /// Acceptable clock skew in seconds.
    pub skew: i64,
}

/// The outcome of a successful token-request verification: the DPoP
/// thumbprint to bind into the minted access token, if DPoP was used.
#[derive(Clone, Debug, Default)]
pub struct VerifiedTokenRequest {
    /// The requesting key's JWK thumbprint, present only if a DPoP proof
    /// was supplied and verified.
    pub dpop_jkt: Option<String>,
}

/// Verify a pre-authorized-code token request against caller-supplied
/// expected state.
///
/// # Errors
///
/// [`Error::InvalidGrant`] if the code or tx_code does not match;
/// DPoP verification errors per [`crate::dpop::verify`] if a proof was
/// supplied.
pub async fn verify_pre_authorized_code_access_token_request(
    request: &AccessTokenRequest, expected: ExpectedPreAuthorizedCode<'_>, hasher: &dyn Hasher,
    verifier: &impl crate::callback::JwtVerifier,
) -> Result<VerifiedTokenRequest> {
    let AccessTokenRequest::PreAuthorizedCode { pre_authorized_code, tx_code, user_pin, dpop_proof } =
        request
    else {
        return Err(oauth2_error!("request is not a pre-authorized-code request"));
    };

    if !constant_time_eq(pre_authorized_code.as_bytes(), expected.code.as_bytes()) {
        return Err(Error::InvalidGrant("pre-authorized_code does not match".to_string()));
    }

    if let Some(expected_tx_code) = expected.tx_code {
        let presented = tx_code.as_deref().or(user_pin.as_deref());
        match presented {
            Some(presented) if constant_time_eq(presented.as_bytes(), expected_tx_code.as_bytes()) => {}
            _ => return Err(Error::InvalidGrant("tx_code does not match".to_string())),
        }
    }

    verify_dpop_if_present(dpop_proof.as_deref(), &expected_into_dpop(&expected), hasher, verifier).await
}

/// Verify an authorization-code token request against caller-supplied
/// expected state.
///
/// # Errors
///
/// [`Error::InvalidGrant`] if the code, redirect_uri, or PKCE challenge do
/// not match; DPoP verification errors per [`crate::dpop::verify`] if a
/// proof was supplied.
pub async fn verify_authorization_code_access_token_request(
    request: &AccessTokenRequest, expected: ExpectedAuthorizationCode<'_>, hasher: &dyn Hasher,
    verifier: &impl crate::callback::JwtVerifier,
) -> Result<VerifiedTokenRequest> {
    let AccessTokenRequest::AuthorizationCode { code, redirect_uri, code_verifier, dpop_proof } =
        request
    else {
        return Err(oauth2_error!("request is not an authorization-code request"));
    };

    if !constant_time_eq(code.as_bytes(), expected.code.as_bytes()) {
        return Err(Error::InvalidGrant("code does not match".to_string()));
    }

    if let Some(expected_redirect) = expected.redirect_uri {
        if redirect_uri.as_deref() != Some(expected_redirect) {
            return Err(Error::InvalidGrant("redirect_uri does not match".to_string()));
        }
    }

    let code_verifier =
        code_verifier.as_deref().ok_or_else(|| invalid!("code_verifier is required"))?;
    if !crate::core::pkce::verify(
        code_verifier,
        expected.code_challenge_method,
        expected.code_challenge,
        hasher,
    ) {
        return Err(Error::InvalidGrant("PKCE verification failed".to_string()));
    }

    let dpop_expected = DpopExpectation {
        htm: expected.htm,
        htu: expected.htu,
        expected_dpop_nonce: expected.expected_dpop_nonce,
        now: expected.now,
        skew: expected.skew,
    };
    verify_dpop_if_present(dpop_proof.as_deref(), &dpop_expected, hasher, verifier).await
}

struct DpopExpectation<'a> {
    htm: &'a str,
    htu: &'a str,
    expected_dpop_nonce: Option<&'a str>,
    now: i64,
    skew: i64,
}

fn expected_into_dpop<'a>(expected: &ExpectedPreAuthorizedCode<'a>) -> DpopExpectation<'a> {
    DpopExpectation {
        htm: expected.htm,
        htu: expected.htu,
        expected_dpop_nonce: expected.expected_dpop_nonce,
        now: expected.now,
        skew: expected.skew,
    }
}

async fn verify_dpop_if_present(
    dpop_proof: Option<&str>, expected: &DpopExpectation<'_>, hasher: &dyn Hasher,
    verifier: &impl crate::callback::JwtVerifier,
) -> Result<VerifiedTokenRequest> {
    let Some(proof) = dpop_proof else {
        return Ok(VerifiedTokenRequest::default());
    };
    let verified = dpop::verify(
        dpop::VerifyParams {
            proof,
            htm: expected.htm,
            htu: expected.htu,
            access_token: None,
            expected_nonce: expected.expected_dpop_nonce,
            expected_jkt: None,
            now: expected.now,
            skew: expected.skew,
        },
        hasher,
        verifier,
    )
    .await?;
    Ok(VerifiedTokenRequest { dpop_jkt: Some(verified.jkt) })
}

/// Inputs for minting an access-token JWT.
#[derive(Clone, Debug)]
pub struct AccessTokenClaimsParams<'a> {
    /// The issuing authorization server's identifier.
    pub iss: &'a str,
    /// The resource server this token is intended for.
    pub aud: &'a str,
    /// The subject this token was issued to.
    pub sub: &'a str,
    /// Issued-at time, Unix seconds.
    pub iat: i64,
    /// Validity period, seconds.
    pub expires_in_seconds: i64,
    /// Granted scope, if any.
    pub scope: Option<&'a str>,
    /// The OAuth client this token was issued to, if known.
    pub client_id: Option<&'a str>,
    /// The DPoP key thumbprint to bind this token to, if DPoP was used.
    pub dpop_jkt: Option<&'a str>,
}

/// Mint a compact access-token JWT (`typ = at+jwt`).
pub async fn create_access_token_jwt(
    params: AccessTokenClaimsParams<'_>, rng: &dyn RandomSource, signer_id: &Signer,
    signer: &impl JwtSigner,
) -> Result<String> {
    let mut header = serde_json::Map::new();
    header.insert("typ".to_string(), serde_json::json!("at+jwt"));
    header.insert("alg".to_string(), serde_json::json!(signer_id.alg()));
    match signer_id {
        Signer::Did { did_url, .. } => {
            header.insert("kid".to_string(), serde_json::json!(did_url));
        }
        Signer::Jwk { public_jwk, .. } => {
            let jwk_value = serde_json::to_value(public_jwk)
                .map_err(|e| Error::JsonParseError(e.to_string()))?;
            header.insert("jwk".to_string(), jwk_value);
        }
        Signer::X5c { chain, .. } => {
            header.insert("x5c".to_string(), serde_json::json!(chain));
        }
        Signer::Custom { .. } => {}
    }

    let mut payload = serde_json::Map::new();
    payload.insert("iss".to_string(), serde_json::json!(params.iss));
    payload.insert("aud".to_string(), serde_json::json!(params.aud));
    payload.insert("sub".to_string(), serde_json::json!(params.sub));
    payload.insert("iat".to_string(), serde_json::json!(params.iat));
    payload.insert("exp".to_string(), serde_json::json!(params.iat + params.expires_in_seconds));
    payload.insert("jti".to_string(), serde_json::json!(generate::jti(rng)));
    if let Some(scope) = params.scope {
        payload.insert("scope".to_string(), serde_json::json!(scope));
    }
    if let Some(client_id) = params.client_id {
        payload.insert("client_id".to_string(), serde_json::json!(client_id));
    }
    if let Some(jkt) = params.dpop_jkt {
        payload.insert("cnf".to_string(), dpop::cnf_claim(jkt));
    }

    let payload_bytes =
        serde_json::to_vec(&payload).map_err(|e| Error::JsonParseError(e.to_string()))?;
    signer
        .sign_jwt(signer_id, crate::callback::SigningInput { header, payload: payload_bytes })
        .await
}

/// The response body returned from the token endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AccessTokenResponse {
    /// The minted access token.
    pub access_token: String,
    /// `Bearer` or `DPoP`.
    pub token_type: String,
    /// Validity period, seconds.
    pub expires_in: i64,
    /// Granted scope, if narrowed from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// A fresh nonce for the wallet's next proof-of-possession JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    /// Validity period of `c_nonce`, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<i64>,
    /// Authorization details granted, echoed back per RFC 9396.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<serde_json::Value>,
}

/// Build the token-endpoint response body, after `create_access_token_jwt`.
#[must_use]
pub fn create_access_token_response(
    access_token: String, token_type: &str, expires_in: i64, scope: Option<String>,
    c_nonce: Option<String>, c_nonce_expires_in: Option<i64>,
) -> AccessTokenResponse {
    AccessTokenResponse {
        access_token,
        token_type: token_type.to_string(),
        expires_in,
        scope,
        c_nonce,
        c_nonce_expires_in,
        authorization_details: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pins the token-endpoint response's exact wire JSON — field order and
    /// omission of unset optionals matter to clients parsing it by hand.
    #[test]
    fn access_token_response_wire_json() {
        use insta::assert_snapshot;

        let response = create_access_token_response(
            "at-1".to_string(),
            "Bearer",
            3600,
            None,
            Some("fresh-nonce".to_string()),
            Some(300),
        );
        let json = serde_json::to_string(&response).unwrap();
        assert_snapshot!(json, @r#"{"access_token":"at-1","token_type":"Bearer","expires_in":3600,"c_nonce":"fresh-nonce","c_nonce_expires_in":300}"#);
    }

    /// §8 end-to-end scenario 1: exact wire-form token request body.
    #[test]
    fn scenario1_pre_authorized_request_body() {
        let body = "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Apre-authorized_code&pre-authorized_code=abc";
        let parsed = parse_access_token_request(body, None).unwrap();
        let AccessTokenRequest::PreAuthorizedCode { pre_authorized_code, tx_code, .. } = parsed else {
            panic!("expected pre-authorized-code request");
        };
        assert_eq!(pre_authorized_code, "abc");
        assert!(tx_code.is_none());
    }

    #[test]
    fn unknown_grant_type_rejected() {
        let err = parse_access_token_request("grant_type=unknown_grant", None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedGrantType(_)));
    }

    #[test]
    fn missing_grant_type_rejected() {
        let err = parse_access_token_request("foo=bar", None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedGrantType(_)));
    }

    #[test]
    fn malformed_dpop_header_rejected() {
        let err = parse_access_token_request(
            "grant_type=authorization_code&code=abc",
            Some("not-a-jwt"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidDpopProof(_)));
    }

    #[tokio::test]
    async fn pre_authorized_code_mismatch_rejected() {
        struct NoopVerifier;
        impl crate::callback::JwtVerifier for NoopVerifier {
            async fn verify_jwt(
                &self, _signer_hint: Option<&Signer>, _jwt: &crate::callback::CompactJwt,
            ) -> Result<crate::callback::VerifiedJwt> {
                Ok(crate::callback::VerifiedJwt { valid: true, signer_jwk: None })
            }
        }

        let request = AccessTokenRequest::PreAuthorizedCode {
            pre_authorized_code: "wrong".to_string(),
            tx_code: None,
            user_pin: None,
            dpop_proof: None,
        };
        let expected = ExpectedPreAuthorizedCode {
            code: "abc",
            tx_code: None,
            htm: "POST",
            htu: "https://as.example.com/token",
            expected_dpop_nonce: None,
            now: 0,
            skew: 60,
        };
        let err = verify_pre_authorized_code_access_token_request(
            &request,
            expected,
            &crate::callback::Sha2Hasher,
            &NoopVerifier,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidGrant(_)));
    }
}
