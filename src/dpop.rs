//! # DPoP (RFC 9449)
//!
//! Demonstrating-Proof-of-Possession: sender-constrains an access token to
//! the key that requested it, binding each proof to a specific HTTP method
//! and URL (`htm`/`htu`), the access token it accompanies (`ath`), and,
//! when the server runs the nonce handshake, a server-issued nonce.
//!
//! Grounded on the DPoP client logic used elsewhere in the ecosystem:
//! build the initial proof, send, and on a `use_dpop_nonce` rejection
//! retry exactly once with the nonce the server just handed back.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::callback::{HashAlg, Hasher, JwtSigner, RandomSource, Signer};
use crate::core::generate;
use crate::error::{Error, Result};
use crate::invalid;
use crate::jose::{jwk::PublicJwk, jwt};

/// Claims carried in the JOSE header of a DPoP proof JWT.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DpopHeader {
    /// Always `"dpop+jwt"`.
    pub typ: String,
    /// The signing algorithm.
    pub alg: String,
    /// The client's public key, embedded directly.
    pub jwk: PublicJwk,
}

/// Claims carried in the payload of a DPoP proof JWT.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DpopClaims {
    /// A unique identifier, preventing replay.
    pub jti: String,
    /// The HTTP method this proof is bound to.
    pub htm: String,
    /// The HTTP target URI this proof is bound to, normalized (§9).
    pub htu: String,
    /// Issued-at time, Unix seconds.
    pub iat: i64,
    /// Hash of the associated access token, present once a token exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
    /// Server-issued nonce, present once the server has run the nonce
    /// handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Inputs for constructing a DPoP proof.
#[derive(Clone, Debug)]
pub struct ProofParams<'a> {
    /// The public JWK to embed in the proof header.
    pub public_jwk: PublicJwk,
    /// Signing algorithm (must match `public_jwk`'s key type).
    pub alg: String,
    /// The HTTP method the request will use.
    pub htm: &'a str,
    /// The HTTP target URI the request will use.
    pub htu: &'a str,
    /// The access token this proof accompanies, if any (its presence
    /// triggers the `ath` claim).
    pub access_token: Option<&'a str>,
    /// Server nonce to bind, if the server has issued one.
    pub nonce: Option<&'a str>,
    /// Current time, Unix seconds.
    pub now: i64,
}

/// Build a signed DPoP proof JWT.
pub async fn create(
    params: ProofParams<'_>, rng: &dyn RandomSource, hasher: &dyn Hasher, signer: &impl JwtSigner,
) -> Result<String> {
    let ath = params.access_token.map(|token| {
        Base64UrlUnpadded::encode_string(&hasher.hash(HashAlg::Sha256, token.as_bytes()))
    });

    let header = DpopHeader {
        typ: "dpop+jwt".to_string(),
        alg: params.alg.clone(),
        jwk: params.public_jwk,
    };
    let header_map: Map<String, Value> = match serde_json::to_value(&header)
        .map_err(|e| Error::JsonParseError(e.to_string()))?
    {
        Value::Object(map) => map,
        _ => unreachable!("DpopHeader always serializes to an object"),
    };

    let claims = DpopClaims {
        jti: generate::jti(rng),
        htm: params.htm.to_uppercase(),
        htu: crate::core::strings::canonicalize_htu(params.htu),
        iat: params.now,
        ath,
        nonce: params.nonce.map(ToString::to_string),
    };
    let payload = serde_json::to_vec(&claims).map_err(|e| Error::JsonParseError(e.to_string()))?;

    let signer_id = Signer::Jwk { public_jwk: header.jwk.clone(), alg: params.alg };
    signer
        .sign_jwt(&signer_id, crate::callback::SigningInput { header: header_map, payload })
        .await
}

/// The outcome of verifying a DPoP proof against a request.
#[derive(Clone, Debug)]
pub struct VerifiedProof {
    /// The RFC 7638 thumbprint of the key that produced the proof, for
    /// binding to `cnf.jkt` on the issued access token.
    pub jkt: String,
}

/// Inputs the verifier expects the caller to supply alongside the proof
/// itself, since this crate holds no session state of its own (§5).
#[derive(Clone, Debug)]
pub struct VerifyParams<'a> {
    /// The proof JWT as received in the `DPoP` header.
    pub proof: &'a str,
    /// The HTTP method of the request the proof accompanies.
    pub htm: &'a str,
    /// The HTTP target URI of the request the proof accompanies.
    pub htu: &'a str,
    /// The access token presented alongside the proof, if any (resource
    /// requests only; absent for the token-endpoint's own DPoP binding).
    pub access_token: Option<&'a str>,
    /// The nonce the server most recently issued to this client, if the
    /// server runs the nonce handshake. `None` if nonces are not in use.
    pub expected_nonce: Option<&'a str>,
    /// The `cnf.jkt` thumbprint to bind against, for resource requests
    /// where the access token was already issued bound to a specific key.
    /// `None` at the token endpoint, where no binding exists yet.
    pub expected_jkt: Option<&'a str>,
    /// Current time, Unix seconds, for freshness checking.
    pub now: i64,
    /// Acceptable clock skew, in seconds, either direction.
    pub skew: i64,
}

/// Verify a DPoP proof per RFC 9449 §4.3.
///
/// Checks, in order: JWT structure, `typ` is `"dpop+jwt"`, `alg` is an
/// asymmetric algorithm, `htm`/`htu` match the request (after `htu`
/// canonicalization, §9), `iat` is within `skew` of `now`, `ath` (if the
/// request carries an access token) matches its hash, `nonce` matches
/// `expected_nonce`, and the signature verifies against the proof's own
/// embedded `jwk`. Returns [`Error::UseDpopNonce`] specifically when the
/// server expects a nonce the proof lacks or got wrong, so the caller can
/// distinguish "send a fresh nonce" from "reject the request".
pub async fn verify(
    params: VerifyParams<'_>, hasher: &dyn Hasher, verifier: &impl crate::callback::JwtVerifier,
) -> Result<VerifiedProof> {
    let compact = jwt::decode(params.proof)?;

    let typ = compact.header.get("typ").and_then(Value::as_str);
    if typ != Some("dpop+jwt") {
        return Err(Error::InvalidDpopProof("typ must be \"dpop+jwt\"".to_string()));
    }

    let alg = compact.header.get("alg").and_then(Value::as_str);
    match alg {
        Some(alg) if !is_asymmetric_alg(alg) => {
            return Err(Error::InvalidDpopProof(format!("alg {alg} is not an asymmetric algorithm")));
        }
        None => return Err(Error::InvalidDpopProof("proof header missing alg".to_string())),
        Some(_) => {}
    }

    let Some(jwk_value) = compact.header.get("jwk").cloned() else {
        return Err(Error::InvalidDpopProof("proof header missing jwk".to_string()));
    };
    let public_jwk: PublicJwk = serde_json::from_value(jwk_value)
        .map_err(|_| Error::InvalidDpopProof("proof jwk is malformed".to_string()))?;

    let htm = compact.payload.get("htm").and_then(Value::as_str);
    if htm.map(str::to_uppercase).as_deref() != Some(&params.htm.to_uppercase()) {
        return Err(Error::InvalidDpopProof("htm mismatch".to_string()));
    }

    let htu = compact.payload.get("htu").and_then(Value::as_str).unwrap_or_default();
    if crate::core::strings::canonicalize_htu(htu)
        != crate::core::strings::canonicalize_htu(params.htu)
    {
        return Err(Error::InvalidDpopProof("htu mismatch".to_string()));
    }

    let iat = compact.payload.get("iat").and_then(Value::as_i64);
    match iat {
        Some(iat) if (params.now - iat).abs() <= params.skew => {}
        _ => return Err(Error::InvalidDpopProof("iat outside acceptable skew".to_string())),
    }

    if let Some(token) = params.access_token {
        let expected_ath =
            Base64UrlUnpadded::encode_string(&hasher.hash(HashAlg::Sha256, token.as_bytes()));
        let ath = compact.payload.get("ath").and_then(Value::as_str).unwrap_or_default();
        if !crate::core::strings::constant_time_eq(ath.as_bytes(), expected_ath.as_bytes()) {
            return Err(Error::InvalidDpopProof("ath mismatch".to_string()));
        }
    }

    if let Some(expected_nonce) = params.expected_nonce {
        let nonce = compact.payload.get("nonce").and_then(Value::as_str);
        if nonce != Some(expected_nonce) {
            return Err(Error::UseDpopNonce(format!("expected nonce {expected_nonce}")));
        }
    }

    let signer_hint = Signer::Jwk { public_jwk: public_jwk.clone(), alg: String::new() };
    let verified = verifier.verify_jwt(Some(&signer_hint), &compact).await?;
    if !verified.valid {
        return Err(Error::InvalidDpopProof("signature verification failed".to_string()));
    }

    let jkt = public_jwk.thumbprint(hasher)?;
    if let Some(expected_jkt) = params.expected_jkt {
        if !crate::core::strings::constant_time_eq(jkt.as_bytes(), expected_jkt.as_bytes()) {
            return Err(Error::InvalidDpopProof("jkt does not match token binding".to_string()));
        }
    }

    Ok(VerifiedProof { jkt })
}

/// `true` if `response` is an authorization-server `use_dpop_nonce`
/// rejection: HTTP 400 with an `{"error": "use_dpop_nonce"}` body.
#[must_use]
pub fn is_auth_server_nonce_error(response: &crate::callback::HttpResponse) -> bool {
    if response.status != 400 {
        return false;
    }
    let Ok(body) = serde_json::from_slice::<Value>(&response.body) else {
        return false;
    };
    body.get("error").and_then(Value::as_str) == Some("use_dpop_nonce")
}

/// `true` if `response` is a resource-server `use_dpop_nonce` rejection:
/// HTTP 401 with a `WWW-Authenticate: DPoP ... error="use_dpop_nonce"`
/// header.
#[must_use]
pub fn is_resource_server_nonce_error(response: &crate::callback::HttpResponse) -> bool {
    if response.status != 401 {
        return false;
    }
    response
        .header("www-authenticate")
        .is_some_and(|h| h.contains("DPoP") && h.contains(r#"error="use_dpop_nonce""#))
}

/// Build an access-token binding (`cnf.jkt`) claim object from a verified
/// proof, for embedding in an access-token JWT.
#[must_use]
pub fn cnf_claim(jkt: &str) -> Value {
    json!({ "jkt": jkt })
}

/// Extract the fresh nonce from a `use_dpop_nonce` rejection, from either
/// the JSON body (`dpop_nonce` isn't standard; the nonce instead travels
/// via the `DPoP-Nonce` response header in both the auth-server and
/// resource-server cases).
#[must_use]
pub fn next_nonce(response: &crate::callback::HttpResponse) -> Option<&str> {
    response.header("dpop-nonce")
}

/// `true` unless `alg` is `"none"` or an HMAC (symmetric) algorithm — the
/// policy RFC 9449 §4.2 requires, since a DPoP proof's embedded `jwk` is
/// only meaningful as a public key the server can verify against.
#[must_use]
fn is_asymmetric_alg(alg: &str) -> bool {
    !matches!(alg, "none" | "HS256" | "HS384" | "HS512")
}

pub(crate) fn require_next_nonce(response: &crate::callback::HttpResponse) -> Result<String> {
    next_nonce(response)
        .map(ToString::to_string)
        .ok_or_else(|| invalid!("use_dpop_nonce response carried no DPoP-Nonce header"))
}
