//! # Credential Request / Response
//!
//! Builds and verifies the proof-of-possession JWT a wallet attaches to a
//! Credential Request, and dispatches the request/response bodies
//! themselves by format, without interpreting any format-specific
//! credential content (§1 Non-goals).

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::callback::{JwtSigner, JwtVerifier, Signer};
use crate::core::OneMany;
use crate::error::{Error, Result};
use crate::invalid;

/// Header/payload inputs for building a single proof-of-possession JWT.
#[cfg(feature = "wallet")]
#[derive(Clone, Debug)]
pub struct ProofJwtParams<'a> {
    /// The signer identity to embed in the header per its variant.
    pub signer: &'a Signer,
    /// The Credential Issuer identifier (`aud`).
    pub credential_issuer: &'a str,
    /// The `c_nonce` to bind this proof to.
    pub nonce: &'a str,
    /// Issued-at time, Unix seconds.
    pub iat: i64,
    /// The OAuth client id to embed as `iss`, if the policy calls for it
    /// (§9 open question (a): caller opt-in, never hardcoded by this
    /// crate).
    pub iss: Option<&'a str>,
}

/// Build a signed proof-of-possession JWT (`typ = openid4vci-proof+jwt`).
///
/// The header carries exactly one of `kid`/`jwk`/`x5c`, selected from
/// `signer`'s variant; `Signer::Custom` leaves header population to the
/// implementer's `sign_jwt`.
#[cfg(feature = "wallet")]
pub async fn create_credential_request_jwt_proof(
    params: ProofJwtParams<'_>, signer: &impl JwtSigner,
) -> Result<String> {
    let mut header = serde_json::Map::new();
    header.insert("typ".to_string(), serde_json::json!("openid4vci-proof+jwt"));
    header.insert("alg".to_string(), serde_json::json!(params.signer.alg()));
    match params.signer {
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
    payload.insert("aud".to_string(), serde_json::json!(params.credential_issuer));
    payload.insert("iat".to_string(), serde_json::json!(params.iat));
    payload.insert("nonce".to_string(), serde_json::json!(params.nonce));
    if let Some(iss) = params.iss {
        payload.insert("iss".to_string(), serde_json::json!(iss));
    }

    let payload_bytes =
        serde_json::to_vec(&payload).map_err(|e| Error::JsonParseError(e.to_string()))?;
    signer
        .sign_jwt(params.signer, crate::callback::SigningInput { header, payload: payload_bytes })
        .await
}

/// A single key proof accompanying a Credential Request.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "proof_type", rename_all = "lowercase")]
pub enum Proof {
    /// A JWT proof.
    Jwt {
        /// The compact proof-of-possession JWT.
        jwt: String,
    },
}

/// Which credential is being requested: either by a pre-agreed identifier
/// negotiated at token time, or by an inline format object.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CredentialSelector {
    /// A `credential_identifier` negotiated out of band (e.g. via
    /// `authorization_details`).
    Identifier {
        /// The identifier.
        credential_identifier: String,
    },
    /// An inline format object, tagged by `format`.
    Format {
        /// The requested format (e.g. `"vc+sd-jwt"`, `"jwt_vc_json"`,
        /// `"mso_mdoc"`).
        format: String,
        /// Any remaining format-specific members (`vct`, `doctype`,
        /// `credential_definition`, ...), opaque to this layer.
        #[serde(flatten)]
        additional: serde_json::Map<String, serde_json::Value>,
    },
}

/// A parsed Credential Request.
#[derive(Clone, Debug)]
pub struct CredentialRequest {
    /// Which credential is being requested.
    pub selector: CredentialSelector,
    /// The attached key proof(s), if any.
    pub proofs: Option<OneMany<Proof>>,
}

/// Raw wire shape of a Credential Request, prior to the mutual-exclusion
/// checks in [`parse_credential_request`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct RawCredentialRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    credential_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proof: Option<Proof>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proofs: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(flatten)]
    additional: serde_json::Map<String, serde_json::Value>,
}

/// Parse and validate a Credential Request body's shape (§3, §8 boundary
/// case "both `proof` and `proofs`").
///
/// # Errors
///
/// [`Error::InvalidCredentialRequest`] if both or neither of
/// `credential_identifier`/`format` are present, if both or neither of
/// `proof`/`proofs` are present, or if `proofs` does not have exactly one
/// key.
#[instrument(level = "debug", skip(body))]
pub fn parse_credential_request(body: &str) -> Result<CredentialRequest> {
    let raw: RawCredentialRequest =
        serde_json::from_str(body).map_err(|e| Error::InvalidCredentialRequest(e.to_string()))?;

    let selector = match (raw.credential_identifier, raw.format) {
        (Some(id), None) => CredentialSelector::Identifier { credential_identifier: id },
        (None, Some(format)) => CredentialSelector::Format { format, additional: raw.additional },
        (Some(_), Some(_)) => {
            return Err(invalid!(
                "credential request must not carry both credential_identifier and format"
            ));
        }
        (None, None) => {
            return Err(invalid!("credential request must carry credential_identifier or format"));
        }
    };

    let proofs = match (raw.proof, raw.proofs) {
        (Some(proof), None) => Some(OneMany::One(proof)),
        (None, Some(proofs_map)) => {
            let mut entries = proofs_map.into_iter();
            let Some((proof_type, value)) = entries.next() else {
                return Err(invalid!("proofs container must have exactly one key"));
            };
            if entries.next().is_some() {
                return Err(invalid!("proofs container must have exactly one key"));
            }
            let jwts: Vec<String> = serde_json::from_value(value)
                .map_err(|e| Error::InvalidCredentialRequest(e.to_string()))?;
            if proof_type != "jwt" {
                return Err(invalid!("unsupported proof type: {proof_type}"));
            }
            Some(OneMany::Many(jwts.into_iter().map(|jwt| Proof::Jwt { jwt }).collect()))
        }
        (Some(_), Some(_)) => {
            return Err(invalid!("credential request must not carry both proof and proofs"));
        }
        (None, None) => None,
    };

    Ok(CredentialRequest { selector, proofs })
}

/// The outcome of verifying a single proof-of-possession JWT.
#[derive(Clone, Debug)]
pub struct VerifiedProofJwt {
    /// Decoded header.
    pub header: serde_json::Map<String, serde_json::Value>,
    /// Decoded payload.
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// The public JWK the signature verified against, if resolvable.
    pub signer_jwk: Option<crate::jose::jwk::PublicJwk>,
}

/// Verify a single proof-of-possession JWT against the expected issuer
/// identifier and a live nonce (§4.8).
///
/// # Errors
///
/// [`Error::InvalidProof`] if the header/payload shape is wrong, `aud`
/// does not match, `iat` is outside the skew window, or the signature
/// fails to verify. [`Error::InvalidNonce`] if `nonce` does not match
/// `expected_nonce`.
pub async fn verify_credential_request_jwt_proof(
    jwt: &str, credential_issuer: &str, expected_nonce: &str, now: i64, skew: i64,
    verifier: &impl JwtVerifier,
) -> Result<VerifiedProofJwt> {
    let compact = crate::jose::jwt::decode(jwt).map_err(|e| Error::InvalidProof(e.to_string()))?;

    let typ = compact.header.get("typ").and_then(serde_json::Value::as_str);
    if typ != Some("openid4vci-proof+jwt") {
        return Err(Error::InvalidProof("typ must be \"openid4vci-proof+jwt\"".to_string()));
    }

    let has_kid = compact.header.contains_key("kid");
    let has_jwk = compact.header.contains_key("jwk");
    if has_kid && has_jwk {
        return Err(Error::InvalidProof("jwk and kid are mutually exclusive".to_string()));
    }
    if compact.header.contains_key("trust_chain") && has_kid {
        return Err(Error::InvalidProof("trust_chain may be present only if kid is absent".to_string()));
    }

    let aud = compact.payload.get("aud").and_then(serde_json::Value::as_str);
    if aud != Some(credential_issuer) {
        return Err(Error::InvalidProof("aud does not match credential issuer".to_string()));
    }

    let nonce = compact.payload.get("nonce").and_then(serde_json::Value::as_str);
    if nonce != Some(expected_nonce) {
        return Err(Error::InvalidNonce("nonce does not match expected c_nonce".to_string()));
    }

    let iat = compact.payload.get("iat").and_then(serde_json::Value::as_i64);
    match iat {
        Some(iat) if (now - iat).abs() <= skew => {}
        _ => return Err(Error::InvalidProof("iat outside acceptable skew".to_string())),
    }

    let verified = verifier.verify_jwt(None, &compact).await?;
    if !verified.valid {
        return Err(Error::InvalidProof("signature verification failed".to_string()));
    }

    Ok(VerifiedProofJwt {
        header: compact.header,
        payload: compact.payload,
        signer_jwk: verified.signer_jwk,
    })
}

/// A Credential Response, mirroring the request's single/batch shape.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CredentialResponse {
    /// Response to a single-proof request.
    Single {
        /// The issued credential, in its format's native representation.
        credential: serde_json::Value,
        /// Echoes the requested format.
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    /// Response to a batch (`proofs`) request.
    Batch {
        /// The issued credentials, one per submitted proof.
        credentials: Vec<serde_json::Value>,
    },
}

/// Extra response-level fields shared by both response shapes.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CredentialResponseExtras {
    /// A fresh `c_nonce` for the wallet's next request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    /// Validity of `c_nonce`, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<i64>,
    /// Identifier the wallet echoes back in a later notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    /// Identifier for a deferred-issuance follow-up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Build a Credential Response mirroring the shape of the originating
/// request (single `credential` vs. batch `credentials`).
#[must_use]
pub fn create_credential_response(
    request: &CredentialRequest, credentials: Vec<serde_json::Value>, format: Option<String>,
) -> CredentialResponse {
    match &request.proofs {
        Some(OneMany::Many(_)) => CredentialResponse::Batch { credentials },
        _ => CredentialResponse::Single {
            credential: credentials.into_iter().next().unwrap_or(serde_json::Value::Null),
            format,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_proof_request() {
        let body = r#"{
            "format": "vc+sd-jwt",
            "vct": "https://sd-jwt",
            "proof": {"proof_type": "jwt", "jwt": "abc.def.ghi"}
        }"#;
        let request = parse_credential_request(body).unwrap();
        assert!(matches!(request.selector, CredentialSelector::Format { .. }));
        assert!(matches!(request.proofs, Some(OneMany::One(_))));
    }

    #[test]
    fn reject_both_proof_and_proofs() {
        let body = r#"{
            "format": "vc+sd-jwt",
            "proof": {"proof_type": "jwt", "jwt": "a.b.c"},
            "proofs": {"jwt": ["a.b.c"]}
        }"#;
        let err = parse_credential_request(body).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn reject_both_identifier_and_format() {
        let body = r#"{"credential_identifier": "id1", "format": "vc+sd-jwt"}"#;
        assert!(parse_credential_request(body).is_err());
    }

    #[test]
    fn parse_batch_proofs() {
        let body = r#"{
            "format": "vc+sd-jwt",
            "proofs": {"jwt": ["a.b.c", "d.e.f"]}
        }"#;
        let request = parse_credential_request(body).unwrap();
        match request.proofs {
            Some(OneMany::Many(proofs)) => assert_eq!(proofs.len(), 2),
            _ => panic!("expected batch proofs"),
        }
    }

    #[test]
    fn response_mirrors_single_request_shape() {
        let request = CredentialRequest {
            selector: CredentialSelector::Format {
                format: "vc+sd-jwt".to_string(),
                additional: Default::default(),
            },
            proofs: Some(OneMany::One(Proof::Jwt { jwt: "a.b.c".to_string() })),
        };
        let response =
            create_credential_response(&request, vec![serde_json::json!("X")], Some("vc+sd-jwt".to_string()));
        assert!(matches!(response, CredentialResponse::Single { .. }));
    }
}
