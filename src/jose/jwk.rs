//! # JSON Web Key
//!
//! A minimal public-JWK representation covering the key types this crate
//! needs to reason about (EC, OKP, RSA), plus the RFC 7638 thumbprint
//! computation used for DPoP `cnf.jkt` binding.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};

use crate::callback::{HashAlg, Hasher};
use crate::error::{Error, Result};

/// A public JSON Web Key.
///
/// Only the members needed to compute an RFC 7638 thumbprint and to
/// populate/recognize a DPoP proof header are modeled; unknown members
/// round-trip via `additional`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PublicJwk {
    /// Key type: `"EC"`, `"OKP"`, or `"RSA"`.
    pub kty: String,

    /// Curve, for `EC`/`OKP` keys (e.g. `"P-256"`, `"Ed25519"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// `EC`/`OKP` x-coordinate, base64url-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// `EC` y-coordinate, base64url-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// `RSA` modulus, base64url-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// `RSA` public exponent, base64url-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Any other members present on the key, preserved verbatim.
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

impl PublicJwk {
    /// Compute the RFC 7638 JWK thumbprint: a base64url-encoded digest over
    /// the JSON object formed from the key's *required* members only, with
    /// members in lexicographic key order and no insignificant whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the key type is unrecognized or
    /// missing required members.
    pub fn thumbprint(&self, hasher: &dyn Hasher) -> Result<String> {
        let canonical = self.canonical_json()?;
        let digest = hasher.hash(HashAlg::Sha256, canonical.as_bytes());
        Ok(Base64UrlUnpadded::encode_string(&digest))
    }

    /// The canonical JSON string hashed to produce the thumbprint (exposed
    /// for testing and for callers that hash with their own implementation
    /// of SHA-256).
    pub fn canonical_json(&self) -> Result<String> {
        match self.kty.as_str() {
            "EC" => {
                let (crv, x, y) = (
                    self.crv.as_deref().ok_or_else(|| invalid("EC key missing crv"))?,
                    self.x.as_deref().ok_or_else(|| invalid("EC key missing x"))?,
                    self.y.as_deref().ok_or_else(|| invalid("EC key missing y"))?,
                );
                Ok(format!(r#"{{"crv":"{crv}","kty":"EC","x":"{x}","y":"{y}"}}"#))
            }
            "OKP" => {
                let (crv, x) = (
                    self.crv.as_deref().ok_or_else(|| invalid("OKP key missing crv"))?,
                    self.x.as_deref().ok_or_else(|| invalid("OKP key missing x"))?,
                );
                Ok(format!(r#"{{"crv":"{crv}","kty":"OKP","x":"{x}"}}"#))
            }
            "RSA" => {
                let (e, n) = (
                    self.e.as_deref().ok_or_else(|| invalid("RSA key missing e"))?,
                    self.n.as_deref().ok_or_else(|| invalid("RSA key missing n"))?,
                );
                Ok(format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#))
            }
            other => Err(invalid(format!("unsupported key type: {other}"))),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> Error {
    Error::ValidationError(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Sha2Hasher;

    /// RFC 7638 §3.1 worked example.
    #[test]
    fn rfc7638_rsa_example() {
        let jwk = PublicJwk {
            kty: "RSA".into(),
            crv: None,
            x: None,
            y: None,
            n: Some(
                "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxu\
                 hDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5\
                 w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5ha\
                 jrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqb\
                 w0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw"
                    .into(),
            ),
            e: Some("AQAB".into()),
            kid: None,
            alg: None,
            additional: Default::default(),
        };
        let thumb = jwk.thumbprint(&Sha2Hasher).unwrap();
        assert_eq!(thumb, "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs");
    }

    #[test]
    fn unsupported_kty_errors() {
        let jwk = PublicJwk {
            kty: "oct".into(),
            crv: None,
            x: None,
            y: None,
            n: None,
            e: None,
            kid: None,
            alg: None,
            additional: Default::default(),
        };
        assert!(jwk.thumbprint(&Sha2Hasher).is_err());
    }
}
