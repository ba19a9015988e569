//! # PKCE (RFC 7636)
//!
//! Proof Key for Code Exchange: binds an authorization code to the client
//! that requested it. S256 must be preferred whenever the server advertises
//! it; `plain` is a last resort.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};

use crate::callback::{HashAlg, Hasher, RandomSource};
use crate::core::generate;

/// The code-challenge method negotiated for a PKCE exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum CodeChallengeMethod {
    /// `S256`: `code_challenge = base64url(sha256(code_verifier))`.
    #[serde(rename = "S256")]
    S256,
    /// `plain`: `code_challenge = code_verifier`.
    #[serde(rename = "plain")]
    Plain,
}

/// A PKCE verifier/challenge pair.
#[derive(Clone, Debug)]
pub struct Pkce {
    /// 43–128 character unreserved-character string, kept by the client.
    pub code_verifier: String,
    /// Sent in the authorization request.
    pub code_challenge: String,
    /// The method used to derive `code_challenge` from `code_verifier`.
    pub code_challenge_method: CodeChallengeMethod,
}

/// Build a PKCE pair, generating a `code_verifier` if the caller doesn't
/// supply one.
///
/// Per §4.4: if the server advertises `S256` support, it is used
/// regardless of any caller preference; otherwise `plain` is used only if
/// explicitly advertised; otherwise PKCE is omitted (`None`).
#[must_use]
pub fn negotiate(
    server_supported_methods: &[String], caller_code_verifier: Option<String>,
    rng: &dyn RandomSource, hasher: &dyn Hasher,
) -> Option<Pkce> {
    let code_verifier = caller_code_verifier.unwrap_or_else(|| generate::code_verifier(rng));

    if server_supported_methods.iter().any(|m| m == "S256") {
        let code_challenge = code_challenge(&code_verifier, hasher);
        return Some(Pkce { code_verifier, code_challenge, code_challenge_method: CodeChallengeMethod::S256 });
    }
    if server_supported_methods.iter().any(|m| m == "plain") {
        return Some(Pkce {
            code_challenge: code_verifier.clone(),
            code_verifier,
            code_challenge_method: CodeChallengeMethod::Plain,
        });
    }
    None
}

/// `code_challenge = base64url(sha256(code_verifier))`.
#[must_use]
pub fn code_challenge(code_verifier: &str, hasher: &dyn Hasher) -> String {
    let digest = hasher.hash(HashAlg::Sha256, code_verifier.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}

/// Recompute `code_challenge` from `code_verifier` per `method` and compare
/// to the stored `expected_challenge` in constant time.
#[must_use]
pub fn verify(
    code_verifier: &str, method: CodeChallengeMethod, expected_challenge: &str, hasher: &dyn Hasher,
) -> bool {
    let computed = match method {
        CodeChallengeMethod::S256 => code_challenge(code_verifier, hasher),
        CodeChallengeMethod::Plain => code_verifier.to_string(),
    };
    crate::core::strings::constant_time_eq(computed.as_bytes(), expected_challenge.as_bytes())
}
