//! # Callback Surface
//!
//! The core never performs cryptography, time, randomness, or I/O itself.
//! Implementers inject narrow traits covering each external concern; the
//! core composes them with simple sequential await-style semantics (see
//! `SPEC_FULL.md` §5) and spawns no parallel work of its own, with the
//! single exception of concurrent metadata discovery.
//!
//! Each trait is deliberately small and single-purpose rather than one
//! god-`Provider` trait, so an implementer can mix and match (e.g. reuse an
//! existing JWKS-backed verifier while writing a bespoke `Fetcher`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Hash algorithms the core may ask a [`Hasher`] to compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlg {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

/// Computes a digest of caller-supplied bytes.
///
/// This is the one callback the core is also allowed to satisfy with a
/// built-in implementation ([`Sha2Hasher`]), since hashing (unlike signing)
/// carries no key material or HSM boundary. Implementers remain free to
/// substitute their own.
pub trait Hasher: Send + Sync {
    /// Hash `data` with the requested algorithm.
    fn hash(&self, alg: HashAlg, data: &[u8]) -> Vec<u8>;
}

/// The default [`Hasher`], backed by the `sha2` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha2Hasher;

impl Hasher for Sha2Hasher {
    fn hash(&self, alg: HashAlg, data: &[u8]) -> Vec<u8> {
        use sha2::{Digest, Sha256, Sha384, Sha512};
        match alg {
            HashAlg::Sha256 => Sha256::digest(data).to_vec(),
            HashAlg::Sha384 => Sha384::digest(data).to_vec(),
            HashAlg::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Supplies cryptographically strong random bytes.
///
/// There is no built-in implementation: unlike hashing, the strength of
/// this source is security-critical (PKCE verifiers, DPoP `jti`, access
/// token `jti`) and the core does not assume a particular RNG is available
/// in every target (e.g. `wasm32-unknown-unknown`).
pub trait RandomSource: Send + Sync {
    /// Produce `n` cryptographically strong random bytes.
    fn generate_random(&self, n: usize) -> Vec<u8>;
}

/// A signer identity, tagged by how the verifier will resolve its public
/// key. The core populates the matching JOSE header member
/// (`kid`/`jwk`/`x5c`) from this variant before calling
/// [`JwtSigner::sign_jwt`]; implementers of `custom` populate the header
/// themselves.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Signer {
    /// Key resolved via a DID URL; the core sets `kid` to `did_url`.
    Did {
        /// The DID URL identifying the verification method.
        did_url: String,
        /// Signing algorithm (e.g. `"ES256"`, `"EdDSA"`).
        alg: String,
    },
    /// Key embedded directly as a JWK in the header's `jwk` member.
    Jwk {
        /// The public JWK to embed.
        public_jwk: crate::jose::jwk::PublicJwk,
        /// Signing algorithm.
        alg: String,
    },
    /// Key attested via an X.509 certificate chain in the header's `x5c`
    /// member.
    X5c {
        /// DER certificates, base64-encoded, leaf-first.
        chain: Vec<String>,
        /// Signing algorithm.
        alg: String,
    },
    /// The caller populates the header entirely; the core passes it
    /// through untouched.
    Custom {
        /// Signing algorithm, so the core can still validate the proof
        /// shape it expects back.
        alg: String,
    },
}

impl Signer {
    /// The signing algorithm this signer uses.
    #[must_use]
    pub fn alg(&self) -> &str {
        match self {
            Self::Did { alg, .. } | Self::Jwk { alg, .. } | Self::X5c { alg, .. } | Self::Custom { alg } => {
                alg
            }
        }
    }
}

/// A JOSE header plus an arbitrary payload, passed to [`JwtSigner`] for
/// signing. `header` already carries the caller-requested claims
/// (`typ`, `alg`, and the key-identification member); `payload` is the
/// to-be-signed claim set, serialized to JSON bytes by the core.
#[derive(Clone, Debug)]
pub struct SigningInput {
    /// The JOSE header as a JSON object.
    pub header: serde_json::Map<String, serde_json::Value>,
    /// The JSON-serialized claim set.
    pub payload: Vec<u8>,
}

/// Produces a compact JWS. The core is never handed private key material;
/// it only ever asks an implementer to sign on its behalf.
pub trait JwtSigner: Send + Sync {
    /// Sign `input` with the key identified by `signer`, returning the
    /// compact `header.payload.signature` string.
    fn sign_jwt(
        &self, signer: &Signer, input: SigningInput,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// The outcome of verifying a compact JWS.
#[derive(Clone, Debug)]
pub struct VerifiedJwt {
    /// Whether the signature validated against the resolved key.
    pub valid: bool,
    /// The public JWK the signature was checked against, when the
    /// implementation was able to resolve one (e.g. not for `did:*`
    /// signers, which callers resolve out of band per §4.1).
    pub signer_jwk: Option<crate::jose::jwk::PublicJwk>,
}

/// A parsed-but-unverified compact JWT, as produced by
/// [`crate::jose::jwt::decode`].
#[derive(Clone, Debug)]
pub struct CompactJwt {
    /// The original `header.payload.signature` string.
    pub compact: String,
    /// Decoded header object.
    pub header: serde_json::Map<String, serde_json::Value>,
    /// Decoded payload object.
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Verifies a compact JWS against whatever key material the embedded
/// header (or an out-of-band resolver) identifies.
pub trait JwtVerifier: Send + Sync {
    /// Verify `jwt`. `signer_hint` is supplied when the caller already
    /// knows which signer variant produced the JWT (e.g. DPoP, where the
    /// public key travels in the proof's own `jwk` header member and no
    /// hint is needed); it may be `None`.
    fn verify_jwt(
        &self, signer_hint: Option<&Signer>, jwt: &CompactJwt,
    ) -> impl Future<Output = Result<VerifiedJwt>> + Send;
}

/// A transport-agnostic HTTP request, as built by this crate for the
/// [`Fetcher`] callback to execute.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: http::Method,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// A `GET` request with no body.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: http::Method::GET, url: url.into(), headers: HashMap::new(), body: None }
    }

    /// A `POST` request with an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn post_form(url: impl Into<String>, body: String) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        Self { method: http::Method::POST, url: url.into(), headers, body: Some(body.into_bytes()) }
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: &impl Serialize) -> Result<Self> {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let body = serde_json::to_vec(body).map_err(|e| crate::Error::JsonParseError(e.to_string()))?;
        Ok(Self { method: http::Method::POST, url: url.into(), headers, body: Some(body) })
    }
}

/// The response to an [`HttpRequest`].
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers (lowercased names).
    pub headers: HashMap<String, String>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// `true` for any 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A response header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers.iter().find(|(k, _)| k.to_ascii_lowercase() == name).map(|(_, v)| v.as_str())
    }

    /// Deserialize the body as JSON.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::JsonParseError(e.to_string()))
    }
}

/// Performs HTTP requests on behalf of the core. Expected to honor standard
/// HTTP semantics (redirects, timeouts are the implementer's concern — the
/// core installs none, per §5).
pub trait Fetcher: Send + Sync {
    /// Execute `request`, returning its response.
    fn fetch(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send;
}

/// Adjusts an outgoing token request to add client authentication.
///
/// Implementations typically add a `client_secret_basic` `Authorization`
/// header, a `client_secret_post` form field, a `private_key_jwt`
/// assertion, or an `attest_jwt_client_auth` pair — or do nothing, for a
/// `none`-authenticated public client.
pub trait ClientAuthenticator: Send + Sync {
    /// Mutate `form` (already populated with the grant-specific
    /// parameters) to add client authentication.
    fn authenticate(&self, form: &mut HashMap<String, String>) -> Result<()>;
}

/// A [`ClientAuthenticator`] that adds nothing — for public clients using
/// the `none` method.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoClientAuthentication;

impl ClientAuthenticator for NoClientAuthentication {
    fn authenticate(&self, _form: &mut HashMap<String, String>) -> Result<()> {
        Ok(())
    }
}
