//! Shared fixtures for the end-to-end scenario tests (§8).

use std::collections::HashMap;
use std::sync::Mutex;

use base64ct::{Base64UrlUnpadded, Encoding};
use oid4vci_core::callback::{
    CompactJwt, Fetcher, HttpRequest, HttpResponse, JwtSigner, JwtVerifier, RandomSource, Signer,
    SigningInput, VerifiedJwt,
};
use oid4vci_core::error::Result;
use oid4vci_core::jose::jwk::PublicJwk;

/// A `RandomSource` that returns a fixed, counting-up byte sequence, so
/// fixture assertions are stable across runs.
pub struct FixedRandom;

impl RandomSource for FixedRandom {
    fn generate_random(&self, n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 256) as u8).collect()
    }
}

/// A `Fetcher` backed by a URL-keyed table of canned responses, serving
/// them in the order queued and recording every request it saw.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Vec<HttpResponse>>>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` to be returned the next time `url` is requested.
    /// Multiple calls for the same URL queue multiple responses, served
    /// front-to-back (used for the DPoP nonce-retry scenario).
    pub fn queue(&self, url: impl Into<String>, response: HttpResponse) {
        self.responses.lock().unwrap().entry(url.into()).or_default().push(response);
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = {
            let mut responses = self.responses.lock().unwrap();
            let queue = responses.get_mut(&request.url);
            queue.filter(|q| !q.is_empty()).map(|q| q.remove(0))
        };
        self.requests.lock().unwrap().push(request.clone());
        response.ok_or_else(|| {
            oid4vci_core::Error::InvalidFetchResponse(format!("no mock response for {}", request.url))
        })
    }
}

fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse { status, headers: HashMap::new(), body: serde_json::to_vec(&body).unwrap() }
}

/// Build a JSON 2xx response.
pub fn ok_json(body: serde_json::Value) -> HttpResponse {
    json_response(200, body)
}

/// Build a JSON error response with the given status.
pub fn err_json(status: u16, body: serde_json::Value) -> HttpResponse {
    json_response(status, body)
}

/// Attach a header to a response (builder-style, for `DPoP-Nonce` /
/// `WWW-Authenticate`).
pub fn with_header(mut response: HttpResponse, name: &str, value: &str) -> HttpResponse {
    response.headers.insert(name.to_string(), value.to_string());
    response
}

/// A `JwtSigner`/`JwtVerifier` pair that "signs" by embedding the header
/// and payload as given and "verifies" by trusting any structurally
/// decodable JWT — standing in for real asymmetric cryptography, which is
/// explicitly out of scope for this crate (§1: implementers inject their
/// own).
pub struct StubCrypto;

impl JwtSigner for StubCrypto {
    async fn sign_jwt(&self, _signer: &Signer, input: SigningInput) -> Result<String> {
        let header_json = serde_json::to_vec(&input.header).unwrap();
        Ok(format!(
            "{}.{}.{}",
            Base64UrlUnpadded::encode_string(&header_json),
            Base64UrlUnpadded::encode_string(&input.payload),
            Base64UrlUnpadded::encode_string(b"stub-signature"),
        ))
    }
}

impl JwtVerifier for StubCrypto {
    async fn verify_jwt(&self, _signer_hint: Option<&Signer>, jwt: &CompactJwt) -> Result<VerifiedJwt> {
        let signer_jwk = jwt
            .header
            .get("jwk")
            .cloned()
            .and_then(|v| serde_json::from_value::<PublicJwk>(v).ok());
        Ok(VerifiedJwt { valid: true, signer_jwk })
    }
}

/// A sample EC P-256 public key, matching the one used in `dpop.rs`'s own
/// unit tests.
pub fn sample_jwk() -> PublicJwk {
    PublicJwk {
        kty: "EC".to_string(),
        crv: Some("P-256".to_string()),
        x: Some("f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU".to_string()),
        y: Some("x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0".to_string()),
        n: None,
        e: None,
        kid: None,
        alg: None,
        additional: Default::default(),
    }
}

/// A second, distinct EC P-256 public key, for mismatch scenarios.
pub fn other_jwk() -> PublicJwk {
    PublicJwk {
        kty: "EC".to_string(),
        crv: Some("P-256".to_string()),
        x: Some("MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4".to_string()),
        y: Some("4Etl6SRW2YiLUrN5vfvMzUyyg1kQiqUE8VirHqUAqyw".to_string()),
        n: None,
        e: None,
        kid: None,
        alg: None,
        additional: Default::default(),
    }
}
