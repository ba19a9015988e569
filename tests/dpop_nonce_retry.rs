//! §8 scenario 6: the DPoP nonce handshake retries exactly once. A second,
//! immediate `use_dpop_nonce` rejection is not retried again and surfaces
//! to the caller as a structured error.

mod common;

use oid4vci_core::callback::Sha2Hasher;
use oid4vci_core::metadata::AuthorizationServerMetadata;
use oid4vci_core::oauth::client::{DpopKey, retrieve_pre_authorized_code_access_token};
use oid4vci_core::Error;

fn server() -> AuthorizationServerMetadata {
    AuthorizationServerMetadata {
        issuer: "https://as.example.com".into(),
        token_endpoint: "https://as.example.com/token".into(),
        dpop_signing_alg_values_supported: vec!["ES256".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn nonce_retry_succeeds_once() {
    let server = server();
    let fetcher = common::MockFetcher::new();
    let dpop_key = DpopKey { public_jwk: common::sample_jwk(), alg: "ES256".to_string() };

    fetcher.queue(
        "https://as.example.com/token",
        common::with_header(
            common::err_json(400, serde_json::json!({"error": "use_dpop_nonce"})),
            "DPoP-Nonce",
            "N1",
        ),
    );
    fetcher.queue(
        "https://as.example.com/token",
        common::ok_json(serde_json::json!({
            "access_token": "at-1",
            "token_type": "DPoP",
            "expires_in": 3600
        })),
    );

    let acquisition = retrieve_pre_authorized_code_access_token(
        &server,
        "abc",
        None,
        false,
        Some(&dpop_key),
        &fetcher,
        &common::FixedRandom,
        &Sha2Hasher,
        &common::StubCrypto,
    )
    .await
    .unwrap();
    assert_eq!(acquisition.access_token_response.access_token, "at-1");

    let sent = fetcher.requests.lock().unwrap();
    assert_eq!(sent.iter().filter(|r| r.url == "https://as.example.com/token").count(), 2);
}

#[tokio::test]
async fn second_immediate_nonce_challenge_is_not_retried_again() {
    let server = server();
    let fetcher = common::MockFetcher::new();
    let dpop_key = DpopKey { public_jwk: common::sample_jwk(), alg: "ES256".to_string() };

    fetcher.queue(
        "https://as.example.com/token",
        common::with_header(
            common::err_json(400, serde_json::json!({"error": "use_dpop_nonce"})),
            "DPoP-Nonce",
            "N1",
        ),
    );
    // The retry, bound to N1, is rejected with a fresh nonce challenge too —
    // this crate retries the handshake exactly once and surfaces the rest.
    fetcher.queue(
        "https://as.example.com/token",
        common::with_header(
            common::err_json(400, serde_json::json!({"error": "use_dpop_nonce"})),
            "DPoP-Nonce",
            "N2",
        ),
    );

    let err = retrieve_pre_authorized_code_access_token(
        &server,
        "abc",
        None,
        false,
        Some(&dpop_key),
        &fetcher,
        &common::FixedRandom,
        &Sha2Hasher,
        &common::StubCrypto,
    )
    .await
    .unwrap_err();

    match err {
        Error::Oauth2ClientError { error, .. } => assert_eq!(error, "use_dpop_nonce"),
        other => panic!("expected Oauth2ClientError, got {other:?}"),
    }

    let sent = fetcher.requests.lock().unwrap();
    assert_eq!(sent.iter().filter(|r| r.url == "https://as.example.com/token").count(), 2);
}
