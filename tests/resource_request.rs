//! §8 scenario 5: a resource request is rejected when the presented DPoP
//! proof's key does not match the access token's `cnf.jkt` binding.

mod common;

use oid4vci_core::callback::Sha2Hasher;
use oid4vci_core::dpop::{self, ProofParams};
use oid4vci_core::jose::jwt::{append_signature, signing_input};
use oid4vci_core::metadata::AuthorizationServerMetadata;
use oid4vci_core::resource::{AuthenticationScheme, VerifyResourceRequestParams, verify_resource_request};
use oid4vci_core::Error;

fn server() -> AuthorizationServerMetadata {
    AuthorizationServerMetadata {
        issuer: "https://as.example.com".into(),
        token_endpoint: "https://as.example.com/token".into(),
        jwks_uri: Some("https://as.example.com/jwks".into()),
        ..Default::default()
    }
}

async fn build_access_token(cnf_jkt: &str) -> String {
    let header = serde_json::Map::from_iter([
        ("typ".to_string(), serde_json::json!("at+jwt")),
        ("alg".to_string(), serde_json::json!("ES256")),
    ]);
    let payload = serde_json::to_vec(&serde_json::json!({
        "iss": "https://as.example.com",
        "aud": "https://issuer.example.com/credential",
        "sub": "wallet-1",
        "iat": 1_700_000_000,
        "exp": 1_900_000_000,
        "cnf": { "jkt": cnf_jkt }
    }))
    .unwrap();
    let input = signing_input(&header, &payload).unwrap();
    append_signature(&input, b"fake-signature")
}

#[tokio::test]
async fn scenario5_dpop_key_mismatch_rejected() {
    let server = server();
    let fetcher = common::MockFetcher::new();
    // Queued twice: one jwks fetch per `verify_resource_request` call below.
    fetcher.queue("https://as.example.com/jwks", common::ok_json(serde_json::json!({ "keys": [] })));
    fetcher.queue("https://as.example.com/jwks", common::ok_json(serde_json::json!({ "keys": [] })));

    let bound_jkt = common::sample_jwk().thumbprint(&Sha2Hasher).unwrap();
    let access_token = build_access_token(&bound_jkt).await;

    // The presenting wallet signs its DPoP proof with a *different* key.
    let mismatched_proof = dpop::create(
        ProofParams {
            public_jwk: common::other_jwk(),
            alg: "ES256".to_string(),
            htm: "POST",
            htu: "https://issuer.example.com/credential",
            access_token: Some(&access_token),
            nonce: None,
            now: 1_700_000_100,
        },
        &common::FixedRandom,
        &Sha2Hasher,
        &common::StubCrypto,
    )
    .await
    .unwrap();

    let authorization_header = format!("DPoP {access_token}");
    let err = verify_resource_request(
        VerifyResourceRequestParams {
            authorization_header: &authorization_header,
            dpop_header: Some(&mismatched_proof),
            htm: "POST",
            htu: "https://issuer.example.com/credential",
            authorization_servers: std::slice::from_ref(&server),
            resource_server: "https://issuer.example.com/credential",
            allowed_authentication_schemes: &[AuthenticationScheme::Dpop],
            now: 1_700_000_100,
            skew: 60,
        },
        &Sha2Hasher,
        &fetcher,
        &common::StubCrypto,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InvalidDpopProof(_)));

    // The legitimately-bound key, by contrast, verifies cleanly.
    let matching_proof = dpop::create(
        ProofParams {
            public_jwk: common::sample_jwk(),
            alg: "ES256".to_string(),
            htm: "POST",
            htu: "https://issuer.example.com/credential",
            access_token: Some(&access_token),
            nonce: None,
            now: 1_700_000_100,
        },
        &common::FixedRandom,
        &Sha2Hasher,
        &common::StubCrypto,
    )
    .await
    .unwrap();

    let verified = verify_resource_request(
        VerifyResourceRequestParams {
            authorization_header: &authorization_header,
            dpop_header: Some(&matching_proof),
            htm: "POST",
            htu: "https://issuer.example.com/credential",
            authorization_servers: std::slice::from_ref(&server),
            resource_server: "https://issuer.example.com/credential",
            allowed_authentication_schemes: &[AuthenticationScheme::Dpop],
            now: 1_700_000_100,
            skew: 60,
        },
        &Sha2Hasher,
        &fetcher,
        &common::StubCrypto,
    )
    .await
    .unwrap();
    assert_eq!(verified.dpop_jkt.as_deref(), Some(bound_jkt.as_str()));
}
