//! §8 scenarios 1 and 2: pre-authorized-code issuance, with and without a
//! transaction code, across the draft-13/draft-11 offer shapes.

mod common;

use common::{FixedRandom, StubCrypto};
use oid4vci_core::callback::Sha2Hasher;
use oid4vci_core::oauth::client::{DpopKey, retrieve_pre_authorized_code_access_token};
use oid4vci_core::oauth::server::{
    AccessTokenClaimsParams, AccessTokenRequest, ExpectedPreAuthorizedCode, create_access_token_jwt,
    create_access_token_response, parse_access_token_request, verify_pre_authorized_code_access_token_request,
};
use oid4vci_core::offer::resolve_credential_offer;

/// Scenario 1: draft-13 offer, pre-authorized code, no tx_code, no DPoP.
/// The wallet resolves the offer, redeems the code, and receives a bearer
/// access token — matching the exact wire fixture in
/// `oauth::server`'s own `scenario1_pre_authorized_request_body` test.
#[tokio::test]
async fn scenario1_pre_authorized_no_dpop() {
    let offer_json = serde_json::json!({
        "credential_issuer": "https://issuer.example.com",
        "credential_configuration_ids": ["UniversityDegree_JWT"],
        "grants": {
            "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                "pre-authorized_code": "abc"
            }
        }
    });
    let offer_uri =
        format!("openid-credential-offer://?credential_offer={}", urlencoding::encode(&offer_json.to_string()));

    let fetcher = common::MockFetcher::new();
    let offer = resolve_credential_offer(&offer_uri, &fetcher).await.unwrap();
    let grant = offer.pre_authorized_code().unwrap();
    assert_eq!(grant.pre_authorized_code, "abc");
    assert!(grant.tx_code.is_none());

    // --- issuer side: a token request arrives ---
    let body = "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Apre-authorized_code&pre-authorized_code=abc";
    let request = parse_access_token_request(body, None).unwrap();
    assert!(matches!(request, AccessTokenRequest::PreAuthorizedCode { .. }));

    let expected = ExpectedPreAuthorizedCode {
        code: "abc",
        tx_code: None,
        htm: "POST",
        htu: "https://as.example.com/token",
        expected_dpop_nonce: None,
        now: 1_700_000_000,
        skew: 60,
    };
    let verified =
        verify_pre_authorized_code_access_token_request(&request, expected, &Sha2Hasher, &StubCrypto)
            .await
            .unwrap();
    assert!(verified.dpop_jkt.is_none());

    let signer_id = oid4vci_core::callback::Signer::Jwk { public_jwk: common::sample_jwk(), alg: "ES256".into() };
    let access_token = create_access_token_jwt(
        AccessTokenClaimsParams {
            iss: "https://as.example.com",
            aud: "https://issuer.example.com",
            sub: "wallet-1",
            iat: 1_700_000_000,
            expires_in_seconds: 3600,
            scope: None,
            client_id: None,
            dpop_jkt: None,
        },
        &FixedRandom,
        &signer_id,
        &StubCrypto,
    )
    .await
    .unwrap();
    let response = create_access_token_response(access_token, "Bearer", 3600, None, Some("fresh-nonce".into()), Some(300));
    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.c_nonce.as_deref(), Some("fresh-nonce"));
}

/// Scenario 2: draft-11 offer (`credentials` + `user_pin_required: true`)
/// normalizes to a `tx_code`, and the wallet submits the legacy `user_pin`
/// form field a draft-11 token endpoint expects.
#[tokio::test]
async fn scenario2_pre_authorized_with_tx_code_draft11() {
    let offer_json = serde_json::json!({
        "credential_issuer": "https://issuer.example.com",
        "credentials": ["UniversityDegree_JWT"],
        "grants": {
            "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                "pre-authorized_code": "abc",
                "user_pin_required": true
            }
        }
    });
    let offer_uri =
        format!("openid-credential-offer://?credential_offer={}", urlencoding::encode(&offer_json.to_string()));

    let fetcher = common::MockFetcher::new();
    let offer = resolve_credential_offer(&offer_uri, &fetcher).await.unwrap();
    assert_eq!(offer.credential_configuration_ids, vec!["UniversityDegree_JWT".to_string()]);
    let grant = offer.pre_authorized_code().unwrap();
    assert!(grant.tx_code.is_some());

    // Wallet retrieves the token, supplying the PIN as legacy `user_pin`.
    let token_url = "https://as.example.com/token";
    let server = oid4vci_core::metadata::AuthorizationServerMetadata {
        issuer: "https://as.example.com".into(),
        token_endpoint: token_url.into(),
        ..Default::default()
    };
    fetcher.queue(
        token_url,
        common::ok_json(serde_json::json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": 3600
        })),
    );
    let acquisition = retrieve_pre_authorized_code_access_token(
        &server,
        "abc",
        Some("1234"),
        true, // legacy_user_pin: this token endpoint is draft-11.
        None::<&DpopKey>,
        &fetcher,
        &FixedRandom,
        &Sha2Hasher,
        &StubCrypto,
    )
    .await
    .unwrap();
    assert_eq!(acquisition.access_token_response.access_token, "at-1");

    let sent = fetcher.requests.lock().unwrap();
    let sent_body = String::from_utf8(sent[0].body.clone().unwrap()).unwrap();
    assert!(sent_body.contains("user_pin=1234"));
    assert!(!sent_body.contains("tx_code"));

    // Issuer side parses the wallet's own request body unmodified.
    let request = parse_access_token_request(&sent_body, None).unwrap();
    let expected = ExpectedPreAuthorizedCode {
        code: "abc",
        tx_code: Some("1234"),
        htm: "POST",
        htu: token_url,
        expected_dpop_nonce: None,
        now: 1_700_000_000,
        skew: 60,
    };
    let verified =
        verify_pre_authorized_code_access_token_request(&request, expected, &Sha2Hasher, &StubCrypto)
            .await
            .unwrap();
    assert!(verified.dpop_jkt.is_none());
}

/// A by-reference offer (`credential_offer_uri`) is fetched and normalized
/// the same way a by-value offer is.
#[tokio::test]
async fn by_reference_offer_is_fetched() {
    let fetcher = common::MockFetcher::new();
    let offer_json = serde_json::json!({
        "credential_issuer": "https://issuer.example.com",
        "credential_configuration_ids": ["UniversityDegree_JWT"],
        "grants": {
            "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                "pre-authorized_code": "xyz"
            }
        }
    });
    fetcher.queue("https://issuer.example.com/offers/1", common::ok_json(offer_json));
    let offer_uri = "openid-credential-offer://?credential_offer_uri=https%3A%2F%2Fissuer.example.com%2Foffers%2F1";
    let offer = resolve_credential_offer(offer_uri, &fetcher).await.unwrap();
    assert_eq!(offer.pre_authorized_code().unwrap().pre_authorized_code, "xyz");
}
