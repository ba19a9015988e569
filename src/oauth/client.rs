//! # OAuth 2.0 Client — Authorization and Token Acquisition
//!
//! Drives the wallet side of an OID4VCI exchange: deciding among
//! Authorization Challenge, PAR, and plain-redirect authorization (§4.4),
//! and acquiring an access token via either grant with the DPoP
//! nonce-retry-once handshake (§4.5).

use std::collections::HashMap;

use serde::Deserialize;
use tracing::instrument;

use crate::callback::{ClientAuthenticator, Fetcher, Hasher, HttpRequest, JwtSigner, RandomSource};
use crate::core::pkce::{self, Pkce};
use crate::dpop;
use crate::error::{Error, Result};
use crate::metadata::AuthorizationServerMetadata;
use crate::oauth::server::AccessTokenResponse;
use crate::{invalid, oauth2_error};

/// The path an `initiate_authorization` call took.
#[derive(Clone, Debug)]
pub enum AuthorizationFlow {
    /// The authorization-challenge endpoint returned a code directly; the
    /// wallet may go straight to the token endpoint with it.
    AuthorizationChallenge {
        /// The authorization code to redeem.
        authorization_code: String,
    },
    /// A PAR request (or an equivalent `redirect_to_web` challenge
    /// response) succeeded; the wallet must direct the end-user to `url`.
    Oauth2Redirect {
        /// The authorization URL to navigate to.
        url: String,
        /// The PKCE pair used, so the wallet can later redeem the code.
        pkce: Option<Pkce>,
    },
    /// The authorization server wants an OID4VP presentation before it
    /// will continue.
    PresentationDuringIssuance {
        /// The `openid4vp://` request URL to present against.
        oid4vp_request_url: String,
        /// Session identifier to resume the challenge with.
        auth_session: String,
    },
}

/// Inputs to [`initiate_authorization`].
#[derive(Clone, Debug)]
pub struct InitiateAuthorizationParams<'a> {
    /// The client identifier.
    pub client_id: &'a str,
    /// Requested scope, if any.
    pub scope: Option<&'a str>,
    /// The redirect URI the authorization response will return to.
    pub redirect_uri: Option<&'a str>,
    /// `issuer_state`/state to correlate this request with an offer.
    pub state: Option<&'a str>,
    /// The caller's PKCE code_verifier preference, if any.
    pub code_verifier: Option<String>,
    /// If resuming a presentation-during-issuance challenge, the session
    /// established by the prior response.
    pub presentation_during_issuance_session: Option<&'a str>,
}

/// Decide how to authorize against `server`, following the ordered policy
/// in §4.4: Authorization Challenge, then PAR, then a plain redirect.
#[instrument(level = "debug", skip(fetcher, client_auth, rng, hasher))]
pub async fn initiate_authorization(
    server: &AuthorizationServerMetadata, params: InitiateAuthorizationParams<'_>,
    fetcher: &impl Fetcher, client_auth: &impl ClientAuthenticator, rng: &dyn RandomSource,
    hasher: &dyn Hasher,
) -> Result<AuthorizationFlow> {
    let pkce = pkce::negotiate(
        &server.code_challenge_methods_supported,
        params.code_verifier.clone(),
        rng,
        hasher,
    );

    if let Some(challenge_endpoint) = server.authorization_challenge_endpoint.as_deref() {
        return initiate_via_challenge(challenge_endpoint, server, &params, pkce, fetcher).await;
    }

    if server.require_pushed_authorization_requests
        || server.pushed_authorization_request_endpoint.is_some()
    {
        let Some(par_endpoint) = &server.pushed_authorization_request_endpoint else {
            return Err(oauth2_error!(
                "require_pushed_authorization_requests set with no pushed_authorization_request_endpoint"
            ));
        };
        return initiate_via_par(par_endpoint, server, &params, pkce, fetcher, client_auth).await;
    }

    let Some(authorization_endpoint) = &server.authorization_endpoint else {
        return Err(oauth2_error!("server advertises no authorization_endpoint"));
    };
    let url = build_authorization_url(authorization_endpoint, server.issuer.as_str(), &params, pkce.as_ref());
    Ok(AuthorizationFlow::Oauth2Redirect { url, pkce })
}

async fn initiate_via_challenge(
    challenge_endpoint: &str, server: &AuthorizationServerMetadata,
    params: &InitiateAuthorizationParams<'_>, pkce: Option<Pkce>, fetcher: &impl Fetcher,
) -> Result<AuthorizationFlow> {
    let mut form = HashMap::new();
    form.insert("client_id".to_string(), params.client_id.to_string());
    if let Some(scope) = params.scope {
        form.insert("scope".to_string(), scope.to_string());
    }
    if let Some(pkce) = &pkce {
        form.insert("code_challenge".to_string(), pkce.code_challenge.clone());
        form.insert(
            "code_challenge_method".to_string(),
            match pkce.code_challenge_method {
                pkce::CodeChallengeMethod::S256 => "S256".to_string(),
                pkce::CodeChallengeMethod::Plain => "plain".to_string(),
            },
        );
    }
    if let Some(session) = params.presentation_during_issuance_session {
        form.insert("presentation_during_issuance_session".to_string(), session.to_string());
    }

    let body = crate::core::urlencode::to_string(&form)?;
    let response = fetcher
        .fetch(HttpRequest::post_form(challenge_endpoint, body))
        .await?;

    if response.is_success() {
        #[derive(Deserialize)]
        struct ChallengeSuccess {
            authorization_code: String,
        }
        let success: ChallengeSuccess = response.json()?;
        return Ok(AuthorizationFlow::AuthorizationChallenge {
            authorization_code: success.authorization_code,
        });
    }

    #[derive(Deserialize)]
    struct ChallengeError {
        error: String,
        request_uri: Option<String>,
        presentation: Option<String>,
        auth_session: Option<String>,
    }
    let body: ChallengeError = response.json()?;

    match body.error.as_str() {
        "redirect_to_web" => {
            if let Some(request_uri) = body.request_uri {
                let authorization_endpoint = server
                    .authorization_endpoint
                    .as_deref()
                    .ok_or_else(|| oauth2_error!("no authorization_endpoint for redirect_to_web"))?;
                let url = format!(
                    "{authorization_endpoint}?request_uri={}&client_id={}",
                    urlencoding::encode(&request_uri),
                    urlencoding::encode(params.client_id)
                );
                return Ok(AuthorizationFlow::Oauth2Redirect { url, pkce });
            }
            Err(oauth2_error!("redirect_to_web without request_uri not handled by this path"))
        }
        "insufficient_authorization" => {
            let presentation = body
                .presentation
                .ok_or_else(|| invalid!("insufficient_authorization missing presentation"))?;
            let auth_session = body
                .auth_session
                .ok_or_else(|| invalid!("insufficient_authorization missing auth_session"))?;
            Ok(AuthorizationFlow::PresentationDuringIssuance {
                oid4vp_request_url: presentation,
                auth_session,
            })
        }
        other => Err(Error::Oauth2ClientError { error: other.to_string(), description: String::new() }),
    }
}

async fn initiate_via_par(
    par_endpoint: &str, server: &AuthorizationServerMetadata, params: &InitiateAuthorizationParams<'_>,
    pkce: Option<Pkce>, fetcher: &impl Fetcher, client_auth: &impl ClientAuthenticator,
) -> Result<AuthorizationFlow> {
    let mut form = HashMap::new();
    form.insert("client_id".to_string(), params.client_id.to_string());
    form.insert("response_type".to_string(), "code".to_string());
    if let Some(scope) = params.scope {
        form.insert("scope".to_string(), scope.to_string());
    }
    if let Some(redirect_uri) = params.redirect_uri {
        form.insert("redirect_uri".to_string(), redirect_uri.to_string());
    }
    if let Some(state) = params.state {
        form.insert("state".to_string(), state.to_string());
    }
    if let Some(pkce) = &pkce {
        form.insert("code_challenge".to_string(), pkce.code_challenge.clone());
        form.insert(
            "code_challenge_method".to_string(),
            match pkce.code_challenge_method {
                pkce::CodeChallengeMethod::S256 => "S256".to_string(),
                pkce::CodeChallengeMethod::Plain => "plain".to_string(),
            },
        );
    }
    client_auth.authenticate(&mut form)?;

    let body = crate::core::urlencode::to_string(&form)?;
    let response = fetcher.fetch(HttpRequest::post_form(par_endpoint, body)).await?;
    if !response.is_success() {
        return Err(decode_client_error(&response));
    }

    #[derive(Deserialize)]
    struct ParResponse {
        request_uri: String,
    }
    let par: ParResponse = response.json()?;

    let authorization_endpoint = server
        .authorization_endpoint
        .as_deref()
        .ok_or_else(|| oauth2_error!("server advertises no authorization_endpoint"))?;
    let url = format!(
        "{authorization_endpoint}?request_uri={}&client_id={}",
        urlencoding::encode(&par.request_uri),
        urlencoding::encode(params.client_id)
    );
    Ok(AuthorizationFlow::Oauth2Redirect { url, pkce })
}

fn build_authorization_url(
    authorization_endpoint: &str, _issuer: &str, params: &InitiateAuthorizationParams<'_>,
    pkce: Option<&Pkce>,
) -> String {
    let mut pairs = vec![
        ("response_type".to_string(), "code".to_string()),
        ("client_id".to_string(), params.client_id.to_string()),
    ];
    if let Some(scope) = params.scope {
        pairs.push(("scope".to_string(), scope.to_string()));
    }
    if let Some(redirect_uri) = params.redirect_uri {
        pairs.push(("redirect_uri".to_string(), redirect_uri.to_string()));
    }
    if let Some(state) = params.state {
        pairs.push(("state".to_string(), state.to_string()));
    }
    if let Some(pkce) = pkce {
        pairs.push(("code_challenge".to_string(), pkce.code_challenge.clone()));
        pairs.push((
            "code_challenge_method".to_string(),
            match pkce.code_challenge_method {
                pkce::CodeChallengeMethod::S256 => "S256".to_string(),
                pkce::CodeChallengeMethod::Plain => "plain".to_string(),
            },
        ));
    }

    let query = pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(&k), urlencoding::encode(&v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{authorization_endpoint}?{query}")
}

/// The DPoP key material a caller supplies for token/credential requests
/// that use sender-constrained tokens.
#[derive(Clone)]
pub struct DpopKey {
    /// The public JWK, embedded in every proof this key produces.
    pub public_jwk: crate::jose::jwk::PublicJwk,
    /// Signing algorithm.
    pub alg: String,
}

/// The outcome of a successful token acquisition.
#[derive(Clone, Debug)]
pub struct TokenAcquisition {
    /// The token endpoint's response body.
    pub access_token_response: AccessTokenResponse,
    /// The most recent server-issued DPoP nonce, if any, for the wallet
    /// to carry into its next DPoP-bound request.
    pub dpop_nonce: Option<String>,
}

/// Acquire an access token via the pre-authorized-code grant (§4.5).
///
/// `legacy_user_pin` selects the form field the PIN travels in: `false`
/// sends the draft-14 `tx_code`; `true` sends the draft-11 `user_pin`
/// instead, for a token endpoint the caller has determined (e.g. from
/// issuer-metadata discovery, or from the offer having arrived in the
/// draft-11 `credentials`/`user_pin_required` shape) is still running the
/// legacy wire format. The server side of this crate accepts either field
/// unconditionally (`AccessTokenRequest::PreAuthorizedCode` carries both),
/// so only the wallet needs this distinction.
#[instrument(level = "debug", skip(fetcher, rng, hasher, signer, dpop_key))]
pub async fn retrieve_pre_authorized_code_access_token(
    server: &AuthorizationServerMetadata, pre_authorized_code: &str, tx_code: Option<&str>,
    legacy_user_pin: bool, dpop_key: Option<&DpopKey>, fetcher: &impl Fetcher, rng: &dyn RandomSource,
    hasher: &dyn Hasher, signer: &impl JwtSigner,
) -> Result<TokenAcquisition> {
    let mut form = HashMap::new();
    form.insert(
        "grant_type".to_string(),
        crate::oauth::server::GRANT_PRE_AUTHORIZED_CODE.to_string(),
    );
    form.insert("pre-authorized_code".to_string(), pre_authorized_code.to_string());
    if let Some(tx_code) = tx_code {
        let field = if legacy_user_pin { "user_pin" } else { "tx_code" };
        form.insert(field.to_string(), tx_code.to_string());
    }

    retrieve_token(server, form, dpop_key, fetcher, rng, hasher, signer).await
}

/// Acquire an access token via the authorization-code grant (§4.5).
#[instrument(level = "debug", skip(fetcher, rng, hasher, signer, dpop_key))]
pub async fn retrieve_authorization_code_access_token(
    server: &AuthorizationServerMetadata, code: &str, redirect_uri: Option<&str>,
    code_verifier: &str, dpop_key: Option<&DpopKey>, fetcher: &impl Fetcher, rng: &dyn RandomSource,
    hasher: &dyn Hasher, signer: &impl JwtSigner,
) -> Result<TokenAcquisition> {
    let mut form = HashMap::new();
    form.insert("grant_type".to_string(), crate::oauth::server::GRANT_AUTHORIZATION_CODE.to_string());
    form.insert("code".to_string(), code.to_string());
    if let Some(redirect_uri) = redirect_uri {
        form.insert("redirect_uri".to_string(), redirect_uri.to_string());
    }
    form.insert("code_verifier".to_string(), code_verifier.to_string());

    retrieve_token(server, form, dpop_key, fetcher, rng, hasher, signer).await
}

async fn retrieve_token(
    server: &AuthorizationServerMetadata, form: HashMap<String, String>, dpop_key: Option<&DpopKey>,
    fetcher: &impl Fetcher, rng: &dyn RandomSource, hasher: &dyn Hasher, signer: &impl JwtSigner,
) -> Result<TokenAcquisition> {
    let body = crate::core::urlencode::to_string(&form)?;

    let mut request = HttpRequest::post_form(&server.token_endpoint, body.clone());
    if let Some(dpop_key) = dpop_key {
        let proof = build_dpop_proof(dpop_key, &server.token_endpoint, None, None, rng, hasher, signer)
            .await?;
        request.headers.insert("DPoP".to_string(), proof);
    }

    let response = fetcher.fetch(request).await?;

    if dpop_key.is_some() && dpop::is_auth_server_nonce_error(&response) {
        let nonce = dpop::require_next_nonce(&response)?;
        let proof = build_dpop_proof(
            dpop_key.expect("checked is_some above"),
            &server.token_endpoint,
            None,
            Some(&nonce),
            rng,
            hasher,
            signer,
        )
        .await?;
        let mut retry = HttpRequest::post_form(&server.token_endpoint, body);
        retry.headers.insert("DPoP".to_string(), proof);
        let retry_response = fetcher.fetch(retry).await?;

        if !retry_response.is_success() {
            return Err(decode_client_error(&retry_response));
        }
        let access_token_response: AccessTokenResponse = retry_response.json()?;
        return Ok(TokenAcquisition {
            access_token_response,
            dpop_nonce: dpop::next_nonce(&retry_response).map(ToString::to_string),
        });
    }

    if !response.is_success() {
        return Err(decode_client_error(&response));
    }
    let access_token_response: AccessTokenResponse = response.json()?;
    Ok(TokenAcquisition {
        access_token_response,
        dpop_nonce: dpop::next_nonce(&response).map(ToString::to_string),
    })
}

async fn build_dpop_proof(
    dpop_key: &DpopKey, htu: &str, access_token: Option<&str>, nonce: Option<&str>,
    rng: &dyn RandomSource, hasher: &dyn Hasher, signer: &impl JwtSigner,
) -> Result<String> {
    dpop::create(
        dpop::ProofParams {
            public_jwk: dpop_key.public_jwk.clone(),
            alg: dpop_key.alg.clone(),
            htm: "POST",
            htu,
            access_token,
            nonce,
            now: current_unix_time(),
        },
        rng,
        hasher,
        signer,
    )
    .await
}

/// Build a DPoP proof for a resource request (e.g. the credential
/// endpoint), binding the access token via `ath`.
pub async fn build_resource_dpop_proof(
    dpop_key: &DpopKey, htm: &str, htu: &str, access_token: &str, nonce: Option<&str>,
    rng: &dyn RandomSource, hasher: &dyn Hasher, signer: &impl JwtSigner,
) -> Result<String> {
    dpop::create(
        dpop::ProofParams {
            public_jwk: dpop_key.public_jwk.clone(),
            alg: dpop_key.alg.clone(),
            htm,
            htu,
            access_token: Some(access_token),
            nonce,
            now: current_unix_time(),
        },
        rng,
        hasher,
        signer,
    )
    .await
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn decode_client_error(response: &crate::callback::HttpResponse) -> Error {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
        #[serde(default)]
        error_description: String,
    }
    match serde_json::from_slice::<ErrorBody>(&response.body) {
        Ok(body) => Error::Oauth2ClientError { error: body.error, description: body.error_description },
        Err(_) => Error::InvalidFetchResponse(format!("status {}", response.status)),
    }
}
