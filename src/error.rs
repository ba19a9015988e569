//! # Error Taxonomy
//!
//! Structured error kinds for OID4VCI and the OAuth 2.0 flows it relies on.
//! Every variant renders to the wire-format JSON error envelope
//! (`{"error": "...", "error_description": "..."}`) via its `Display`
//! implementation, so the same value can be propagated to a caller, logged,
//! or serialized directly into an HTTP error body.

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::core::urlencode;

/// Errors surfaced by this crate.
///
/// Propagation policy: every error surfaces to the calling function. The
/// only internal recovery the core performs is the DPoP nonce retry (see
/// [`crate::oauth::client`]) and the authorization-challenge
/// `redirect_to_web` fallback. All other errors abort the current
/// operation; none are logged here.
#[derive(Error, Debug, Deserialize)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Schema violation in a locally constructed or remotely received
    /// payload.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    ValidationError(String),

    /// Local protocol misuse: missing grant, ambiguous authorization
    /// server, unsupported signer variant, and the like.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    Oauth2Error(String),

    /// Client authentication failed, or the grant is invalid, expired, or
    /// was issued to another client.
    #[error(r#"{{"error": "invalid_grant", "error_description": "{0}"}}"#)]
    InvalidGrant(String),

    /// The authorization grant type is not supported by the authorization
    /// server.
    #[error(r#"{{"error": "unsupported_grant_type", "error_description": "{0}"}}"#)]
    UnsupportedGrantType(String),

    /// A DPoP proof failed header, binding, timestamp, or signature
    /// verification.
    #[error(r#"{{"error": "invalid_dpop_proof", "error_description": "{0}"}}"#)]
    InvalidDpopProof(String),

    /// The server requires a fresh DPoP nonce; the accompanying
    /// `DPoP-Nonce` header carries the value to retry with.
    #[error(r#"{{"error": "use_dpop_nonce", "error_description": "{0}"}}"#)]
    UseDpopNonce(String),

    /// Credential Request is missing a required parameter, repeats a
    /// parameter, or is otherwise malformed.
    #[error(r#"{{"error": "invalid_credential_request", "error_description": "{0}"}}"#)]
    InvalidCredentialRequest(String),

    /// Credential Request proof was missing or invalid, i.e. not bound to a
    /// live `c_nonce`.
    #[error(r#"{{"error": "invalid_proof", "error_description": "{0}"}}"#)]
    InvalidProof(String),

    /// At least one key proof in a `proof`/`proofs` request used a nonce
    /// the issuer no longer recognizes. The wallet should fetch a fresh
    /// `c_nonce` and retry.
    #[error(r#"{{"error": "invalid_nonce", "error_description": "{0}"}}"#)]
    InvalidNonce(String),

    /// The Deferred Credential Request `transaction_id` is unknown or was
    /// already redeemed.
    #[error(r#"{{"error": "invalid_transaction_id", "error_description": "{0}"}}"#)]
    InvalidTransactionId(String),

    /// Issuance is still pending; retry no sooner than `interval` seconds.
    #[error(r#"{{"error": "issuance_pending", "interval": {0}}}"#)]
    IssuancePending(i64),

    /// A non-2xx response was returned by a remote endpoint and decoded
    /// into an OAuth2/OID4VCI error envelope.
    #[error(r#"{{"error": "{error}", "error_description": "{description}"}}"#)]
    Oauth2ClientError {
        /// The `error` code from the remote envelope.
        error: String,
        /// The `error_description` from the remote envelope, if any.
        description: String,
    },

    /// A specialized [`Error::Oauth2ClientError`] carrying the
    /// Authorization Challenge extensions (`presentation`, `auth_session`,
    /// `request_uri`).
    #[error(
        r#"{{"error": "{error}", "error_description": "{description}", "auth_session": "{auth_session}"}}"#
    )]
    Oauth2ClientAuthorizationChallengeError {
        /// The `error` code (e.g. `insufficient_authorization`).
        error: String,
        /// Human-readable description.
        description: String,
        /// Session identifier to resume the challenge with.
        auth_session: String,
    },

    /// A fetch response was not a valid 2xx payload and did not decode as
    /// a structured error envelope either.
    #[error(r#"{{"error": "server_error", "error_description": "invalid fetch response: {0}"}}"#)]
    InvalidFetchResponse(String),

    /// A JSON body failed to parse.
    #[error(r#"{{"error": "server_error", "error_description": "JSON parse error: {0}"}}"#)]
    JsonParseError(String),

    /// An injected callback (hash, sign, verify, fetch, client
    /// authentication) returned an error. This is the ambient "external
    /// error" channel: callback implementations carry their own error
    /// types, flattened here to a message via [`Error::callback`].
    #[error(r#"{{"error": "server_error", "error_description": "{0}"}}"#)]
    Callback(String),
}

/// Wire-format error envelope shared by all variants' `Display` output.
#[derive(Deserialize, Serialize)]
struct OidError {
    error: String,
    error_description: String,
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as SerdeError;

        let Ok(error) = serde_json::from_str::<OidError>(&self.to_string()) else {
            return Err(SerdeError::custom("issue deserializing Err"));
        };
        error.serialize(serializer)
    }
}

impl Error {
    /// Render the error as the OID4VCI/OAuth2 JSON error envelope.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.to_string()).unwrap_or_default()
    }

    /// Render the error as an `application/x-www-form-urlencoded` query
    /// string, as used when propagating an error back via a redirect.
    #[must_use]
    pub fn to_querystring(&self) -> String {
        urlencode::to_string(self).unwrap_or_default()
    }

    /// Wrap an external callback failure.
    pub fn callback(e: impl std::fmt::Display) -> Self {
        Self::Callback(e.to_string())
    }
}

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Construct an [`Error::ValidationError`] from a format string or
/// existing error value.
#[macro_export]
macro_rules! invalid {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::ValidationError(format!($fmt, $($arg)*))
    };
    ($err:expr $(,)?) => {
        $crate::Error::ValidationError(format!($err))
    };
}

/// Construct an [`Error::Oauth2Error`] from a format string or existing
/// error value.
#[macro_export]
macro_rules! oauth2_error {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Oauth2Error(format!($fmt, $($arg)*))
    };
    ($err:expr $(,)?) => {
        $crate::Error::Oauth2Error(format!($err))
    };
}
