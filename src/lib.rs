//! An API for the issuance of Verifiable Credentials based on the
//! [OpenID for Verifiable Credential Issuance](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html)
//! specification, together with the OAuth 2.0 authorization flows it
//! depends on: authorization code with PKCE, the pre-authorized code
//! grant, Pushed Authorization Requests, Authorization Challenge, and
//! DPoP (RFC 9449) sender-constrained tokens.
//!
//! This crate is the protocol state and message layer only. It performs
//! no cryptography, randomness, time, or I/O of its own — every external
//! concern is injected through the narrow traits in [`callback`]. It is
//! also stateless: callers hold whatever state spans multiple calls
//! (issued codes, live nonces, DPoP nonces) themselves and pass it back
//! in as `expected`/context parameters.
//!
//! # Feature Flags
//!
//! Both features are enabled by default. Disable default features and
//! select one to build only that side of an exchange.
//!
//! * `wallet` - the wallet-side orchestration: offer resolution,
//!   authorization, token acquisition, proof-of-possession JWT
//!   construction.
//! * `issuer` - the issuer / authorization-server / resource-server
//!   verification paths: token request parsing and verification, access
//!   token minting, resource-request and proof-of-possession JWT
//!   verification.

pub mod callback;
pub mod core;
pub mod dpop;
pub mod error;
pub mod jose;
pub mod metadata;
pub mod offer;

pub mod oauth;

#[cfg(feature = "issuer")]
pub mod resource;

pub mod credential;
pub mod notification;

#[cfg(test)]
mod test_support;

pub use crate::core::{Kind, OneMany};
pub use crate::error::{Error, Result};
