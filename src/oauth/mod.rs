//! # OAuth 2.0 Authorization and Token Flows
//!
//! [`client`] drives the wallet side of authorization (PAR, redirect,
//! Authorization Challenge) and token acquisition (authorization-code and
//! pre-authorized-code grants, with DPoP nonce retry). [`server`] verifies
//! an incoming token request and mints the resulting access token.
//!
//! Both sides are callback-driven and stateless: the caller supplies
//! whatever was persisted out of band (an issued code, an expected
//! `tx_code`, a PKCE verifier) explicitly into each function rather than
//! this crate retrieving it from a session store of its own (§5).

#[cfg(feature = "wallet")]
pub mod client;

// `server` also backs issuer-side verification directly, so it compiles
// whenever either side of the crate is built — `client` depends on its
// grant-identifier constants and response type even in a wallet-only build.
#[cfg(any(feature = "wallet", feature = "issuer"))]
pub mod server;
