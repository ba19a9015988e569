//! # JOSE Utilities
//!
//! The core owns JWK *data representation* and compact-JWT structural
//! encode/decode, but never signs or verifies a signature itself — that is
//! [`crate::callback::JwtSigner`]/[`crate::callback::JwtVerifier`]'s job.

pub mod jwk;
pub mod jwt;
