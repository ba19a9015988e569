//! Random value generation, grounded on every caller-supplied
//! [`RandomSource`] rather than a process-global RNG — the core holds no
//! entropy source of its own.

use base64ct::{Base64UrlUnpadded, Encoding};
use uuid::Uuid;

use crate::callback::RandomSource;

/// A random `jti` (JWT ID) suitable for a DPoP proof or access token: at
/// least 16 bytes per the spec's minimum, base64url-encoded.
#[must_use]
pub fn jti(rng: &dyn RandomSource) -> String {
    Base64UrlUnpadded::encode_string(&rng.generate_random(16))
}

/// A PKCE `code_verifier`: 32 random bytes, base64url-encoded (43
/// characters, well within the RFC 7636 43–128 unreserved-character
/// bound).
#[must_use]
pub fn code_verifier(rng: &dyn RandomSource) -> String {
    Base64UrlUnpadded::encode_string(&rng.generate_random(32))
}

/// A numeric transaction code (PIN) of `length` digits, default 6, for a
/// pre-authorized-code offer that requires one.
#[must_use]
pub fn tx_code(rng: &dyn RandomSource, length: usize) -> String {
    let bytes = rng.generate_random(length);
    bytes.iter().map(|b| char::from(b'0' + (b % 10))).collect()
}

/// An opaque pre-authorized or authorization code.
#[must_use]
pub fn auth_code(rng: &dyn RandomSource) -> String {
    Base64UrlUnpadded::encode_string(&rng.generate_random(24))
}

/// An opaque token identifying a by-reference credential offer stored for
/// later retrieval via `credential_offer_uri`.
#[must_use]
pub fn uri_token(rng: &dyn RandomSource) -> String {
    Base64UrlUnpadded::encode_string(&rng.generate_random(16))
}

/// A `notification_id` for a Credential Response, identifying it for a
/// later call to [`crate::notification::send_notification`].
///
/// Unlike the other identifiers in this module, this one needs no
/// injected entropy: it is an opaque correlation id, not a security
/// token, so a process-local UUID is sufficient.
#[must_use]
pub fn notification_id() -> String {
    Uuid::new_v4().to_string()
}

/// A `transaction_id` for deferred credential issuance.
#[must_use]
pub fn transaction_id() -> String {
    Uuid::new_v4().to_string()
}
