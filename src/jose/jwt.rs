//! Structural (non-cryptographic) compact-JWT handling: splitting a
//! `header.payload.signature` string into its three parts and decoding the
//! header/payload as JSON objects. Signing and signature verification are
//! [`crate::callback::JwtSigner`]/[`crate::callback::JwtVerifier`]'s job.

use base64ct::{Base64UrlUnpadded, Encoding};

use crate::callback::CompactJwt;
use crate::error::{Error, Result};

/// Build the `base64url(header).base64url(payload)` signing input for a
/// JWT — everything but the trailing signature.
pub fn signing_input(
    header: &serde_json::Map<String, serde_json::Value>, payload: &[u8],
) -> Result<String> {
    let header_json =
        serde_json::to_vec(header).map_err(|e| Error::JsonParseError(e.to_string()))?;
    Ok(format!(
        "{}.{}",
        Base64UrlUnpadded::encode_string(&header_json),
        Base64UrlUnpadded::encode_string(payload)
    ))
}

/// Append a detached signature to a `signing_input` string to form a
/// complete compact JWT.
#[must_use]
pub fn append_signature(signing_input: &str, signature: &[u8]) -> String {
    format!("{signing_input}.{}", Base64UrlUnpadded::encode_string(signature))
}

/// Split and decode a compact JWT's header and payload without checking
/// the signature.
///
/// # Errors
///
/// Returns [`Error::ValidationError`] if the JWT does not have exactly
/// three dot-separated parts or either segment fails to decode as base64url
/// JSON.
pub fn decode(compact: &str) -> Result<CompactJwt> {
    let parts: Vec<&str> = compact.split('.').collect();
    let [header_b64, payload_b64, _sig_b64] = parts[..] else {
        return Err(Error::ValidationError("malformed JWT: expected 3 segments".into()));
    };

    let header = decode_segment(header_b64)?;
    let payload = decode_segment(payload_b64)?;

    Ok(CompactJwt { compact: compact.to_string(), header, payload })
}

/// The raw signature bytes of a compact JWT.
pub fn signature(compact: &str) -> Result<Vec<u8>> {
    let (_, sig_b64) =
        compact.rsplit_once('.').ok_or_else(|| Error::ValidationError("malformed JWT".into()))?;
    Base64UrlUnpadded::decode_vec(sig_b64)
        .map_err(|e| Error::ValidationError(format!("invalid signature encoding: {e}")))
}

fn decode_segment(segment: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    let bytes = Base64UrlUnpadded::decode_vec(segment)
        .map_err(|e| Error::ValidationError(format!("invalid base64url: {e}")))?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| Error::JsonParseError(e.to_string()))?;
    let serde_json::Value::Object(map) = value else {
        return Err(Error::ValidationError("JWT segment is not a JSON object".into()));
    };
    Ok(map)
}
