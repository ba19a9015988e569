//! Form/query-string encoding for `application/x-www-form-urlencoded`
//! bodies and query strings.
//!
//! Nested objects are JSON-encoded and then percent-encoded as a single
//! value, per §6 of the spec ("Nested objects are JSON-encoded then
//! URL-encoded").

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

use crate::error::{Error, Result};

/// Characters that must remain percent-encoded in form values. `+` is kept
/// encoded here (we always emit `%20` for spaces, never `+`) so values
/// round-trip unambiguously regardless of the decoder's leniency.
const FORM_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Serialize any serde `Serialize` value (expected to be a struct or map)
/// into a `key=value&key=value` query/form string. Struct fields that
/// serialize to arrays or objects are flattened to a single JSON-encoded
/// value for that key.
pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value).map_err(|e| Error::JsonParseError(e.to_string()))?;
    let serde_json::Value::Object(map) = json else {
        return Err(Error::ValidationError("urlencode target must be an object".into()));
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let encoded_value = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        pairs.push(format!(
            "{}={}",
            utf8_percent_encode(&key, FORM_SET),
            utf8_percent_encode(&encoded_value, FORM_SET)
        ));
    }
    Ok(pairs.join("&"))
}

/// Parse a `key=value&key=value` form/query string into ordered pairs,
/// percent-decoding both sides.
pub fn from_str(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or_default();
            Some((decode(key), decode(value)))
        })
        .collect()
}

fn decode(s: &str) -> String {
    percent_encoding::percent_decode_str(&s.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Body {
        grant_type: String,
        #[serde(rename = "pre-authorized_code")]
        pre_authorized_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_code: Option<String>,
    }

    #[test]
    fn pre_authorized_token_request() {
        let body = Body {
            grant_type: "urn:ietf:params:oauth:grant-type:pre-authorized_code".into(),
            pre_authorized_code: "abc".into(),
            tx_code: None,
        };
        let encoded = to_string(&body).unwrap();
        assert_eq!(
            encoded,
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Apre-authorized_code&\
             pre-authorized_code=abc"
        );
    }

    #[test]
    fn roundtrip_pairs() {
        let pairs = from_str("error=invalid_request&error_description=Invalid%20request%20description");
        assert_eq!(
            pairs,
            vec![
                ("error".to_string(), "invalid_request".to_string()),
                ("error_description".to_string(), "Invalid request description".to_string()),
            ]
        );
    }
}
