//! # Credential-Offer Module
//!
//! Resolves a Credential Offer by value or by reference and normalizes the
//! legacy draft-11 wire shape to draft-14, per §4.3. The normalization is a
//! pure, forward-only transform (§9): it is never applied in reverse, and
//! any ambiguity it cannot resolve is left absent rather than guessed.

use std::io::Cursor;

use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::callback::Fetcher;
use crate::core::urlencode;
use crate::error::{Error, Result};
use crate::metadata::CredentialIssuerMetadata;
use crate::{invalid, oauth2_error};

/// A Credential Offer, as resolved from a wallet-facing offer URI.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialOffer {
    /// The Credential Issuer's identifier.
    pub credential_issuer: String,

    /// Keys into the issuer's `credential_configurations_supported`.
    pub credential_configuration_ids: Vec<String>,

    /// Grants the issuer is prepared to process for this offer. Absent
    /// only when the wallet must fall back to issuer metadata to
    /// determine supported grant types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grants>,
}

/// The grants an offer may carry, keyed by grant identifier.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Grants {
    /// The `authorization_code` grant.
    #[serde(rename = "authorization_code", skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,

    /// The `urn:ietf:params:oauth:grant-type:pre-authorized_code` grant.
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

/// Authorization-code grant parameters carried on an offer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthorizationCodeGrant {
    /// Opaque value the issuer uses to correlate the later authorization
    /// request with this offer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,

    /// The authorization server to use, if the issuer has more than one
    /// and wants to pin this offer to a specific one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
}

/// Pre-authorized-code grant parameters carried on an offer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PreAuthorizedCodeGrant {
    /// The pre-authorized code itself.
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,

    /// Transaction-code (PIN) descriptor, if the token endpoint requires
    /// one to redeem this code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,

    /// The authorization server to use, if pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
}

/// Describes the transaction code (PIN) a wallet must collect from the
/// end-user to redeem a pre-authorized code.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TxCode {
    /// Expected character set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<TxCodeInputMode>,

    /// Expected length, if fixed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,

    /// End-user-facing guidance, at most 300 characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The expected character set of a transaction code.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxCodeInputMode {
    /// Digits only.
    Numeric,
    /// Any characters.
    Text,
}

impl CredentialOffer {
    /// Extract the pre-authorized-code grant, if present.
    #[must_use]
    pub fn pre_authorized_code(&self) -> Option<&PreAuthorizedCodeGrant> {
        self.grants.as_ref().and_then(|g| g.pre_authorized_code.as_ref())
    }

    /// Extract the authorization-code grant, if present.
    #[must_use]
    pub fn authorization_code(&self) -> Option<&AuthorizationCodeGrant> {
        self.grants.as_ref().and_then(|g| g.authorization_code.as_ref())
    }

    /// Validate the invariants in §3: at least one grant present if
    /// `grants` is present at all; every configuration id resolves in the
    /// given issuer metadata.
    pub fn validate(&self, metadata: &CredentialIssuerMetadata) -> Result<()> {
        if self.credential_configuration_ids.is_empty() {
            return Err(invalid!("offer has no credential_configuration_ids"));
        }
        for id in &self.credential_configuration_ids {
            if !metadata.credential_configurations_supported.contains_key(id) {
                return Err(invalid!("unknown credential_configuration_id: {id}"));
            }
        }
        if let Some(grants) = &self.grants {
            if grants.authorization_code.is_none() && grants.pre_authorized_code.is_none() {
                return Err(invalid!("`grants` present but empty"));
            }
        }
        Ok(())
    }

    /// Build the `scheme://?credential_offer=<json>` wallet-facing URL.
    pub fn to_querystring(&self) -> Result<String> {
        let json = serde_json::to_string(self).map_err(|e| Error::JsonParseError(e.to_string()))?;
        Ok(format!("credential_offer={}", urlencoding::encode(&json)))
    }

    /// Render this offer as a `scheme://?credential_offer=<json>` URL and
    /// encode it into a PNG QR code, returned as a `data:` URI.
    ///
    /// This is an ambient wallet-deep-linking convenience, not a protocol
    /// requirement: callers that don't need QR codes can ignore it.
    pub fn to_qrcode(&self, scheme: &str) -> Result<String> {
        let qs = self.to_querystring()?;
        let qr_code = QrCode::new(format!("{scheme}://?{qs}"))
            .map_err(|e| Error::ValidationError(format!("failed to build QR code: {e}")))?;

        let img_buf = qr_code.render::<image::Luma<u8>>().build();
        let mut buffer: Vec<u8> = Vec::new();
        let mut writer = Cursor::new(&mut buffer);
        img_buf
            .write_to(&mut writer, image::ImageFormat::Png)
            .map_err(|e| Error::ValidationError(format!("failed to encode QR code: {e}")))?;

        Ok(format!("data:image/png;base64,{}", base64ct::Base64::encode_string(&buffer)))
    }
}

/// Build a `scheme://?credential_offer=<json>` or
/// `scheme://?credential_offer_uri=<url>` wallet-facing offer URL.
pub fn build_credential_offer_url(offer: &CredentialOffer, scheme: &str) -> Result<String> {
    Ok(format!("{scheme}://?{}", offer.to_querystring()?))
}

/// Resolve a wallet-facing credential-offer URI into a [`CredentialOffer`].
///
/// Accepts any URI where the first `?` delimits the query parameters.
/// Exactly one of `credential_offer` (inline JSON) or
/// `credential_offer_uri` (an HTTPS URL to fetch and parse) must be
/// present.
#[instrument(level = "debug", skip(fetcher))]
pub async fn resolve_credential_offer(
    offer_uri: &str, fetcher: &impl Fetcher,
) -> Result<CredentialOffer> {
    let query = offer_uri.splitn(2, '?').nth(1).unwrap_or_default();
    let pairs = urlencode::from_str(query);

    let inline = pairs.iter().find(|(k, _)| k == "credential_offer").map(|(_, v)| v.clone());
    let by_ref = pairs.iter().find(|(k, _)| k == "credential_offer_uri").map(|(_, v)| v.clone());

    let body = match (inline, by_ref) {
        (Some(json), None) => json,
        (None, Some(url)) => {
            tracing::debug!("fetching credential_offer_uri: {url}");
            let response = fetcher
                .fetch(crate::callback::HttpRequest::get(url))
                .await?;
            if !response.is_success() {
                return Err(invalid!("credential_offer_uri fetch failed"));
            }
            String::from_utf8(response.body)
                .map_err(|e| Error::ValidationError(format!("non-utf8 offer body: {e}")))?
        }
        (Some(_), Some(_)) => {
            return Err(invalid!("exactly one of credential_offer/credential_offer_uri allowed"));
        }
        (None, None) => return Err(invalid!("no credential_offer or credential_offer_uri present")),
    };

    let raw: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| Error::JsonParseError(e.to_string()))?;

    normalize(raw)
}

/// Normalize a parsed offer body, accepting either the draft-14 shape or
/// the legacy draft-11 shape and converting the latter forward.
///
/// Draft-11 → draft-14:
/// - `credentials: string[]` → `credential_configuration_ids`.
/// - `user_pin_required: true` under the pre-authorized grant →
///   `tx_code: {input_mode: "text"}`.
/// - `user_pin_required: false`/absent → omit `tx_code`.
///
/// This transform is idempotent and never runs in reverse (§9): a
/// draft-14 body with no `credentials` field and no `user_pin_required`
/// field passes through unchanged.
fn normalize(mut raw: serde_json::Value) -> Result<CredentialOffer> {
    let obj = raw.as_object_mut().ok_or_else(|| invalid!("credential offer is not a JSON object"))?;

    if let Some(credentials) = obj.remove("credentials") {
        obj.entry("credential_configuration_ids").or_insert(credentials);
    }

    if let Some(grants) = obj.get_mut("grants").and_then(|g| g.as_object_mut()) {
        if let Some(pre_auth) =
            grants.get_mut("urn:ietf:params:oauth:grant-type:pre-authorized_code")
        {
            if let Some(pre_auth) = pre_auth.as_object_mut() {
                if let Some(required) = pre_auth.remove("user_pin_required") {
                    if required.as_bool() == Some(true) {
                        pre_auth.entry("tx_code").or_insert(serde_json::json!({
                            "input_mode": "text"
                        }));
                    }
                    // `false`/absent: leave `tx_code` unset, as prescribed.
                }
            }
        }
    }

    serde_json::from_value(raw).map_err(|e| Error::ValidationError(format!("invalid offer shape: {e}")))
}

/// Determine which authorization server an offer's grant should use.
///
/// If the grant pins an `authorization_server`, it must be one of the
/// issuer's known servers. Otherwise, if exactly one is known, it is used;
/// multiple known servers with no pinned choice is ambiguous and must be
/// disambiguated by the caller.
pub fn determine_authorization_server<'m>(
    pinned: Option<&str>, known_servers: &'m [String],
) -> Result<&'m str> {
    if let Some(pinned) = pinned {
        return known_servers
            .iter()
            .find(|s| crate::core::strings::issuer_eq(s, pinned))
            .map(String::as_str)
            .ok_or_else(|| oauth2_error!("unknown_authorization_server: {pinned}"));
    }
    match known_servers {
        [only] => Ok(only.as_str()),
        [] => Err(oauth2_error!("no authorization server known")),
        _ => Err(oauth2_error!("ambiguous_authorization_server: caller must disambiguate")),
    }
}
