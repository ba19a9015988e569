//! # Notification Endpoint
//!
//! Sends the wallet's outbound notification after a credential is
//! accepted, deleted, or fails, authenticated the same way the preceding
//! credential request was (§4.10).

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::callback::{Fetcher, HttpRequest};
use crate::error::{Error, Result};

/// The event a notification reports.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    /// The wallet accepted and stored the credential.
    CredentialAccepted,
    /// The wallet deleted a previously accepted credential.
    CredentialDeleted,
    /// The wallet failed to process the credential.
    CredentialFailure,
}

/// The notification request body.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NotificationRequest {
    /// Identifier echoed from the credential response.
    pub notification_id: String,
    /// The event being reported.
    pub event: NotificationEvent,
    /// Optional human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_description: Option<String>,
}

/// Send a notification to `notification_endpoint`.
///
/// `authorization_header` is the `Authorization` header value this
/// notification is bound by (mirroring whatever scheme the credential
/// request used); `dpop_header`, if the server requires DPoP on this
/// endpoint too, is a proof already bound to this request's method/URL
/// via [`crate::dpop::create`].
///
/// Idempotent from the caller's perspective: the server is expected to
/// dedupe by `notification_id`, so a retried send after an ambiguous
/// network failure is safe.
///
/// # Errors
///
/// [`Error::InvalidFetchResponse`] on a non-2xx response.
#[instrument(level = "debug", skip(fetcher))]
pub async fn send_notification(
    notification_endpoint: &str, request: &NotificationRequest, authorization_header: &str,
    dpop_header: Option<&str>, fetcher: &impl Fetcher,
) -> Result<()> {
    let mut http_request = HttpRequest::post_json(notification_endpoint, request)?;
    http_request.headers.insert("authorization".to_string(), authorization_header.to_string());
    if let Some(dpop_header) = dpop_header {
        http_request.headers.insert("DPoP".to_string(), dpop_header.to_string());
    }

    let response = fetcher.fetch(http_request).await?;
    if !response.is_success() {
        return Err(Error::InvalidFetchResponse(format!(
            "notification endpoint returned {}",
            response.status
        )));
    }
    Ok(())
}
