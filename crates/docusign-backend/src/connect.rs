//! DocuSign Connect notification payloads
//!
//! Connect posts a JSON event per envelope change. Only the envelope status
//! and the embedded signers (those carrying a `clientUserId`) matter here;
//! everything else in the payload is ignored.

use anysign_core::{EnvelopeNotification, RecipientNotification, SignerId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Malformed Connect payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Connect payload has no envelope id")]
    MissingEnvelope,

    #[error("Connect payload has no envelope status")]
    MissingStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<ConnectData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectData {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    envelope_summary: Option<ConnectEnvelope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_changed_date_time: Option<String>,
    #[serde(default)]
    recipients: Option<ConnectRecipients>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRecipients {
    #[serde(default)]
    signers: Vec<ConnectSigner>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectSigner {
    #[serde(default)]
    client_user_id: Option<String>,
    status: String,
    #[serde(default)]
    sent_date_time: Option<String>,
    #[serde(default)]
    delivered_date_time: Option<String>,
    #[serde(default)]
    signed_date_time: Option<String>,
    #[serde(default)]
    declined_date_time: Option<String>,
    #[serde(default)]
    declined_reason: Option<String>,
}

/// Map DocuSign's envelope vocabulary onto the core's, lowercased.
/// Values with no counterpart pass through and are rejected downstream.
pub fn envelope_status(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "created" => "draft".to_string(),
        other => other.to_string(),
    }
}

/// Recipient vocabulary differs from the envelope one: `signed` means done.
pub fn recipient_status(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "created" => "draft".to_string(),
        "signed" => "completed".to_string(),
        other => other.to_string(),
    }
}

fn parse_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring unparseable Connect timestamp {:?}: {}", raw, e);
            None
        }
    }
}

impl ConnectSigner {
    fn status_datetime(&self, status: &str) -> Option<DateTime<Utc>> {
        let raw = match status {
            "sent" => self.sent_date_time.as_deref(),
            "delivered" => self.delivered_date_time.as_deref(),
            "completed" => self.signed_date_time.as_deref(),
            "declined" => self.declined_date_time.as_deref(),
            _ => None,
        };
        parse_datetime(raw)
    }
}

/// Status name carried by an event such as `envelope-completed`
fn status_from_event(event: &str) -> Option<String> {
    event.strip_prefix("envelope-").map(envelope_status)
}

pub fn parse_notification(body: &[u8]) -> Result<EnvelopeNotification, ConnectError> {
    let event: ConnectEvent = serde_json::from_slice(body)?;
    let data = event.data.ok_or(ConnectError::MissingEnvelope)?;
    let summary = data.envelope_summary;

    let envelope_id = data
        .envelope_id
        .or_else(|| summary.as_ref().and_then(|s| s.envelope_id.clone()))
        .filter(|id| !id.is_empty())
        .ok_or(ConnectError::MissingEnvelope)?;

    let status = summary
        .as_ref()
        .and_then(|s| s.status.as_deref())
        .map(envelope_status)
        .or_else(|| event.event.as_deref().and_then(status_from_event))
        .ok_or(ConnectError::MissingStatus)?;

    let status_datetime =
        parse_datetime(summary.as_ref().and_then(|s| s.status_changed_date_time.as_deref()));

    let mut recipients = Vec::new();
    let signers = summary
        .and_then(|s| s.recipients)
        .map(|r| r.signers)
        .unwrap_or_default();
    for signer in signers {
        let Some(client_user_id) = signer.client_user_id.as_deref() else {
            continue;
        };
        let signer_id = match client_user_id.trim().parse::<i64>() {
            Ok(id) => SignerId(id),
            Err(_) => {
                warn!(
                    "Envelope {} has signer with foreign clientUserId {:?}",
                    envelope_id, client_user_id
                );
                continue;
            }
        };
        let status = recipient_status(&signer.status);
        recipients.push(RecipientNotification {
            signer_id,
            status_datetime: signer.status_datetime(&status),
            message: signer.declined_reason.clone().filter(|m| !m.is_empty()),
            status,
        });
    }

    Ok(EnvelopeNotification {
        envelope_id,
        status,
        status_datetime,
        recipients,
    })
}
