//! DocuSign REST API payloads

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInformation {
    #[serde(default)]
    pub login_accounts: Vec<LoginAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAccount {
    pub account_id: String,
    pub base_url: String,
    #[serde(default)]
    pub is_default: Option<String>,
}

impl LoginInformation {
    /// The default account, or the first one listed
    pub fn default_account(&self) -> Option<&LoginAccount> {
        self.login_accounts
            .iter()
            .find(|a| a.is_default.as_deref() == Some("true"))
            .or_else(|| self.login_accounts.first())
    }
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDefinition {
    pub email_subject: String,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<EnvelopeDocumentUpload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Recipients>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub template_roles: Vec<TemplateRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_notification: Option<EventNotification>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDocumentUpload {
    pub document_id: String,
    pub name: String,
    pub document_base64: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipients {
    pub signers: Vec<SignerRecipient>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerRecipient {
    pub email: String,
    pub name: String,
    pub recipient_id: String,
    pub routing_order: String,
    /// Marks the recipient as embedded; carries the local signer id
    pub client_user_id: String,
    pub tabs: SignerTabs,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerTabs {
    pub sign_here_tabs: Vec<SignHereTab>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignHereTab {
    pub document_id: String,
    pub page_number: String,
    pub x_position: String,
    pub y_position: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRole {
    pub email: String,
    pub name: String,
    pub role_name: String,
    pub client_user_id: String,
    pub routing_order: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotification {
    pub url: String,
    pub logging_enabled: String,
    pub include_documents: String,
    pub envelope_events: Vec<EnvelopeEvent>,
    pub recipient_events: Vec<RecipientEvent>,
    /// Without it Connect falls back to the legacy XML payload
    pub event_data: ConnectEventData,
}

/// Payload shape requested from Connect
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectEventData {
    pub version: String,
    pub format: String,
    pub include_data: Vec<String>,
}

impl Default for ConnectEventData {
    fn default() -> Self {
        Self {
            version: "restv2.1".to_string(),
            format: "json".to_string(),
            include_data: vec!["recipients".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeEvent {
    pub envelope_event_status_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientEvent {
    pub recipient_event_status_code: String,
}

impl EventNotification {
    /// Subscribe `url` to every envelope and recipient status the core understands
    pub fn for_callback(url: &str) -> Self {
        Self {
            url: url.to_string(),
            logging_enabled: "true".to_string(),
            include_documents: "false".to_string(),
            envelope_events: ["Sent", "Delivered", "Completed", "Declined"]
                .iter()
                .map(|s| EnvelopeEvent {
                    envelope_event_status_code: s.to_string(),
                })
                .collect(),
            recipient_events: ["Sent", "Delivered", "Completed", "Declined"]
                .iter()
                .map(|s| RecipientEvent {
                    recipient_event_status_code: s.to_string(),
                })
                .collect(),
            event_data: ConnectEventData::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    pub envelope_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDocumentsResult {
    #[serde(default)]
    pub envelope_documents: Vec<EnvelopeDocumentInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDocumentInfo {
    pub document_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl EnvelopeDocumentInfo {
    /// The signing certificate is appended by DocuSign and is not part of the envelope content
    pub fn is_content(&self) -> bool {
        self.document_id != "certificate" && self.kind.as_deref() != Some("summary")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientViewRequest {
    pub authentication_method: String,
    pub client_user_id: String,
    pub email: String,
    pub user_name: String,
    pub recipient_id: String,
    pub return_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewUrl {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorDetails {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorDetails {
    pub fn describe(&self) -> String {
        match (&self.error_code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}
