//! Request and response bodies

use anysign_core::{
    BackendSettings, NewSigner, Signature, SignatureId, Signer, SignerId, Status,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signer entry of an envelope creation form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerRequest {
    pub name: String,
    pub email: String,
}

impl From<SignerRequest> for NewSigner {
    fn from(req: SignerRequest) -> Self {
        NewSigner {
            full_name: req.name,
            email: req.email,
        }
    }
}

/// Envelope around an uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSignatureRequest {
    pub title: String,
    #[serde(default)]
    pub document_name: Option<String>,
    /// Base64 encoded PDF
    pub document_base64: String,
    pub signers: Vec<SignerRequest>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Envelope rendered from a backend-side template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplateSignatureRequest {
    pub title: String,
    #[serde(default)]
    pub template_id: Option<String>,
    pub signers: Vec<SignerRequest>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub root_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub integrator_key: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

impl SettingsForm {
    pub fn into_settings(self) -> BackendSettings {
        let mut settings = BackendSettings::new();
        let fields = [
            ("root_url", self.root_url),
            ("username", self.username),
            ("password", self.password),
            ("integrator_key", self.integrator_key),
            ("timeout", self.timeout),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                settings.set(key, value);
            }
        }
        settings
    }
}

/// Stored settings as shown back to the client; the password is never echoed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub root_url: Option<String>,
    pub username: Option<String>,
    pub integrator_key: Option<String>,
    pub timeout: Option<String>,
    pub has_password: bool,
}

impl From<&BackendSettings> for SettingsResponse {
    fn from(settings: &BackendSettings) -> Self {
        let get = |key: &str| settings.get(key).map(str::to_string);
        Self {
            root_url: get("root_url"),
            username: get("username"),
            integrator_key: get("integrator_key"),
            timeout: get("timeout"),
            has_password: settings.get("password").is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerResponse {
    pub id: SignerId,
    pub full_name: String,
    pub email: String,
    pub signing_order: u32,
    pub status: Status,
    pub status_datetime: DateTime<Utc>,
    pub status_details: String,
    /// Starts the embedded signing session
    pub signing_url: String,
}

impl From<&Signer> for SignerResponse {
    fn from(signer: &Signer) -> Self {
        Self {
            id: signer.id,
            full_name: signer.full_name.clone(),
            email: signer.email.clone(),
            signing_order: signer.signing_order,
            status: signer.status,
            status_datetime: signer.status_datetime,
            status_details: signer.status_details.clone(),
            signing_url: format!("/signers/{}", signer.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub id: SignatureId,
    pub title: String,
    pub backend_code: String,
    pub backend_id: String,
    pub template_id: Option<String>,
    pub status: Status,
    pub status_datetime: DateTime<Utc>,
    pub document_name: Option<String>,
    pub document_url: Option<String>,
    pub signers: Vec<SignerResponse>,
}

impl From<&Signature> for SignatureResponse {
    fn from(signature: &Signature) -> Self {
        let document_name = signature
            .document
            .as_ref()
            .filter(|_| signature.has_document())
            .map(|d| d.name.clone());
        Self {
            id: signature.id,
            title: signature.title.clone(),
            backend_code: signature.signature_type.backend_code.clone(),
            backend_id: signature.backend_id.clone(),
            template_id: signature
                .signature_type
                .uses_template()
                .then(|| signature.signature_type.template_id.clone()),
            status: signature.status,
            status_datetime: signature.status_datetime,
            document_url: document_name
                .as_ref()
                .map(|_| format!("/signatures/{}/document", signature.id)),
            document_name,
            signers: signature.signers.iter().map(SignerResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeResponse {
    pub has_settings: bool,
    pub latest_signatures: Vec<SignatureResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerReturnResponse {
    pub signer_id: SignerId,
    pub signature_id: SignatureId,
    pub full_name: String,
    pub status: Status,
    /// Outcome reported by the backend on redirect, e.g. `signing_complete`
    pub event: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub signature_id: SignatureId,
    pub status: Status,
    pub document_replaced: bool,
}
