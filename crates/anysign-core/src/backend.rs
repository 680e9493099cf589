//! Signing backend capability and registry
//!
//! A backend is the remote signing service an envelope is sent through. The
//! core only needs three things from it: create the envelope, hand back the
//! rendered documents, and produce an embedded signing URL for a recipient.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::model::{Signature, Signer, SignerId};

/// Owned byte stream for one fetched document. Dropping it closes it.
pub type DocumentStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Backend API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("Backend returned no document for envelope {0}")]
    NoDocument(String),

    #[error("Unknown signature backend: {0}")]
    UnknownBackend(String),
}

/// Per-envelope options given when sending it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeRequest {
    /// Where the backend posts status notifications
    pub callback_url: String,
    pub subject: String,
}

/// Identifiers the backend assigned to a newly sent envelope
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreatedEnvelope {
    pub envelope_id: String,
    pub recipient_ids: HashMap<SignerId, String>,
}

#[async_trait]
pub trait SignatureBackend: Send + Sync {
    /// Code stored on [`crate::model::SignatureType`] for envelopes sent through this backend
    fn code(&self) -> &str;

    async fn create_signature(
        &self,
        signature: &Signature,
        request: &EnvelopeRequest,
    ) -> Result<CreatedEnvelope, BackendError>;

    /// Rendered documents of the envelope, in backend order.
    ///
    /// Callers use the first stream; a backend may return only that one.
    async fn fetch_documents(&self, signature: &Signature) -> Result<Vec<DocumentStream>, BackendError>;

    /// URL of the embedded signing session for `signer`
    async fn recipient_view_url(
        &self,
        signature: &Signature,
        signer: &Signer,
        return_url: &str,
    ) -> Result<String, BackendError>;
}

/// Path a signer lands on after leaving the embedded signing session
pub fn signer_return_path(signer_id: SignerId) -> String {
    format!("/signers/{}/return", signer_id)
}

/// Opaque key/value configuration handed to a backend at construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendSettings(BTreeMap<String, String>);

impl BackendSettings {
    pub const KEYS: [&'static str; 5] =
        ["root_url", "username", "password", "integrator_key", "timeout"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Blank values are ignored so a partial form never clears stored values
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.0.insert(key.into(), value.trim().to_string());
        }
    }

    pub fn merge(&mut self, other: &BackendSettings) {
        for (key, value) in &other.0 {
            self.set(key.clone(), value.clone());
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether every credential the backend needs is present
    pub fn is_complete(&self) -> bool {
        ["root_url", "username", "password", "integrator_key"]
            .iter()
            .all(|key| self.get(key).is_some())
    }
}

type BackendFactory =
    dyn Fn(&BackendSettings) -> Result<Arc<dyn SignatureBackend>, BackendError> + Send + Sync;

/// Resolves a backend code to a freshly configured backend
#[derive(Default, Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, code: &str, factory: F) -> Self
    where
        F: Fn(&BackendSettings) -> Result<Arc<dyn SignatureBackend>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(code.to_string(), Arc::new(factory));
        self
    }

    pub fn get(
        &self,
        code: &str,
        settings: &BackendSettings,
    ) -> Result<Arc<dyn SignatureBackend>, BackendError> {
        let factory = self
            .factories
            .get(code)
            .ok_or_else(|| BackendError::UnknownBackend(code.to_string()))?;
        factory(settings)
    }

    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}
