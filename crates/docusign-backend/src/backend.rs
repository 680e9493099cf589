//! `SignatureBackend` implementation for DocuSign

use anysign_core::{
    BackendError, BackendSettings, CreatedEnvelope, DocumentStream, EnvelopeRequest, Signature,
    SignatureBackend, Signer,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::io::Cursor;
use std::sync::Arc;
use tracing::info;

use crate::client::DocuSignClient;
use crate::config::DocuSignConfig;
use crate::models::*;

/// Code stored on signature types routed through DocuSign
pub const BACKEND_CODE: &str = "docusign";

pub struct DocuSignBackend {
    client: DocuSignClient,
}

impl DocuSignBackend {
    pub fn new(config: DocuSignConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: DocuSignClient::new(config)?,
        })
    }

    pub fn from_settings(settings: &BackendSettings) -> Result<Self, BackendError> {
        Self::new(DocuSignConfig::from_settings(settings)?)
    }

    /// Factory suitable for [`anysign_core::BackendRegistry::register`]
    pub fn factory(settings: &BackendSettings) -> Result<Arc<dyn SignatureBackend>, BackendError> {
        Ok(Arc::new(Self::from_settings(settings)?))
    }

    pub fn client(&self) -> &DocuSignClient {
        &self.client
    }

    fn envelope_definition(
        &self,
        signature: &Signature,
        request: &EnvelopeRequest,
    ) -> Result<EnvelopeDefinition, BackendError> {
        let mut definition = EnvelopeDefinition {
            email_subject: request.subject.clone(),
            status: "sent".to_string(),
            event_notification: (!request.callback_url.is_empty())
                .then(|| EventNotification::for_callback(&request.callback_url)),
            ..Default::default()
        };

        if signature.signature_type.uses_template() {
            definition.template_id = Some(signature.signature_type.template_id.clone());
            definition.template_roles = signature
                .signers
                .iter()
                .map(|signer| TemplateRole {
                    email: signer.email.clone(),
                    name: signer.full_name.clone(),
                    role_name: template_role_name(signer),
                    client_user_id: signer.id.to_string(),
                    routing_order: signer.signing_order.to_string(),
                })
                .collect();
        } else {
            let document = signature.document.as_ref().ok_or_else(|| {
                BackendError::Configuration(format!(
                    "signature {} has no document to send",
                    signature.id
                ))
            })?;
            definition.documents = vec![EnvelopeDocumentUpload {
                document_id: "1".to_string(),
                name: document_display_name(&document.name),
                document_base64: BASE64.encode(&document.content),
            }];
            definition.recipients = Some(Recipients {
                signers: signature
                    .signers
                    .iter()
                    .map(|signer| SignerRecipient {
                        email: signer.email.clone(),
                        name: signer.full_name.clone(),
                        recipient_id: recipient_id(signer),
                        routing_order: signer.signing_order.to_string(),
                        client_user_id: signer.id.to_string(),
                        tabs: SignerTabs {
                            sign_here_tabs: vec![SignHereTab {
                                document_id: "1".to_string(),
                                page_number: "1".to_string(),
                                x_position: "100".to_string(),
                                y_position: (100 + 60 * signer.signing_order).to_string(),
                            }],
                        },
                    })
                    .collect(),
            });
        }
        Ok(definition)
    }
}

/// Template roles are named `Signer 1`, `Signer 2`, ... by signing order
pub fn template_role_name(signer: &Signer) -> String {
    format!("Signer {}", signer.signing_order)
}

/// Recipient ids are the signing order, unique within an envelope
pub fn recipient_id(signer: &Signer) -> String {
    signer.signing_order.to_string()
}

fn document_display_name(stored_name: &str) -> String {
    stored_name
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("document.pdf")
        .to_string()
}

#[async_trait]
impl SignatureBackend for DocuSignBackend {
    fn code(&self) -> &str {
        BACKEND_CODE
    }

    async fn create_signature(
        &self,
        signature: &Signature,
        request: &EnvelopeRequest,
    ) -> Result<CreatedEnvelope, BackendError> {
        let definition = self.envelope_definition(signature, request)?;
        let summary = self.client.create_envelope(&definition).await?;
        info!(
            "Created DocuSign envelope {} for signature {}",
            summary.envelope_id, signature.id
        );

        Ok(CreatedEnvelope {
            envelope_id: summary.envelope_id,
            recipient_ids: signature
                .signers
                .iter()
                .map(|s| (s.id, recipient_id(s)))
                .collect(),
        })
    }

    async fn fetch_documents(&self, signature: &Signature) -> Result<Vec<DocumentStream>, BackendError> {
        if signature.backend_id.is_empty() {
            return Err(BackendError::NoDocument(format!(
                "signature {} was never sent",
                signature.id
            )));
        }
        let listing = self.client.list_documents(&signature.backend_id).await?;

        // Only the first content document replaces the stored one
        let info = listing
            .envelope_documents
            .iter()
            .find(|d| d.is_content())
            .ok_or_else(|| BackendError::NoDocument(signature.backend_id.clone()))?;
        let content = self
            .client
            .document_content(&signature.backend_id, &info.document_id)
            .await?;
        let stream: DocumentStream = Box::new(Cursor::new(content));
        Ok(vec![stream])
    }

    async fn recipient_view_url(
        &self,
        signature: &Signature,
        signer: &Signer,
        return_url: &str,
    ) -> Result<String, BackendError> {
        let request = RecipientViewRequest {
            authentication_method: "none".to_string(),
            client_user_id: signer.id.to_string(),
            email: signer.email.clone(),
            user_name: signer.full_name.clone(),
            recipient_id: if signer.backend_id.is_empty() {
                recipient_id(signer)
            } else {
                signer.backend_id.clone()
            },
            return_url: return_url.to_string(),
        };
        let view = self
            .client
            .recipient_view(&signature.backend_id, &request)
            .await?;
        Ok(view.url)
    }
}
