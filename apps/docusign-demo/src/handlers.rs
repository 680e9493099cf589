//! HTTP handlers for the demo API

use anysign_core::filename::document_filename;
use anysign_core::{
    signer_return_path, Document, EnvelopeNotification, EnvelopeRequest,
    NewSignature, NewSigner, Signature, SignatureId, SignatureType, SignerId, Status,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Redirect,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use docusign_backend::{parse_notification, BACKEND_CODE};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// Envelopes listed on the home page
const LATEST_SIGNATURES: usize = 5;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

pub async fn home(State(state): State<Arc<AppState>>) -> Result<Json<HomeResponse>, ApiError> {
    let has_settings = state.backend(BACKEND_CODE).await.is_ok();
    let latest = state.store.latest_signatures(LATEST_SIGNATURES).await?;
    Ok(Json(HomeResponse {
        has_settings,
        latest_signatures: latest.iter().map(SignatureResponse::from).collect(),
    }))
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    Json(SettingsResponse::from(&state.settings().await))
}

/// Store backend settings; blank values leave stored ones untouched
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(form): Json<SettingsForm>,
) -> Json<SettingsResponse> {
    let settings = state.update_settings(&form.into_settings()).await;
    Json(SettingsResponse::from(&settings))
}

/// Create an envelope around an uploaded document
pub async fn create_signature(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSignatureRequest>,
) -> Result<(StatusCode, Json<SignatureResponse>), ApiError> {
    // Decode PDF
    let content = BASE64
        .decode(req.document_base64.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid document base64: {}", e)))?;
    if content.is_empty() {
        return Err(ApiError::InvalidRequest("Document is empty".to_string()));
    }

    let signature_type = state
        .store
        .get_or_create_signature_type(BACKEND_CODE, "")
        .await?;
    let filename = document_filename(req.document_name.as_deref(), &req.title);
    let new = new_signature(
        signature_type,
        req.title,
        Some(Document::new(filename, content)),
        req.signers,
    )?;

    let signature = state.store.create_signature(new).await?;
    let signature = send_signature(&state, signature, req.callback_url).await?;
    Ok((StatusCode::CREATED, Json(SignatureResponse::from(&signature))))
}

/// Create an envelope rendered from a backend template
pub async fn create_template_signature(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTemplateSignatureRequest>,
) -> Result<(StatusCode, Json<SignatureResponse>), ApiError> {
    let template_id = req
        .template_id
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| state.config.template_id.clone())
        .ok_or_else(|| ApiError::InvalidRequest("template_id is required".to_string()))?;

    let signature_type = state
        .store
        .get_or_create_signature_type(BACKEND_CODE, &template_id)
        .await?;
    let new = new_signature(signature_type, req.title, None, req.signers)?;

    let signature = state.store.create_signature(new).await?;
    let signature = send_signature(&state, signature, req.callback_url).await?;
    Ok((StatusCode::CREATED, Json(SignatureResponse::from(&signature))))
}

fn new_signature(
    signature_type: SignatureType,
    title: String,
    document: Option<Document>,
    signers: Vec<SignerRequest>,
) -> Result<NewSignature, ApiError> {
    if signers.is_empty() {
        return Err(ApiError::InvalidRequest(
            "At least one signer is required".to_string(),
        ));
    }
    let new = NewSignature {
        signature_type,
        title: title.trim().to_string(),
        document,
        signers: signers.into_iter().map(NewSigner::from).collect(),
    };
    new.validate()?;
    Ok(new)
}

/// Create the envelope backend-side and record the ids it was given.
///
/// The draft stays stored when the backend refuses the envelope.
async fn send_signature(
    state: &AppState,
    signature: Signature,
    callback_url: Option<String>,
) -> Result<Signature, ApiError> {
    let backend = state
        .backend(&signature.signature_type.backend_code)
        .await?;
    let request = EnvelopeRequest {
        callback_url: callback_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| state.config.callback_url.clone()),
        subject: signature.title.clone(),
    };

    let created = backend
        .create_signature(&signature, &request)
        .await
        .inspect_err(|e| {
            tracing::warn!("Backend refused signature {}: {}", signature.id, e);
        })?;

    state
        .store
        .set_signature_backend_id(signature.id, &created.envelope_id)
        .await?;
    for (signer_id, recipient_id) in &created.recipient_ids {
        state
            .store
            .set_signer_backend_id(*signer_id, recipient_id)
            .await?;
    }

    tracing::info!(
        "Sent signature {} as envelope {} to {} signers",
        signature.id,
        created.envelope_id,
        signature.signers.len()
    );
    load_signature(state, signature.id).await
}

async fn load_signature(state: &AppState, id: SignatureId) -> Result<Signature, ApiError> {
    state
        .store
        .get_signature(id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            kind: "Signature",
            id: id.to_string(),
        })
}

pub async fn get_signature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let signature = load_signature(&state, SignatureId(id)).await?;
    Ok(Json(SignatureResponse::from(&signature)))
}

/// Get the current document of a signature
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, [(header::HeaderName, String); 2], Vec<u8>), ApiError> {
    let signature = load_signature(&state, SignatureId(id)).await?;
    let document = signature
        .document
        .filter(|d| !d.name.is_empty())
        .ok_or_else(|| ApiError::NotFound {
            kind: "Document",
            id: id.to_string(),
        })?;

    let filename = document
        .name
        .rsplit('/')
        .next()
        .unwrap_or(document.name.as_str())
        .to_string();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        document.content,
    ))
}

/// Redirect a signer into the embedded signing session
pub async fn signer_view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Redirect, ApiError> {
    let signer_id = SignerId(id);
    let signer = state
        .store
        .get_signer(signer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            kind: "Signer",
            id: signer_id.to_string(),
        })?;
    let signature = load_signature(&state, signer.signature_id).await?;
    if signature.backend_id.is_empty() {
        return Err(ApiError::InvalidRequest(format!(
            "Signature {} was never sent",
            signature.id
        )));
    }

    let backend = state
        .backend(&signature.signature_type.backend_code)
        .await?;
    let return_url = state.config.absolute_url(&signer_return_path(signer.id));
    let url = backend
        .recipient_view_url(&signature, &signer, &return_url)
        .await?;

    tracing::info!("Redirecting signer {} to recipient view", signer.id);
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    #[serde(default)]
    pub event: Option<String>,
}

/// Welcome the signer back from the signing session
pub async fn signer_return(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<ReturnQuery>,
) -> Result<Json<SignerReturnResponse>, ApiError> {
    let signer_id = SignerId(id);
    let signer = state
        .store
        .get_signer(signer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            kind: "Signer",
            id: signer_id.to_string(),
        })?;

    let message = match signer.status {
        Status::Completed => "Thank you, your signature has been recorded.",
        Status::Declined => "You declined to sign this document.",
        _ => "Thank you, your signature is being processed.",
    };
    Ok(Json(SignerReturnResponse {
        signer_id: signer.id,
        signature_id: signer.signature_id,
        full_name: signer.full_name,
        status: signer.status,
        event: query.event,
        message: message.to_string(),
    }))
}

/// Accept a status notification, either already normalized or as a DocuSign Connect event
fn read_notification(body: &[u8]) -> Result<EnvelopeNotification, ApiError> {
    match serde_json::from_slice::<EnvelopeNotification>(body) {
        Ok(notification) => Ok(notification),
        Err(_) => Ok(parse_notification(body)?),
    }
}

/// Status callback posted by the signing backend
pub async fn callback(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CallbackResponse>, ApiError> {
    let notification = read_notification(&body)?;
    tracing::debug!(
        "Callback for envelope {}: {} ({} recipients)",
        notification.envelope_id,
        notification.status,
        notification.recipients.len()
    );

    let signature = state
        .store
        .find_signature_by_backend_id(&notification.envelope_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            kind: "Envelope",
            id: notification.envelope_id.clone(),
        })?;
    let backend = state
        .backend(&signature.signature_type.backend_code)
        .await?;

    let update = state
        .callback_handler(backend)
        .apply_notification(&notification)
        .await?;

    Ok(Json(CallbackResponse {
        signature_id: update.signature.id,
        status: update.signature.status,
        document_replaced: update.document_replaced,
    }))
}
