//! Thin HTTP client over the DocuSign REST API

use anysign_core::BackendError;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::DocuSignConfig;
use crate::models::*;

const AUTH_HEADER: &str = "X-DocuSign-Authentication";

pub struct DocuSignClient {
    http: reqwest::Client,
    config: DocuSignConfig,
    account_url: OnceCell<String>,
}

fn http_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Http(format!("request timed out: {}", e))
    } else {
        BackendError::Http(e.to_string())
    }
}

impl DocuSignClient {
    pub fn new(config: DocuSignConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(http_error)?;
        Ok(Self {
            http,
            config,
            account_url: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &DocuSignConfig {
        &self.config
    }

    /// Base URL of the default account, discovered once per client
    pub async fn account_url(&self) -> Result<&str, BackendError> {
        self.account_url
            .get_or_try_init(|| async {
                let info = self.login_information().await?;
                let account = info.default_account().ok_or_else(|| {
                    BackendError::Configuration("DocuSign login has no accounts".to_string())
                })?;
                debug!("Using DocuSign account {}", account.account_id);
                Ok::<_, BackendError>(account.base_url.trim_end_matches('/').to_string())
            })
            .await
            .map(String::as_str)
    }

    pub async fn login_information(&self) -> Result<LoginInformation, BackendError> {
        let url = format!("{}/login_information", self.config.root_url);
        let response = self
            .http
            .get(&url)
            .header(AUTH_HEADER, self.config.authentication_header())
            .send()
            .await
            .map_err(http_error)?;
        json_body(response).await
    }

    pub async fn create_envelope(
        &self,
        definition: &EnvelopeDefinition,
    ) -> Result<EnvelopeSummary, BackendError> {
        let url = format!("{}/envelopes", self.account_url().await?);
        let response = self
            .http
            .post(&url)
            .header(AUTH_HEADER, self.config.authentication_header())
            .json(definition)
            .send()
            .await
            .map_err(http_error)?;
        json_body(response).await
    }

    pub async fn list_documents(
        &self,
        envelope_id: &str,
    ) -> Result<EnvelopeDocumentsResult, BackendError> {
        let url = format!("{}/envelopes/{}/documents", self.account_url().await?, envelope_id);
        let response = self
            .http
            .get(&url)
            .header(AUTH_HEADER, self.config.authentication_header())
            .send()
            .await
            .map_err(http_error)?;
        json_body(response).await
    }

    pub async fn document_content(
        &self,
        envelope_id: &str,
        document_id: &str,
    ) -> Result<Vec<u8>, BackendError> {
        let url = format!(
            "{}/envelopes/{}/documents/{}",
            self.account_url().await?,
            envelope_id,
            document_id
        );
        let response = self
            .http
            .get(&url)
            .header(AUTH_HEADER, self.config.authentication_header())
            .header(reqwest::header::ACCEPT, "application/pdf")
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response).await?;
        let body = response.bytes().await.map_err(http_error)?;
        Ok(body.to_vec())
    }

    pub async fn recipient_view(
        &self,
        envelope_id: &str,
        request: &RecipientViewRequest,
    ) -> Result<ViewUrl, BackendError> {
        let url = format!(
            "{}/envelopes/{}/views/recipient",
            self.account_url().await?,
            envelope_id
        );
        let response = self
            .http
            .post(&url)
            .header(AUTH_HEADER, self.config.authentication_header())
            .json(request)
            .send()
            .await
            .map_err(http_error)?;
        json_body(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorDetails>(&text)
        .map(|details| details.describe())
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                text
            }
        });
    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn json_body<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let response = check_status(response).await?;
    if response.status() == StatusCode::NO_CONTENT {
        return Err(BackendError::Decode("empty response body".to_string()));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}
