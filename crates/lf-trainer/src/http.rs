//! HTTP client for the training service.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Call          | Request                                   |
//! |---------------|-------------------------------------------|
//! | `submit`      | `POST /jobs` multipart `config` + `dataset` |
//! | `status`      | `GET /jobs/{track_id}`                    |
//! | `poll_result` | `GET /jobs/{track_id}/result`             |
//! | `cancel`      | `POST /jobs/{track_id}/cancel`            |

use crate::error::{ServiceError, ServiceResult};
use crate::service::TrainingService;
use crate::wire::{JobStatus, ResultPayload, SubmitRequest, SubmitResponse};
use async_trait::async_trait;
use lf_core::config::TrainingServiceConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

pub struct HttpTrainingService {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpTrainingService {
    /// Build a client with the configured per-request timeout.
    pub fn new(config: &TrainingServiceConfig) -> ServiceResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ServiceError::Transport(format!("invalid base URL '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Transport(format!(
                "base URL '{}' cannot carry a path",
                config.base_url
            )));
        }
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServiceError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Append escaped path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(reqwest::header::AUTHORIZATION, key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, track_id: Option<&str>) -> ServiceResult<Response> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(track_id) = track_id {
                return Err(ServiceError::UnknownJob {
                    track_id: track_id.to_string(),
                });
            }
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        track_id: &str,
    ) -> ServiceResult<T> {
        let url = self.url(segments);
        let response = self
            .send(self.client.get(url.clone()), Some(track_id))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedPayload(format!("{}: {e}", url.path())))
    }
}

#[async_trait]
impl TrainingService for HttpTrainingService {
    async fn submit(&self, archive: Vec<u8>, request: &SubmitRequest) -> ServiceResult<String> {
        let config = serde_json::to_string(request)
            .map_err(|e| ServiceError::MalformedPayload(format!("submit config: {e}")))?;
        let file_name = format!("dataset-{}.tar.gz", uuid::Uuid::new_v4());
        log::debug!(
            "Submitting {} ({} bytes) to {}",
            request.model_track_key,
            archive.len(),
            self.base_url
        );
        let dataset = Part::bytes(archive)
            .file_name(file_name)
            .mime_str("application/gzip")?;
        let form = Form::new().text("config", config).part("dataset", dataset);

        let response = self
            .send(self.client.post(self.url(&["jobs"])).multipart(form), None)
            .await?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedPayload(format!("submit response: {e}")))?;
        if body.track_id.trim().is_empty() {
            return Err(ServiceError::Rejected(
                "service returned an empty track id".to_string(),
            ));
        }
        Ok(body.track_id)
    }

    async fn status(&self, track_id: &str) -> ServiceResult<JobStatus> {
        self.get_json(&["jobs", track_id], track_id).await
    }

    async fn poll_result(&self, track_id: &str) -> ServiceResult<ResultPayload> {
        self.get_json(&["jobs", track_id, "result"], track_id)
            .await
    }

    async fn cancel(&self, track_id: &str) -> ServiceResult<()> {
        self.send(
            self.client.post(self.url(&["jobs", track_id, "cancel"])),
            Some(track_id),
        )
        .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
