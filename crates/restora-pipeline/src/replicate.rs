//! HTTP client for a Replicate-style prediction API.
//!
//! - `POST {base}/predictions` with `{"version", "input"}` for targets
//!   that pin a version,
//! - `POST {base}/models/{owner}/{name}/predictions` with `{"input"}`
//!   for unpinned model targets,
//! - `GET {base}/predictions/{id}` and
//!   `POST {base}/predictions/{id}/cancel`.
//!
//! Every request carries the bearer token and is bounded by the
//! configured per-request timeout.

use std::time::Duration;

use serde_json::json;

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::job::{JobId, JobInput, Prediction, Target};
use crate::service::PredictionService;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("restora/", env!("CARGO_PKG_VERSION"));

/// Prediction API over HTTP.
#[derive(Debug, Clone)]
pub struct ReplicateService {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ReplicateService {
    /// Build a client for the API at `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] if the HTTP client cannot be
    /// constructed (e.g. no TLS backend).
    pub fn new(config: &ServiceConfig, token: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Prediction, ServiceError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

impl PredictionService for ReplicateService {
    async fn create_prediction(
        &self,
        target: &Target,
        input: &JobInput,
    ) -> Result<Prediction, ServiceError> {
        let request = match target {
            Target::Model {
                owner,
                name,
                version: None,
            } => self
                .http
                .post(self.url(&format!("models/{owner}/{name}/predictions")))
                .json(&json!({ "input": input })),
            Target::Version(version)
            | Target::Model {
                version: Some(version),
                ..
            } => self
                .http
                .post(self.url("predictions"))
                .json(&json!({ "version": version, "input": input })),
        };
        self.send(request).await
    }

    async fn get_prediction(&self, id: &JobId) -> Result<Prediction, ServiceError> {
        self.send(self.http.get(self.url(&format!("predictions/{id}"))))
            .await
    }

    async fn cancel_prediction(&self, id: &JobId) -> Result<Prediction, ServiceError> {
        self.send(self.http.post(self.url(&format!("predictions/{id}/cancel"))))
            .await
    }
}
