//! Where images live between stages.
//!
//! Remote jobs take image references, not bytes, so the original and the
//! generated mask have to be put somewhere the service can fetch them
//! from. [`ImgbbHost`] uploads to an imgbb-style endpoint;
//! [`crate::memory::MemoryHost`] keeps objects in a map.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::config::HostingConfig;
use crate::error::HostError;
use crate::job::ImageRef;

/// Stores and retrieves image bytes by reference.
pub trait ObjectHost: Send + Sync {
    /// Store `bytes` under `file_name` and return where they can be
    /// fetched from.
    fn store_bytes(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<ImageRef, HostError>> + Send;

    /// Fetch the bytes at `url`.
    fn fetch_bytes(&self, url: &ImageRef) -> impl Future<Output = Result<Vec<u8>, HostError>> + Send;
}

impl<H: ObjectHost> ObjectHost for &H {
    fn store_bytes(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<ImageRef, HostError>> + Send {
        (**self).store_bytes(bytes, file_name)
    }

    fn fetch_bytes(&self, url: &ImageRef) -> impl Future<Output = Result<Vec<u8>, HostError>> + Send {
        (**self).fetch_bytes(url)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadedImage,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    url: String,
}

/// Image host speaking the imgbb upload API.
///
/// Uploads are `POST {upload_url}?key=...` with a multipart `image`
/// field; the response's `data.url` is the public locator. Downloads are
/// plain `GET`s and work for any URL, including job outputs.
#[derive(Debug, Clone)]
pub struct ImgbbHost {
    http: reqwest::Client,
    upload_url: String,
    api_key: String,
}

impl ImgbbHost {
    /// Build a host client.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Upload`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &HostingConfig, api_key: impl Into<String>) -> Result<Self, HostError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| HostError::Upload {
                file_name: String::new(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            http,
            upload_url: config.upload_url.clone(),
            api_key: api_key.into(),
        })
    }
}

impl ObjectHost for ImgbbHost {
    async fn store_bytes(&self, bytes: Vec<u8>, file_name: &str) -> Result<ImageRef, HostError> {
        let upload_error = |detail: String| HostError::Upload {
            file_name: file_name.to_owned(),
            detail,
        };
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_owned());
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .http
            .post(&self.upload_url)
            .query(&[("key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upload_error(format!("HTTP {status}: {body}")));
        }
        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| upload_error(format!("unexpected response: {e}")))?;

        tracing::debug!(file_name, size, url = %uploaded.data.url, "image hosted");
        Ok(ImageRef::new(uploaded.data.url))
    }

    async fn fetch_bytes(&self, url: &ImageRef) -> Result<Vec<u8>, HostError> {
        let download_error = |detail: String| HostError::Download {
            url: url.to_string(),
            detail,
        };
        let response = self
            .http
            .get(url.as_str())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| download_error(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn upload_response_shape() {
        let response: UploadResponse = serde_json::from_value(json!({
            "data": { "id": "abc", "url": "https://i.ibb.co/abc/mask.png", "size": 12 },
            "success": true,
            "status": 200,
        }))
        .unwrap();
        assert_eq!(response.data.url, "https://i.ibb.co/abc/mask.png");
    }

    #[test]
    fn builds_from_default_config() {
        let host = ImgbbHost::new(&HostingConfig::default(), "key").unwrap();
        assert_eq!(host.upload_url, HostingConfig::DEFAULT_UPLOAD_URL);
    }
}
