//! reqwest-backed authority client

use crate::authority::{Authority, ChallengeRequest, ChallengeResponse, SyncAck, SyncRequest};
use crate::error::SyncError;
use async_trait::async_trait;
use rollet_certs::HouseCertificate;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub struct HttpAuthority {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthority {
    /// Client for the authority at `base_url` (http or https)
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, SyncError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(SyncError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: trimmed.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "authority request");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn request_challenge(&self, house_cert: &HouseCertificate) -> Result<String, SyncError> {
        let body = ChallengeRequest {
            house_cert: house_cert.clone(),
        };
        let text = self.post_json("/sync/challenge", &body).await?;
        let response: ChallengeResponse =
            serde_json::from_str(&text).map_err(|e| SyncError::Malformed(e.to_string()))?;
        Ok(response.nonce)
    }

    async fn submit(&self, request: &SyncRequest) -> Result<SyncAck, SyncError> {
        let text = self.post_json("/sync", request).await?;
        if text.trim().is_empty() {
            return Ok(SyncAck::default());
        }
        serde_json::from_str(&text).map_err(|e| SyncError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_scheme() {
        let result = HttpAuthority::new("ftp://authority.example", Duration::from_secs(1));
        assert!(matches!(result, Err(SyncError::InvalidUrl(_))));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let authority = HttpAuthority::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(authority.base_url(), "http://localhost:8080");
    }
}
