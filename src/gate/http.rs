use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{validate_order, GateError, SessionGate};
use crate::feed::FeedRecord;

/// Header carrying the admin secret on every request.
pub const SECRET_HEADER: &str = "X-Admin-Secret";

/// Session gate backed by the application's HTTP API.
///
/// Endpoints, relative to the base URL:
/// - `GET    api/feeds`       - canonical list
/// - `POST   api/feeds`       - upsert one record (JSON body)
/// - `DELETE api/feeds/{id}`  - remove one record
/// - `PUT    api/feeds/order` - replace the order, body `{"ids": [...]}`
#[derive(Debug, Clone)]
pub struct HttpGate {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGate {
    /// Create a gate for `base_url`.
    ///
    /// SEC-002: HTTPS is required so the secret never travels in clear text;
    /// plain HTTP is accepted only for localhost (testing).
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, GateError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GateError::Validation(format!("base URL is not valid: {}", e)))?;

        match base_url.scheme() {
            "https" => {}
            "http" => {
                let is_localhost = matches!(base_url.host_str(), Some("localhost" | "127.0.0.1"));
                if !is_localhost {
                    tracing::error!(base_url = %base_url, "Rejecting non-HTTPS gate URL (HTTPS required except for localhost)");
                    return Err(GateError::InsecureBaseUrl);
                }
                tracing::warn!(base_url = %base_url, "Using non-HTTPS gate URL (localhost only)");
            }
            _ => return Err(GateError::InsecureBaseUrl),
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GateError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GateError::Validation("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(request: RequestBuilder, secret: &SecretString) -> Result<Response, GateError> {
        let response = request
            .header(SECRET_HEADER, secret.expose_secret())
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GateError::Unauthorized),
            status if !status.is_success() => Err(GateError::Status(status.as_u16())),
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl SessionGate for HttpGate {
    async fn list(&self, secret: &SecretString) -> Result<Vec<FeedRecord>, GateError> {
        let url = self.endpoint(&["api", "feeds"])?;
        let response = Self::send(self.client.get(url), secret).await?;
        let feeds: Vec<FeedRecord> = response.json().await?;
        tracing::debug!(count = feeds.len(), "Fetched feed list");
        Ok(feeds)
    }

    async fn upsert(&self, record: &FeedRecord, secret: &SecretString) -> Result<(), GateError> {
        let url = self.endpoint(&["api", "feeds"])?;
        Self::send(self.client.post(url).json(record), secret).await?;
        tracing::debug!(id = %record.id, "Upserted feed");
        Ok(())
    }

    async fn remove(&self, id: &str, secret: &SecretString) -> Result<(), GateError> {
        let url = self.endpoint(&["api", "feeds", id])?;
        Self::send(self.client.delete(url), secret).await?;
        tracing::debug!(id, "Removed feed");
        Ok(())
    }

    async fn reorder(&self, ids: &[String], secret: &SecretString) -> Result<(), GateError> {
        validate_order(ids)?;
        let url = self.endpoint(&["api", "feeds", "order"])?;
        let body = serde_json::json!({ "ids": ids });
        Self::send(self.client.put(url).json(&body), secret).await?;
        tracing::debug!(count = ids.len(), "Saved feed order");
        Ok(())
    }
}
