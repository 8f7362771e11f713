//! Remote status endpoint probes.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time;

/// Largest status body we are willing to read.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Minimum payload of a status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub status: String,
    pub uptime_seconds: f64,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid body: {0}")]
    Body(String),
}

/// One status poll.
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    async fn probe(&self) -> Result<StatusBody, ProbeError>;
}

/// GETs a status URL over plain HTTP.
pub struct HttpHealthProbe {
    uri: Uri,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl HttpHealthProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let uri: Uri = url.parse().map_err(|e| ProbeError::Request(format!("{}", e)))?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self {
            uri,
            timeout,
            client,
        })
    }

    async fn fetch(&self) -> Result<StatusBody, ProbeError> {
        let request = Request::builder()
            .method("GET")
            .uri(self.uri.clone())
            .header("user-agent", "telemetry-hub-health-check")
            .header("accept", "application/json")
            .body(Body::empty())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let response: hyper::Response<hyper::body::Incoming> = self
            .client
            .request(request)
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES)
            .await
            .map_err(|e| ProbeError::Body(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ProbeError::Body("empty response".to_string()));
        }
        serde_json::from_slice(&bytes).map_err(|e| ProbeError::Body(e.to_string()))
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> Result<StatusBody, ProbeError> {
        match time::timeout(self.timeout, self.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_uses_camel_case() {
        let body: StatusBody =
            serde_json::from_str(r#"{"status":"ok","uptimeSeconds":12.5,"version":"1.2.0"}"#).unwrap();
        assert_eq!(body.uptime_seconds, 12.5);
        assert!(serde_json::from_str::<StatusBody>(r#"{"status":"ok"}"#).is_err());
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(HttpHealthProbe::new("not a url at all", Duration::from_secs(1)).is_err());
    }
}
