use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;

use pushmon_common::signing;
use pushmon_common::types::Metric;

/// Header carrying the HMAC-SHA256 hex digest of the uncompressed body.
pub const HASH_HEADER: &str = "HashSHA256";

/// Network-level failures get this many extra attempts before giving up.
const RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(40);

/// Delivery failure surfaced to the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("encoding batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("compressing batch: {0}")]
    Compress(#[from] std::io::Error),

    #[error("sending batch: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),
}

/// Destination for merged metric batches. The dispatcher only knows this
/// seam, which keeps the worker pool testable without a live server.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn send_batch(&self, batch: &[Metric]) -> Result<(), TransportError>;
}

/// HTTP transport: encodes, signs, compresses and POSTs one batch per call.
#[derive(Clone)]
pub struct TransportClient {
    client: reqwest::Client,
    endpoint: String,
    key: Option<String>,
}

impl TransportClient {
    pub fn new(endpoint: String, key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            key,
        }
    }

    /// Digest over the uncompressed body, independent of transport encoding.
    fn signature(&self, body: &[u8]) -> Option<String> {
        self.key.as_deref().map(|key| signing::sign(key, body))
    }
}

#[async_trait]
impl MetricSink for TransportClient {
    async fn send_batch(&self, batch: &[Metric]) -> Result<(), TransportError> {
        let body = serde_json::to_vec(batch)?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT_ENCODING, "gzip")
            .body(gzip_encode(&body)?);
        if let Some(digest) = self.signature(&body) {
            request = request.header(HASH_HEADER, digest);
        }
        let mut result = request.send().await;

        // Only network-level errors retry, with a linearly growing delay and
        // an uncompressed fallback body; an HTTP error status is terminal.
        let mut attempt = 0;
        while result.is_err() && attempt < RETRIES {
            attempt += 1;
            tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
            tracing::warn!(attempt, endpoint = %self.endpoint, "retrying batch without compression");

            let mut request = self
                .client
                .post(&self.endpoint)
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
            if let Some(digest) = self.signature(&body) {
                request = request.header(HASH_HEADER, digest);
            }
            result = request.send().await;
        }

        let response = result?;
        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status()));
        }

        let compressed = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| value.contains("gzip"));
        let bytes = response.bytes().await?;
        let ack = if compressed {
            gzip_decode(&bytes)?
        } else {
            bytes.to_vec()
        };
        tracing::debug!(bytes = ack.len(), "batch acknowledged");
        Ok(())
    }
}

fn gzip_encode(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn gzip_decode(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(decoded)
}
