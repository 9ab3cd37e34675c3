use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use condogate_core::{EmbeddingExtractor, ExtractError, Extraction};
use image::ImageFormat;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Header carrying the shared service key.
pub const API_KEY_HEADER: &str = "x-ml-key";

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Service root, e.g. `https://embed.example.net`. Trailing slashes are ignored.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Length of the vectors the service returns.
    pub dimension: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    ok: bool,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    error: Option<String>,
}

/// [`EmbeddingExtractor`] backed by the remote service.
///
/// Uses the blocking reqwest client, so every call must run off the async
/// runtime. The HTTP client is built in [`init`](EmbeddingExtractor::init) (or
/// on first use) and dropped in [`shutdown`](EmbeddingExtractor::shutdown),
/// keeping its lifetime on the calling worker thread.
pub struct RemoteExtractor {
    config: RemoteConfig,
    base_url: String,
    client: Mutex<Option<Client>>,
    closed: AtomicBool,
}

impl RemoteExtractor {
    pub fn new(config: RemoteConfig) -> Result<Self, ExtractError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ExtractError::Unavailable("embedding service URL not set".into()));
        }
        Ok(Self {
            config,
            base_url,
            client: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn client(&self) -> Result<Client, ExtractError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExtractError::Closed);
        }
        let mut slot = self
            .client
            .lock()
            .map_err(|_| ExtractError::Unavailable("client lock poisoned".into()))?;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        // the blocking client defaults to 30s; None disables the timeout
        let client = Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| ExtractError::Unavailable(format!("http client: {e}")))?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn request(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => builder.header(API_KEY_HEADER, key),
            _ => builder,
        }
    }
}

impl EmbeddingExtractor for RemoteExtractor {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn init(&self) -> Result<(), ExtractError> {
        let client = self.client()?;
        let url = self.endpoint("health");
        let response = self
            .request(client.get(&url))
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Unavailable(format!(
                "health check returned {status}"
            )));
        }
        tracing::info!(url = %self.base_url, "embedding service reachable");
        Ok(())
    }

    fn extract(&self, image: &[u8]) -> Result<Extraction, ExtractError> {
        let format = sniff_image(image)?;
        let client = self.client()?;
        let encoded = STANDARD.encode(image);
        tracing::debug!(?format, bytes = image.len(), "requesting embedding");

        let response = self
            .request(client.post(self.endpoint("embed")))
            .json(&EmbedRequest {
                image_base64: &encoded,
            })
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().map_err(transport_error)?;
        if !status.is_success() {
            let snippet = String::from_utf8_lossy(&body[..body.len().min(200)]).into_owned();
            return Err(ExtractError::Unavailable(format!("embed returned {status}: {snippet}")));
        }
        parse_embed_response(&body, self.config.dimension)
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.client.lock() {
            slot.take();
        }
    }
}

fn transport_error(err: reqwest::Error) -> ExtractError {
    if err.is_timeout() {
        ExtractError::Timeout
    } else {
        ExtractError::Unavailable(err.to_string())
    }
}

/// Identify the container format from magic bytes.
pub fn sniff_image(bytes: &[u8]) -> Result<ImageFormat, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::InvalidImage("empty image".into()));
    }
    image::guess_format(bytes)
        .map_err(|_| ExtractError::InvalidImage("unrecognized image format".into()))
}

/// Decode an `/embed` reply body.
pub fn parse_embed_response(body: &[u8], dimension: usize) -> Result<Extraction, ExtractError> {
    let reply: EmbedResponse =
        serde_json::from_slice(body).map_err(|e| ExtractError::Malformed(e.to_string()))?;
    if !reply.ok {
        if let Some(reason) = reply.error.as_deref() {
            tracing::debug!(reason, "embedding service found no face");
        }
        return Ok(Extraction::NoFace);
    }
    let embedding = reply
        .embedding
        .ok_or_else(|| ExtractError::Malformed("ok reply without embedding".into()))?;
    if embedding.len() != dimension {
        return Err(ExtractError::Malformed(format!(
            "expected {dimension} floats, got {}",
            embedding.len()
        )));
    }
    Ok(Extraction::Face(embedding))
}
