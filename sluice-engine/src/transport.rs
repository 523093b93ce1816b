//! Upload transport
//!
//! One entry's payload is sent as the raw body of a single HTTP POST to
//! `<endpoint>/<relative path>`; there is no multipart framing. The
//! transport emits `(loaded, total, size_known)` samples at its own cadence
//! while the body streams out.
//!
//! The `Transport` trait exists so the engine can be driven without a live
//! network in tests; `HttpTransport` is the real implementation.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::entry::Payload;

/// Read/stream chunk size for upload bodies
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// Characters escaped when the relative path is placed in the upload URL.
/// `/` is deliberately left alone so directory structure survives.
const UPLOAD_PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

// =============================================================================
// Progress and Failure Types
// =============================================================================

/// One byte-level progress sample from an in-flight upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Bytes handed to the transport so far
    pub loaded_bytes: u64,
    /// Total payload size, meaningful only when `size_known` is true
    pub total_bytes: u64,
    /// Whether the transport knows the payload size
    pub size_known: bool,
}

/// Terminal failure of one transfer
///
/// The `Display` output is exactly what gets recorded as the entry's
/// failure message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFailure {
    /// The server answered with a non-success status
    #[error("{status}: {body}")]
    ServerRejected { status: u16, body: String },

    /// The request could not be completed at all; no further detail is
    /// assumed available from the transport
    #[error("Communication error")]
    Transport,
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Sends one payload and reports progress at its own cadence
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmit `payload` as the raw body of a single POST to `url`
    ///
    /// Progress samples go out on `progress` while the body streams; the
    /// sender is dropped when transmission ends, which is how consumers
    /// know the sample stream is complete.
    async fn send(
        &self,
        url: &str,
        payload: &Payload,
        progress: mpsc::UnboundedSender<ProgressSample>,
    ) -> Result<(), TransferFailure>;
}

/// Build the upload URL for one entry
///
/// The relative path keeps its `/` separators; everything the URL grammar
/// would misread is percent-encoded.
pub fn upload_url(endpoint: &str, relative_path: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        utf8_percent_encode(relative_path, UPLOAD_PATH_SET)
    )
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// Real transport over HTTP POST, built on reqwest
///
/// No timeout is configured: a stalled upload surfaces only if the
/// transport itself reports an error, matching the engine's contract.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a default client
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Create a transport around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        url: &str,
        payload: &Payload,
        progress: mpsc::UnboundedSender<ProgressSample>,
    ) -> Result<(), TransferFailure> {
        let total_bytes = payload.size();

        let chunks: BoxStream<'static, Result<Bytes, io::Error>> = match payload {
            Payload::File { path, .. } => {
                let file = File::open(path).await.map_err(|e| {
                    debug!(path = %path.display(), error = %e, "failed to open payload");
                    TransferFailure::Transport
                })?;
                ReaderStream::with_capacity(file, CHUNK_SIZE).boxed()
            }
            Payload::Bytes(data) => stream::iter(chunk_bytes(data)).boxed(),
        };

        let body = reqwest::Body::wrap_stream(counted(chunks, total_bytes, progress));

        let response = self
            .client
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                debug!(url, error = %e, "upload request failed");
                TransferFailure::Transport
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransferFailure::ServerRejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Split an in-memory payload into transport-sized chunks
fn chunk_bytes(data: &Bytes) -> Vec<Result<Bytes, io::Error>> {
    let mut chunks = Vec::with_capacity(data.len().div_ceil(CHUNK_SIZE).max(1));
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + CHUNK_SIZE).min(data.len());
        chunks.push(Ok(data.slice(offset..end)));
        offset = end;
    }
    chunks
}

/// Wrap a chunk stream so every chunk handed to the transport emits a
/// cumulative progress sample
fn counted<S>(
    chunks: S,
    total_bytes: u64,
    progress: mpsc::UnboundedSender<ProgressSample>,
) -> impl Stream<Item = Result<Bytes, io::Error>>
where
    S: Stream<Item = Result<Bytes, io::Error>>,
{
    let mut loaded_bytes: u64 = 0;
    chunks.inspect(move |chunk| {
        if let Ok(chunk) = chunk {
            loaded_bytes += chunk.len() as u64;
            let _ = progress.send(ProgressSample {
                loaded_bytes,
                total_bytes,
                size_known: true,
            });
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
