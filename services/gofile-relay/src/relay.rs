//! Upload endpoints
//!
//! Incoming bytes (a raw request body, or a file fetched from a URL) are
//! streamed to a spool file first, then handed to the uploader as a disk
//! source. Failover may read the file once per account, so it has to be
//! re-readable; the spool file is removed when the request finishes, however
//! it finishes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use account_pool::Uploader;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use storage::FileSource;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::error::RelayError;

const DEFAULT_DOWNLOAD_NAME: &str = "download.bin";

/// Query keys that commonly carry a filename in download links.
const FILENAME_QUERY_KEYS: &[&str] = &["filename", "file", "name", "download", "dl"];

/// Shared state for the upload handlers
#[derive(Clone)]
pub struct RelayState {
    pub uploader: Arc<Uploader>,
    /// Client for fetching remote files
    pub client: reqwest::Client,
    pub spool_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub download_timeout: Duration,
    pub transfers: Arc<Semaphore>,
}

impl RelayState {
    fn limit_mb(&self) -> u64 {
        self.max_upload_bytes / (1024 * 1024)
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub url: String,
    /// Overrides the name guessed from the response or the URL
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub filename: String,
    pub size_bytes: u64,
}

/// Temporary file in the spool directory, deleted on drop.
struct SpoolFile {
    path: PathBuf,
}

impl SpoolFile {
    async fn create(dir: &Path) -> Result<(Self, tokio::fs::File), RelayError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("spool_{}", uuid::Uuid::new_v4().as_simple()));
        let file = tokio::fs::File::create(&path).await?;
        Ok((Self { path }, file))
    }
}

impl Drop for SpoolFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove spool file");
        }
    }
}

/// Spool a raw request body and upload it.
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn upload_body(
    state: &RelayState,
    query: UploadQuery,
    body: axum::body::Body,
    request_id: &str,
) -> Result<UploadResponse, RelayError> {
    let filename = query
        .filename
        .as_deref()
        .and_then(sanitize_filename)
        .ok_or_else(|| RelayError::BadRequest("filename query parameter is required".into()))?;

    let _permit = acquire(&state.transfers).await?;
    let (spool, file) = SpoolFile::create(&state.spool_dir).await?;
    let size = write_stream(file, body.into_data_stream(), state, |e| {
        RelayError::BadRequest(format!("failed to read request body: {e}"))
    })
    .await?;
    crate::metrics::record_transfer_bytes("body", size);
    info!(filename = %filename, size_bytes = size, "request body spooled");

    upload_spooled(state, &spool, filename, size).await
}

/// Download a remote file into the spool and upload it.
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn upload_from_url(
    state: &RelayState,
    request: UploadUrlRequest,
    request_id: &str,
) -> Result<UploadResponse, RelayError> {
    let url = reqwest::Url::parse(request.url.trim())
        .map_err(|e| RelayError::BadRequest(format!("invalid url: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(RelayError::BadRequest(format!(
            "url must use http or https, got: {}",
            url.scheme()
        )));
    }

    let _permit = acquire(&state.transfers).await?;

    let response = state
        .client
        .get(url.clone())
        .timeout(state.download_timeout)
        .send()
        .await
        .map_err(|e| RelayError::Download(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::Download(format!("remote returned HTTP {status}")));
    }
    if let Some(len) = response.content_length()
        && len > state.max_upload_bytes
    {
        return Err(RelayError::PayloadTooLarge {
            limit_mb: state.limit_mb(),
        });
    }

    let filename = request
        .filename
        .as_deref()
        .and_then(sanitize_filename)
        .or_else(|| {
            response
                .headers()
                .get(reqwest::header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(filename_from_disposition)
        })
        .unwrap_or_else(|| filename_from_url(&url));

    let (spool, file) = SpoolFile::create(&state.spool_dir).await?;
    let size = write_stream(file, response.bytes_stream(), state, |e| {
        RelayError::Download(format!("reading remote body: {e}"))
    })
    .await?;
    crate::metrics::record_transfer_bytes("url", size);
    info!(filename = %filename, size_bytes = size, "remote file spooled");

    upload_spooled(state, &spool, filename, size).await
}

async fn acquire(transfers: &Semaphore) -> Result<tokio::sync::SemaphorePermit<'_>, RelayError> {
    transfers
        .acquire()
        .await
        .map_err(|_| RelayError::Io("transfer limiter closed".into()))
}

async fn upload_spooled(
    state: &RelayState,
    spool: &SpoolFile,
    filename: String,
    size: u64,
) -> Result<UploadResponse, RelayError> {
    let source = FileSource::from_path_named(&spool.path, filename.clone());
    let receipt = state.uploader.upload(&source).await?;
    Ok(UploadResponse {
        link: receipt.link,
        content_id: receipt.content_id,
        filename,
        size_bytes: size,
    })
}

/// Copy a byte stream into `file`, enforcing the upload size limit.
async fn write_stream<S, E>(
    mut file: tokio::fs::File,
    stream: S,
    state: &RelayState,
    read_error: impl Fn(E) -> RelayError,
) -> Result<u64, RelayError>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(&read_error)?;
        written += chunk.len() as u64;
        if written > state.max_upload_bytes {
            return Err(RelayError::PayloadTooLarge {
                limit_mb: state.limit_mb(),
            });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

/// Make a user-supplied name safe to report as an upload filename.
///
/// Drops any directory part, replaces reserved and control characters with
/// `_`, and collapses runs of whitespace and underscores.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim();

    let replaced: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut run = String::new();
    for c in replaced.chars() {
        if c.is_whitespace() || c == '_' {
            run.push(c);
            continue;
        }
        match run.chars().count() {
            0 => {}
            _ if out.is_empty() => {}
            1 => out.push_str(&run),
            _ => out.push(' '),
        }
        run.clear();
        out.push(c);
    }

    if out.is_empty() || out == "." || out == ".." {
        return None;
    }
    Some(out.chars().take(255).collect())
}

/// Filename from a Content-Disposition header, preferring `filename*`.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if key == "filename*" {
            // RFC 5987: charset'language'percent-encoded
            let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
            let decoded = percent_decode_str(encoded).decode_utf8_lossy();
            if let Some(name) = sanitize_filename(&decoded) {
                return Some(name);
            }
        } else if key == "filename" {
            plain = sanitize_filename(value.trim_matches('"'));
        }
    }
    plain
}

/// Filename guessed from a download URL: common query keys first, then the
/// last path segment if it has an extension, else `download.bin`.
pub fn filename_from_url(url: &reqwest::Url) -> String {
    for key in FILENAME_QUERY_KEYS {
        if let Some(name) = url
            .query_pairs()
            .find(|(k, v)| &**k == *key && !v.is_empty())
            .and_then(|(_, v)| sanitize_filename(&v))
        {
            return name;
        }
    }

    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .filter(|segment| segment.contains('.'))
        .and_then(|segment| sanitize_filename(&segment))
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string())
}
