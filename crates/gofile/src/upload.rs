//! Multipart file upload
//!
//! Posts the file as the `file` part of a multipart form to the upload host.
//! Disk sources are streamed straight from a freshly opened handle, so the same
//! `FileSource` can be uploaded again after a failed attempt.
//!
//! A successful response carries the share link under `data.downloadPage`
//! (older revisions used `downloadUrl` or `page`). HTTP 200 is not enough on its
//! own: GoFile reports many failures as `{"status":"error-..."}` with a 200.

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use storage::{FileSource, UploadReceipt};
use tracing::debug;

use crate::constants::STATUS_OK;
use crate::error::{Error, Result};
use crate::{Endpoints, bearer};

const LINK_KEYS: &[&str] = &["downloadPage", "downloadUrl", "page"];
const CONTENT_ID_KEYS: &[&str] = &["contentId", "id"];

/// Upload a file, optionally into an existing folder.
pub async fn upload_file(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    token: &str,
    file: &FileSource,
    folder_id: Option<&str>,
) -> Result<UploadReceipt> {
    let mut url = reqwest::Url::parse(&endpoints.upload_url)
        .map_err(|e| Error::Http(format!("invalid upload url: {e}")))?;
    if let Some(folder) = folder_id {
        url.query_pairs_mut().append_pair("folderId", folder);
    }

    let form = Form::new().part("file", file_part(file).await?);

    let response = client
        .post(url)
        .header(reqwest::header::AUTHORIZATION, bearer(token))
        .multipart(form)
        .send()
        .await
        .map_err(|e| Error::from_transport("upload request", e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::from_transport("reading upload response", e))?;

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }

    let json: Value = serde_json::from_str(&body)
        .map_err(|e| Error::MalformedResponse(format!("upload response is not JSON: {e}")))?;

    if let Some(api_status) = json.get("status").and_then(|s| s.as_str())
        && api_status != STATUS_OK
    {
        return Err(Error::Api {
            status: api_status.to_string(),
            body,
        });
    }

    let receipt = extract_receipt(&json)
        .ok_or_else(|| Error::MalformedResponse(format!("no share link in response: {body}")))?;
    debug!(filename = file.filename(), link = %receipt.link, "upload accepted");
    Ok(receipt)
}

/// Build the multipart part, opening disk sources anew.
async fn file_part(file: &FileSource) -> Result<Part> {
    let part = match file {
        FileSource::Memory { data, .. } => {
            Part::stream_with_length(reqwest::Body::from(data.clone()), data.len() as u64)
        }
        FileSource::Disk { path, .. } => {
            let handle = tokio::fs::File::open(path)
                .await
                .map_err(|e| Error::Io(format!("opening {}: {e}", path.display())))?;
            let len = handle
                .metadata()
                .await
                .map_err(|e| Error::Io(format!("stat {}: {e}", path.display())))?
                .len();
            Part::stream_with_length(handle, len)
        }
    };
    Ok(part.file_name(file.filename().to_string()))
}

/// Pull the share link and content id out of an upload response.
///
/// Looks under `data` when present, otherwise at the top level.
pub fn extract_receipt(body: &Value) -> Option<UploadReceipt> {
    let data = body.get("data").filter(|d| d.is_object()).unwrap_or(body);

    let link = LINK_KEYS.iter().find_map(|key| {
        data.get(*key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    })?;

    let content_id = CONTENT_ID_KEYS.iter().find_map(|key| match data.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    Some(UploadReceipt { link, content_id })
}
