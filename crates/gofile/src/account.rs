//! Account identity and account-info lookups
//!
//! `GET /accounts/getid` maps a token to its account id; `GET /accounts/{id}`
//! returns the account document. The id has moved around between API
//! revisions (`data` as a string, `data.id`, `data.accountId`, or top level),
//! so extraction tries each shape in turn.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::{Endpoints, bearer};

/// Resolve the account id for a token.
///
/// 401/403 map to `InvalidCredentials`; other non-success statuses to `Status`.
pub async fn get_account_id(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    token: &str,
) -> Result<String> {
    let body = get_json(client, &endpoints.api("accounts/getid"), token).await?;
    extract_account_id(&body).ok_or_else(|| {
        Error::MalformedResponse(format!("no account id in getid response: {body}"))
    })
}

/// Fetch the raw account document.
///
/// The document is returned unparsed; usage extraction happens in the pool.
pub async fn get_account_info(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    token: &str,
    account_id: &str,
) -> Result<Value> {
    get_json(client, &endpoints.api(&format!("accounts/{account_id}")), token).await
}

async fn get_json(client: &reqwest::Client, url: &str, token: &str) -> Result<Value> {
    let response = client
        .get(url)
        .header(reqwest::header::AUTHORIZATION, bearer(token))
        .send()
        .await
        .map_err(|e| Error::from_transport("account request", e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::from_transport("reading account response", e))?;

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(Error::InvalidCredentials(format!(
            "token rejected ({status}): {body}"
        )));
    }
    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }

    debug!(url, "account endpoint responded");
    serde_json::from_str(&body)
        .map_err(|e| Error::MalformedResponse(format!("account response is not JSON: {e}")))
}

/// Pull the account id out of a getid response.
pub fn extract_account_id(body: &Value) -> Option<String> {
    if let Some(data) = body.get("data") {
        if let Some(id) = non_empty_str(data) {
            return Some(id);
        }
        for key in ["id", "accountId"] {
            if let Some(id) = data.get(key).and_then(non_empty_str) {
                return Some(id);
            }
        }
    }
    ["accountId", "id"]
        .iter()
        .find_map(|key| body.get(*key).and_then(non_empty_str))
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
