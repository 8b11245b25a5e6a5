//! GoFile HTTP API client
//!
//! Thin async wrappers over the three GoFile endpoints the relay needs:
//! 1. `account::get_account_id()` resolves the account behind a bearer token
//! 2. `account::get_account_info()` fetches the raw account document (usage lives here)
//! 3. `upload::upload_file()` posts a multipart upload and extracts the share link
//!
//! The crate knows nothing about pools or failover. Responses are parsed
//! leniently because GoFile renames fields between API revisions.

pub mod account;
pub mod constants;
pub mod error;
pub mod upload;

pub use account::{get_account_id, get_account_info};
pub use constants::*;
pub use error::{Error, Result};
pub use upload::upload_file;

/// Base URLs for the GoFile API. Overridable so tests can point at a local server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api_base: String,
    pub upload_url: String,
}

impl Endpoints {
    pub fn new(api_base: impl Into<String>, upload_url: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            upload_url: upload_url.into(),
        }
    }

    pub(crate) fn api(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(API_BASE, UPLOAD_URL)
    }
}

/// Bearer header value for a token.
pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoints_point_at_gofile() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.api_base, "https://api.gofile.io");
        assert_eq!(endpoints.upload_url, "https://upload.gofile.io/uploadfile");
    }

    #[test]
    fn api_path_joins_without_double_slash() {
        let endpoints = Endpoints::new("http://127.0.0.1:9999/", "http://x/upload");
        assert_eq!(
            endpoints.api("accounts/getid"),
            "http://127.0.0.1:9999/accounts/getid"
        );
    }
}
