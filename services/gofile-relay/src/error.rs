//! Per-request errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors a relay request can end with.
///
/// Each maps to a status code and a stable `type` string in the JSON body:
/// `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("payload exceeds the {limit_mb} MB upload limit")]
    PayloadTooLarge { limit_mb: u64 },

    #[error("download failed: {0}")]
    Download(String),

    #[error("local I/O failed: {0}")]
    Io(String),

    #[error(transparent)]
    Pool(#[from] account_pool::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Download(_) => StatusCode::BAD_GATEWAY,
            RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Pool(account_pool::Error::PoolExhausted(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RelayError::Pool(account_pool::Error::UploadFailed { .. }) => StatusCode::BAD_GATEWAY,
            RelayError::Pool(account_pool::Error::EmptyPool) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::BadRequest(_) => "invalid_request",
            RelayError::PayloadTooLarge { .. } => "payload_too_large",
            RelayError::Download(_) => "download_failed",
            RelayError::Io(_) => "io_error",
            RelayError::Pool(e) => e.kind(),
        }
    }

    /// JSON error response tagged with the request id.
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        error_response(self.status(), self.kind(), &self.to_string(), request_id)
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(e.to_string())
    }
}

pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use account_pool::StatusCounts;

    #[test]
    fn pool_errors_map_to_gateway_statuses() {
        let exhausted = RelayError::from(account_pool::Error::PoolExhausted(StatusCounts {
            exhausted: 2,
            ..StatusCounts::default()
        }));
        assert_eq!(exhausted.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(exhausted.kind(), "pool_exhausted");
        assert!(exhausted.to_string().contains("2 exhausted"));

        let failed = RelayError::from(account_pool::Error::UploadFailed {
            accounts_tried: 3,
            last_error: "connection reset".into(),
        });
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(failed.kind(), "upload_failed");
    }

    #[test]
    fn request_errors_map_to_client_statuses() {
        assert_eq!(
            RelayError::BadRequest("missing url".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let too_large = RelayError::PayloadTooLarge { limit_mb: 5 };
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(too_large.to_string(), "payload exceeds the 5 MB upload limit");
        assert_eq!(
            RelayError::Download("404".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn response_body_carries_type_and_request_id() {
        let response = RelayError::BadRequest("filename is required".into())
            .into_response_with_id("req_abc");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "invalid_request");
        assert_eq!(json["error"]["message"], "filename is required");
        assert_eq!(json["error"]["request_id"], "req_abc");
    }
}
