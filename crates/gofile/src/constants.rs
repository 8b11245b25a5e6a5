//! GoFile API constants

/// REST API base for account endpoints
pub const API_BASE: &str = "https://api.gofile.io";

/// Upload endpoint (separate host from the REST API)
pub const UPLOAD_URL: &str = "https://upload.gofile.io/uploadfile";

/// Status value GoFile puts in successful JSON envelopes
pub const STATUS_OK: &str = "ok";
