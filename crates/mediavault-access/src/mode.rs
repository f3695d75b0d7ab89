//! Access modes and list filters for access tokens

use serde::{Deserialize, Serialize};

/// What an access token permits, as a single total enum over the
/// `(allow_streaming, allow_download)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Grants nothing; the parse fallback for unknown input
    None,
    StreamingOnly,
    DownloadOnly,
    StreamingAndDownload,
}

impl AccessMode {
    /// Total mapping from the stored boolean pair.
    pub fn from_flags(allow_streaming: bool, allow_download: bool) -> Self {
        match (allow_streaming, allow_download) {
            (false, false) => AccessMode::None,
            (true, false) => AccessMode::StreamingOnly,
            (false, true) => AccessMode::DownloadOnly,
            (true, true) => AccessMode::StreamingAndDownload,
        }
    }

    /// Total inverse: `(allow_streaming, allow_download)`.
    pub fn flags(self) -> (bool, bool) {
        match self {
            AccessMode::None => (false, false),
            AccessMode::StreamingOnly => (true, false),
            AccessMode::DownloadOnly => (false, true),
            AccessMode::StreamingAndDownload => (true, true),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::None => "none",
            AccessMode::StreamingOnly => "streaming_only",
            AccessMode::DownloadOnly => "download_only",
            AccessMode::StreamingAndDownload => "streaming_and_download",
        }
    }

    /// Unrecognized values default to no permissions.
    pub fn parse(s: &str) -> Self {
        match s {
            "streaming_only" => AccessMode::StreamingOnly,
            "download_only" => AccessMode::DownloadOnly,
            "streaming_and_download" => AccessMode::StreamingAndDownload,
            _ => AccessMode::None,
        }
    }
}

/// Status filter for token listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    Expired,
    Revoked,
    All,
}

impl TokenStatus {
    /// Absent or unrecognized filter values fall back to `Active`.
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("active") => TokenStatus::Active,
            Some("expired") => TokenStatus::Expired,
            Some("revoked") => TokenStatus::Revoked,
            Some("all") => TokenStatus::All,
            _ => TokenStatus::Active,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Expired => "expired",
            TokenStatus::Revoked => "revoked",
            TokenStatus::All => "all",
        }
    }
}
