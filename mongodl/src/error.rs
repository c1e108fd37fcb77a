use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error("an I/O error occurred: {0}")]
    GenericIo(#[from] std::io::Error),

    #[error("database error: {0}")]
    DatabaseError(#[from] libsql::Error),

    #[error("http client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("failed to fetch {url}: server responded with status {status}")]
    Fetch {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("deserialization error: {0}")]
    DeserializeError(#[from] serde::de::value::Error),

    #[error("deserialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("malformed downloads manifest: {0}")]
    ManifestParse(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    #[error(
        "no download for \"{component}\" was found for version={version} target={target} arch={arch} edition={edition}"
    )]
    NotFound {
        version: String,
        target: String,
        arch: String,
        edition: String,
        component: String,
    },

    #[error("unknown archive file extension: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("zip archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("archive member escapes the destination: {}", .0.display())]
    UnsafePath(PathBuf),

    #[error("a \"--{0}\" argument is required")]
    Filter(&'static str),

    #[error("unable to detect the download target: {0}")]
    TargetDetection(String),

    #[error("background task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}
