use crate::config::DownloaderConfig;
use crate::db::{CachedValidator, Database};
use crate::error::DownloaderError;
use reqwest::header::{ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};
use sha2::Digest as _;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt as _;
use tracing_indicatif::span_ext::IndicatifSpanExt as _;
use tracing_indicatif::style::ProgressStyle;

/// Outcome of a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// `false` when the server confirmed the cached copy is current.
    pub changed: bool,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    database: Database,
    files_root: PathBuf,
}

impl Fetcher {
    /// Prepare the HTTP client.
    pub fn new(config: &DownloaderConfig, database: Database) -> Result<Self, DownloaderError> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .redirect(Policy::limited(10))
            .hickory_dns(true)
            .build()?;

        Ok(Self {
            client,
            database,
            files_root: config.files_root(),
        })
    }

    /// Where the cached copy of `url` lives.
    pub fn cache_path(&self, url: &Url) -> PathBuf {
        cache_path_in(&self.files_root, url)
    }

    /// Download `url` into the cache unless the stored validators show the
    /// cached copy is still current.
    #[tracing::instrument(skip(self), fields(url = url.as_str()))]
    pub async fn fetch(&self, url: &Url) -> Result<FetchedFile, DownloaderError> {
        let destination = self.cache_path(url);

        let validator = match self.database.get_validator(url.as_str()).await? {
            Some(validator) if validator.is_empty() => None,
            Some(validator) if tokio::fs::try_exists(&destination).await? => Some(validator),
            Some(_) => {
                tracing::debug!(
                    "Cached file {} is gone, fetching unconditionally",
                    destination.display()
                );
                None
            }
            None => None,
        };

        let mut request = self.client.get(url.clone());
        if let Some(validator) = &validator {
            if let Some(etag) = &validator.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }

            if let Some(last_modified) = &validator.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let mut response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED && validator.is_some() {
            tracing::debug!("{} not modified", url);
            return Ok(FetchedFile {
                changed: false,
                path: destination,
            });
        }

        if !status.is_success() {
            return Err(DownloaderError::Fetch {
                url: url.to_string(),
                status,
            });
        }

        let received = CachedValidator {
            etag: header_value(response.headers(), ETAG),
            last_modified: header_value(response.headers(), LAST_MODIFIED),
        };

        tracing::info!("Downloading [{}] ...", url);

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let span = tracing::Span::current();
        if let Some(length) = response.content_length() {
            if let Ok(style) = ProgressStyle::with_template(
                "{span_child_prefix}{spinner} {span_name} {wide_bar} {bytes}/{total_bytes}",
            ) {
                span.pb_set_style(&style);
            }
            span.pb_set_length(length);
        }

        // The cached copy is only replaced once the whole body arrived.
        let partial = partial_path(&destination);
        if let Err(err) = stream_body(&mut response, &partial, &span).await {
            tracing::debug!("Discarding partial download {}", partial.display());
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        tokio::fs::rename(&partial, &destination).await?;

        if received.is_empty() {
            tracing::debug!("{} carries no validators", url);
        }

        self.database
            .store_validator(url.as_str(), &received)
            .await?;

        Ok(FetchedFile {
            changed: true,
            path: destination,
        })
    }
}

/// `<files_root>/<first 4 hex digits of sha256(url)>/<last path segment>`.
fn cache_path_in(files_root: &Path, url: &Url) -> PathBuf {
    let digest = sha2::Sha256::digest(url.as_str().as_bytes());
    let prefix = digest[..2]
        .iter()
        .fold(String::with_capacity(4), |mut acc, byte| {
            acc.push_str(&format!("{byte:02x}"));
            acc
        });

    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or("index");

    files_root.join(prefix).join(file_name)
}

async fn stream_body(
    response: &mut reqwest::Response,
    path: &Path,
    span: &tracing::Span,
) -> Result<(), DownloaderError> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        span.pb_inc(chunk.len() as u64);
    }
    file.flush().await?;

    Ok(())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");

    destination.with_file_name(name)
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_owned())
}
