mod models;
pub use models::*;

use crate::config::DownloaderConfig;
use crate::db::Database;
use crate::error::DownloaderError;
use crate::fetch::Fetcher;
use std::path::Path;
use url::Url;

/// Keeps the local copy of the downloads manifest in sync with upstream.
pub struct ManifestStore {
    database: Database,
    fetcher: Fetcher,
    manifest_url: Url,
}

/// Read access to the imported manifest tables.
#[derive(Clone)]
pub struct StoreHandle {
    database: Database,
    refreshed: bool,
}

impl StoreHandle {
    pub(crate) fn database(&self) -> &Database {
        &self.database
    }

    /// Whether the manifest was re-imported during this invocation.
    pub fn refreshed(&self) -> bool {
        self.refreshed
    }
}

impl ManifestStore {
    pub async fn open(config: &DownloaderConfig) -> Result<Self, DownloaderError> {
        let database = Database::setup(config).await?;
        let fetcher = Fetcher::new(config, database.clone())?;

        Ok(Self {
            database,
            fetcher,
            manifest_url: config.manifest_url.clone(),
        })
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Revalidate the manifest and re-import it if upstream changed.
    #[tracing::instrument(skip(self), fields(url = self.manifest_url.as_str()))]
    pub async fn ensure_fresh(&self) -> Result<StoreHandle, DownloaderError> {
        let fetched = self.fetcher.fetch(&self.manifest_url).await?;

        if !fetched.changed {
            if let Some(validator) = self.database.manifest_validator().await? {
                tracing::debug!(
                    "Reusing cached manifest (etag = {:?}, last modified = {:?})",
                    validator.etag,
                    validator.last_modified
                );
            }

            return Ok(StoreHandle {
                database: self.database.clone(),
                refreshed: false,
            });
        }

        tracing::info!("Refreshing downloads manifest ...");

        if let Err(err) = self.import(&fetched.path).await {
            // The tables still hold the previous import, so the next run must
            // not be answered with a 304 for a manifest we never imported.
            self.database
                .forget_validator(self.manifest_url.as_str())
                .await?;
            return Err(err);
        }

        Ok(StoreHandle {
            database: self.database.clone(),
            refreshed: true,
        })
    }

    async fn import(&self, path: &Path) -> Result<(), DownloaderError> {
        let raw = tokio::fs::read(path).await?;
        let versions = parse_manifest(&raw)?;

        let validator = self
            .database
            .get_validator(self.manifest_url.as_str())
            .await?
            .unwrap_or_default();

        self.database.replace_manifest(&versions, &validator).await
    }
}
