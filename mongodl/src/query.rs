use crate::db::{CachedComponent, map_row_de};
use crate::error::DownloaderError;
use crate::manifest::StoreHandle;
use futures::{TryStreamExt, future};
use reqwest::Url;

/// Optional filters for listing; `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub version: Option<String>,
    pub target: Option<String>,
    pub arch: Option<String>,
    pub edition: Option<String>,
    pub component: Option<String>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.target.is_none()
            && self.arch.is_none()
            && self.edition.is_none()
            && self.component.is_none()
    }
}

/// A fully specified component lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentQuery {
    pub version: String,
    pub target: String,
    pub arch: String,
    pub edition: String,
    pub component: String,
}

/// Distinct values of every dimension across the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub versions: Vec<String>,
    pub targets: Vec<String>,
    pub arches: Vec<String>,
    pub editions: Vec<String>,
    pub components: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Listing {
    pub matching: Vec<CachedComponent>,
    pub dimensions: Dimensions,
}

impl CachedComponent {
    pub fn info(&self) -> Result<serde_json::Value, DownloaderError> {
        serde_json::from_str(&self.data).map_err(DownloaderError::from)
    }

    /// The artifact URL carried in the component's blob.
    pub fn url(&self) -> Result<Url, DownloaderError> {
        let info = self.info()?;
        let url = info.get("url").and_then(|v| v.as_str()).ok_or_else(|| {
            DownloaderError::ManifestParse(format!("component {} has no url", self.key))
        })?;

        Ok(Url::parse(url)?)
    }
}

const COMPONENT_COLUMNS: &str = r#"
    SELECT version, target, arch, edition, key, components.data AS data
    FROM components
    JOIN downloads USING (download_id)
    JOIN versions USING (version_id)
"#;

impl StoreHandle {
    /// Components matching `filters` plus every distinct dimension value.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filters: &Filters) -> Result<Listing, DownloaderError> {
        let matching = self
            .database()
            .connection()
            .query(
                &format!(
                    r#"{COMPONENT_COLUMNS}
                    WHERE (?1 IS NULL OR key = ?1)
                      AND (?2 IS NULL OR target = ?2)
                      AND (?3 IS NULL OR arch = ?3)
                      AND (?4 IS NULL OR edition = ?4)
                      AND (?5 IS NULL OR version = ?5)
                    ORDER BY component_id
                "#
                ),
                libsql::params![
                    filters.component.as_deref(),
                    filters.target.as_deref(),
                    filters.arch.as_deref(),
                    filters.edition.as_deref(),
                    filters.version.as_deref()
                ],
            )
            .await?
            .into_stream()
            .map_err(DownloaderError::from)
            .and_then(map_row_de)
            .try_collect()
            .await?;

        let dimensions = Dimensions {
            versions: self.distinct("version", "versions").await?,
            targets: self.distinct("target", "downloads").await?,
            arches: self.distinct("arch", "downloads").await?,
            editions: self.distinct("edition", "downloads").await?,
            components: self.distinct("key", "components").await?,
        };

        Ok(Listing {
            matching,
            dimensions,
        })
    }

    /// The single component matching every field of `query` exactly.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, query: &ComponentQuery) -> Result<CachedComponent, DownloaderError> {
        let found = self
            .database()
            .connection()
            .query(
                &format!(
                    r#"{COMPONENT_COLUMNS}
                    WHERE key = ?1
                      AND target = ?2
                      AND arch = ?3
                      AND edition = ?4
                      AND version = ?5
                    ORDER BY component_id
                "#
                ),
                libsql::params![
                    query.component.as_str(),
                    query.target.as_str(),
                    query.arch.as_str(),
                    query.edition.as_str(),
                    query.version.as_str()
                ],
            )
            .await?
            .next()
            .await?;

        match found {
            Some(row) => map_row_de(row).await,
            None => Err(DownloaderError::NotFound {
                version: query.version.clone(),
                target: query.target.clone(),
                arch: query.arch.clone(),
                edition: query.edition.clone(),
                component: query.component.clone(),
            }),
        }
    }

    async fn distinct(&self, column: &str, table: &str) -> Result<Vec<String>, DownloaderError> {
        self.database()
            .connection()
            .query(
                &format!("SELECT DISTINCT {column} FROM {table} ORDER BY {column}"),
                (),
            )
            .await?
            .into_stream()
            .and_then(|r| future::ready(r.get_str(0).map(|v| v.to_string())))
            .map_err(DownloaderError::from)
            .try_collect()
            .await
    }
}
