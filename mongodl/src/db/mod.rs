mod models;
pub use models::*;

use crate::config::DownloaderConfig;
use crate::error::DownloaderError;
use crate::manifest::ManifestVersion;
use futures::{TryFutureExt, TryStreamExt, future};
use libsql::{Connection, Row};
use serde::de::DeserializeOwned;

#[derive(Clone)]
pub struct Database {
    connection: Connection,
}

pub(crate) fn map_row_de<T: DeserializeOwned>(
    r: Row,
) -> impl Future<Output = Result<T, DownloaderError>> {
    let v = libsql::de::from_row::<T>(&r).map_err(|e| {
        tracing::error!(
            "Failed to deserialize {}: {}",
            std::any::type_name::<T>(),
            e
        );

        DownloaderError::from(e)
    });

    future::ready(v)
}

impl Database {
    /// Open the cache database, creating it and its tables if needed.
    pub async fn setup(config: &DownloaderConfig) -> Result<Self, DownloaderError> {
        let path = config.database_path();
        tracing::debug!("Setting up database at {}", path.display());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                tracing::error!("Failed to create cache directory: {}", e);
                e
            })?;
        }

        let db = libsql::Builder::new_local(&path).build().await?;
        let connection = db.connect()?;

        connection.query("PRAGMA foreign_keys = ON", ()).await?;

        tracing::debug!("Connected to database");
        Self::ensure_db_structure(&connection).await?;

        Ok(Self { connection })
    }

    async fn ensure_db_structure(connection: &Connection) -> Result<(), DownloaderError> {
        tracing::trace!("Setting up database structure...");
        let tx = connection.transaction().await?;

        tx.execute(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                etag TEXT,
                last_modified TEXT
            )
        "#,
            (),
        )
        .await?;

        tx.execute(
            r#"
            CREATE TABLE IF NOT EXISTS past_downloads (
                url TEXT NOT NULL UNIQUE,
                etag TEXT,
                last_modified TEXT
            )
        "#,
            (),
        )
        .await?;

        // Queries run against these even before the first manifest import.
        create_manifest_tables(&tx, "IF NOT EXISTS").await?;

        tx.commit().await?;

        tracing::trace!("Database structure created.");

        Ok(())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_validator(&self, url: &str) -> Result<Option<CachedValidator>, DownloaderError> {
        match self
            .connection
            .query(
                "SELECT etag, last_modified FROM past_downloads WHERE url = ?1",
                [url],
            )
            .await?
            .next()
            .await?
        {
            Some(row) => map_row_de(row).await.map(Some),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn store_validator(
        &self,
        url: &str,
        validator: &CachedValidator,
    ) -> Result<(), DownloaderError> {
        self.connection
            .execute(
                r#"
                    INSERT INTO past_downloads (url, etag, last_modified)
                    VALUES (?1, ?2, ?3) ON CONFLICT (url) DO UPDATE SET
                        etag = ?2, last_modified = ?3
                "#,
                libsql::params![
                    url,
                    validator.etag.as_deref(),
                    validator.last_modified.as_deref()
                ],
            )
            .map_err(DownloaderError::from)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn forget_validator(&self, url: &str) -> Result<(), DownloaderError> {
        self.connection
            .execute("DELETE FROM past_downloads WHERE url = ?1", [url])
            .map_err(DownloaderError::from)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn manifest_validator(&self) -> Result<Option<CachedValidator>, DownloaderError> {
        let mut rows: Vec<CachedValidator> = self
            .connection
            .query("SELECT etag, last_modified FROM meta", ())
            .await?
            .into_stream()
            .map_err(DownloaderError::from)
            .and_then(map_row_de)
            .try_collect()
            .await?;

        Ok(rows.pop())
    }

    /// Replace every version, download and component row in one transaction.
    ///
    /// When any statement fails the transaction is rolled back and the
    /// previously imported manifest stays in place.
    #[tracing::instrument(skip_all, fields(versions = versions.len()))]
    pub async fn replace_manifest(
        &self,
        versions: &[ManifestVersion],
        validator: &CachedValidator,
    ) -> Result<(), DownloaderError> {
        let tx = self.connection.transaction().await?;

        match import_manifest(&tx, versions, validator).await {
            Ok(()) => {
                tx.commit().await?;
                tracing::debug!("Imported {} versions", versions.len());
                Ok(())
            }
            Err(err) => {
                tracing::error!("Manifest import failed, rolling back: {}", err);
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn count_rows(&self, table: &str) -> i64 {
        let row = self
            .connection
            .query(&format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .unwrap()
            .next()
            .await
            .unwrap()
            .expect("COUNT(*) always yields a row");

        row.get::<i64>(0).unwrap()
    }

    /// Rows inserted, updated or deleted through this connection so far.
    #[cfg(test)]
    pub(crate) async fn total_changes(&self) -> i64 {
        let row = self
            .connection
            .query("SELECT total_changes()", ())
            .await
            .unwrap()
            .next()
            .await
            .unwrap()
            .expect("total_changes() always yields a row");

        row.get::<i64>(0).unwrap()
    }
}

async fn create_manifest_tables(
    connection: &Connection,
    condition: &str,
) -> Result<(), DownloaderError> {
    connection
        .execute(
            &format!(
                r#"
            CREATE TABLE {condition} versions (
                version_id INTEGER PRIMARY KEY,
                date TEXT NOT NULL,
                version TEXT NOT NULL,
                githash TEXT NOT NULL
            )
        "#
            ),
            (),
        )
        .await?;

    connection
        .execute(
            &format!(
                r#"
            CREATE TABLE {condition} downloads (
                download_id INTEGER PRIMARY KEY,
                version_id INTEGER NOT NULL REFERENCES versions,
                target TEXT NOT NULL,
                arch TEXT NOT NULL,
                edition TEXT NOT NULL,
                archive_url TEXT NOT NULL,
                data TEXT NOT NULL
            )
        "#
            ),
            (),
        )
        .await?;

    connection
        .execute(
            &format!(
                r#"
            CREATE TABLE {condition} components (
                component_id INTEGER PRIMARY KEY,
                key TEXT NOT NULL,
                download_id INTEGER NOT NULL REFERENCES downloads,
                data TEXT NOT NULL,
                UNIQUE (key, download_id)
            )
        "#
            ),
            (),
        )
        .await?;

    Ok(())
}

async fn import_manifest(
    connection: &Connection,
    versions: &[ManifestVersion],
    validator: &CachedValidator,
) -> Result<(), DownloaderError> {
    connection.execute("DELETE FROM meta", ()).await?;
    connection.execute("DROP TABLE IF EXISTS components", ()).await?;
    connection.execute("DROP TABLE IF EXISTS downloads", ()).await?;
    connection.execute("DROP TABLE IF EXISTS versions", ()).await?;
    create_manifest_tables(connection, "").await?;

    for version in versions {
        connection
            .execute(
                "INSERT INTO versions (date, version, githash) VALUES (?1, ?2, ?3)",
                libsql::params![
                    version.date.as_str(),
                    version.version.as_str(),
                    version.githash.as_str()
                ],
            )
            .await?;
        let version_id = connection.last_insert_rowid();

        for download in &version.downloads {
            connection
                .execute(
                    r#"
                    INSERT INTO downloads
                        (version_id, target, arch, edition, archive_url, data)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                    libsql::params![
                        version_id,
                        download.target.as_str(),
                        download.arch.as_str(),
                        download.edition.as_str(),
                        download.archive_url.as_str(),
                        download.data.as_str()
                    ],
                )
                .await?;
            let download_id = connection.last_insert_rowid();

            for component in &download.components {
                tracing::trace!(
                    "{} {}-{}-{}: {}",
                    version.version,
                    download.target,
                    download.arch,
                    download.edition,
                    component.key
                );

                connection
                    .execute(
                        "INSERT INTO components (key, download_id, data) VALUES (?1, ?2, ?3)",
                        libsql::params![
                            component.key.as_str(),
                            download_id,
                            component.data.as_str()
                        ],
                    )
                    .await?;
            }
        }
    }

    connection
        .execute(
            "INSERT INTO meta (etag, last_modified) VALUES (?1, ?2)",
            libsql::params![
                validator.etag.as_deref(),
                validator.last_modified.as_deref()
            ],
        )
        .await?;

    Ok(())
}
