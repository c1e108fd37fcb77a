use crate::args::DownloaderArgs;
use std::path::{Path, PathBuf};
use url::Url;

const CACHE_NAMESPACE: &str = "mongodl";
const DATABASE_FILE: &str = "downloads.db";
const FILES_DIRECTORY: &str = "files";

/// Locations shared by the fetcher and the manifest store.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub cache_root: PathBuf,
    pub manifest_url: Url,
}

impl DownloaderConfig {
    pub fn from_args(args: &DownloaderArgs) -> Self {
        let cache_root = args.cache_dir.clone().unwrap_or_else(default_cache_root);

        Self {
            cache_root,
            manifest_url: args.manifest_url.clone(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.cache_root.join(DATABASE_FILE)
    }

    pub fn files_root(&self) -> PathBuf {
        self.cache_root.join(FILES_DIRECTORY)
    }

    #[cfg(test)]
    pub fn for_tests(cache_root: &Path, manifest_url: Url) -> Self {
        Self {
            cache_root: cache_root.to_path_buf(),
            manifest_url,
        }
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| Path::new(".cache").to_path_buf())
        .join(CACHE_NAMESPACE)
}
