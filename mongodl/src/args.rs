use crate::error::DownloaderError;
use crate::extract::MemberPattern;
use crate::platform;
use crate::query::{ComponentQuery, Filters};
use clap::Parser;
use std::path::PathBuf;
use url::Url;

const DEFAULT_EDITION: &str = "targeted";

/// Download and extract MongoDB components.
#[derive(Debug, Clone, Parser)]
#[command(disable_version_flag = true)]
pub struct DownloaderArgs {
    /// List available components, targets, editions, and architectures.
    /// Download arguments act as filters.
    #[arg(long, default_value_t = false)]
    pub list: bool,

    /// The product version to download. Use "--list" to list available versions.
    #[arg(short = 'V', long)]
    pub version: Option<String>,

    /// The target platform for which to download. Inferred from the host when omitted.
    #[arg(short = 'T', long)]
    pub target: Option<String>,

    /// The architecture for which to download. Inferred from the host when omitted.
    #[arg(short = 'A', long)]
    pub arch: Option<String>,

    /// The edition of the product to download (default is "targeted").
    #[arg(short = 'E', long)]
    pub edition: Option<String>,

    /// The component to download. Use "--list" to list available components.
    #[arg(short = 'C', long)]
    pub component: Option<String>,

    /// The directory in which to extract the component.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Restrict extraction to archive members whose full path matches this glob.
    /// Use "**" to match any number of intermediate directories.
    #[arg(long)]
    pub only: Option<String>,

    /// Strip this many leading path components from archive members.
    /// Members with fewer components are discarded.
    #[arg(short = 'p', long = "strip-path-components", value_name = "N", default_value_t = 0)]
    pub strip_components: usize,

    #[arg(long, env = "MONGODL_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[arg(
        long,
        default_value = "https://downloads.mongodb.org/full.json",
        env = "MONGODL_MANIFEST_URL"
    )]
    pub manifest_url: Url,
}

/// Everything needed to fetch and unpack one component.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub query: ComponentQuery,
    pub out: PathBuf,
    pub pattern: Option<MemberPattern>,
    pub strip_components: usize,
}

impl DownloaderArgs {
    pub fn filters(&self) -> Filters {
        Filters {
            version: self.version.clone(),
            target: self.target.clone(),
            arch: self.arch.clone(),
            edition: self.edition.clone(),
            component: self.component.clone(),
        }
    }

    /// Validate the download arguments, filling in host defaults.
    pub fn download_request(&self) -> Result<DownloadRequest, DownloaderError> {
        let version = self.version.clone().ok_or(DownloaderError::Filter("version"))?;
        let component = self
            .component
            .clone()
            .ok_or(DownloaderError::Filter("component"))?;
        let out = self.out.as_deref().ok_or(DownloaderError::Filter("out"))?;

        let pattern = self.only.as_deref().map(MemberPattern::new).transpose()?;

        let target = match &self.target {
            Some(target) => target.clone(),
            None => platform::infer_target()?,
        };
        let arch = self.arch.clone().unwrap_or_else(platform::infer_arch);
        let edition = self
            .edition
            .clone()
            .unwrap_or_else(|| DEFAULT_EDITION.to_owned());

        Ok(DownloadRequest {
            query: ComponentQuery {
                version,
                target,
                arch,
                edition,
                component,
            },
            out: std::path::absolute(out)?,
            pattern,
            strip_components: self.strip_components,
        })
    }
}
