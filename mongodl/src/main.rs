mod args;
mod config;
mod db;
mod error;
mod extract;
mod fetch;
mod manifest;
mod output;
mod platform;
mod query;

use crate::args::{DownloadRequest, DownloaderArgs};
use crate::config::DownloaderConfig;
use crate::error::DownloaderError;
use crate::manifest::ManifestStore;
use clap::Parser as _;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

fn main() {
    let indicatif_layer = tracing_indicatif::IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("MONGODL_LOG")
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();

    let args = DownloaderArgs::parse();

    let result = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(v) => v.block_on(async_main(args)),
        Err(err) => {
            tracing::error!("Failed to create tokio runtime: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = result {
        tracing::error!("Error: {}", err);

        let mut src = std::error::Error::source(&err);
        while let Some(err) = src {
            tracing::error!("-> Caused by: {}", err);
            src = err.source();
        }

        std::process::exit(1);
    }
}

async fn async_main(args: DownloaderArgs) -> Result<(), DownloaderError> {
    tracing::trace!("args = {:#?}", args);

    let config = DownloaderConfig::from_args(&args);

    if args.list {
        let store = ManifestStore::open(&config).await?;
        let handle = store.ensure_fresh().await?;
        let filters = args.filters();
        let listing = handle.list(&filters).await?;
        output::print_listing(&listing, !filters.is_empty());
        return Ok(());
    }

    // Argument problems surface before the cache or network is touched.
    let request = args.download_request()?;

    let store = ManifestStore::open(&config).await?;
    fetch_and_extract(&store, &request).await?;

    Ok(())
}

/// Resolve the requested component, fetch its archive and unpack it.
async fn fetch_and_extract(
    store: &ManifestStore,
    request: &DownloadRequest,
) -> Result<usize, DownloaderError> {
    let handle = store.ensure_fresh().await?;
    if !handle.refreshed() {
        tracing::debug!("Downloads manifest is up to date");
    }

    let query = &request.query;
    tracing::info!(
        "Download {} v{}-{} for {}-{}",
        query.component,
        query.version,
        query.edition,
        query.target,
        query.arch
    );

    let component = handle.resolve(query).await?;
    let cached = store.fetcher().fetch(&component.url()?).await?;

    let out = request.out.clone();
    let pattern = request.pattern.clone();
    let strip = request.strip_components;

    let extracted = tokio::task::spawn_blocking(move || {
        extract::extract_archive(&cached.path, &out, pattern.as_ref(), strip)
    })
    .await??;

    Ok(extracted)
}
