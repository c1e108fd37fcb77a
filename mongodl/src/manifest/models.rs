use crate::error::DownloaderError;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Placeholder stored for a target or arch the manifest leaves out, so
/// filters can still select platform-independent downloads.
pub const NULL_DIMENSION: &str = "null";

#[derive(Debug, Clone, Deserialize)]
struct RemoteManifest {
    versions: Vec<RemoteVersion>,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteVersion {
    version: String,
    githash: String,
    date: String,

    #[serde(default)]
    downloads: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestVersion {
    pub version: String,
    pub githash: String,
    pub date: String,
    pub downloads: Vec<ManifestDownload>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDownload {
    pub target: String,
    pub arch: String,
    pub edition: String,
    pub archive_url: String,
    pub data: String,
    pub components: Vec<ManifestComponent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestComponent {
    pub key: String,
    pub data: String,
}

/// Parse the raw manifest document and decompose every download into its
/// components.
pub fn parse_manifest(raw: &[u8]) -> Result<Vec<ManifestVersion>, DownloaderError> {
    let manifest: RemoteManifest = serde_json::from_slice(raw)
        .map_err(|e| DownloaderError::ManifestParse(e.to_string()))?;

    manifest
        .versions
        .into_iter()
        .map(|version| {
            let downloads = version
                .downloads
                .iter()
                .map(|raw| decompose_download(&version.version, raw))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ManifestVersion {
                version: version.version,
                githash: version.githash,
                date: version.date,
                downloads,
            })
        })
        .collect()
}

fn decompose_download(
    version: &str,
    raw: &Map<String, Value>,
) -> Result<ManifestDownload, DownloaderError> {
    let target = optional_dimension(version, raw, "target")?;
    let arch = optional_dimension(version, raw, "arch")?;

    let edition = raw
        .get("edition")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DownloaderError::ManifestParse(format!(
                "download of version {version} has no edition"
            ))
        })?
        .to_owned();

    let archive_url = raw
        .get("archive")
        .and_then(|archive| archive.get("url"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DownloaderError::ManifestParse(format!(
                "download {target}-{arch}-{edition} of version {version} has no archive url"
            ))
        })?
        .to_owned();

    // Only entries with something to download become components.
    let components = raw
        .iter()
        .filter(|(_, value)| value.as_object().is_some_and(|o| o.contains_key("url")))
        .map(|(key, value)| {
            Ok(ManifestComponent {
                key: key.clone(),
                data: serde_json::to_string(value)?,
            })
        })
        .collect::<Result<Vec<_>, DownloaderError>>()?;

    Ok(ManifestDownload {
        target,
        arch,
        edition,
        archive_url,
        data: serde_json::to_string(raw)?,
        components,
    })
}

fn optional_dimension(
    version: &str,
    raw: &Map<String, Value>,
    field: &str,
) -> Result<String, DownloaderError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(NULL_DIMENSION.to_owned()),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(DownloaderError::ManifestParse(format!(
            "download of version {version} has a non-string {field}: {other}"
        ))),
    }
}
