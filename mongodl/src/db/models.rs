use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CachedValidator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CachedValidator {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CachedComponent {
    pub version: String,
    pub target: String,
    pub arch: String,
    pub edition: String,
    pub key: String,
    pub data: String,
}
