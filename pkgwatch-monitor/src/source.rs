//! Where status documents come from

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{SourceConfig, SourceKind};
use crate::page::PageContext;

const DATA_FILE: &str = ".data.json";
const USER_AGENT: &str = concat!("pkgwatch-monitor/", env!("CARGO_PKG_VERSION"));

/// Fetches the current status document
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Value>;

    /// Location shown in logs
    fn describe(&self) -> String;
}

/// `.data.json` served over HTTP
pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self) -> Result<Value> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::CACHE_CONTROL, "max-age=0")
            .send()
            .await
            .with_context(|| format!("Failed to GET {}", self.url))?
            .error_for_status()
            .with_context(|| format!("Bad response from {}", self.url))?;

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        serde_json::from_str(&body).context("Failed to decode status document")
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// `.data.json` read from the producer's directory
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for FileSource {
    async fn fetch(&self) -> Result<Value> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&body).context("Failed to decode status document")
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub enum DataSource {
    Http(HttpSource),
    File(FileSource),
}

impl DataSource {
    /// Build the source for a page's data directory.
    pub fn from_config(config: &SourceConfig, ctx: &PageContext) -> Result<Self> {
        match config.kind {
            SourceKind::Http => {
                let base = if config.base_url.ends_with('/') {
                    config.base_url.clone()
                } else {
                    format!("{}/", config.base_url)
                };
                let url = format!("{}{}{}", base, encode_path(&ctx.data_url), DATA_FILE);
                let timeout = Duration::from_secs(config.request_timeout_secs);
                Ok(DataSource::Http(HttpSource::new(url, timeout)?))
            }
            SourceKind::File => {
                let path = PathBuf::from(&config.path).join(&ctx.data_url).join(DATA_FILE);
                Ok(DataSource::File(FileSource::new(path)))
            }
        }
    }
}

/// Percent-encode each segment of a relative path, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl SnapshotSource for DataSource {
    async fn fetch(&self) -> Result<Value> {
        match self {
            DataSource::Http(source) => source.fetch().await,
            DataSource::File(source) => source.fetch().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            DataSource::Http(source) => source.describe(),
            DataSource::File(source) => source.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgwatch_common::{PageKind, ServerStyle};

    fn ctx(style: ServerStyle) -> PageContext {
        PageContext::new(
            PageKind::Build,
            style,
            Some("131amd64-default".into()),
            Some("2024-03-01 run".into()),
        )
    }

    #[test]
    fn test_http_url_from_page() {
        let config = SourceConfig {
            base_url: "http://pkg.example.org/bulk".into(),
            ..SourceConfig::default()
        };
        let source = DataSource::from_config(&config, &ctx(ServerStyle::Hosted)).unwrap();
        assert_eq!(
            source.describe(),
            "http://pkg.example.org/bulk/data/131amd64-default/2024-03-01%20run/.data.json"
        );

        let source = DataSource::from_config(&config, &ctx(ServerStyle::Inline)).unwrap();
        assert_eq!(source.describe(), "http://pkg.example.org/bulk/.data.json");
    }

    #[tokio::test]
    async fn test_file_source_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DATA_FILE), r#"{"masternames": {}}"#).unwrap();
        let config = SourceConfig {
            kind: SourceKind::File,
            path: dir.path().display().to_string(),
            ..SourceConfig::default()
        };
        let ctx = PageContext::new(PageKind::Index, ServerStyle::Inline, None, None);
        let source = DataSource::from_config(&config, &ctx).unwrap();
        let value = source.fetch().await.unwrap();
        assert!(value.get("masternames").is_some());
    }

    #[tokio::test]
    async fn test_file_source_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileSource::new(dir.path().join("nope.json"));
        assert!(missing.fetch().await.is_err());

        let path = dir.path().join(DATA_FILE);
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(FileSource::new(path).fetch().await.is_err());
    }
}
