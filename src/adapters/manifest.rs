use crate::domain::ports::ManifestSource;
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;

/// 以 HTTP GET 取得清單文件
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    client: Client,
    url: String,
}

impl HttpManifestSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self) -> Result<String> {
        tracing::debug!("Fetching manifest from {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        tracing::debug!("Manifest response status: {}", response.status());

        let body = response.error_for_status()?.text().await?;
        Ok(body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[derive(Debug, Clone)]
pub struct FileManifestSource {
    path: PathBuf,
}

impl FileManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ManifestSource for FileManifestSource {
    async fn fetch(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
