use crate::domain::ports::ByteSource;
use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation::parse_endpoint;
use reqwest::Client;
use std::io::{self, Read};
use std::time::Duration;
use tokio::runtime::Handle;
use url::Url;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// 透過 IPFS 節點的 HTTP RPC API (`/api/v0/cat`) 取得內容
#[derive(Debug, Clone)]
pub struct IpfsHttpSource {
    client: Client,
    api_base: Url,
    handle: Handle,
}

impl IpfsHttpSource {
    /// 必須在 tokio runtime 內建立；`endpoint` 可以是 `host:port` 或完整 URL
    pub fn new(endpoint: &str) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| ProvisionError::ConfigError {
            message: format!("IPFS source requires a tokio runtime: {}", e),
        })?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()?;
        Self::with_client(client, endpoint, handle)
    }

    pub fn with_client(client: Client, endpoint: &str, handle: Handle) -> Result<Self> {
        let mut api_base = parse_endpoint("retrieval.endpoint", endpoint)?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        Ok(Self {
            client,
            api_base,
            handle,
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub fn cat_url(&self, content_id: &str) -> Result<Url> {
        let mut url = self
            .api_base
            .join("api/v0/cat")
            .map_err(|e| ProvisionError::ConfigError {
                message: format!("Invalid IPFS API URL: {}", e),
            })?;
        url.query_pairs_mut().append_pair("arg", content_id);
        Ok(url)
    }
}

impl ByteSource for IpfsHttpSource {
    fn open(&self, content_id: &str) -> Result<Box<dyn Read + Send>> {
        let fetch_error = |message: String| ProvisionError::FetchError {
            content_id: content_id.to_string(),
            message,
        };

        let url = self.cat_url(content_id)?;
        tracing::debug!("Requesting {} from IPFS API", url);

        let response = self
            .handle
            .block_on(self.client.post(url).send())
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = self.handle.block_on(response.text()).unwrap_or_default();
            return Err(fetch_error(format!(
                "IPFS API returned {}: {}",
                status,
                api_error_message(&body)
            )));
        }

        Ok(Box::new(ResponseReader {
            response,
            handle: self.handle.clone(),
            chunk: Vec::new(),
            pos: 0,
        }))
    }
}

/// IPFS API 的錯誤格式為 `{"Message": "...", "Code": 0, "Type": "error"}`
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("Message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// 一次只拉一個 HTTP chunk 的阻塞式讀取器
struct ResponseReader {
    response: reqwest::Response,
    handle: Handle,
    chunk: Vec<u8>,
    pos: usize,
}

impl Read for ResponseReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            match self.handle.block_on(self.response.chunk()) {
                Ok(Some(bytes)) => {
                    self.chunk.clear();
                    self.chunk.extend_from_slice(&bytes);
                    self.pos = 0;
                }
                Ok(None) => return Ok(0),
                Err(e) => return Err(io::Error::other(e)),
            }
        }

        let available = &self.chunk[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}
