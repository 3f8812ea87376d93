use crate::utils::error::Result;
use async_trait::async_trait;
use std::io::Read;

/// 依內容識別碼提供循序讀取的位元組串流
///
/// `open` 會阻塞，只能在阻塞執行緒中呼叫（引擎透過 `spawn_blocking` 使用）。
/// 實作不可把整個物件載入記憶體。
pub trait ByteSource: Send + Sync {
    fn open(&self, content_id: &str) -> Result<Box<dyn Read + Send>>;
}

#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;

    /// 日誌用的來源描述
    fn describe(&self) -> String;
}

/// 盡力而為的服務註冊；錯誤只記錄，不影響套件結果
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn enable(&self, unit: &str) -> Result<()>;
    async fn start(&self, unit: &str) -> Result<()>;
}
