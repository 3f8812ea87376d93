use crate::utils::error::{ErrorCategory, ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    #[default]
    Plain,
    Service,
}

/// 清單中的一個套件，以 `(name, content_id)` 識別
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "contentID", alias = "cid", alias = "content_id")]
    pub content_id: String,
    #[serde(default, alias = "type")]
    pub kind: PackageKind,
}

impl Package {
    pub fn new(name: impl Into<String>, content_id: impl Into<String>, kind: PackageKind) -> Self {
        Self {
            name: name.into(),
            content_id: content_id.into(),
            kind,
        }
    }

    pub fn is_service(&self) -> bool {
        self.kind == PackageKind::Service
    }

    /// 日誌用名稱；未命名的套件以內容識別碼代替
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.content_id
        } else {
            &self.name
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.content_id.trim().is_empty() {
            return Err(ProvisionError::InvalidPackage {
                name: self.name.clone(),
                reason: "contentID must not be empty".to_string(),
            });
        }
        if self.is_service() && self.name.trim().is_empty() {
            return Err(ProvisionError::InvalidPackage {
                name: self.content_id.clone(),
                reason: "service packages require a name".to_string(),
            });
        }
        Ok(())
    }
}

/// 取得套件內容的方式：IPFS 節點端點，或是覆寫用的外部命令
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default, alias = "ipfs_peer")]
    pub endpoint: String,
    #[serde(default, alias = "ipget_cmd")]
    pub command: Option<String>,
}

impl RetrievalConfig {
    pub fn command_override(&self) -> Option<&str> {
        self.command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PackageState {
    Pending,
    Fetching,
    Decompressing,
    Extracting,
    Succeeded,
    Failed(ErrorCategory),
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetching => write!(f, "fetching"),
            Self::Decompressing => write!(f, "decompressing"),
            Self::Extracting => write!(f, "extracting"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(reason) => write!(f, "failed({:?})", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntryStats {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// 每個套件唯一的處理結果
#[derive(Debug)]
pub struct MaterializationResult {
    pub package: Package,
    pub state: PackageState,
    pub error: Option<ProvisionError>,
    pub stats: EntryStats,
    pub duration: Duration,
}

impl MaterializationResult {
    pub fn succeeded(package: Package, stats: EntryStats, duration: Duration) -> Self {
        Self {
            package,
            state: PackageState::Succeeded,
            error: None,
            stats,
            duration,
        }
    }

    pub fn failed(
        package: Package,
        error: ProvisionError,
        stats: EntryStats,
        duration: Duration,
    ) -> Self {
        Self {
            package,
            state: PackageState::Failed(error.category()),
            error: Some(error),
            stats,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == PackageState::Succeeded
    }

    pub fn error_category(&self) -> Option<ErrorCategory> {
        self.error.as_ref().map(ProvisionError::category)
    }
}
