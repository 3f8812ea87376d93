use crate::domain::model::{Package, RetrievalConfig};
use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 開機時取得的套件清單，解析後唯讀
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, alias = "ipfs")]
    pub retrieval: RetrievalConfig,
    pub packages: Vec<Package>,
}

impl Manifest {
    /// 從檔案載入清單
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ProvisionError::IoError)?;
        Self::from_document(&content)
    }

    /// 解析清單文件：以 `{` 開頭視為 JSON，其餘先以 YAML (cloud-config) 解析，失敗再試 TOML
    pub fn from_document(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        if processed.trim_start().starts_with('{') {
            return Ok(serde_json::from_str(&processed)?);
        }

        let yaml_error = match serde_yaml::from_str::<Self>(&processed) {
            Ok(manifest) => return Ok(manifest),
            Err(e) => e,
        };
        tracing::debug!("Manifest is not YAML ({}), trying TOML", yaml_error);

        toml::from_str(&processed).map_err(|toml_error| ProvisionError::ManifestError {
            message: format!(
                "YAML parsing error: {}; TOML parsing error: {}",
                yaml_error, toml_error
            ),
        })
    }

    /// 替換環境變數 (例如 ${IPFS_PEER})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ProvisionError::ManifestError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn service_count(&self) -> usize {
        self.packages.iter().filter(|p| p.is_service()).count()
    }
}

impl Validate for Manifest {
    /// 只檢查整體設定；個別套件的問題留到處理該套件時回報
    fn validate(&self) -> Result<()> {
        if self.retrieval.command_override().is_none() && self.retrieval.endpoint.trim().is_empty()
        {
            return Err(ProvisionError::ManifestError {
                message: "retrieval.endpoint or retrieval.command must be set".to_string(),
            });
        }
        Ok(())
    }
}
