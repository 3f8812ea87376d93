use crate::domain::model::{MaterializationResult, Package, PackageKind, PackageState};
use crate::utils::error::{ErrorCategory, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub name: String,
    #[serde(rename = "contentID")]
    pub content_id: String,
    pub kind: PackageKind,
    #[serde(flatten)]
    pub state: PackageState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
    pub bytes: u64,
    pub duration_ms: u128,
}

impl PackageReport {
    /// 尚未處理的套件（dry run）
    pub fn pending(package: &Package) -> Self {
        Self {
            name: package.name.clone(),
            content_id: package.content_id.clone(),
            kind: package.kind,
            state: PackageState::Pending,
            error: None,
            directories: 0,
            files: 0,
            skipped: 0,
            bytes: 0,
            duration_ms: 0,
        }
    }

    pub fn error_category(&self) -> Option<ErrorCategory> {
        match self.state {
            PackageState::Failed(category) => Some(category),
            _ => None,
        }
    }
}

impl From<&MaterializationResult> for PackageReport {
    fn from(result: &MaterializationResult) -> Self {
        Self {
            name: result.package.name.clone(),
            content_id: result.package.content_id.clone(),
            kind: result.package.kind,
            state: result.state,
            error: result.error.as_ref().map(|e| e.to_string()),
            directories: result.stats.directories,
            files: result.stats.files,
            skipped: result.stats.skipped,
            bytes: result.stats.bytes,
            duration_ms: result.duration.as_millis(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceReport {
    pub unit: String,
    pub enabled: bool,
    pub started: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// 一次開機佈建的完整紀錄
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub manifest_source: String,
    pub retrieval: String,
    pub root: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub packages: Vec<PackageReport>,
    pub services: Vec<ServiceReport>,
}

impl ProvisionReport {
    pub fn succeeded_count(&self) -> usize {
        self.packages
            .iter()
            .filter(|p| p.state == PackageState::Succeeded)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.packages
            .iter()
            .filter(|p| p.error_category().is_some())
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        tracing::info!("📝 Report written to {}", path.as_ref().display());
        Ok(())
    }

    pub fn log_summary(&self) {
        for package in &self.packages {
            match &package.error {
                Some(error) => tracing::warn!(
                    "  {} [{}]: {} ({} files, {} bytes)",
                    package.name,
                    package.state,
                    error,
                    package.files,
                    package.bytes
                ),
                None => tracing::info!(
                    "  {} [{}]: {} dirs, {} files, {} bytes in {}ms",
                    package.name,
                    package.state,
                    package.directories,
                    package.files,
                    package.bytes,
                    package.duration_ms
                ),
            }
        }

        let elapsed = self.finished_at - self.started_at;
        tracing::info!(
            "📊 {} succeeded, {} failed, {} service(s) in {}ms",
            self.succeeded_count(),
            self.failed_count(),
            self.services.len(),
            elapsed.num_milliseconds()
        );
    }
}
