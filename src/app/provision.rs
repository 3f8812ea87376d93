use crate::adapters::manifest::{FileManifestSource, HttpManifestSource};
use crate::adapters::retrieval::RetrievalBackend;
use crate::app::report::{PackageReport, ProvisionReport, ServiceReport};
use crate::config::cmdline::read_manifest_url;
use crate::core::engine::ProvisionEngine;
use crate::core::stream::CancelToken;
use crate::domain::manifest::Manifest;
use crate::domain::model::Package;
use crate::domain::ports::{ManifestSource, ServiceManager};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;

/// 清單所在位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLocation {
    Url(String),
    File(PathBuf),
    /// 從核心命令列的 `nocloud=` 參數取得網址
    BootParameter(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub manifest: ManifestLocation,
    pub root: PathBuf,
    pub endpoint_override: Option<String>,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub register_services: bool,
    pub monitor: bool,
    pub dry_run: bool,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            manifest: ManifestLocation::BootParameter(PathBuf::from(
                crate::config::cmdline::DEFAULT_CMDLINE_PATH,
            )),
            root: PathBuf::from("/"),
            endpoint_override: None,
            jobs: 1,
            timeout: None,
            register_services: true,
            monitor: false,
            dry_run: false,
        }
    }
}

pub fn manifest_source(location: &ManifestLocation) -> Result<Box<dyn ManifestSource>> {
    match location {
        ManifestLocation::Url(url) => Ok(Box::new(HttpManifestSource::new(url.clone()))),
        ManifestLocation::File(path) => Ok(Box::new(FileManifestSource::new(path.clone()))),
        ManifestLocation::BootParameter(cmdline) => {
            let url = read_manifest_url(cmdline)?;
            Ok(Box::new(HttpManifestSource::new(url)))
        }
    }
}

/// 取得並解析清單；任何錯誤都會中止整次執行
pub async fn load_manifest(
    source: &dyn ManifestSource,
    endpoint_override: Option<&str>,
) -> Result<Manifest> {
    tracing::info!("📥 Fetching manifest from {}", source.describe());
    let document = source.fetch().await?;
    let mut manifest = Manifest::from_document(&document)?;

    if let Some(endpoint) = endpoint_override {
        tracing::debug!(
            "Overriding retrieval endpoint '{}' with '{}'",
            manifest.retrieval.endpoint,
            endpoint
        );
        manifest.retrieval.endpoint = endpoint.to_string();
    }
    manifest.validate()?;

    tracing::info!(
        "📋 Manifest lists {} package(s), {} service(s)",
        manifest.packages.len(),
        manifest.service_count()
    );
    Ok(manifest)
}

/// 依序啟用並啟動服務套件；失敗只記錄，enable 失敗仍會嘗試 start
pub async fn register_services<M: ServiceManager + ?Sized>(
    manager: &M,
    packages: &[Package],
) -> Vec<ServiceReport> {
    let mut reports = Vec::new();

    for package in packages.iter().filter(|p| p.is_service()) {
        let mut report = ServiceReport {
            unit: package.name.clone(),
            ..ServiceReport::default()
        };

        if package.name.trim().is_empty() {
            tracing::warn!(
                "⚠️ Service package {} has no name, skipping registration",
                package.content_id
            );
            report.errors.push("service package has no name".to_string());
            reports.push(report);
            continue;
        }

        match manager.enable(&package.name).await {
            Ok(()) => report.enabled = true,
            Err(e) => {
                tracing::warn!("⚠️ Failed to enable {}: {}", package.name, e);
                report.errors.push(e.to_string());
            }
        }
        match manager.start(&package.name).await {
            Ok(()) => report.started = true,
            Err(e) => {
                tracing::warn!("⚠️ Failed to start {}: {}", package.name, e);
                report.errors.push(e.to_string());
            }
        }

        if report.enabled && report.started {
            tracing::info!("🔧 Service {} enabled and started", package.name);
        }
        reports.push(report);
    }

    reports
}

/// 一次完整的開機佈建：找清單 → 取得清單 → 部署套件 → 註冊服務 → 產生報告
pub struct Provisioner<M: ServiceManager> {
    settings: ProvisionSettings,
    services: M,
    cancel: CancelToken,
}

impl<M: ServiceManager> Provisioner<M> {
    pub fn new(settings: ProvisionSettings, services: M) -> Self {
        Self {
            settings,
            services,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// 只有執行層級的錯誤（設定、清單）會回傳 `Err`；套件失敗記錄在報告中
    pub async fn run(&self) -> Result<ProvisionReport> {
        let started_at = Utc::now();
        let source = manifest_source(&self.settings.manifest)?;
        let manifest =
            load_manifest(source.as_ref(), self.settings.endpoint_override.as_deref()).await?;

        if self.settings.dry_run {
            tracing::info!("🧪 Dry run: no packages will be fetched");
            for (index, package) in manifest.packages.iter().enumerate() {
                tracing::info!(
                    "  {}. {} (cid={}, kind={:?})",
                    index + 1,
                    package.label(),
                    package.content_id,
                    package.kind
                );
            }
            return Ok(ProvisionReport {
                manifest_source: source.describe(),
                retrieval: describe_retrieval(&manifest),
                root: self.settings.root.display().to_string(),
                dry_run: true,
                started_at,
                finished_at: Utc::now(),
                packages: manifest.packages.iter().map(PackageReport::pending).collect(),
                services: Vec::new(),
            });
        }

        let backend = RetrievalBackend::from_config(&manifest.retrieval)?;
        let retrieval = backend.describe();
        tracing::info!("🌐 Retrieving packages via {}", retrieval);

        let engine = ProvisionEngine::new_with_monitoring(
            backend,
            self.settings.root.clone(),
            self.settings.monitor,
        )
        .with_jobs(self.settings.jobs)
        .with_timeout(self.settings.timeout)
        .with_cancel_token(self.cancel.clone());
        let results = engine.run(&manifest).await;

        let services = if self.cancel.is_cancelled() {
            if manifest.service_count() > 0 {
                tracing::warn!(
                    "🛑 Run cancelled, not registering {} service(s)",
                    manifest.service_count()
                );
            }
            Vec::new()
        } else if self.settings.register_services {
            register_services(&self.services, &manifest.packages).await
        } else {
            if manifest.service_count() > 0 {
                tracing::info!(
                    "⏭️ Skipping registration of {} service(s)",
                    manifest.service_count()
                );
            }
            Vec::new()
        };

        Ok(ProvisionReport {
            manifest_source: source.describe(),
            retrieval,
            root: self.settings.root.display().to_string(),
            dry_run: false,
            started_at,
            finished_at: Utc::now(),
            packages: results.iter().map(PackageReport::from).collect(),
            services,
        })
    }
}

fn describe_retrieval(manifest: &Manifest) -> String {
    match manifest.retrieval.command_override() {
        Some(command) => format!("command '{}'", command),
        None => format!("IPFS API at {}", manifest.retrieval.endpoint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::PackageKind;
    use crate::utils::error::ProvisionError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingManager {
        calls: Mutex<Vec<String>>,
        fail_enable: bool,
    }

    #[async_trait]
    impl ServiceManager for RecordingManager {
        async fn enable(&self, unit: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("enable {}", unit));
            if self.fail_enable {
                return Err(ProvisionError::ServiceError {
                    unit: unit.to_string(),
                    message: "exit status 1".to_string(),
                });
            }
            Ok(())
        }

        async fn start(&self, unit: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("start {}", unit));
            Ok(())
        }
    }

    struct StaticManifest(&'static str);

    #[async_trait]
    impl ManifestSource for StaticManifest {
        async fn fetch(&self) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    fn packages() -> Vec<Package> {
        vec![
            Package::new("tools", "bafytools", PackageKind::Plain),
            Package::new("agent", "bafyagent", PackageKind::Service),
            Package::new("", "bafyanon", PackageKind::Service),
        ]
    }

    #[tokio::test]
    async fn test_register_services_enables_then_starts() {
        let manager = RecordingManager::default();
        let reports = register_services(&manager, &packages()).await;

        assert_eq!(
            *manager.calls.lock().unwrap(),
            vec!["enable agent".to_string(), "start agent".to_string()]
        );
        assert_eq!(reports.len(), 2);
        assert!(reports[0].enabled && reports[0].started);
        assert!(!reports[1].errors.is_empty());
    }

    #[tokio::test]
    async fn test_start_attempted_after_enable_failure() {
        let manager = RecordingManager {
            fail_enable: true,
            ..RecordingManager::default()
        };
        let reports = register_services(&manager, &packages()[1..2]).await;

        assert!(!reports[0].enabled);
        assert!(reports[0].started);
        assert_eq!(reports[0].errors.len(), 1);
        assert_eq!(manager.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_manifest_applies_endpoint_override() {
        let source = StaticManifest("[[packages]]\nname = \"tools\"\ncontentID = \"bafytools\"\n");
        let manifest = load_manifest(&source, Some("10.1.1.1:5001")).await.unwrap();
        assert_eq!(manifest.retrieval.endpoint, "10.1.1.1:5001");
    }

    #[tokio::test]
    async fn test_load_manifest_without_endpoint_fails() {
        let source = StaticManifest("[[packages]]\ncontentID = \"bafytools\"\n");
        let result = load_manifest(&source, None).await;
        assert!(matches!(result, Err(ProvisionError::ManifestError { .. })));
    }

    #[test]
    fn test_boot_parameter_without_nocloud_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let cmdline = dir.path().join("cmdline");
        std::fs::write(&cmdline, "console=ttyS0 quiet\n").unwrap();

        let result = manifest_source(&ManifestLocation::BootParameter(cmdline));
        assert!(matches!(
            result,
            Err(ProvisionError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_boot_parameter_resolves_to_http_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let cmdline = dir.path().join("cmdline");
        std::fs::write(&cmdline, "nocloud=http://10.0.0.1/seed.toml\n").unwrap();

        let source = manifest_source(&ManifestLocation::BootParameter(cmdline)).unwrap();
        assert_eq!(source.describe(), "http://10.0.0.1/seed.toml");
    }
}
