use crate::core::archive::{ArchiveReader, EntryError};
use crate::core::decompress;
use crate::core::materialize::{EntryOutcome, Materializer};
use crate::core::state::PackageProgress;
use crate::core::stream::{classify_read_error, CancelToken, CancellableReader, Stage, StageReader};
use crate::domain::manifest::Manifest;
use crate::domain::model::{EntryStats, MaterializationResult, Package, PackageState};
use crate::domain::ports::ByteSource;
use crate::utils::error::{ProvisionError, Result};
use crate::utils::monitor::MemoryMonitor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// 依清單順序處理套件；單一套件失敗只會記錄在它自己的結果中
///
/// 多個套件可以並行（`jobs`），但它們共用同一個目標根目錄：路徑重疊時以最後寫入者為準，
/// 不做鎖定或衝突偵測。
pub struct ProvisionEngine<S: ByteSource> {
    source: Arc<S>,
    root: PathBuf,
    jobs: usize,
    timeout: Option<Duration>,
    cancel: CancelToken,
    monitor: Option<MemoryMonitor>,
}

impl<S: ByteSource + 'static> ProvisionEngine<S> {
    pub fn new(source: S, root: impl Into<PathBuf>) -> Self {
        Self {
            source: Arc::new(source),
            root: root.into(),
            jobs: 1,
            timeout: None,
            cancel: CancelToken::new(),
            monitor: None,
        }
    }

    pub fn new_with_monitoring(source: S, root: impl Into<PathBuf>, monitor_enabled: bool) -> Self {
        Self::new(source, root).with_monitoring(monitor_enabled)
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(MemoryMonitor::new);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn run(&self, manifest: &Manifest) -> Vec<MaterializationResult> {
        let total = manifest.packages.len();
        tracing::info!(
            "🚀 Provisioning {} package(s) into {} (jobs: {})",
            total,
            self.root.display(),
            self.jobs
        );

        let watchdog = self.timeout.map(|timeout| {
            let token = self.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                tracing::warn!("⏰ Provisioning timed out after {:?}, cancelling", timeout);
                token.cancel();
            })
        });

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut tasks = JoinSet::new();
        let mut results: Vec<Option<MaterializationResult>> = (0..total).map(|_| None).collect();

        for (index, package) in manifest.packages.iter().enumerate() {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            if self.cancel.is_cancelled() {
                tracing::warn!("⏭️ Not starting {}: run cancelled", package.label());
                results[index] = Some(MaterializationResult::failed(
                    package.clone(),
                    ProvisionError::Cancelled,
                    EntryStats::default(),
                    Duration::ZERO,
                ));
                continue;
            }

            tracing::info!(
                "📦 Deploying package {}/{}: {} (cid={})",
                index + 1,
                total,
                package.label(),
                package.content_id
            );

            let source = Arc::clone(&self.source);
            let root = self.root.clone();
            let cancel = self.cancel.clone();
            let package = package.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                let fallback = package.clone();
                let token = cancel.clone();
                let stats = Arc::new(SharedStats::default());
                let worker_stats = Arc::clone(&stats);

                let worker = tokio::task::spawn_blocking(move || {
                    run_package(source.as_ref(), &package, &root, &cancel, &worker_stats)
                });

                // 阻塞中的網路讀取無法立即中斷；取消時先回報，背景工作會在下一次讀寫時停下
                let result = tokio::select! {
                    biased;
                    joined = worker => match joined {
                        Ok(result) => result,
                        Err(e) => MaterializationResult::failed(
                            fallback,
                            ProvisionError::TaskFailed { message: e.to_string() },
                            stats.snapshot(),
                            started.elapsed(),
                        ),
                    },
                    _ = token.cancelled() => MaterializationResult::failed(
                        fallback,
                        ProvisionError::Cancelled,
                        stats.snapshot(),
                        started.elapsed(),
                    ),
                };
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    log_result(&result);
                    if let Some(monitor) = &self.monitor {
                        monitor.record_package(result.package.label());
                    }
                    results[index] = Some(result);
                }
                Err(e) => tracing::error!("❌ Package task aborted: {}", e),
            }
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        if let Some(monitor) = &self.monitor {
            monitor.log_summary();
        }

        results
            .into_iter()
            .zip(manifest.packages.iter())
            .map(|(result, package)| {
                result.unwrap_or_else(|| {
                    MaterializationResult::failed(
                        package.clone(),
                        ProvisionError::TaskFailed {
                            message: "package worker did not report a result".to_string(),
                        },
                        EntryStats::default(),
                        Duration::ZERO,
                    )
                })
            })
            .collect()
    }
}

fn log_result(result: &MaterializationResult) {
    match &result.error {
        None => tracing::info!(
            "✅ {}: {} dirs, {} files ({} bytes), {} skipped in {:?}",
            result.package.label(),
            result.stats.directories,
            result.stats.files,
            result.stats.bytes,
            result.stats.skipped,
            result.duration
        ),
        Some(e) => tracing::error!(
            "❌ Failed to extract package {} ({:?}): {}",
            result.package.label(),
            e.category(),
            e
        ),
    }
}

/// 工作執行緒與協調端共用的項目計數；取消時仍能回報已寫入的部分
#[derive(Debug, Default)]
struct SharedStats {
    directories: AtomicUsize,
    files: AtomicUsize,
    skipped: AtomicUsize,
    bytes: AtomicU64,
}

impl SharedStats {
    fn record(&self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Directory => {
                self.directories.fetch_add(1, Ordering::Relaxed);
            }
            EntryOutcome::File { bytes } => {
                self.bytes.fetch_add(bytes, Ordering::Relaxed);
                self.files.fetch_add(1, Ordering::Relaxed);
            }
            EntryOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> EntryStats {
        EntryStats {
            directories: self.directories.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// 阻塞式處理單一套件：取得 → 解壓 → 解封存 → 寫入，全程串流
pub fn materialize_package<S: ByteSource + ?Sized>(
    source: &S,
    package: &Package,
    root: &Path,
    cancel: &CancelToken,
) -> MaterializationResult {
    run_package(source, package, root, cancel, &SharedStats::default())
}

fn run_package<S: ByteSource + ?Sized>(
    source: &S,
    package: &Package,
    root: &Path,
    cancel: &CancelToken,
    stats: &SharedStats,
) -> MaterializationResult {
    let started = Instant::now();
    let mut progress = PackageProgress::new(package.label());

    match extract_package(source, package, root, cancel, &mut progress, stats) {
        Ok(()) => {
            progress.advance(PackageState::Succeeded);
            MaterializationResult::succeeded(package.clone(), stats.snapshot(), started.elapsed())
        }
        Err(e) => {
            progress.advance(PackageState::Failed(e.category()));
            MaterializationResult::failed(package.clone(), e, stats.snapshot(), started.elapsed())
        }
    }
}

fn extract_package<S: ByteSource + ?Sized>(
    source: &S,
    package: &Package,
    root: &Path,
    cancel: &CancelToken,
    progress: &mut PackageProgress,
    stats: &SharedStats,
) -> Result<()> {
    package.validate()?;
    cancel.check().map_err(|_| ProvisionError::Cancelled)?;
    let materializer = Materializer::new(root, cancel.clone())?;
    let content_id = package.content_id.as_str();

    progress.advance(PackageState::Fetching);
    let stream = source.open(content_id)?;
    let stream = CancellableReader::new(StageReader::new(stream, Stage::Fetch), cancel.clone());

    progress.advance(PackageState::Decompressing);
    let decoded = decompress::wrap(stream)?;

    progress.advance(PackageState::Extracting);
    let mut reader = ArchiveReader::new(decoded);
    let entries = reader
        .entries()
        .map_err(|e| classify_read_error(e, content_id))?;

    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(EntryError::Read(e)) => return Err(classify_read_error(e, content_id)),
            Err(EntryError::Header(e)) => return Err(e),
        };
        tracing::debug!("  {}", entry.path.display());

        stats.record(materializer.materialize(&mut entry, content_id)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::PackageKind;
    use crate::utils::error::ErrorCategory;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MockSource {
        objects: HashMap<String, Vec<u8>>,
        opened: Mutex<Vec<String>>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                objects: HashMap::new(),
                opened: Mutex::new(Vec::new()),
            }
        }

        fn with_object(mut self, cid: &str, data: Vec<u8>) -> Self {
            self.objects.insert(cid.to_string(), data);
            self
        }
    }

    impl ByteSource for MockSource {
        fn open(&self, content_id: &str) -> Result<Box<dyn Read + Send>> {
            self.opened.lock().unwrap().push(content_id.to_string());
            match self.objects.get(content_id) {
                Some(data) => Ok(Box::new(std::io::Cursor::new(data.clone()))),
                None => Err(ProvisionError::FetchError {
                    content_id: content_id.to_string(),
                    message: "not found".to_string(),
                }),
            }
        }
    }

    fn tar_xz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_mode(0o644);
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        let tar_data = builder.into_inner().unwrap();

        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(&tar_data).unwrap();
        encoder.finish().unwrap()
    }

    fn manifest(packages: Vec<Package>) -> Manifest {
        Manifest {
            packages,
            ..Manifest::default()
        }
    }

    #[tokio::test]
    async fn test_run_reports_each_package_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let source = MockSource::new()
            .with_object("bafyone", tar_xz(&[("opt/one.txt", b"one")]))
            .with_object("bafytwo", tar_xz(&[("opt/two.txt", b"two")]));

        let engine = ProvisionEngine::new(source, temp_dir.path()).with_jobs(2);
        let results = engine
            .run(&manifest(vec![
                Package::new("one", "bafyone", PackageKind::Plain),
                Package::new("missing", "bafymissing", PackageKind::Plain),
                Package::new("two", "bafytwo", PackageKind::Plain),
            ]))
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].package.name, "one");
        assert!(results[0].is_success());
        assert_eq!(results[1].state, PackageState::Failed(ErrorCategory::Fetch));
        assert!(results[2].is_success());
        assert_eq!(
            std::fs::read(temp_dir.path().join("opt/two.txt")).unwrap(),
            b"two"
        );
    }

    #[tokio::test]
    async fn test_invalid_package_is_not_fetched() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ProvisionEngine::new(MockSource::new(), temp_dir.path());

        let results = engine
            .run(&manifest(vec![Package::new("broken", "", PackageKind::Plain)]))
            .await;

        assert_eq!(
            results[0].state,
            PackageState::Failed(ErrorCategory::InvalidPackage)
        );
        assert!(engine.source.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_launching_packages() {
        let temp_dir = TempDir::new().unwrap();
        let source = MockSource::new().with_object("bafyone", tar_xz(&[("a.txt", b"a")]));
        let engine = ProvisionEngine::new(source, temp_dir.path());
        engine.cancel_token().cancel();

        let results = engine
            .run(&manifest(vec![
                Package::new("one", "bafyone", PackageKind::Plain),
                Package::new("two", "bafyone", PackageKind::Plain),
            ]))
            .await;

        assert!(results
            .iter()
            .all(|r| r.state == PackageState::Failed(ErrorCategory::Cancelled)));
        assert!(engine.source.opened.lock().unwrap().is_empty());
        assert!(!temp_dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_materialize_package_counts_entries() {
        let temp_dir = TempDir::new().unwrap();
        let source = MockSource::new().with_object(
            "bafy",
            tar_xz(&[("etc/motd", b"welcome"), ("etc/issue", b"linux")]),
        );

        let result = materialize_package(
            &source,
            &Package::new("motd", "bafy", PackageKind::Plain),
            temp_dir.path(),
            &CancelToken::new(),
        );

        assert!(result.is_success());
        assert_eq!(result.stats.files, 2);
        assert_eq!(result.stats.bytes, 12);
    }
}
