#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// 某個套件處理完後的行程常駐記憶體
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub resident_mb: u64,
    /// 相對於開始佈建時的增減
    pub delta_mb: i64,
    pub peak_mb: u64,
}

#[cfg(feature = "cli")]
#[derive(Debug, Default)]
struct Watermarks {
    baseline_mb: Option<u64>,
    peak_mb: u64,
    samples: usize,
}

/// `--monitor`：逐套件記錄常駐記憶體，確認串流解壓沒有把整個封存檔留在記憶體裡
#[cfg(feature = "cli")]
pub struct MemoryMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    marks: Mutex<Watermarks>,
}

#[cfg(feature = "cli")]
impl MemoryMonitor {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Memory monitoring unavailable: {}", e);
                None
            }
        };

        let monitor = Self {
            system: Mutex::new(System::new()),
            pid,
            started: Instant::now(),
            marks: Mutex::new(Watermarks::default()),
        };
        // 第一次取樣作為基準
        if let Some(resident_mb) = monitor.resident_mb() {
            if let Ok(mut marks) = monitor.marks.lock() {
                marks.baseline_mb = Some(resident_mb);
                marks.peak_mb = resident_mb;
            }
        }
        monitor
    }

    fn resident_mb(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|process| process.memory() / 1024 / 1024)
    }

    pub fn sample(&self) -> Option<MemorySample> {
        let resident_mb = self.resident_mb()?;
        let mut marks = self.marks.lock().ok()?;
        let baseline_mb = *marks.baseline_mb.get_or_insert(resident_mb);
        marks.peak_mb = marks.peak_mb.max(resident_mb);
        marks.samples += 1;

        Some(MemorySample {
            resident_mb,
            delta_mb: resident_mb as i64 - baseline_mb as i64,
            peak_mb: marks.peak_mb,
        })
    }

    pub fn record_package(&self, label: &str) {
        if let Some(sample) = self.sample() {
            tracing::info!(
                "📊 After {}: RSS {}MB ({:+}MB since start), peak {}MB",
                label,
                sample.resident_mb,
                sample.delta_mb,
                sample.peak_mb
            );
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn log_summary(&self) {
        let Ok(marks) = self.marks.lock() else {
            return;
        };
        tracing::info!(
            "📊 Provisioning took {:?}, peak RSS {}MB over {} package sample(s)",
            self.elapsed(),
            marks.peak_mb,
            marks.samples
        );
    }
}

#[cfg(feature = "cli")]
impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// 非 CLI 建置時不取樣
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct MemoryMonitor;

#[cfg(not(feature = "cli"))]
impl MemoryMonitor {
    pub fn new() -> Self {
        Self
    }

    pub fn record_package(&self, _label: &str) {}

    pub fn log_summary(&self) {}
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_peak_never_below_latest_sample() {
        let monitor = MemoryMonitor::new();
        let first = monitor.sample().unwrap();
        let _buffer = vec![1u8; 8 * 1024 * 1024];
        let second = monitor.sample().unwrap();

        assert!(first.resident_mb > 0);
        assert!(second.peak_mb >= second.resident_mb);
        assert!(second.peak_mb >= first.peak_mb);
        assert_eq!(monitor.marks.lock().unwrap().samples, 2);
    }
}
