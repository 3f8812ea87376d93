//! Reader adapters shared by the pipeline stages.
//!
//! Every stage boundary wraps its reader in a [`StageReader`], so an I/O error that
//! surfaces out of the tar parser still tells which stage produced it.

use crate::utils::error::ProvisionError;
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// 整個執行共用的取消旗標；阻塞的讀寫以 `check` 輪詢，非同步端以 `cancelled` 等待
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    pub fn check(&self) -> io::Result<()> {
        if self.is_cancelled() {
            Err(io::Error::other(Cancelled))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Decompress,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Decompress => write!(f, "decompress"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageFault {
    pub stage: Stage,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Tags errors from `inner` with `stage`; errors already tagged upstream pass through.
pub struct StageReader<R> {
    inner: R,
    stage: Stage,
}

impl<R: Read> StageReader<R> {
    pub fn new(inner: R, stage: Stage) -> Self {
        Self { inner, stage }
    }
}

impl<R: Read> Read for StageReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) if is_tagged(&e) => Err(e),
            Err(e) => Err(io::Error::new(
                e.kind(),
                StageFault {
                    stage: self.stage,
                    source: e,
                },
            )),
        }
    }
}

/// Fails every read once the token is cancelled.
pub struct CancellableReader<R> {
    inner: R,
    token: CancelToken,
}

impl<R: Read> CancellableReader<R> {
    pub fn new(inner: R, token: CancelToken) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.token.check()?;
        self.inner.read(buf)
    }
}

fn is_tagged(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<StageFault>() || inner.is::<Cancelled>())
}

/// 把串流讀取錯誤對應到錯誤分類；未標記的錯誤來自封存檔解析本身
pub fn classify_read_error(err: io::Error, content_id: &str) -> ProvisionError {
    let mut current: Option<&(dyn std::error::Error + 'static)> =
        err.get_ref().map(|inner| inner as &(dyn std::error::Error + 'static));

    while let Some(inner) = current {
        if inner.is::<Cancelled>() {
            return ProvisionError::Cancelled;
        }
        if let Some(fault) = inner.downcast_ref::<StageFault>() {
            return match fault.stage {
                Stage::Fetch => ProvisionError::FetchError {
                    content_id: content_id.to_string(),
                    message: fault.source.to_string(),
                },
                Stage::Decompress => ProvisionError::DecompressError {
                    message: fault.source.to_string(),
                },
            };
        }
        current = inner.source();
    }

    ProvisionError::ArchiveFormatError {
        message: err.to_string(),
    }
}
