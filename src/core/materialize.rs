use crate::core::archive::{ArchiveEntry, EntryKind};
use crate::core::stream::{classify_read_error, CancelToken};
use crate::utils::error::{ProvisionError, Result};
use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Directory,
    File { bytes: u64 },
    Skipped,
}

/// 將封存項目寫到目標根目錄下
///
/// 沒有交易式回滾：失敗時已寫入的檔案（包括寫到一半的檔案）都會留在磁碟上。
pub struct Materializer {
    root: PathBuf,
    token: CancelToken,
}

impl Materializer {
    /// 建立（必要時）並正規化目標根目錄
    pub fn new(root: &Path, token: CancelToken) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| materialize_error(root, e))?;
        let root = fs::canonicalize(root).map_err(|e| materialize_error(root, e))?;
        Ok(Self { root, token })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an archive path onto the root; `None` when it names the root itself.
    pub fn resolve(&self, entry_path: &Path) -> Result<Option<PathBuf>> {
        Ok(normalize_entry_path(entry_path)?.map(|relative| self.root.join(relative)))
    }

    pub fn materialize<R: Read>(
        &self,
        entry: &mut ArchiveEntry<'_, R>,
        content_id: &str,
    ) -> Result<EntryOutcome> {
        self.token.check().map_err(|_| ProvisionError::Cancelled)?;

        if let EntryKind::Other(flag) = entry.kind {
            tracing::warn!(
                "⚠️ Skipping unsupported entry {} (type '{}')",
                entry.path.display(),
                flag as char
            );
            return Ok(EntryOutcome::Skipped);
        }

        let Some(target) = self.resolve(&entry.path)? else {
            tracing::debug!("Skipping root entry {}", entry.path.display());
            return Ok(EntryOutcome::Skipped);
        };
        self.prepare_parent(&target, &entry.path)?;

        match entry.kind {
            EntryKind::Directory => {
                self.create_directory(&target, &entry.path, entry.mode)?;
                Ok(EntryOutcome::Directory)
            }
            EntryKind::RegularFile => {
                let bytes = self.write_file(entry, &target, content_id)?;
                Ok(EntryOutcome::File { bytes })
            }
            EntryKind::Other(_) => Ok(EntryOutcome::Skipped),
        }
    }

    /// 先檢查最深的既有祖先仍在根目錄內，再建立缺少的父目錄
    fn prepare_parent(&self, target: &Path, original: &Path) -> Result<()> {
        let Some(parent) = target.parent() else {
            return Ok(());
        };

        let mut existing = parent;
        while !existing.exists() {
            match existing.parent() {
                Some(p) => existing = p,
                None => break,
            }
        }
        self.ensure_within_root(existing, original)?;

        fs::create_dir_all(parent).map_err(|e| materialize_error(parent, e))
    }

    fn ensure_within_root(&self, path: &Path, original: &Path) -> Result<()> {
        let canonical = fs::canonicalize(path).map_err(|e| materialize_error(path, e))?;
        if !canonical.starts_with(&self.root) {
            return Err(ProvisionError::PathEscapeError {
                path: original.to_path_buf(),
            });
        }
        Ok(())
    }

    /// 只有這個項目新建立的目錄才套用宣告的權限；既有目錄保持原狀
    fn create_directory(&self, target: &Path, original: &Path, mode: u32) -> Result<()> {
        match fs::symlink_metadata(target) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(meta) if meta.file_type().is_symlink() => {
                // 例如 usr-merge 的 /lib -> usr/lib
                self.ensure_within_root(target, original)?;
                if !target.is_dir() {
                    return Err(not_a_directory(target));
                }
                Ok(())
            }
            Ok(_) => Err(not_a_directory(target)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::create_dir(target) {
                Ok(()) => fs::set_permissions(target, Permissions::from_mode(mode))
                    .map_err(|e| materialize_error(target, e)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
                Err(e) => Err(materialize_error(target, e)),
            },
            Err(e) => Err(materialize_error(target, e)),
        }
    }

    fn write_file<R: Read>(
        &self,
        entry: &mut ArchiveEntry<'_, R>,
        target: &Path,
        content_id: &str,
    ) -> Result<u64> {
        // 不跟隨既有的符號連結寫檔
        if let Ok(meta) = fs::symlink_metadata(target) {
            if meta.file_type().is_symlink() {
                fs::remove_file(target).map_err(|e| materialize_error(target, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(entry.mode)
            .open(target)
            .map_err(|e| materialize_error(target, e))?;

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            self.token.check().map_err(|_| ProvisionError::Cancelled)?;

            let n = match entry.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(classify_read_error(e, content_id)),
            };
            file.write_all(&buf[..n])
                .map_err(|e| materialize_error(target, e))?;
            written += n as u64;
        }

        if written < entry.size {
            return Err(ProvisionError::ArchiveFormatError {
                message: format!(
                    "{} truncated: expected {} bytes, got {}",
                    entry.path.display(),
                    entry.size,
                    written
                ),
            });
        }

        file.flush().map_err(|e| materialize_error(target, e))?;
        fs::set_permissions(target, Permissions::from_mode(entry.mode))
            .map_err(|e| materialize_error(target, e))?;

        Ok(written)
    }
}

/// 去掉開頭的 `/` 與 `.`；任何 `..` 都視為逃逸
fn normalize_entry_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut result = PathBuf::with_capacity(path.as_os_str().len());

    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                return Err(ProvisionError::PathEscapeError {
                    path: path.to_path_buf(),
                })
            }
            Component::Normal(part) => result.push(part),
        }
    }

    if result.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(result))
}

fn materialize_error(path: &Path, source: io::Error) -> ProvisionError {
    ProvisionError::MaterializeError {
        path: path.to_path_buf(),
        source,
    }
}

fn not_a_directory(path: &Path) -> ProvisionError {
    materialize_error(
        path,
        io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
    )
}
