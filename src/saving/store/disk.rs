/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : DiskIOStore：以目录树保存非数值资源（词表等）
 *
 * 不带归档时直接读写磁盘目录；带归档时先在临时目录中暂存，
 * 写模式关闭时整体写入归档，读模式打开时先把归档解压到临时目录。
 * 临时目录由 `TempDir` 持有，无论正常关闭还是出错提前返回，离开作用域即删除。
 */

use super::StoreMode;
use crate::saving::archive::{ArchiveReader, ArchiveWriter};
use crate::saving::error::SavingError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEMP_DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// 作用域内有效的临时目录，drop 时连同内容一起删除
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(prefix: &str) -> Result<Self, SavingError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let count = TEMP_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "{prefix}_{}_{nanos}_{count}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!("删除临时目录 {} 失败：{e}", self.path.display());
        }
    }
}

pub struct DiskIOStore {
    root_path: String,
    mode: StoreMode,
    archive: Option<ArchiveWriter>,
    tmp_dir: Option<TempDir>,
    working_dir: PathBuf,
    closed: bool,
}

impl DiskIOStore {
    /// 写模式。带归档时`root_path`为归档内的目录名（如`assets`），否则为磁盘目录
    pub fn create(
        root_path: impl Into<String>,
        archive: Option<ArchiveWriter>,
    ) -> Result<Self, SavingError> {
        let root_path = root_path.into();
        let (tmp_dir, working_dir) = match archive {
            Some(_) => {
                let tmp_dir = TempDir::new("only_keras_assets")?;
                let working_dir = tmp_dir.path().join(&root_path);
                (Some(tmp_dir), working_dir)
            }
            None => (None, PathBuf::from(&root_path)),
        };
        std::fs::create_dir_all(&working_dir)?;
        Ok(Self {
            root_path,
            mode: StoreMode::Write,
            archive,
            tmp_dir,
            working_dir,
            closed: false,
        })
    }

    /// 读模式。带归档时先解压到临时目录
    pub fn open(
        root_path: impl Into<String>,
        archive: Option<&ArchiveReader>,
    ) -> Result<Self, SavingError> {
        let root_path = root_path.into();
        let (tmp_dir, working_dir) = match archive {
            Some(archive) => {
                let tmp_dir = TempDir::new("only_keras_assets")?;
                archive.extract_to(tmp_dir.path())?;
                let working_dir = tmp_dir.path().join(&root_path);
                (Some(tmp_dir), working_dir)
            }
            None => (None, PathBuf::from(&root_path)),
        };
        Ok(Self {
            root_path,
            mode: StoreMode::Read,
            archive: None,
            tmp_dir,
            working_dir,
            closed: false,
        })
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// 创建（若不存在）并返回`path`对应的目录
    pub fn make(&mut self, path: &str) -> Result<PathBuf, SavingError> {
        if self.mode != StoreMode::Write {
            return Err(SavingError::ReadOnly(self.root_path.clone()));
        }
        if path.is_empty() {
            return Ok(self.working_dir.clone());
        }
        let dir = self.working_dir.join(path);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// `path`对应的目录，不存在时返回 None
    pub fn get(&self, path: &str) -> Option<PathBuf> {
        if path.is_empty() {
            return Some(self.working_dir.clone());
        }
        let dir = self.working_dir.join(path);
        dir.exists().then_some(dir)
    }

    /// 写模式下把暂存目录写入归档；随后删除临时目录
    pub fn close(&mut self) -> Result<(), SavingError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let (StoreMode::Write, Some(archive)) = (self.mode, &self.archive) {
            archive.write_dir_recursively(&self.working_dir, &self.root_path)?;
        }
        self.tmp_dir.take();
        Ok(())
    }
}
