/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : `.keras` zip 归档的读写句柄
 *
 * 归档在一次保存/加载中被多个存储（权重、资源）共享，
 * 故以 `Rc<RefCell<..>>` 包装，克隆句柄即共享同一归档。
 */

use super::error::SavingError;
use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 写模式归档
#[derive(Clone)]
pub struct ArchiveWriter {
    inner: Rc<RefCell<ZipWriter<File>>>,
}

impl ArchiveWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SavingError> {
        let file = File::create(path.as_ref())?;
        Ok(Self {
            inner: Rc::new(RefCell::new(ZipWriter::new(file))),
        })
    }

    fn options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true)
    }

    /// 写入一个条目
    pub fn write_entry(&self, name: &str, bytes: &[u8]) -> Result<(), SavingError> {
        let mut zip = self.inner.borrow_mut();
        zip.start_file(name, Self::options())?;
        zip.write_all(bytes)?;
        Ok(())
    }

    /// 把磁盘目录`system_path`下的所有文件写入归档的`zip_path`下
    pub fn write_dir_recursively(
        &self,
        system_path: &Path,
        zip_path: &str,
    ) -> Result<(), SavingError> {
        if !system_path.is_dir() {
            let bytes = std::fs::read(system_path)?;
            return self.write_entry(zip_path, &bytes);
        }
        let mut entries = std::fs::read_dir(system_path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();
        for entry in entries {
            let file_name = entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.write_dir_recursively(&entry, &format!("{zip_path}/{file_name}"))?;
        }
        Ok(())
    }

    /// 写出中央目录，完成归档
    pub fn finish(&self) -> Result<(), SavingError> {
        self.inner.borrow_mut().finish()?;
        Ok(())
    }
}

/// 读模式归档
#[derive(Clone)]
pub struct ArchiveReader {
    inner: Rc<RefCell<ZipArchive<File>>>,
}

impl ArchiveReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SavingError> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            inner: Rc::new(RefCell::new(ZipArchive::new(file)?)),
        })
    }

    /// 归档中的所有条目名
    pub fn names(&self) -> Vec<String> {
        self.inner
            .borrow()
            .file_names()
            .map(str::to_string)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.borrow().file_names().any(|n| n == name)
    }

    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>, SavingError> {
        let mut zip = self.inner.borrow_mut();
        let mut entry = match zip.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(SavingError::MissingEntry(name.to_string())),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// 把整个归档解压到`directory`
    pub fn extract_to(&self, directory: &Path) -> Result<(), SavingError> {
        self.inner.borrow_mut().extract(directory)?;
        Ok(())
    }
}
