/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : H5IOStore：单文件的分组变量存储
 *
 * 每个逻辑路径对应一个名为 `/<path>/vars` 的组（根路径为 `/vars`），
 * 组内是扁平的具名变量。文件格式：魔数 + 版本号 + bincode 编码的组表。
 * 可直接读写磁盘文件，也可作为 `.keras` 归档中的一个条目（内存缓冲，关闭时写入）。
 */

use super::{read_bytes, write_bytes, StoreMode, VarsGroup, WeightsStore};
use crate::saving::archive::{ArchiveReader, ArchiveWriter};
use crate::saving::error::SavingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

/// 一个物理权重文件的内容：组名 -> 变量组
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct H5File {
    groups: BTreeMap<String, VarsGroup>,
}

impl H5File {
    /// 权重文件魔数
    const MAGIC: &'static [u8; 4] = b"OKH5";
    /// 权重文件版本
    const VERSION: u32 = 1;

    /// 逻辑路径对应的组名
    pub(crate) fn group_name(path: &str) -> String {
        if path.is_empty() {
            "/vars".to_string()
        } else {
            format!("/{path}/vars")
        }
    }

    pub(crate) fn create_group(&mut self, path: &str) -> Result<&mut VarsGroup, SavingError> {
        let name = Self::group_name(path);
        if self.groups.contains_key(&name) {
            return Err(SavingError::GroupExists(name));
        }
        Ok(self.groups.entry(name).or_default())
    }

    pub(crate) fn group(&self, path: &str) -> Option<&VarsGroup> {
        self.groups.get(&Self::group_name(path))
    }

    pub(crate) fn nbytes(&self) -> u64 {
        self.groups.values().map(VarsGroup::nbytes).sum()
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, SavingError> {
        let mut writer = Vec::new();
        writer.write_all(Self::MAGIC)?;
        writer.write_all(&Self::VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut writer, &self.groups)?;
        Ok(writer)
    }

    pub(crate) fn from_bytes(bytes: &[u8], origin: &str) -> Result<Self, SavingError> {
        let mut reader = Cursor::new(bytes);
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| SavingError::BadMagic(origin.to_string()))?;
        if &magic != Self::MAGIC {
            return Err(SavingError::BadMagic(origin.to_string()));
        }
        let mut version_bytes = [0u8; 4];
        reader
            .read_exact(&mut version_bytes)
            .map_err(|_| SavingError::BadMagic(origin.to_string()))?;
        let version = u32::from_le_bytes(version_bytes);
        if version != Self::VERSION {
            return Err(SavingError::UnsupportedVersion {
                found: version,
                expected: Self::VERSION,
            });
        }
        let groups = bincode::deserialize_from(&mut reader)?;
        Ok(Self { groups })
    }

    pub(crate) fn load(
        root_path: &str,
        archive: Option<&ArchiveReader>,
    ) -> Result<Self, SavingError> {
        let bytes = read_bytes(root_path, archive)?;
        Self::from_bytes(&bytes, root_path)
    }

    pub(crate) fn flush(
        &self,
        root_path: &str,
        archive: Option<&ArchiveWriter>,
    ) -> Result<(), SavingError> {
        write_bytes(root_path, archive, &self.to_bytes()?)
    }
}

/// 单文件权重存储
pub struct H5IOStore {
    root_path: String,
    mode: StoreMode,
    archive: Option<ArchiveWriter>,
    file: H5File,
    closed: bool,
}

impl H5IOStore {
    /// 以写模式创建。若给出`archive`，`root_path`是归档内的条目名，否则是磁盘路径
    pub fn create(root_path: impl Into<String>, archive: Option<ArchiveWriter>) -> Self {
        Self {
            root_path: root_path.into(),
            mode: StoreMode::Write,
            archive,
            file: H5File::default(),
            closed: false,
        }
    }

    /// 以读模式打开
    pub fn open(
        root_path: impl Into<String>,
        archive: Option<&ArchiveReader>,
    ) -> Result<Self, SavingError> {
        let root_path = root_path.into();
        let file = H5File::load(&root_path, archive)?;
        tracing::debug!("打开权重文件 {root_path}（{} 个组）", file.groups.len());
        Ok(Self {
            root_path,
            mode: StoreMode::Read,
            archive: None,
            file,
            closed: false,
        })
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }
}

impl WeightsStore for H5IOStore {
    fn make(&mut self, path: &str) -> Result<&mut VarsGroup, SavingError> {
        if self.mode != StoreMode::Write {
            return Err(SavingError::ReadOnly(self.root_path.clone()));
        }
        self.file.create_group(path)
    }

    fn get(&mut self, path: &str) -> Result<VarsGroup, SavingError> {
        Ok(self.file.group(path).cloned().unwrap_or_default())
    }

    fn close(&mut self) -> Result<(), SavingError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.mode == StoreMode::Write {
            self.file.flush(&self.root_path, self.archive.as_ref())?;
        }
        Ok(())
    }
}
