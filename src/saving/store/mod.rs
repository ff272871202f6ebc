/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 权重/资源存储的统一接口
 *
 * 逻辑上，存储是一棵以路径（如 `layers/dense`）命名的组树，每个组含一组扁平的具名变量；
 * 物理上可落到单个文件、多个分片文件、npz 归档或目录树中。
 *
 * 所有数值存储共享同一套约定：
 * - `make(path)`：新建该路径的变量组并返回可写引用
 * - `get(path)`：读取该路径的变量组，不存在时返回空组
 * - `close()`：落盘（写模式）并释放资源
 */

mod disk;
mod h5;
mod npz;
mod sharded;

pub use disk::{DiskIOStore, TempDir};
pub use h5::H5IOStore;
pub use npz::NpzIOStore;
pub use sharded::{resolve_duplicate_filename, ShardedH5IOStore, DEFAULT_SHARD_SIZE};

use super::archive::{ArchiveReader, ArchiveWriter};
use super::error::SavingError;
use enum_dispatch::enum_dispatch;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 一个路径下的具名变量集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarsGroup {
    vars: BTreeMap<String, ArrayD<f32>>,
}

impl VarsGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArrayD<f32>) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.vars.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArrayD<f32>)> {
        self.vars.iter()
    }

    /// 所有变量的字节数（分片时据此判断是否超限）
    pub fn nbytes(&self) -> u64 {
        self.vars
            .values()
            .map(|v| (v.len() * std::mem::size_of::<f32>()) as u64)
            .sum()
    }
}

/// 数值变量存储的统一接口
#[enum_dispatch]
pub trait WeightsStore {
    /// 新建`path`对应的变量组（写模式）
    fn make(&mut self, path: &str) -> Result<&mut VarsGroup, SavingError>;
    /// 读取`path`对应的变量组，不存在时返回空组（读模式）
    fn get(&mut self, path: &str) -> Result<VarsGroup, SavingError>;
    /// 落盘并释放资源；重复调用无副作用
    fn close(&mut self) -> Result<(), SavingError>;
}

#[enum_dispatch(WeightsStore)]
pub enum WeightsStoreKind {
    H5(H5IOStore),
    ShardedH5(ShardedH5IOStore),
    Npz(NpzIOStore),
}

/// 存储的读写模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Read,
    Write,
}

/// 将`bytes`写到磁盘文件`root_path`，或写为归档中名为`root_path`的条目
pub(crate) fn write_bytes(
    root_path: &str,
    archive: Option<&ArchiveWriter>,
    bytes: &[u8],
) -> Result<(), SavingError> {
    match archive {
        Some(archive) => archive.write_entry(root_path, bytes),
        None => {
            std::fs::write(Path::new(root_path), bytes)?;
            Ok(())
        }
    }
}

/// `write_bytes`的逆操作
pub(crate) fn read_bytes(
    root_path: &str,
    archive: Option<&ArchiveReader>,
) -> Result<Vec<u8>, SavingError> {
    match archive {
        Some(archive) => archive.read_entry(root_path),
        None => Ok(std::fs::read(Path::new(root_path))?),
    }
}

/// 路径是否存在（磁盘文件或归档条目）
pub(crate) fn exists(root_path: &str, archive: Option<&ArchiveReader>) -> bool {
    match archive {
        Some(archive) => archive.contains(root_path),
        None => Path::new(root_path).exists(),
    }
}
