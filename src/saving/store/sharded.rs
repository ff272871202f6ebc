/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : ShardedH5IOStore：按大小阈值切分为多个物理文件的权重存储
 *
 * 写入时统计当前分片已有的字节数，`make()` 时若已超过阈值，
 * 则落盘当前分片并开启新分片（`model.weights.h5` -> `model_1.weights.h5` -> ...）。
 * 组名到分片文件名的映射保存为同目录下的 `*.weights.json`，读取时据此切换分片。
 */

use super::h5::H5File;
use super::{exists, read_bytes, StoreMode, VarsGroup, WeightsStore};
use crate::saving::archive::{ArchiveReader, ArchiveWriter};
use crate::saving::error::SavingError;
use crate::saving::options::parse_size;
use std::collections::BTreeMap;
use std::path::Path;

/// 默认分片大小
pub const DEFAULT_SHARD_SIZE: &str = "10GB";

/// 为新分片生成不重复的文件名。
///
/// `path_list`是已经写出的分片：
/// - `model.weights.h5` -> `model_1.weights.h5`
/// - `model_1.weights.h5`（已有2个分片）-> `model_2.weights.h5`
pub fn resolve_duplicate_filename(path: &str, path_list: &[String]) -> String {
    let Some(stem) = path.strip_suffix(".weights.h5") else {
        return format!("{path}_1");
    };
    let numbered = stem
        .rsplit_once('_')
        .filter(|(_, index)| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()));
    if let Some((base, _)) = numbered {
        let count = path_list.iter().filter(|p| p.starts_with(base)).count();
        if count > 1 {
            return format!("{base}_{count}.weights.h5");
        }
    }
    format!("{stem}_1.weights.h5")
}

/// 路径的文件名部分
fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

pub struct ShardedH5IOStore {
    /// 当前分片的路径（磁盘路径或归档条目名）
    root_path: String,
    mode: StoreMode,
    writer: Option<ArchiveWriter>,
    reader: Option<ArchiveReader>,
    max_size: u64,
    current_shard_size: u64,
    shard_list: Vec<String>,
    /// 组名（如 `/layers/dense/vars`）-> 分片文件名
    var_shard_map: BTreeMap<String, String>,
    var_shard_map_filename: String,
    file: H5File,
    closed: bool,
}

impl ShardedH5IOStore {
    fn map_filename_for(root_path: &str) -> String {
        root_path.replace(".weights.h5", ".weights.json")
    }

    /// 以写模式创建，`max_size`形如`"10GB"`、`"15MB"`
    pub fn create(
        root_path: impl Into<String>,
        max_size: &str,
        archive: Option<ArchiveWriter>,
    ) -> Result<Self, SavingError> {
        let root_path = root_path.into();
        let max_size = parse_size(max_size)?;
        Ok(Self {
            var_shard_map_filename: Self::map_filename_for(&root_path),
            root_path,
            mode: StoreMode::Write,
            writer: archive,
            reader: None,
            max_size,
            current_shard_size: 0,
            shard_list: Vec::new(),
            var_shard_map: BTreeMap::new(),
            file: H5File::default(),
            closed: false,
        })
    }

    /// 以读模式打开；分片映射文件缺失时报错
    pub fn open(
        root_path: impl Into<String>,
        archive: Option<ArchiveReader>,
    ) -> Result<Self, SavingError> {
        let root_path = root_path.into();
        let var_shard_map_filename = Self::map_filename_for(&root_path);
        if !exists(&var_shard_map_filename, archive.as_ref()) {
            return Err(SavingError::ShardMapMissing(var_shard_map_filename));
        }
        let map_bytes = read_bytes(&var_shard_map_filename, archive.as_ref())?;
        let var_shard_map: BTreeMap<String, String> = serde_json::from_slice(&map_bytes)?;
        let file = H5File::load(&root_path, archive.as_ref())?;
        tracing::debug!("打开分片权重 {root_path}（映射中共 {} 个组）", var_shard_map.len());
        Ok(Self {
            root_path,
            mode: StoreMode::Read,
            writer: None,
            reader: archive,
            max_size: 0,
            current_shard_size: 0,
            shard_list: Vec::new(),
            var_shard_map,
            var_shard_map_filename,
            file,
            closed: false,
        })
    }

    /// 已落盘的分片（不含当前分片）
    pub fn shard_list(&self) -> &[String] {
        &self.shard_list
    }

    pub fn var_shard_map(&self) -> &BTreeMap<String, String> {
        &self.var_shard_map
    }

    /// 分片文件名 -> 可读取的位置（归档条目名，或与映射文件同目录的磁盘路径）
    fn locate(&self, shard: &str) -> String {
        if self.reader.is_some() || self.writer.is_some() {
            return shard.to_string();
        }
        match Path::new(&self.var_shard_map_filename).parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                dir.join(shard).to_string_lossy().into_owned()
            }
            _ => shard.to_string(),
        }
    }

    fn rotate(&mut self) -> Result<(), SavingError> {
        self.shard_list.push(self.root_path.clone());
        self.file.flush(&self.root_path, self.writer.as_ref())?;
        let next = resolve_duplicate_filename(&self.root_path, &self.shard_list);
        tracing::debug!(
            "分片 {} 已达 {} 字节（上限 {}），切换到 {next}",
            self.root_path,
            self.current_shard_size,
            self.max_size
        );
        self.root_path = next;
        self.file = H5File::default();
        Ok(())
    }
}

impl WeightsStore for ShardedH5IOStore {
    fn make(&mut self, path: &str) -> Result<&mut VarsGroup, SavingError> {
        if self.mode != StoreMode::Write {
            return Err(SavingError::ReadOnly(self.root_path.clone()));
        }
        self.current_shard_size = self.file.nbytes();
        if self.current_shard_size > self.max_size {
            self.rotate()?;
        }
        self.var_shard_map
            .insert(H5File::group_name(path), file_name(&self.root_path));
        self.file.create_group(path)
    }

    fn get(&mut self, path: &str) -> Result<VarsGroup, SavingError> {
        if let Some(group) = self.file.group(path) {
            return Ok(group.clone());
        }
        let group_name = H5File::group_name(path);
        let shard = self
            .var_shard_map
            .get(path)
            .or_else(|| self.var_shard_map.get(&group_name))
            .cloned();
        if let Some(shard) = shard {
            let location = self.locate(&shard);
            if location != self.root_path {
                let file = H5File::load(&location, self.reader.as_ref())?;
                if let Some(group) = file.group(path).cloned() {
                    tracing::debug!("切换到分片 {location} 读取 {group_name}");
                    self.file = file;
                    self.root_path = location;
                    return Ok(group);
                }
            }
        }
        Ok(VarsGroup::default())
    }

    fn close(&mut self) -> Result<(), SavingError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.mode == StoreMode::Write {
            self.file.flush(&self.root_path, self.writer.as_ref())?;
            let map_json = serde_json::to_vec(&self.var_shard_map)?;
            match &self.writer {
                Some(archive) => archive.write_entry(&self.var_shard_map_filename, &map_json)?,
                None => std::fs::write(&self.var_shard_map_filename, map_json)?,
            }
        }
        Ok(())
    }
}
