/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : NpzIOStore：基于 npz 的权重存储
 *
 * 写入时全部变量先留在内存中，关闭时一次性写成单个 `.npz`；
 * 每个变量是一个条目，条目名为 `<路径>/<变量名>`，根路径记为 `__root__`。
 */

use super::{read_bytes, write_bytes, StoreMode, VarsGroup, WeightsStore};
use crate::saving::archive::{ArchiveReader, ArchiveWriter};
use crate::saving::error::SavingError;
use ndarray::ArrayD;
use ndarray_npy::{NpzReader, NpzWriter};
use std::collections::BTreeMap;
use std::io::Cursor;

const ROOT_KEY: &str = "__root__";

fn content_key(path: &str) -> &str {
    if path.is_empty() { ROOT_KEY } else { path }
}

pub struct NpzIOStore {
    root_path: String,
    mode: StoreMode,
    archive: Option<ArchiveWriter>,
    contents: BTreeMap<String, VarsGroup>,
    closed: bool,
}

impl NpzIOStore {
    pub fn create(root_path: impl Into<String>, archive: Option<ArchiveWriter>) -> Self {
        Self {
            root_path: root_path.into(),
            mode: StoreMode::Write,
            archive,
            contents: BTreeMap::new(),
            closed: false,
        }
    }

    pub fn open(
        root_path: impl Into<String>,
        archive: Option<&ArchiveReader>,
    ) -> Result<Self, SavingError> {
        let root_path = root_path.into();
        let bytes = read_bytes(&root_path, archive)?;
        let mut reader = NpzReader::new(Cursor::new(bytes))?;
        let mut contents: BTreeMap<String, VarsGroup> = BTreeMap::new();
        for raw_name in reader.names()? {
            let name = raw_name.strip_suffix(".npy").unwrap_or(&raw_name);
            let (group, var) = name.rsplit_once('/').unwrap_or((ROOT_KEY, name));
            let array: ArrayD<f32> = reader.by_name(&raw_name)?;
            contents
                .entry(group.to_string())
                .or_default()
                .insert(var, array);
        }
        tracing::debug!("打开 npz 权重 {root_path}（{} 个组）", contents.len());
        Ok(Self {
            root_path,
            mode: StoreMode::Read,
            archive: None,
            contents,
            closed: false,
        })
    }
}

impl WeightsStore for NpzIOStore {
    fn make(&mut self, path: &str) -> Result<&mut VarsGroup, SavingError> {
        if self.mode != StoreMode::Write {
            return Err(SavingError::ReadOnly(self.root_path.clone()));
        }
        let group = self.contents.entry(content_key(path).to_string()).or_default();
        *group = VarsGroup::default();
        Ok(group)
    }

    fn get(&mut self, path: &str) -> Result<VarsGroup, SavingError> {
        Ok(self
            .contents
            .get(content_key(path))
            .cloned()
            .unwrap_or_default())
    }

    fn close(&mut self) -> Result<(), SavingError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.mode == StoreMode::Write {
            let mut npz = NpzWriter::new(Cursor::new(Vec::new()));
            for (group, vars) in &self.contents {
                for (var, array) in vars.iter() {
                    npz.add_array(format!("{group}/{var}"), array)?;
                }
            }
            let bytes = npz.finish()?.into_inner();
            write_bytes(&self.root_path, self.archive.as_ref(), &bytes)?;
        }
        Ok(())
    }
}
