/*
 * @Author       : 老董
 * @Date         : 2026-02-14
 * @Description  : 模型存档的入口：`.keras` 整模型存取与 `.weights.h5` 仅权重存取
 *
 * `.keras` 归档的布局：
 * - `metadata.json`：保存时的版本号与时间
 * - `config.json`：模型的序列化配置
 * - `model.weights.h5`（或 `.npz`；分片时另有 `model.weights.json` 与 `model_N.weights.h5`）
 * - `assets/`：非数值资源
 */

use super::archive::{ArchiveReader, ArchiveWriter};
use super::error::SavingError;
use super::options::{LoadOptions, SaveOptions, WeightsFormat};
use super::serialization::{serialize_model, DeserializationContext};
use super::store::{
    DiskIOStore, H5IOStore, NpzIOStore, ShardedH5IOStore, WeightsStore, WeightsStoreKind,
    DEFAULT_SHARD_SIZE,
};
use super::trackable::{StateWalker, Trackable};
use crate::nn::layer::Layer;
use crate::nn::Functional;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CONFIG_FILENAME: &str = "config.json";
pub const METADATA_FILENAME: &str = "metadata.json";
pub const VARS_FILENAME: &str = "model.weights";
pub const ASSETS_DIRNAME: &str = "assets";

/// 写入`metadata.json`的版本号
pub const KERAS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `metadata.json`的内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub keras_version: String,
    pub date_saved: String,
}

impl Metadata {
    fn now() -> Self {
        Self {
            keras_version: KERAS_VERSION.to_string(),
            date_saved: format_utc_timestamp(SystemTime::now()),
        }
    }
}

// ========== 时间戳 ==========

/// 按`%Y-%m-%d@%H:%M:%S`（UTC）格式化时间
pub fn format_utc_timestamp(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{year:04}-{month:02}-{day:02}@{:02}:{:02}:{:02}",
        rem / 3600,
        rem % 3600 / 60,
        rem % 60
    )
}

/// 1970-01-01 起的天数 -> (年, 月, 日)，公历
const fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

// ========== 校验 ==========

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn require_extension(path: &Path, expected: &str) -> Result<String, SavingError> {
    let path = path_string(path);
    if path.ends_with(expected) {
        Ok(path)
    } else {
        Err(SavingError::InvalidExtension {
            path,
            expected: expected.to_string(),
        })
    }
}

// ========== 整模型 ==========

/// 把模型（配置 + 权重 + 资源）保存为`.keras`归档
pub fn save_model(
    model: &Functional,
    path: impl AsRef<Path>,
    options: &SaveOptions,
) -> Result<(), SavingError> {
    let path_str = require_extension(path.as_ref(), ".keras")?;
    if options.sharded && options.weights_format != WeightsFormat::H5 {
        return Err(SavingError::ShardingUnsupported(options.weights_format));
    }
    if !model.is_built() {
        tracing::warn!("模型“{}”尚未构建，保存的存档可能无法完整加载", model.name());
    }

    let metadata = serde_json::to_vec(&Metadata::now())?;
    let config = serde_json::to_vec(&serialize_model(model)?)?;

    let archive = ArchiveWriter::create(&path_str)?;
    archive.write_entry(METADATA_FILENAME, &metadata)?;
    archive.write_entry(CONFIG_FILENAME, &config)?;

    let weights_path = format!("{VARS_FILENAME}.{}", options.weights_format.extension());
    let mut weights_store: WeightsStoreKind = match (options.weights_format, options.sharded) {
        (WeightsFormat::H5, true) => {
            let shard_size = options.shard_size.as_deref().unwrap_or(DEFAULT_SHARD_SIZE);
            ShardedH5IOStore::create(weights_path, shard_size, Some(archive.clone()))?.into()
        }
        (WeightsFormat::H5, false) => H5IOStore::create(weights_path, Some(archive.clone())).into(),
        (WeightsFormat::Npz, _) => NpzIOStore::create(weights_path, Some(archive.clone())).into(),
    };
    let mut assets_store = DiskIOStore::create(ASSETS_DIRNAME, Some(archive.clone()))?;

    let visited = {
        let mut walker = StateWalker::new(Some(&mut weights_store), Some(&mut assets_store));
        walker.save(model, "")?;
        walker.visited_count()
    };
    weights_store.close()?;
    assets_store.close()?;
    archive.finish()?;

    tracing::info!("模型“{}”已保存到 {path_str}（共 {visited} 个对象）", model.name());
    Ok(())
}

/// 从`.keras`归档加载模型
pub fn load_model(
    path: impl AsRef<Path>,
    options: &LoadOptions,
) -> Result<Functional, SavingError> {
    let path_str = require_extension(path.as_ref(), ".keras")?;
    let archive = ArchiveReader::open(&path_str)?;

    let config: serde_json::Value = serde_json::from_slice(&archive.read_entry(CONFIG_FILENAME)?)?;
    if archive.contains(METADATA_FILENAME) {
        let metadata: Metadata = serde_json::from_slice(&archive.read_entry(METADATA_FILENAME)?)?;
        tracing::debug!(
            "存档由版本 {} 于 {} 保存",
            metadata.keras_version,
            metadata.date_saved
        );
    }

    let mut ctx = DeserializationContext::new(&options.registry, options.safe_mode);
    let mut model = ctx.deserialize_model(&config)?;
    if !options.compile {
        tracing::debug!("加载时不编译模型");
    }

    let mut weights_store = open_archived_weights(&archive)?;
    let all_names = archive.names();
    // 除元数据、配置、权重外还有其他条目时才有资源
    let mut assets_store = if all_names.len() > 3 {
        Some(DiskIOStore::open(ASSETS_DIRNAME, Some(&archive))?)
    } else {
        None
    };

    {
        let mut walker = StateWalker::new(Some(&mut weights_store), assets_store.as_mut());
        walker.load(&mut model, "")?;
    }
    weights_store.close()?;
    if let Some(store) = assets_store.as_mut() {
        store.close()?;
    }

    tracing::info!("已从 {path_str} 加载模型“{}”", model.name());
    Ok(model)
}

/// 按归档中实际存在的权重文件选择存储
fn open_archived_weights(archive: &ArchiveReader) -> Result<WeightsStoreKind, SavingError> {
    let h5_path = format!("{VARS_FILENAME}.h5");
    let npz_path = format!("{VARS_FILENAME}.npz");
    let map_path = format!("{VARS_FILENAME}.json");
    if archive.contains(&map_path) {
        Ok(ShardedH5IOStore::open(h5_path, Some(archive.clone()))?.into())
    } else if archive.contains(&h5_path) {
        Ok(H5IOStore::open(h5_path, Some(archive))?.into())
    } else if archive.contains(&npz_path) {
        Ok(NpzIOStore::open(npz_path, Some(archive))?.into())
    } else {
        Err(SavingError::MissingWeights(VARS_FILENAME.to_string()))
    }
}

// ========== 仅权重 ==========

/// 仅保存权重到`.weights.h5`文件；分片时另写出`.weights.json`映射
pub fn save_weights_only<T: Trackable + ?Sized>(
    trackable: &T,
    path: impl AsRef<Path>,
    sharded: bool,
    shard_size: Option<&str>,
) -> Result<(), SavingError> {
    let path_str = require_extension(path.as_ref(), ".weights.h5")?;
    let mut weights_store: WeightsStoreKind = if sharded {
        ShardedH5IOStore::create(
            path_str.clone(),
            shard_size.unwrap_or(DEFAULT_SHARD_SIZE),
            None,
        )?
        .into()
    } else {
        H5IOStore::create(path_str.clone(), None).into()
    };
    StateWalker::new(Some(&mut weights_store), None).save(trackable, "")?;
    weights_store.close()?;
    tracing::info!("权重已保存到 {path_str}");
    Ok(())
}

/// 从`.weights.h5`文件或`.keras`归档加载权重
pub fn load_weights_only<T: Trackable + ?Sized>(
    trackable: &mut T,
    path: impl AsRef<Path>,
    sharded: bool,
    skip_mismatch: bool,
) -> Result<(), SavingError> {
    let path_str = path_string(path.as_ref());
    let mut weights_store: WeightsStoreKind = if path_str.ends_with(".weights.h5") {
        if sharded {
            ShardedH5IOStore::open(path_str.clone(), None)?.into()
        } else {
            H5IOStore::open(path_str.clone(), None)?.into()
        }
    } else if path_str.ends_with(".keras") {
        let archive = ArchiveReader::open(&path_str)?;
        open_archived_weights(&archive)?
    } else {
        return Err(SavingError::InvalidExtension {
            path: path_str,
            expected: ".weights.h5 或 .keras".to_string(),
        });
    };

    StateWalker::new(Some(&mut weights_store), None)
        .with_skip_mismatch(skip_mismatch)
        .load(trackable, "")?;
    weights_store.close()?;
    tracing::info!("已从 {path_str} 加载权重");
    Ok(())
}
