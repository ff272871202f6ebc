/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 保存/加载的选项
 */

use super::error::SavingError;
use super::serialization::LayerRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 权重文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightsFormat {
    #[default]
    H5,
    Npz,
}

impl WeightsFormat {
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::H5 => "h5",
            Self::Npz => "npz",
        }
    }
}

impl fmt::Display for WeightsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for WeightsFormat {
    type Err = SavingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h5" => Ok(Self::H5),
            "npz" => Ok(Self::Npz),
            _ => Err(SavingError::UnknownWeightsFormat(s.to_string())),
        }
    }
}

/// `save_model`的选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    pub weights_format: WeightsFormat,
    /// 是否把权重切分为多个文件（仅 h5 支持）
    pub sharded: bool,
    /// 单个分片的大小上限，如`"10GB"`；缺省为`DEFAULT_SHARD_SIZE`
    pub shard_size: Option<String>,
}

/// `load_model`的选项
pub struct LoadOptions {
    /// 自定义层的注册表（已包含内置层）
    pub registry: LayerRegistry,
    /// 安全模式下拒绝反序列化可执行任意代码的类（如 Lambda）
    pub safe_mode: bool,
    /// 是否编译模型；本库不含优化器与损失，仅保留此开关以兼容配置
    pub compile: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            registry: LayerRegistry::default(),
            safe_mode: true,
            compile: true,
        }
    }
}

/// 把`"10GB"`、`"15MB"`、`"500KB"`之类的字符串解析为字节数（十进制单位）
pub fn parse_size(size: &str) -> Result<u64, SavingError> {
    let trimmed = size.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (number, factor) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1_000_000_000u64)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1_000_000)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1_000)
    } else {
        return Err(SavingError::InvalidSize(size.to_string()));
    };
    number
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(factor))
        .ok_or_else(|| SavingError::InvalidSize(size.to_string()))
}
