/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : 张量的数据类型标签（与 keras 配置中的 dtype 字符串一一对应）
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 张量数据类型
///
/// 数值统一以 `f32` 存储，`DType` 只决定转换（cast）时的取值规则，
/// 以及配置文件里写出的 dtype 字符串。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    #[default]
    Float32,
    Float64,
    Int32,
    Bool,
}

impl DType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Bool => "bool",
        }
    }

    /// 单个元素占用的字节数（分片存储计算大小时使用）
    pub const fn size_in_bytes(&self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float64 => 8,
            Self::Bool => 1,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float32" => Ok(Self::Float32),
            "float64" => Ok(Self::Float64),
            "int32" => Ok(Self::Int32),
            "bool" => Ok(Self::Bool),
            other => Err(format!("未知的 dtype：{other}")),
        }
    }
}
