/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 模型保存/加载的错误类型
 */

use super::options::WeightsFormat;
use super::serialization::SerializationError;
use crate::nn::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SavingError {
    // ========== 参数校验（读写开始前即失败） ==========
    #[error("无效的文件路径{path}：期望扩展名为{expected}")]
    InvalidExtension { path: String, expected: String },
    #[error("未知的权重格式：{0}（应为 h5 或 npz）")]
    UnknownWeightsFormat(String),
    #[error("目前只有 h5 权重格式支持分片，得到的格式为{0}")]
    ShardingUnsupported(WeightsFormat),
    #[error("无效的大小格式：{0}（应为整数加单位 GB、MB 或 KB，如 5GB、15MB）")]
    InvalidSize(String),

    // ========== 存储 ==========
    #[error("读取分片的权重文件需要对应的分片映射文件{0}，请确保权重文件与映射文件位于同一目录")]
    ShardMapMissing(String),
    #[error("权重存储中的组{0}已存在")]
    GroupExists(String),
    #[error("归档中缺少权重文件（{0}.h5 或 {0}.npz）")]
    MissingWeights(String),
    #[error("归档中缺少条目：{0}")]
    MissingEntry(String),
    #[error("{0}不是有效的权重文件")]
    BadMagic(String),
    #[error("权重文件版本{found}不受支持（当前版本{expected}）")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("存储以只读方式打开，不能写入：{0}")]
    ReadOnly(String),

    // ========== 对象状态 ==========
    #[error("层“{layer}”期望{expected}个变量，但加载时得到{received}个变量。期望的变量：{names:?}")]
    VariableCountMismatch {
        layer: String,
        expected: usize,
        received: usize,
        names: Vec<String>,
    },
    #[error("层“{layer}”的变量{variable}形状不匹配：期望{expected:?}，实际为{got:?}")]
    VariableShapeMismatch {
        layer: String,
        variable: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("对象“{0}”正被占用，无法借用")]
    Busy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
    #[error(transparent)]
    NpzWrite(#[from] ndarray_npy::WriteNpzError),
    #[error(transparent)]
    NpzRead(#[from] ndarray_npy::ReadNpzError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}
