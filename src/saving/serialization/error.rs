/*
 * @Author       : 老董
 * @Date         : 2026-02-13
 * @Description  : 配置（反）序列化的错误类型
 */

use crate::nn::layer::LayerError;
use crate::nn::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("未知的类“{0}”，自定义层需先在注册表中注册")]
    UnknownClass(String),
    #[error("配置引用了未知的层“{0}”")]
    UnknownLayer(String),
    #[error("无效的配置：{0}")]
    InvalidConfig(String),
    #[error("无法重建模型：以下层的调用所需的输入始终无法得到，配置中可能存在环：{pending:?}")]
    CyclicDependency { pending: Vec<String> },
    #[error("类“{0}”在安全模式下不允许反序列化，如确认来源可信，请在加载时关闭 safe_mode")]
    UnsafeClass(String),
    #[error("层“{0}”正被占用，无法借用")]
    LayerBusy(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Layer(#[from] LayerError),
}

impl SerializationError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
