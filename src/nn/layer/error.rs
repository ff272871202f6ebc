/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 层的错误类型
 */

use crate::errors::TensorError;
use crate::nn::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayerError {
    #[error("层“{layer}”的输入无效：{message}")]
    InvalidInput { layer: String, message: String },
    #[error("层“{layer}”的配置无效：{message}")]
    InvalidConfig { layer: String, message: String },
    #[error("层“{0}”尚未构建")]
    NotBuilt(String),
    #[error("嵌套模型“{layer}”执行失败：{source}")]
    Nested {
        layer: String,
        #[source]
        source: Box<GraphError>,
    },
    #[error(transparent)]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl LayerError {
    pub fn invalid_input(layer: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            layer: layer.to_string(),
            message: message.into(),
        }
    }

    pub fn nested(layer: &str, source: GraphError) -> Self {
        Self::Nested {
            layer: layer.to_string(),
            source: Box::new(source),
        }
    }

    pub fn invalid_config(layer: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            layer: layer.to_string(),
            message: message.into(),
        }
    }
}
