/*
 * @Author       : 老董
 * @Date         : 2026-01-27
 * @Description  : Graph 模块的错误类型
 */

use crate::errors::TensorError;
use crate::nn::layer::LayerError;
use thiserror::Error;

/// 图构建与执行错误
#[derive(Error, Debug)]
pub enum GraphError {
    #[error(
        "图不连通：无法获得张量{tensor}的值（操作“{operation}”的输入）。\
         已能访问的张量：{computable:?}"
    )]
    Disconnected {
        tensor: String,
        operation: String,
        computable: Vec<String>,
    },
    #[error("张量{tensor}（来自操作“{operation}”）处于环中")]
    Cycle { tensor: String, operation: String },
    #[error("名称“{name}”在模型中被使用了{count}次，所有操作的名称都必须唯一")]
    DuplicateName { name: String, count: usize },
    #[error("操作“{operation}”没有第{node_index}个入站节点")]
    MissingInboundNode { operation: String, node_index: usize },
    #[error("无效的输入：{0}")]
    InvalidInput(String),
    #[error("输入“{input}”的形状不兼容：期望{expected:?}，实际为{got:?}")]
    ShapeMismatch {
        input: String,
        expected: Vec<Option<usize>>,
        got: Vec<usize>,
    },
    #[error(
        "输出层{layer}只有单个单元的输出，但其激活函数为 softmax，输出将恒为1.0。\
         若确认无误，可在构建模型时设置 `validate_output_activation = false` 关闭此检查"
    )]
    SoftmaxOnSingleUnit { layer: String },
    #[error("图中不存在操作{0}")]
    UnknownOperation(String),
    #[error("层“{0}”正被占用，无法借用")]
    LayerBusy(String),
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
