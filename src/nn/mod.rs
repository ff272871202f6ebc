/*
 * @Author       : 老董
 * @Date         : 2024-01-31 20:23:53
 * @LastEditors  : 老董
 * @LastEditTime : 2026-02-14 10:12:40
 * @Description  : 负责函数式模型（functional model）的构建与执行
 */

mod function;
mod functional;
mod graph;
pub mod layer;

pub use function::Function;
pub use functional::{functional_from_config, Functional, FunctionalOptions, InputSpec};
pub use graph::{
    ArgValue, CallArguments, Graph, GraphError, GraphInner, LayerHandle, Node, NodeId, NodeKey,
    OperationId, SymbolicTensor, TensorHistory, TensorId, TensorSpec,
};
pub use layer::{layer_ref, Layer, LayerRef};

#[cfg(test)]
mod tests;
