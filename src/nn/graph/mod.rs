/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : Graph 模块：记录层调用的有向无环图
 *
 * 公开 API：
 * - `Graph`: 用户级句柄
 * - `GraphInner`: 底层实现（操作表、节点表）
 * - `SymbolicTensor` / `TensorSpec`: 图构建阶段的占位张量
 * - `Node` / `CallArguments`: 一次层调用的记录
 * - `GraphError`: 错误类型
 */

mod error;
mod handle;
mod inner;
mod node;
mod symbolic;
mod types;

pub use error::GraphError;
pub use handle::{Graph, LayerHandle};
pub use inner::GraphInner;
pub use node::{ArgValue, CallArguments, Node};
pub use symbolic::{SymbolicTensor, TensorSpec};
pub use types::{NodeId, NodeKey, OperationId, TensorHistory, TensorId};
