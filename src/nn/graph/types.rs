/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : Graph 模块的 ID 与历史记录类型
 *
 * 图中的操作、节点、符号张量都以整数 ID 存于 arena 中，
 * 张量通过 `TensorHistory` 反向指向产生它的节点，而不是持有节点的引用。
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// 操作（层）在图中的 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub usize);

/// 节点（一次层调用）在图中的 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// 符号张量的 ID（图内唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorId(pub usize);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// 节点键：`(操作, 该操作的第几个入站节点)`
pub type NodeKey = (OperationId, usize);

/// 张量的来源：`(产生它的操作, 节点序号, 输出序号)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorHistory {
    pub operation: OperationId,
    pub node_index: usize,
    pub tensor_index: usize,
}

impl TensorHistory {
    pub const fn node_key(&self) -> NodeKey {
        (self.operation, self.node_index)
    }
}
