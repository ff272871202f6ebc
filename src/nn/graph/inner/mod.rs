/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : GraphInner 计算图的底层实现
 *
 * 各 impl 块分散在子模块中：
 * - core.rs: 创建、登记操作、添加节点、符号调用
 * - traversal.rs: 从输出反向遍历（build_map）
 * - clone.rs: 以中间张量为输入时克隆子图
 */

mod clone;
mod core;
mod traversal;

use super::node::Node;
use super::types::{NodeId, OperationId};
use crate::nn::LayerRef;
use crate::utils::naming::UniqueNamer;
use rand::rngs::StdRng;
use std::collections::HashMap;

/// 操作表中的一项
pub(crate) struct OperationEntry {
    pub(crate) layer: LayerRef,
    /// 该操作被调用产生的节点（序号即节点序号）
    pub(crate) inbound_nodes: Vec<NodeId>,
    /// 以该操作的输出为输入的节点
    pub(crate) outbound_nodes: Vec<NodeId>,
}

/// 图的完整定义（核心实现）
///
/// 操作、节点、符号张量都以整数 ID 存放，彼此只通过 ID 引用。
/// 用户通常通过 `Graph` 句柄使用此结构。
pub struct GraphInner {
    /// 操作表：下标即 `OperationId`
    pub(in crate::nn::graph) operations: Vec<OperationEntry>,
    /// 节点表：下标即 `NodeId`
    pub(in crate::nn::graph) nodes: Vec<Node>,
    /// 层实例地址 -> 操作，保证同一个层只登记一次
    pub(in crate::nn::graph) op_by_addr: HashMap<usize, OperationId>,
    pub(in crate::nn::graph) next_tensor_id: usize,
    pub(in crate::nn::graph) layer_namer: UniqueNamer,
    pub(in crate::nn::graph) tensor_namer: UniqueNamer,
    /// 图级别的随机数生成器（用于层的参数初始化）
    pub(in crate::nn::graph) rng: StdRng,
}

impl Default for GraphInner {
    fn default() -> Self {
        Self::new()
    }
}
