/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : Graph 句柄（用户级 API）
 */

use super::error::GraphError;
use super::inner::GraphInner;
use super::node::{CallArguments, Node};
use super::symbolic::{SymbolicTensor, TensorSpec};
use super::types::{NodeId, OperationId};
use crate::nn::layer::{layer_ref, InputLayer, Layer};
use crate::nn::LayerRef;
use crate::utils::Nest;
use std::cell::RefCell;
use std::rc::Rc;

/// Graph - 计算图句柄
///
/// # 设计原则
/// - 是 `Rc<RefCell<GraphInner>>` 的薄封装
/// - Clone 语义：多个 Graph 引用同一个 GraphInner
/// - 层登记到图后得到 `LayerHandle`，对符号张量调用它即在图中记录一个节点
#[derive(Clone)]
pub struct Graph {
    inner: Rc<RefCell<GraphInner>>,
}

impl Graph {
    // ==================== 创建 ====================

    /// 创建新图
    pub fn new() -> Self {
        Self::from_inner(GraphInner::new())
    }

    /// 创建带种子的图（层的参数初始化可复现）
    pub fn new_with_seed(seed: u64) -> Self {
        Self::from_inner(GraphInner::new_with_seed(seed))
    }

    pub fn from_inner(inner: GraphInner) -> Self {
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    /// 获取内部 GraphInner 的不可变引用
    pub fn inner(&self) -> std::cell::Ref<'_, GraphInner> {
        self.inner.borrow()
    }

    /// 获取内部 GraphInner 的可变引用
    pub fn inner_mut(&self) -> std::cell::RefMut<'_, GraphInner> {
        self.inner.borrow_mut()
    }

    /// 两个句柄是否指向同一张图
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ==================== 登记层 ====================

    pub fn add_layer<L: Layer + 'static>(&self, layer: L) -> Result<LayerHandle, GraphError> {
        self.add_layer_ref(layer_ref(layer))
    }

    /// 登记一个（可能已被共享的）层；重复登记同一实例返回同一个操作
    pub fn add_layer_ref(&self, layer: LayerRef) -> Result<LayerHandle, GraphError> {
        let op = self.inner.borrow_mut().register_layer(layer.clone())?;
        Ok(LayerHandle {
            graph: self.clone(),
            op,
            layer,
        })
    }

    /// 已登记的操作对应的句柄
    pub fn handle(&self, op: OperationId) -> Result<LayerHandle, GraphError> {
        let layer = self.inner.borrow().layer(op)?;
        Ok(LayerHandle {
            graph: self.clone(),
            op,
            layer,
        })
    }

    // ==================== 创建输入 ====================

    /// 模型输入（keras 中的 `Input(shape)`），`shape`不含批维
    pub fn input(&self, shape: &[usize], name: Option<&str>) -> Result<SymbolicTensor, GraphError> {
        self.input_with(TensorSpec::with_batch(shape), name)
    }

    /// 以完整规格（含批维、dtype、是否稀疏）创建模型输入
    pub fn input_with(
        &self,
        spec: TensorSpec,
        name: Option<&str>,
    ) -> Result<SymbolicTensor, GraphError> {
        let mut layer = InputLayer::from_spec(spec);
        if let Some(name) = name {
            layer = layer.with_name(name);
        }
        let handle = self.add_layer(layer)?;
        let g = self.inner.borrow();
        g.node_by_key((handle.op, 0))
            .and_then(|node| node.output_tensors().first().map(|t| (*t).clone()))
            .ok_or_else(|| GraphError::MissingInboundNode {
                operation: g.operation_name(handle.op),
                node_index: 0,
            })
    }

    // ==================== 节点 ====================

    pub fn call_operation(
        &self,
        op: OperationId,
        arguments: CallArguments<SymbolicTensor>,
    ) -> Result<Nest<SymbolicTensor>, GraphError> {
        self.inner.borrow_mut().call_operation(op, arguments)
    }

    pub fn add_node(
        &self,
        op: OperationId,
        arguments: CallArguments<SymbolicTensor>,
        outputs: Nest<SymbolicTensor>,
    ) -> Result<NodeId, GraphError> {
        self.inner.borrow_mut().add_node(op, arguments, outputs)
    }

    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.inner.borrow().node(id).cloned()
    }

    pub fn layer(&self, op: OperationId) -> Result<LayerRef, GraphError> {
        self.inner.borrow().layer(op)
    }

    pub fn clone_graph_nodes(
        &self,
        inputs: &Nest<SymbolicTensor>,
        outputs: &Nest<SymbolicTensor>,
    ) -> Result<(Nest<SymbolicTensor>, Nest<SymbolicTensor>), GraphError> {
        self.inner.borrow_mut().clone_graph_nodes(inputs, outputs)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// 已登记到图中的层
#[derive(Clone)]
pub struct LayerHandle {
    graph: Graph,
    op: OperationId,
    layer: LayerRef,
}

impl LayerHandle {
    pub const fn id(&self) -> OperationId {
        self.op
    }

    pub const fn layer(&self) -> &LayerRef {
        &self.layer
    }

    pub fn name(&self) -> String {
        self.graph.inner().operation_name(self.op)
    }

    /// 以任意参数调用层
    pub fn call(
        &self,
        arguments: CallArguments<SymbolicTensor>,
    ) -> Result<Nest<SymbolicTensor>, GraphError> {
        self.graph.call_operation(self.op, arguments)
    }

    /// 以单个张量调用层，并要求输出也是单个张量
    pub fn call_single(&self, x: &SymbolicTensor) -> Result<SymbolicTensor, GraphError> {
        Self::expect_single(self.call(CallArguments::single(x.clone()))?)
    }

    /// 以张量列表调用层（如 Add、Concatenate），并要求输出是单个张量
    pub fn call_list(&self, xs: &[&SymbolicTensor]) -> Result<SymbolicTensor, GraphError> {
        Self::expect_single(self.call(CallArguments::list(xs.iter().map(|x| (*x).clone())))?)
    }

    fn expect_single(outputs: Nest<SymbolicTensor>) -> Result<SymbolicTensor, GraphError> {
        match outputs.unpack_singleton() {
            Nest::Leaf(t) => Ok(t),
            other => Err(GraphError::InvalidInput(format!(
                "层的输出不是单个张量，而是{}个张量",
                other.leaf_count()
            ))),
        }
    }
}
