/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : GraphInner 核心操作：创建、登记操作、添加节点、符号调用
 */

use super::super::error::GraphError;
use super::super::node::{CallArguments, Node};
use super::super::symbolic::{SymbolicTensor, TensorSpec};
use super::super::types::{NodeId, NodeKey, OperationId, TensorHistory, TensorId};
use super::{GraphInner, OperationEntry};
use crate::nn::layer::layer_addr;
use crate::nn::LayerRef;
use crate::utils::naming::{to_snake_case, UniqueNamer};
use crate::utils::Nest;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

impl GraphInner {
    // ========== 创建 ==========

    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// 创建一个带固定种子的计算图（层的参数初始化可复现）
    pub fn new_with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            operations: Vec::new(),
            nodes: Vec::new(),
            op_by_addr: HashMap::new(),
            next_tensor_id: 0,
            layer_namer: UniqueNamer::new(),
            tensor_namer: UniqueNamer::new(),
            rng,
        }
    }

    // ========== 查询 ==========

    pub fn num_operations(&self) -> usize {
        self.operations.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn entry(&self, op: OperationId) -> Result<&OperationEntry, GraphError> {
        self.operations
            .get(op.0)
            .ok_or_else(|| GraphError::UnknownOperation(op.to_string()))
    }

    pub fn layer(&self, op: OperationId) -> Result<LayerRef, GraphError> {
        Ok(self.entry(op)?.layer.clone())
    }

    /// 操作名；层正被占用时以 ID 代替
    pub fn operation_name(&self, op: OperationId) -> String {
        self.operations
            .get(op.0)
            .and_then(|entry| entry.layer.try_borrow().ok().map(|l| l.name().to_string()))
            .unwrap_or_else(|| op.to_string())
    }

    /// 已登记的层对应的操作
    pub fn find_operation(&self, layer: &LayerRef) -> Option<OperationId> {
        self.op_by_addr.get(&layer_addr(layer)).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_by_key(&self, (op, node_index): NodeKey) -> Option<&Node> {
        let id = self.operations.get(op.0)?.inbound_nodes.get(node_index)?;
        self.nodes.get(id.0)
    }

    pub fn inbound_nodes(&self, op: OperationId) -> Result<&[NodeId], GraphError> {
        Ok(&self.entry(op)?.inbound_nodes)
    }

    pub fn outbound_nodes(&self, op: OperationId) -> Result<&[NodeId], GraphError> {
        Ok(&self.entry(op)?.outbound_nodes)
    }

    /// 节点是否为源节点；找不到节点时视为否
    pub fn is_source(&self, tensor: &SymbolicTensor) -> bool {
        tensor
            .node_key()
            .and_then(|key| self.node_by_key(key))
            .is_some_and(Node::is_input)
    }

    // ========== 构建 ==========

    pub(crate) fn unique_layer_name(&mut self, prefix: &str) -> String {
        self.layer_namer.next(prefix)
    }

    /// 新建一个（尚无来源的）符号张量
    pub(crate) fn new_symbolic(
        &mut self,
        spec: TensorSpec,
        name: Option<String>,
    ) -> SymbolicTensor {
        let id = TensorId(self.next_tensor_id);
        self.next_tensor_id += 1;
        let name = name.unwrap_or_else(|| self.tensor_namer.next("keras_tensor"));
        SymbolicTensor::new(id, spec, name)
    }

    /// 登记一个操作（同一个层实例重复登记时返回已有的操作）。
    /// 未命名的层按类名分配唯一名称；源操作（InputLayer）立即创建其源节点。
    pub fn register_layer(&mut self, layer: LayerRef) -> Result<OperationId, GraphError> {
        if let Some(op) = self.find_operation(&layer) {
            return Ok(op);
        }
        let (name, source_spec) = {
            let mut l = layer
                .try_borrow_mut()
                .map_err(|_| GraphError::LayerBusy("<未登记的层>".to_string()))?;
            if l.name().is_empty() {
                let prefix = to_snake_case(l.class_name());
                l.set_name(self.layer_namer.next(&prefix));
            }
            (l.name().to_string(), l.source_spec())
        };

        let op = OperationId(self.operations.len());
        self.op_by_addr.insert(layer_addr(&layer), op);
        self.operations.push(OperationEntry {
            layer,
            inbound_nodes: Vec::new(),
            outbound_nodes: Vec::new(),
        });

        if let Some(spec) = source_spec {
            let tensor = self.new_symbolic(spec, Some(name));
            self.add_node(op, CallArguments::new(), Nest::Leaf(tensor))?;
        }
        Ok(op)
    }

    /// 创建节点：追加到操作的入站节点列表（序号为已有节点数），
    /// 写入各输出张量的来源，并登记到所有上游操作的出站节点列表
    pub fn add_node(
        &mut self,
        op: OperationId,
        arguments: CallArguments<SymbolicTensor>,
        outputs: Nest<SymbolicTensor>,
    ) -> Result<NodeId, GraphError> {
        let node_index = self.entry(op)?.inbound_nodes.len();
        let id = NodeId(self.nodes.len());

        let mut tensor_index = 0;
        let outputs = outputs.map(&mut |t: &SymbolicTensor| {
            let mut t = t.clone();
            t.set_history(TensorHistory {
                operation: op,
                node_index,
                tensor_index,
            });
            tensor_index += 1;
            t
        });

        let mut parent_nodes: Vec<NodeKey> = Vec::new();
        let mut upstream_ops: Vec<OperationId> = Vec::new();
        for key in arguments.tensors().into_iter().filter_map(SymbolicTensor::node_key) {
            if !parent_nodes.contains(&key) {
                parent_nodes.push(key);
            }
            if !upstream_ops.contains(&key.0) {
                upstream_ops.push(key.0);
            }
        }
        let is_input = arguments.tensors().is_empty();

        for upstream in upstream_ops {
            if let Some(entry) = self.operations.get_mut(upstream.0) {
                entry.outbound_nodes.push(id);
            }
        }
        self.operations[op.0].inbound_nodes.push(id);
        self.nodes.push(Node {
            id,
            operation: op,
            node_index,
            arguments,
            outputs,
            is_input,
            parent_nodes,
        });
        Ok(id)
    }

    /// 张量须是本图中某个已有节点的输出
    fn check_tensor_source(&self, tensor: &SymbolicTensor) -> Result<(), GraphError> {
        let history = tensor.history().ok_or_else(|| {
            GraphError::InvalidInput(format!(
                "张量{}没有来源节点，只能使用 Input 或层调用得到的张量",
                tensor.name()
            ))
        })?;
        let missing = || GraphError::MissingInboundNode {
            operation: self.operation_name(history.operation),
            node_index: history.node_index,
        };
        let node = self.node_by_key(history.node_key()).ok_or_else(missing)?;
        match node.output_tensors().get(history.tensor_index) {
            Some(output) if output.id() == tensor.id() => Ok(()),
            _ => Err(missing()),
        }
    }

    /// 对符号张量调用操作：首次调用时构建层，推导输出规格，创建输出张量并记录节点
    pub fn call_operation(
        &mut self,
        op: OperationId,
        arguments: CallArguments<SymbolicTensor>,
    ) -> Result<Nest<SymbolicTensor>, GraphError> {
        let layer = self.layer(op)?;
        for tensor in arguments.tensors() {
            self.check_tensor_source(tensor)?;
        }
        let specs = arguments.map_tensors(&mut |t: &SymbolicTensor| t.spec().clone());

        let output_specs = {
            let mut l = layer
                .try_borrow_mut()
                .map_err(|_| GraphError::LayerBusy(op.to_string()))?;
            if !l.is_built() {
                l.build(&specs, &mut self.rng)?;
            }
            l.compute_output_spec(&specs)?
        };
        let outputs =
            output_specs.map(&mut |spec: &TensorSpec| self.new_symbolic(spec.clone(), None));
        let id = self.add_node(op, arguments, outputs)?;
        Ok(self.nodes[id.0].outputs.clone())
    }
}
