/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : Function：输入到输出之间的子图，及其按深度执行的解释器
 *
 * 构建时从输出反向遍历得到子图中的节点（`build_map`），再为每个节点分配深度：
 * 输出所在的节点深度为0，上游节点的深度至少比下游大1。执行时按深度从大到小进行。
 *
 * Function 在构建时对所用节点和层做快照，之后的执行与图的后续修改无关，
 * 也不需要再借用图。
 */

use crate::nn::graph::{
    CallArguments, Graph, GraphError, GraphInner, Node, NodeKey, OperationId, SymbolicTensor,
    TensorId, TensorSpec,
};
use crate::nn::LayerRef;
use crate::tensor::Tensor;
use crate::utils::Nest;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// 记录节点深度；首次出现的节点按出现先后追加到`order`
fn set_node_depth(
    key: NodeKey,
    depth: usize,
    order: &mut Vec<NodeKey>,
    depths: &mut HashMap<NodeKey, usize>,
) {
    if depths.insert(key, depth).is_none() {
        order.push(key);
    }
}

pub struct Function {
    inputs_struct: Nest<SymbolicTensor>,
    outputs_struct: Nest<SymbolicTensor>,
    inputs: Vec<SymbolicTensor>,
    outputs: Vec<SymbolicTensor>,
    /// 子图中的节点
    nodes: HashMap<NodeKey, Node>,
    /// 深度 -> 该深度的节点（按分配深度的先后）
    nodes_by_depth: BTreeMap<usize, Vec<NodeKey>>,
    /// 按深度从大到小、同深度按遍历先后排列的操作
    operations: Vec<OperationId>,
    layers: HashMap<OperationId, LayerRef>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |xs: &[SymbolicTensor]| {
            xs.iter().map(|x| x.name().to_string()).collect::<Vec<_>>()
        };
        f.debug_struct("Function")
            .field("inputs", &names(&self.inputs))
            .field("outputs", &names(&self.outputs))
            .field("operations", &self.operations)
            .finish()
    }
}

impl Function {
    pub fn new(
        graph: &Graph,
        inputs: Nest<SymbolicTensor>,
        outputs: Nest<SymbolicTensor>,
    ) -> Result<Self, GraphError> {
        let g = graph.inner();
        Self::from_inner(&g, inputs, outputs)
    }

    pub(crate) fn from_inner(
        g: &GraphInner,
        inputs_struct: Nest<SymbolicTensor>,
        outputs_struct: Nest<SymbolicTensor>,
    ) -> Result<Self, GraphError> {
        let inputs = inputs_struct.flatten().into_iter().cloned().collect::<Vec<_>>();
        let outputs = outputs_struct.flatten().into_iter().cloned().collect::<Vec<_>>();
        for x in inputs.iter().chain(&outputs) {
            if x.history().is_none() {
                return Err(GraphError::InvalidInput(format!(
                    "张量{}没有来源节点，只能使用 Input 或层调用得到的张量",
                    x.name()
                )));
            }
        }

        let map = g.build_map(&inputs, &outputs)?;
        let mut operation_indices: HashMap<OperationId, isize> = map
            .operation_indices
            .iter()
            .map(|(&op, &i)| (op, i as isize))
            .collect();
        let mut network_nodes: HashSet<NodeKey> =
            map.nodes_in_decreasing_depth.iter().copied().collect();

        // ========== 分配深度 ==========
        let mut node_order: Vec<NodeKey> = Vec::new();
        let mut nodes_depths: HashMap<NodeKey, usize> = HashMap::new();
        let mut operations_depths: HashMap<OperationId, usize> = HashMap::new();
        let mut operation_order: Vec<OperationId> = Vec::new();

        for &key in map.nodes_in_decreasing_depth.iter().rev() {
            let node = g.node_by_key(key).ok_or_else(|| GraphError::MissingInboundNode {
                operation: g.operation_name(key.0),
                node_index: key.1,
            })?;
            let node_depth = nodes_depths.get(&key).copied().unwrap_or(0);
            let previous_depth = operations_depths.get(&key.0).copied().unwrap_or(0);
            let depth = node_depth.max(previous_depth);
            if operations_depths.insert(key.0, depth).is_none() {
                operation_order.push(key.0);
            }
            set_node_depth(key, depth, &mut node_order, &mut nodes_depths);

            for &parent in node.parent_nodes() {
                let previous = nodes_depths.get(&parent).copied().unwrap_or(0);
                set_node_depth(
                    parent,
                    (depth + 1).max(previous),
                    &mut node_order,
                    &mut nodes_depths,
                );
            }
        }

        // 未被遍历到的输入操作：深度为0，排在同深度的其他操作之前
        for x in &inputs {
            let Some(history) = x.history() else {
                continue;
            };
            if operations_depths.contains_key(&history.operation) {
                continue;
            }
            operations_depths.insert(history.operation, 0);
            operation_order.push(history.operation);
            operation_indices.insert(history.operation, -1);
            set_node_depth((history.operation, 0), 0, &mut node_order, &mut nodes_depths);
            network_nodes.insert((history.operation, 0));
        }

        let mut nodes_by_depth: BTreeMap<usize, Vec<NodeKey>> = BTreeMap::new();
        for key in &node_order {
            nodes_by_depth.entry(nodes_depths[key]).or_default().push(*key);
        }

        let mut operations_by_depth: BTreeMap<usize, Vec<OperationId>> = BTreeMap::new();
        for op in &operation_order {
            operations_by_depth.entry(operations_depths[op]).or_default().push(*op);
        }
        let mut operations = Vec::with_capacity(operation_order.len());
        for ops in operations_by_depth.values_mut().rev() {
            ops.sort_by_key(|op| operation_indices.get(op).copied().unwrap_or(isize::MAX));
            operations.extend(ops.iter().copied());
        }

        // ========== 连通性检查 ==========
        let mut computable: HashSet<TensorId> = inputs.iter().map(SymbolicTensor::id).collect();
        let mut computable_names: Vec<String> =
            inputs.iter().map(|x| x.name().to_string()).collect();
        for keys in nodes_by_depth.values().rev() {
            for key in keys {
                let Some(node) = g.node_by_key(*key) else {
                    continue;
                };
                // 源节点的输出只有作为模型输入时才可得
                if node.is_input() {
                    continue;
                }
                for x in node.input_tensors() {
                    if !computable.contains(&x.id()) {
                        return Err(GraphError::Disconnected {
                            tensor: x.name().to_string(),
                            operation: g.operation_name(key.0),
                            computable: computable_names,
                        });
                    }
                }
                for x in node.output_tensors() {
                    if computable.insert(x.id()) {
                        computable_names.push(x.name().to_string());
                    }
                }
            }
        }

        // ========== 名称唯一性检查 ==========
        let names = operations.iter().map(|&op| g.operation_name(op)).collect::<Vec<_>>();
        for name in &names {
            let count = names.iter().filter(|n| *n == name).count();
            if count != 1 {
                return Err(GraphError::DuplicateName {
                    name: name.clone(),
                    count,
                });
            }
        }

        let mut nodes = HashMap::with_capacity(network_nodes.len());
        for key in &network_nodes {
            if let Some(node) = g.node_by_key(*key) {
                nodes.insert(*key, node.clone());
            }
        }
        let layers = operations
            .iter()
            .map(|&op| Ok((op, g.layer(op)?)))
            .collect::<Result<HashMap<_, _>, GraphError>>()?;

        Ok(Self {
            inputs_struct,
            outputs_struct,
            inputs,
            outputs,
            nodes,
            nodes_by_depth,
            operations,
            layers,
        })
    }

    // ========== 查询 ==========

    pub fn inputs(&self) -> &[SymbolicTensor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SymbolicTensor] {
        &self.outputs
    }

    pub const fn inputs_struct(&self) -> &Nest<SymbolicTensor> {
        &self.inputs_struct
    }

    pub const fn outputs_struct(&self) -> &Nest<SymbolicTensor> {
        &self.outputs_struct
    }

    pub fn operations(&self) -> &[OperationId] {
        &self.operations
    }

    pub fn layer(&self, op: OperationId) -> Option<&LayerRef> {
        self.layers.get(&op)
    }

    /// 按执行顺序排列的层
    pub fn layers(&self) -> Vec<LayerRef> {
        self.operations
            .iter()
            .filter_map(|op| self.layers.get(op).cloned())
            .collect()
    }

    pub const fn nodes_by_depth(&self) -> &BTreeMap<usize, Vec<NodeKey>> {
        &self.nodes_by_depth
    }

    pub fn contains_node(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    /// 操作在子图中的节点，按原节点序号排列
    pub fn operation_nodes(&self, op: OperationId) -> Vec<&Node> {
        let mut nodes = self
            .nodes
            .iter()
            .filter(|(key, _)| key.0 == op)
            .map(|(_, node)| node)
            .collect::<Vec<_>>();
        nodes.sort_by_key(|node| node.key().1);
        nodes
    }

    /// 只计子图中的节点时，节点的新序号
    pub fn reindexed_node_index(&self, key: NodeKey) -> Option<usize> {
        self.contains_node(key).then(|| {
            self.nodes
                .keys()
                .filter(|other| other.0 == key.0 && other.1 < key.1)
                .count()
        })
    }

    // ========== 执行 ==========

    /// 对真实张量执行。`training`只传给声明了该参数的层；
    /// 支持掩码的层若输出没有掩码，则沿用第一个输入的掩码
    pub fn call(
        &self,
        inputs: Vec<Tensor>,
        training: Option<bool>,
    ) -> Result<Nest<Tensor>, GraphError> {
        self.run_through_graph(inputs, &mut |layer: &LayerRef, args: &CallArguments<Tensor>| {
            let layer = layer
                .try_borrow()
                .map_err(|_| GraphError::LayerBusy("<执行中的层>".to_string()))?;
            let training = if layer.call_has_training_arg() { training } else { None };
            let mut outputs = layer.call(args, training)?;
            if layer.supports_masking() {
                let input_mask = args.tensors().first().and_then(|t| t.mask()).cloned();
                if let (Some(mask), Nest::Leaf(output)) = (input_mask, &mut outputs) {
                    if output.mask().is_none() {
                        output.set_mask(Some(mask));
                    }
                }
            }
            Ok(outputs)
        })
    }

    /// 对规格符号执行，推导输出规格
    pub fn compute_output_spec(
        &self,
        inputs: Vec<TensorSpec>,
    ) -> Result<Nest<TensorSpec>, GraphError> {
        self.run_through_graph(inputs, &mut |layer: &LayerRef, args: &CallArguments<TensorSpec>| {
            let layer = layer
                .try_borrow()
                .map_err(|_| GraphError::LayerBusy("<执行中的层>".to_string()))?;
            Ok(layer.compute_output_spec(args)?)
        })
    }

    /// 数据流解释器：可用张量表以符号张量 ID 为键；
    /// 跳过源节点和输入尚不齐全的节点
    fn run_through_graph<T: Clone>(
        &self,
        inputs: Vec<T>,
        operation_fn: &mut impl FnMut(&LayerRef, &CallArguments<T>) -> Result<Nest<T>, GraphError>,
    ) -> Result<Nest<T>, GraphError> {
        if inputs.len() != self.inputs.len() {
            return Err(GraphError::InvalidInput(format!(
                "模型需要{}个输入，实际得到{}个",
                self.inputs.len(),
                inputs.len()
            )));
        }
        let mut tensor_dict: HashMap<TensorId, T> = self
            .inputs
            .iter()
            .map(SymbolicTensor::id)
            .zip(inputs)
            .collect();

        for keys in self.nodes_by_depth.values().rev() {
            for key in keys {
                let Some(node) = self.nodes.get(key) else {
                    continue;
                };
                if node.is_input() {
                    continue;
                }
                if node
                    .input_tensors()
                    .iter()
                    .any(|x| !tensor_dict.contains_key(&x.id()))
                {
                    continue;
                }
                let layer = self
                    .layers
                    .get(&key.0)
                    .ok_or_else(|| GraphError::UnknownOperation(key.0.to_string()))?;
                let args = node
                    .arguments()
                    .map_tensors(&mut |x: &SymbolicTensor| tensor_dict[&x.id()].clone());
                let outputs = operation_fn(layer, &args)?.into_flat();
                let expected = node.output_tensors();
                if outputs.len() != expected.len() {
                    return Err(GraphError::InvalidInput(format!(
                        "操作{}应产生{}个输出，实际为{}个",
                        key.0,
                        expected.len(),
                        outputs.len()
                    )));
                }
                for (x, y) in expected.into_iter().zip(outputs) {
                    tensor_dict.insert(x.id(), y);
                }
            }
        }

        let outputs = self
            .outputs
            .iter()
            .map(|x| {
                tensor_dict.get(&x.id()).cloned().ok_or_else(|| {
                    GraphError::InvalidInput(format!("无法由给定输入计算出输出{}", x.name()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.outputs_struct
            .pack_as(outputs)
            .ok_or_else(|| GraphError::InvalidInput("输出结构与输出个数不一致".to_string()))
    }
}
