/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 子图克隆：以中间张量作为模型输入时使用
 *
 * 克隆出的节点复用原有的操作（层），只是重新记录一遍调用；
 * 作为输入的中间张量被替换为新的 InputLayer（名为`<张量名>CLONE`）。
 * 替换以产生该张量的节点为单位：同一个层的其他调用照常克隆，
 * 其参数改指向克隆后的张量。原有节点不受影响。
 */

use super::super::error::GraphError;
use super::super::node::CallArguments;
use super::super::symbolic::SymbolicTensor;
use super::super::types::{NodeKey, TensorId};
use super::GraphInner;
use crate::nn::layer::{layer_ref, InputLayer};
use crate::utils::Nest;
use std::collections::{HashMap, HashSet};

/// 原张量 ID -> 克隆后的张量
type TensorMap = HashMap<TensorId, SymbolicTensor>;

impl GraphInner {
    /// 在`inputs`与`outputs`之间重建一份节点，返回新的`(inputs, outputs)`
    pub fn clone_graph_nodes(
        &mut self,
        inputs: &Nest<SymbolicTensor>,
        outputs: &Nest<SymbolicTensor>,
    ) -> Result<(Nest<SymbolicTensor>, Nest<SymbolicTensor>), GraphError> {
        let flat_inputs = inputs.flatten().into_iter().cloned().collect::<Vec<_>>();
        let flat_outputs = outputs.flatten().into_iter().cloned().collect::<Vec<_>>();
        let nodes_to_clone = self
            .build_map(&flat_inputs, &flat_outputs)?
            .nodes_in_decreasing_depth;

        let mut kt_map = TensorMap::new();
        // 被 InputLayer 取代的节点（中间输入张量的来源节点）
        let mut replaced_nodes: HashSet<NodeKey> = HashSet::new();
        for kt in &flat_inputs {
            if self.is_source(kt) {
                kt_map.insert(kt.id(), kt.clone());
                continue;
            }
            let history = kt.history().ok_or_else(|| {
                GraphError::InvalidInput(format!("张量{}没有来源节点，无法作为模型输入", kt.name()))
            })?;
            let input_layer = InputLayer::from_spec(kt.spec().clone())
                .with_name(format!("{}CLONE", kt.name()));
            let new_op = self.register_layer(layer_ref(input_layer))?;
            let cloned = self
                .node_by_key((new_op, 0))
                .and_then(|node| node.output_tensors().first().map(|t| (*t).clone()))
                .ok_or_else(|| GraphError::MissingInboundNode {
                    operation: self.operation_name(new_op),
                    node_index: 0,
                })?;
            kt_map.insert(kt.id(), cloned);
            replaced_nodes.insert(history.node_key());
        }

        for kt in &flat_outputs {
            if kt_map.contains_key(&kt.id()) {
                continue;
            }
            let copy = self.clone_tensor(kt);
            kt_map.insert(kt.id(), copy);
        }

        for key in nodes_to_clone {
            let node = self
                .node_by_key(key)
                .cloned()
                .ok_or_else(|| GraphError::MissingInboundNode {
                    operation: self.operation_name(key.0),
                    node_index: key.1,
                })?;
            // 源节点与被取代的节点不再重建，其输出已由输入映射给出
            if node.is_input() || replaced_nodes.contains(&key) {
                continue;
            }
            let arguments: CallArguments<SymbolicTensor> = node
                .arguments
                .map_tensors(&mut |t: &SymbolicTensor| self.lookup_or_clone(&mut kt_map, t));
            let outputs = node
                .outputs
                .map(&mut |t: &SymbolicTensor| self.lookup_or_clone(&mut kt_map, t));
            let new_id = self.add_node(node.operation, arguments, outputs)?;

            // 节点会改写输出张量的来源，映射中记录改写后的张量
            let new_outputs = self.nodes[new_id.0]
                .output_tensors()
                .into_iter()
                .cloned()
                .collect::<Vec<_>>();
            for (old, new) in node.output_tensors().into_iter().zip(new_outputs) {
                kt_map.insert(old.id(), new);
            }
        }

        let lookup = |t: &SymbolicTensor| {
            kt_map
                .get(&t.id())
                .cloned()
                .ok_or_else(|| {
                    GraphError::InvalidInput(format!("克隆子图时丢失了张量{}", t.name()))
                })
        };
        let new_inputs = inputs.try_map(&mut |t: &SymbolicTensor| lookup(t))?;
        let new_outputs = outputs.try_map(&mut |t: &SymbolicTensor| lookup(t))?;
        Ok((new_inputs, new_outputs))
    }

    /// 同规格、名为`<原名>_clone`的新张量，暂时沿用原张量的来源
    fn clone_tensor(&mut self, tensor: &SymbolicTensor) -> SymbolicTensor {
        let mut copy =
            self.new_symbolic(tensor.spec().clone(), Some(format!("{}_clone", tensor.name())));
        if let Some(history) = tensor.history() {
            copy.set_history(history);
        }
        copy
    }

    fn lookup_or_clone(
        &mut self,
        kt_map: &mut TensorMap,
        tensor: &SymbolicTensor,
    ) -> SymbolicTensor {
        if let Some(existing) = kt_map.get(&tensor.id()) {
            return existing.clone();
        }
        let copy = self.clone_tensor(tensor);
        kt_map.insert(tensor.id(), copy.clone());
        copy
    }
}
