/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 从输出张量出发的反向遍历
 */

use super::super::error::GraphError;
use super::super::symbolic::SymbolicTensor;
use super::super::types::{NodeKey, OperationId, TensorId};
use super::GraphInner;
use std::collections::{HashMap, HashSet};

/// `build_map` 的结果
pub struct GraphMap {
    /// 后序（先上游后下游）排列的节点，即深度递减的顺序
    pub nodes_in_decreasing_depth: Vec<NodeKey>,
    /// 操作 -> 首次遍历到它的次序
    pub operation_indices: HashMap<OperationId, usize>,
}

struct BuildState<'a> {
    input_ids: HashSet<TensorId>,
    finished: HashSet<NodeKey>,
    in_progress: HashSet<NodeKey>,
    map: &'a mut GraphMap,
}

impl GraphInner {
    /// 从`outputs`反向深度优先遍历，遇到源节点或`inputs`中的张量即停止。
    /// 遍历中再次遇到未完成的节点说明图中有环。
    pub fn build_map(
        &self,
        inputs: &[SymbolicTensor],
        outputs: &[SymbolicTensor],
    ) -> Result<GraphMap, GraphError> {
        let mut map = GraphMap {
            nodes_in_decreasing_depth: Vec::new(),
            operation_indices: HashMap::new(),
        };
        let mut state = BuildState {
            input_ids: inputs.iter().map(SymbolicTensor::id).collect(),
            finished: HashSet::new(),
            in_progress: HashSet::new(),
            map: &mut map,
        };
        for output in outputs {
            self.build_map_helper(output, &mut state)?;
        }
        Ok(map)
    }

    fn build_map_helper(
        &self,
        tensor: &SymbolicTensor,
        state: &mut BuildState<'_>,
    ) -> Result<(), GraphError> {
        let Some(history) = tensor.history() else {
            return Ok(());
        };
        let key = history.node_key();
        if state.finished.contains(&key) {
            return Ok(());
        }
        if state.in_progress.contains(&key) {
            return Err(GraphError::Cycle {
                tensor: tensor.name().to_string(),
                operation: self.operation_name(history.operation),
            });
        }
        let node = self.node_by_key(key).ok_or_else(|| GraphError::MissingInboundNode {
            operation: self.operation_name(history.operation),
            node_index: history.node_index,
        })?;

        let next_index = state.map.operation_indices.len();
        state
            .map
            .operation_indices
            .entry(history.operation)
            .or_insert(next_index);

        state.in_progress.insert(key);
        if !node.is_input() && !state.input_ids.contains(&tensor.id()) {
            for input in node.input_tensors() {
                self.build_map_helper(input, state)?;
            }
        }
        state.in_progress.remove(&key);
        state.finished.insert(key);
        state.map.nodes_in_decreasing_depth.push(key);
        Ok(())
    }
}
