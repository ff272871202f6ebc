/*
 * @Author       : 老董
 * @Date         : 2026-02-13
 * @Description  : Functional 的配置导出与由配置重建
 *
 * 导出时只保留模型子图中的节点，并按操作重新连续编号（节点重新编号表），
 * 每个层的 `inbound_nodes` 记录它在模型中的每次调用的参数。
 *
 * 重建时先创建所有层（InputLayer 随即产生源节点），再按层的声明顺序反复扫描
 * 待处理的调用：所需的入站节点已存在的调用立即执行，否则留待下一轮；
 * 一轮扫描没有任何进展即说明配置中存在环。
 */

use super::{Functional, FunctionalOptions};
use crate::nn::graph::{
    ArgValue, CallArguments, Graph, LayerHandle, NodeKey, OperationId, SymbolicTensor,
};
use crate::saving::serialization::codec::{
    collect_histories, decode_arguments, decode_nest, encode_arguments, keras_tensor_config,
    keras_tensor_history, KerasHistory,
};
use crate::saving::serialization::{
    DeserializationContext, SerializationContext, SerializationError,
};
use crate::utils::Nest;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};

impl Functional {
    /// 以新的序列化上下文导出配置
    pub fn get_config(&self) -> Result<Value, SerializationError> {
        let mut ctx = SerializationContext::new();
        let config = self.get_config_with(&mut ctx)?;
        Ok(ctx.finish(config))
    }

    /// 在给定的序列化上下文中导出配置（嵌套模型共享外层的上下文）
    pub fn get_config_with(
        &self,
        ctx: &mut SerializationContext,
    ) -> Result<Value, SerializationError> {
        let function = &self.function;

        // ========== 节点重新编号 ==========
        let mut node_reindexing_map: HashMap<NodeKey, usize> = HashMap::new();
        let mut names: HashMap<OperationId, String> = HashMap::new();
        for &op in function.operations() {
            // 嵌套的 Functional 模型也从0开始编号，而 Keras 为其保留了构建时的0号节点、
            // 从1开始编号，因此含嵌套模型的配置与 Keras 导出的配置不能互换
            for (kept_nodes, node) in function.operation_nodes(op).into_iter().enumerate() {
                node_reindexing_map.insert(node.key(), kept_nodes);
            }
            let layer = function
                .layer(op)
                .ok_or_else(|| SerializationError::UnknownLayer(op.to_string()))?;
            let name = layer
                .try_borrow()
                .map_err(|_| SerializationError::LayerBusy(op.to_string()))?
                .name()
                .to_string();
            names.insert(op, name);
        }

        let history_of = |x: &SymbolicTensor| -> Result<KerasHistory, SerializationError> {
            let history = x.history().ok_or_else(|| {
                SerializationError::invalid(format!("张量{}没有来源节点", x.name()))
            })?;
            let node_index = node_reindexing_map
                .get(&history.node_key())
                .copied()
                .ok_or_else(|| {
                    SerializationError::invalid(format!("张量{}的来源节点不在模型中", x.name()))
                })?;
            let layer = names
                .get(&history.operation)
                .cloned()
                .ok_or_else(|| SerializationError::UnknownLayer(history.operation.to_string()))?;
            Ok(KerasHistory {
                layer,
                node_index,
                tensor_index: history.tensor_index,
            })
        };

        // ========== 各层配置 ==========
        let mut layer_configs = Vec::with_capacity(function.operations().len());
        for &op in function.operations() {
            let mut inbound_nodes = Vec::new();
            for node in function.operation_nodes(op) {
                // 源节点无需保存
                if node.input_tensors().is_empty() {
                    continue;
                }
                inbound_nodes.push(encode_arguments(node.arguments(), &mut |x: &SymbolicTensor| {
                    Ok(keras_tensor_config(x, &history_of(x)?))
                })?);
            }
            let layer = function
                .layer(op)
                .ok_or_else(|| SerializationError::UnknownLayer(op.to_string()))?;
            let mut layer_config = ctx.serialize_layer(layer)?;
            layer_config["name"] = Value::from(names[&op].clone());
            layer_config["inbound_nodes"] = Value::Array(inbound_nodes);
            layer_configs.push(layer_config);
        }

        // ========== 输入输出 ==========
        let map_tensors = |nest: &Nest<SymbolicTensor>| -> Result<Value, SerializationError> {
            Ok(match nest {
                Nest::Dict(items) => Value::Object(
                    items
                        .iter()
                        .map(|(k, x)| {
                            let x = x.as_leaf().ok_or_else(|| {
                                SerializationError::invalid("模型的输入输出字典不能嵌套")
                            })?;
                            Ok((k.clone(), history_of(x)?.to_value()))
                        })
                        .collect::<Result<Map<_, _>, SerializationError>>()?,
                ),
                other => Value::Array(
                    other
                        .flatten()
                        .into_iter()
                        .map(|x| Ok(history_of(x)?.to_value()))
                        .collect::<Result<Vec<_>, SerializationError>>()?,
                ),
            })
        };

        Ok(json!({
            "name": self.name,
            "trainable": self.trainable,
            "layers": layer_configs,
            "input_layers": map_tensors(function.inputs_struct())?,
            "output_layers": map_tensors(function.outputs_struct())?,
        }))
    }
}

// ========== 由配置重建 ==========

/// 配置中`[层名, 节点序号, 输出序号]`对应的张量；该节点尚未创建时返回 None
fn get_tensor(
    graph: &Graph,
    created_layers: &HashMap<String, LayerHandle>,
    history: &KerasHistory,
) -> Result<Option<SymbolicTensor>, SerializationError> {
    let handle = created_layers
        .get(&history.layer)
        .ok_or_else(|| SerializationError::UnknownLayer(history.layer.clone()))?;
    let g = graph.inner();
    let Some(&node_id) = g.inbound_nodes(handle.id())?.get(history.node_index) else {
        return Ok(None);
    };
    let node = g.node(node_id).ok_or_else(|| {
        SerializationError::invalid(format!("层“{}”的节点{node_id}不存在", history.layer))
    })?;
    let tensor = node
        .output_tensors()
        .get(history.tensor_index)
        .map(|x| (*x).clone())
        .ok_or_else(|| {
            SerializationError::invalid(format!(
                "层“{}”的第{}个节点没有第{}个输出",
                history.layer, history.node_index, history.tensor_index
            ))
        })?;
    Ok(Some(tensor))
}

/// 解析一次层调用；所需的入站节点尚未全部创建时返回 None
fn deserialize_node(
    node_data: &Value,
    graph: &Graph,
    created_layers: &HashMap<String, LayerHandle>,
) -> Result<Option<CallArguments<SymbolicTensor>>, SerializationError> {
    // 旧格式：[[层名, 节点序号, 输出序号, kwargs?], ...]
    if let Value::Array(items) = node_data {
        let mut input_tensors = Vec::with_capacity(items.len());
        let mut kwargs = Value::Null;
        for input_data in items {
            let len = input_data.as_array().map_or(0, Vec::len);
            if len != 3 && len != 4 {
                return Err(SerializationError::invalid(format!(
                    "无法反序列化模型（节点数据无效）：{input_data}"
                )));
            }
            let history = KerasHistory::from_value(input_data)?;
            let Some(tensor) = get_tensor(graph, created_layers, &history)? else {
                return Ok(None);
            };
            input_tensors.push(tensor);
            kwargs = input_data.get(3).cloned().unwrap_or(Value::Null);
        }
        let tensors =
            Nest::list(input_tensors.into_iter().map(ArgValue::Tensor)).unpack_singleton();
        let mut arguments = CallArguments::from_nest(tensors);
        if let Value::Object(kwargs) = kwargs {
            for (k, v) in kwargs {
                let value = decode_nest::<SymbolicTensor>(&v, &mut |_: &Value| {
                    Err(SerializationError::invalid("旧格式的 kwargs 中不能含有张量"))
                })?;
                arguments.kwargs.insert(k, value);
            }
        }
        return Ok(Some(arguments));
    }

    let mut histories = Vec::new();
    collect_histories(node_data, &mut histories)?;
    for history in &histories {
        if get_tensor(graph, created_layers, history)?.is_none() {
            return Ok(None);
        }
    }
    let arguments = decode_arguments(node_data, &mut |value: &Value| {
        let history = keras_tensor_history(value)?;
        get_tensor(graph, created_layers, &history)?
            .ok_or_else(|| SerializationError::invalid(format!("张量来源{history:?}不存在")))
    })?;
    Ok(Some(arguments))
}

/// `input_layers`/`output_layers`对应的张量结构
fn map_tensors(
    value: &Value,
    graph: &Graph,
    created_layers: &HashMap<String, LayerHandle>,
) -> Result<Nest<SymbolicTensor>, SerializationError> {
    let get = |v: &Value| -> Result<SymbolicTensor, SerializationError> {
        let history = KerasHistory::from_value(v)?;
        get_tensor(graph, created_layers, &history)?
            .ok_or_else(|| SerializationError::invalid(format!("张量来源{history:?}不存在")))
    };
    match value {
        Value::Object(items) => Ok(Nest::Dict(
            items
                .iter()
                .map(|(k, v)| Ok((k.clone(), Nest::Leaf(get(v)?))))
                .collect::<Result<BTreeMap<_, _>, SerializationError>>()?,
        )),
        Value::Array(items) => Ok(Nest::List(
            items
                .iter()
                .map(|v| Ok(Nest::Leaf(get(v)?)))
                .collect::<Result<Vec<_>, SerializationError>>()?,
        )),
        other => Err(SerializationError::invalid(format!("无效的模型输入/输出：{other}"))),
    }
}

/// 由`get_config()`的结果重建模型（在一张新图中）
pub fn functional_from_config(
    config: &Value,
    ctx: &mut DeserializationContext<'_>,
) -> Result<Functional, SerializationError> {
    let graph = Graph::new();
    let layers_data = config
        .get("layers")
        .and_then(Value::as_array)
        .ok_or_else(|| SerializationError::invalid("模型配置缺少 layers 列表"))?;

    // ========== 创建所有层，登记待处理的调用 ==========
    let mut created_layers: HashMap<String, LayerHandle> = HashMap::new();
    let mut layer_order: Vec<String> = Vec::with_capacity(layers_data.len());
    let mut unprocessed_nodes: HashMap<String, VecDeque<Value>> = HashMap::new();
    for layer_data in layers_data {
        let name = layer_data
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| SerializationError::invalid(format!("层配置缺少 name：{layer_data}")))?
            .to_string();
        let layer = ctx.deserialize_layer(layer_data)?;
        {
            let mut borrowed = layer
                .try_borrow_mut()
                .map_err(|_| SerializationError::LayerBusy(name.clone()))?;
            if borrowed.name() != name {
                borrowed.set_name(name.clone());
            }
        }
        let handle = graph.add_layer_ref(layer)?;
        created_layers.insert(name.clone(), handle);

        let inbound_nodes = layer_data
            .get("inbound_nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if !inbound_nodes.is_empty() {
            unprocessed_nodes.insert(name.clone(), inbound_nodes.into());
        }
        layer_order.push(name);
    }

    // ========== 按层的顺序反复处理调用，直到全部完成 ==========
    while !unprocessed_nodes.is_empty() {
        let mut progressed = false;
        for name in &layer_order {
            let Some(queue) = unprocessed_nodes.get_mut(name) else {
                continue;
            };
            let handle = &created_layers[name];
            while let Some(node_data) = queue.front() {
                let Some(arguments) = deserialize_node(node_data, &graph, &created_layers)? else {
                    break;
                };
                handle.call(arguments)?;
                queue.pop_front();
                progressed = true;
            }
            if queue.is_empty() {
                unprocessed_nodes.remove(name);
            }
        }
        if !progressed {
            let mut pending = unprocessed_nodes.keys().cloned().collect::<Vec<_>>();
            pending.sort();
            return Err(SerializationError::CyclicDependency { pending });
        }
    }

    // ========== 输入输出 ==========
    let inputs = map_tensors(
        config
            .get("input_layers")
            .ok_or_else(|| SerializationError::invalid("模型配置缺少 input_layers"))?,
        &graph,
        &created_layers,
    )?;
    let outputs = map_tensors(
        config
            .get("output_layers")
            .ok_or_else(|| SerializationError::invalid("模型配置缺少 output_layers"))?,
        &graph,
        &created_layers,
    )?;
    let options = FunctionalOptions {
        name: config.get("name").and_then(Value::as_str).map(str::to_string),
        trainable: config.get("trainable").and_then(Value::as_bool).unwrap_or(true),
        ..FunctionalOptions::default()
    };
    Ok(Functional::new(&graph, inputs, outputs, options)?)
}
