/*
 * @Author       : 老董
 * @Date         : 2026-02-13
 * @Description  : 调用参数与 JSON 之间的编解码
 *
 * 调用参数中的符号张量编码为
 * `{"class_name": "__keras_tensor__", "config": {"shape", "dtype", "keras_history": [层名, 节点序号, 输出序号]}}`，
 * 字面量原样写出，列表/字典按结构递归。
 * 解码时不含张量的 JSON 值整体作为一个字面量。
 */

use super::SerializationError;
use crate::nn::{ArgValue, CallArguments, SymbolicTensor};
use crate::utils::Nest;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const KERAS_TENSOR_CLASS: &str = "__keras_tensor__";

/// 张量在配置中的来源：`(层名, 节点序号, 输出序号)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KerasHistory {
    pub layer: String,
    pub node_index: usize,
    pub tensor_index: usize,
}

impl KerasHistory {
    pub fn to_value(&self) -> Value {
        json!([self.layer, self.node_index, self.tensor_index])
    }

    /// 解析`[层名, 节点序号, 输出序号]`（旧格式中可能多出第4项 kwargs）
    pub fn from_value(value: &Value) -> Result<Self, SerializationError> {
        let items = value
            .as_array()
            .filter(|items| items.len() >= 3)
            .ok_or_else(|| SerializationError::invalid(format!("无效的张量来源：{value}")))?;
        let index = |i: usize| {
            items[i]
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| SerializationError::invalid(format!("无效的张量来源：{value}")))
        };
        Ok(Self {
            layer: items[0]
                .as_str()
                .ok_or_else(|| SerializationError::invalid(format!("无效的张量来源：{value}")))?
                .to_string(),
            node_index: index(1)?,
            tensor_index: index(2)?,
        })
    }
}

/// 符号张量的配置
pub fn keras_tensor_config(tensor: &SymbolicTensor, history: &KerasHistory) -> Value {
    json!({
        "class_name": KERAS_TENSOR_CLASS,
        "config": {
            "shape": tensor.shape(),
            "dtype": tensor.dtype().as_str(),
            "keras_history": history.to_value(),
        }
    })
}

pub fn is_keras_tensor(value: &Value) -> bool {
    value.get("class_name").and_then(Value::as_str) == Some(KERAS_TENSOR_CLASS)
}

/// 从张量配置中取出来源
pub fn keras_tensor_history(value: &Value) -> Result<KerasHistory, SerializationError> {
    let history = value
        .pointer("/config/keras_history")
        .ok_or_else(|| SerializationError::invalid("张量配置缺少 keras_history"))?;
    KerasHistory::from_value(history)
}

/// 递归收集 JSON 值中所有张量的来源
pub fn collect_histories(
    value: &Value,
    out: &mut Vec<KerasHistory>,
) -> Result<(), SerializationError> {
    if is_keras_tensor(value) {
        out.push(keras_tensor_history(value)?);
        return Ok(());
    }
    match value {
        Value::Array(items) => items.iter().try_for_each(|x| collect_histories(x, out)),
        Value::Object(items) => items.values().try_for_each(|x| collect_histories(x, out)),
        _ => Ok(()),
    }
}

fn contains_keras_tensor(value: &Value) -> bool {
    is_keras_tensor(value)
        || match value {
            Value::Array(items) => items.iter().any(contains_keras_tensor),
            Value::Object(items) => items.values().any(contains_keras_tensor),
            _ => false,
        }
}

// ========== 编码 ==========

pub fn encode_nest<T>(
    nest: &Nest<ArgValue<T>>,
    tensor_fn: &mut impl FnMut(&T) -> Result<Value, SerializationError>,
) -> Result<Value, SerializationError> {
    Ok(match nest {
        Nest::Leaf(ArgValue::Tensor(t)) => tensor_fn(t)?,
        Nest::Leaf(ArgValue::Literal(v)) => v.clone(),
        Nest::List(items) => Value::Array(
            items
                .iter()
                .map(|x| encode_nest(x, tensor_fn))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Nest::Dict(items) => Value::Object(
            items
                .iter()
                .map(|(k, x)| Ok((k.clone(), encode_nest(x, tensor_fn)?)))
                .collect::<Result<Map<_, _>, SerializationError>>()?,
        ),
    })
}

/// `{"args": [...], "kwargs": {...}}`
pub fn encode_arguments<T>(
    arguments: &CallArguments<T>,
    tensor_fn: &mut impl FnMut(&T) -> Result<Value, SerializationError>,
) -> Result<Value, SerializationError> {
    let args = arguments
        .args
        .iter()
        .map(|x| encode_nest(x, tensor_fn))
        .collect::<Result<Vec<_>, _>>()?;
    let kwargs = arguments
        .kwargs
        .iter()
        .map(|(k, x)| Ok((k.clone(), encode_nest(x, tensor_fn)?)))
        .collect::<Result<Map<_, _>, SerializationError>>()?;
    Ok(json!({ "args": args, "kwargs": kwargs }))
}

// ========== 解码 ==========

pub fn decode_nest<T>(
    value: &Value,
    tensor_fn: &mut impl FnMut(&Value) -> Result<T, SerializationError>,
) -> Result<Nest<ArgValue<T>>, SerializationError> {
    if is_keras_tensor(value) {
        return Ok(Nest::Leaf(ArgValue::Tensor(tensor_fn(value)?)));
    }
    if !contains_keras_tensor(value) {
        return Ok(Nest::Leaf(ArgValue::Literal(value.clone())));
    }
    Ok(match value {
        Value::Array(items) => Nest::List(
            items
                .iter()
                .map(|x| decode_nest(x, tensor_fn))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Object(items) => Nest::Dict(
            items
                .iter()
                .map(|(k, x)| Ok((k.clone(), decode_nest(x, tensor_fn)?)))
                .collect::<Result<BTreeMap<_, _>, SerializationError>>()?,
        ),
        other => Nest::Leaf(ArgValue::Literal(other.clone())),
    })
}

/// `encode_arguments`的逆操作；`null`或空对象表示没有参数
pub fn decode_arguments<T>(
    value: &Value,
    tensor_fn: &mut impl FnMut(&Value) -> Result<T, SerializationError>,
) -> Result<CallArguments<T>, SerializationError> {
    let mut arguments = CallArguments::new();
    if value.is_null() {
        return Ok(arguments);
    }
    let object = value
        .as_object()
        .ok_or_else(|| SerializationError::invalid(format!("无效的节点数据：{value}")))?;
    if let Some(args) = object.get("args") {
        let args = args.as_array().ok_or_else(|| {
            SerializationError::invalid(format!("节点数据的 args 应为列表：{args}"))
        })?;
        for x in args {
            arguments.args.push(decode_nest(x, tensor_fn)?);
        }
    }
    if let Some(kwargs) = object.get("kwargs") {
        let kwargs = kwargs.as_object().ok_or_else(|| {
            SerializationError::invalid(format!("节点数据的 kwargs 应为字典：{kwargs}"))
        })?;
        for (k, x) in kwargs {
            arguments.kwargs.insert(k.clone(), decode_nest(x, tensor_fn)?);
        }
    }
    Ok(arguments)
}
