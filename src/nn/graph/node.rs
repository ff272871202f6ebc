/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : 节点（一次层调用的记录）与调用参数
 *
 * 调用参数由位置参数和关键字参数组成，每个参数是任意嵌套的结构，
 * 叶子要么是张量（图构建时为符号张量，执行时为真实张量），要么是字面量。
 */

use super::symbolic::SymbolicTensor;
use super::types::{NodeId, NodeKey, OperationId};
use crate::utils::Nest;
use serde_json::Value;
use std::collections::BTreeMap;

/// 调用参数中的叶子
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue<T> {
    Tensor(T),
    Literal(Value),
}

impl<T> ArgValue<T> {
    pub const fn as_tensor(&self) -> Option<&T> {
        match self {
            Self::Tensor(t) => Some(t),
            Self::Literal(_) => None,
        }
    }
}

/// 一次调用的参数（`*args, **kwargs`）
#[derive(Debug, Clone, PartialEq)]
pub struct CallArguments<T> {
    pub args: Vec<Nest<ArgValue<T>>>,
    pub kwargs: BTreeMap<String, Nest<ArgValue<T>>>,
}

impl<T> Default for CallArguments<T> {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }
}

impl<T> CallArguments<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单个张量作为唯一位置参数
    pub fn single(tensor: T) -> Self {
        Self {
            args: vec![Nest::Leaf(ArgValue::Tensor(tensor))],
            kwargs: BTreeMap::new(),
        }
    }

    /// 张量列表作为唯一位置参数（如 `Add()([a, b])`）
    pub fn list(tensors: impl IntoIterator<Item = T>) -> Self {
        Self::from_nest(Nest::List(
            tensors
                .into_iter()
                .map(|t| Nest::Leaf(ArgValue::Tensor(t)))
                .collect(),
        ))
    }

    /// 任意嵌套的张量结构作为唯一位置参数
    pub fn from_nest(tensors: Nest<ArgValue<T>>) -> Self {
        Self {
            args: vec![tensors],
            kwargs: BTreeMap::new(),
        }
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Nest<ArgValue<T>>) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn with_literal(self, name: impl Into<String>, value: Value) -> Self {
        self.with_kwarg(name, Nest::Leaf(ArgValue::Literal(value)))
    }

    /// 第一个位置参数
    pub fn first(&self) -> Option<&Nest<ArgValue<T>>> {
        self.args.first()
    }

    /// 关键字字面量参数
    pub fn literal(&self, name: &str) -> Option<&Value> {
        match self.kwargs.get(name) {
            Some(Nest::Leaf(ArgValue::Literal(v))) => Some(v),
            _ => None,
        }
    }

    /// 按顺序（先位置参数，后关键字参数）列出所有张量
    pub fn tensors(&self) -> Vec<&T> {
        self.args
            .iter()
            .chain(self.kwargs.values())
            .flat_map(Nest::flatten)
            .filter_map(ArgValue::as_tensor)
            .collect()
    }

    /// 第一个位置参数中的所有张量
    pub fn first_tensors(&self) -> Vec<&T> {
        self.first()
            .map(|nest| nest.flatten().into_iter().filter_map(ArgValue::as_tensor).collect())
            .unwrap_or_default()
    }

    /// 第一个位置参数恰为单个张量时返回它
    pub fn single_tensor(&self) -> Option<&T> {
        match self.first() {
            Some(Nest::Leaf(ArgValue::Tensor(t))) => Some(t),
            _ => None,
        }
    }

    /// 保持结构不变，逐个替换张量（字面量原样保留）
    pub fn try_map_tensors<U, E>(
        &self,
        f: &mut impl FnMut(&T) -> Result<U, E>,
    ) -> Result<CallArguments<U>, E> {
        let mut leaf = |v: &ArgValue<T>| -> Result<ArgValue<U>, E> {
            Ok(match v {
                ArgValue::Tensor(t) => ArgValue::Tensor(f(t)?),
                ArgValue::Literal(l) => ArgValue::Literal(l.clone()),
            })
        };
        let args = self
            .args
            .iter()
            .map(|nest| nest.try_map(&mut leaf))
            .collect::<Result<Vec<_>, E>>()?;
        let kwargs = self
            .kwargs
            .iter()
            .map(|(k, nest)| Ok((k.clone(), nest.try_map(&mut leaf)?)))
            .collect::<Result<BTreeMap<_, _>, E>>()?;
        Ok(CallArguments { args, kwargs })
    }

    pub fn map_tensors<U>(&self, f: &mut impl FnMut(&T) -> U) -> CallArguments<U> {
        let result: Result<_, std::convert::Infallible> =
            self.try_map_tensors(&mut |t: &T| Ok(f(t)));
        match result {
            Ok(mapped) => mapped,
            Err(never) => match never {},
        }
    }
}

/// 节点：一次层调用的记录。创建后只追加到所属操作的入站节点列表中，不再修改。
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) operation: OperationId,
    pub(crate) node_index: usize,
    pub(crate) arguments: CallArguments<SymbolicTensor>,
    pub(crate) outputs: Nest<SymbolicTensor>,
    pub(crate) is_input: bool,
    pub(crate) parent_nodes: Vec<NodeKey>,
}

impl Node {
    pub const fn id(&self) -> NodeId {
        self.id
    }

    pub const fn operation(&self) -> OperationId {
        self.operation
    }

    pub const fn key(&self) -> NodeKey {
        (self.operation, self.node_index)
    }

    pub const fn arguments(&self) -> &CallArguments<SymbolicTensor> {
        &self.arguments
    }

    pub fn input_tensors(&self) -> Vec<&SymbolicTensor> {
        self.arguments.tensors()
    }

    pub const fn outputs(&self) -> &Nest<SymbolicTensor> {
        &self.outputs
    }

    pub fn output_tensors(&self) -> Vec<&SymbolicTensor> {
        self.outputs.flatten()
    }

    /// 源节点（没有张量参数，如 InputLayer 的节点）
    pub const fn is_input(&self) -> bool {
        self.is_input
    }

    /// 产生本节点输入张量的上游节点
    pub fn parent_nodes(&self) -> &[NodeKey] {
        &self.parent_nodes
    }
}
