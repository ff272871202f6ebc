/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : 符号张量（只含形状/类型的占位张量）及其规格
 */

use super::types::{NodeKey, TensorHistory, TensorId};
use crate::tensor::{DType, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 张量规格：形状（`None` 表示未知维度，通常是批维）、数据类型、是否稀疏
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub shape: Vec<Option<usize>>,
    pub dtype: DType,
    pub sparse: bool,
}

impl TensorSpec {
    pub const fn new(shape: Vec<Option<usize>>, dtype: DType) -> Self {
        Self {
            shape,
            dtype,
            sparse: false,
        }
    }

    /// 在给定形状前补一个未知的批维，即 keras 中 `Input(shape=...)` 的约定
    pub fn with_batch(shape: &[usize]) -> Self {
        let mut full = Vec::with_capacity(shape.len() + 1);
        full.push(None);
        full.extend(shape.iter().map(|&d| Some(d)));
        Self::new(full, DType::Float32)
    }

    /// 由具体张量得到（所有维度已知）的规格
    pub fn of(tensor: &Tensor) -> Self {
        Self::new(
            tensor.shape().iter().map(|&d| Some(d)).collect(),
            tensor.dtype(),
        )
    }

    pub const fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn last_dim(&self) -> Option<usize> {
        self.shape.last().copied().flatten()
    }

    /// 具体形状是否与本规格相容（阶数相同，且已知的维度一致）
    pub fn is_compatible_with(&self, shape: &[usize]) -> bool {
        self.rank() == shape.len()
            && self
                .shape
                .iter()
                .zip(shape)
                .all(|(expected, got)| expected.is_none_or(|e| e == *got))
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .shape
            .iter()
            .map(|d| d.map_or_else(|| "None".to_string(), |d| d.to_string()))
            .collect::<Vec<_>>();
        write!(f, "({})", dims.join(", "))
    }
}

/// 符号张量：图构建阶段代替真实张量的占位值。
///
/// `history` 指向产生它的节点；只有图（`Graph`）能创建符号张量并写入历史。
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicTensor {
    id: TensorId,
    spec: TensorSpec,
    name: String,
    history: Option<TensorHistory>,
}

impl SymbolicTensor {
    pub(crate) const fn new(id: TensorId, spec: TensorSpec, name: String) -> Self {
        Self {
            id,
            spec,
            name,
            history: None,
        }
    }

    pub const fn id(&self) -> TensorId {
        self.id
    }

    pub const fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    pub fn shape(&self) -> &[Option<usize>] {
        &self.spec.shape
    }

    pub const fn dtype(&self) -> DType {
        self.spec.dtype
    }

    pub const fn sparse(&self) -> bool {
        self.spec.sparse
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn history(&self) -> Option<TensorHistory> {
        self.history
    }

    pub fn node_key(&self) -> Option<NodeKey> {
        self.history.map(|h| h.node_key())
    }

    pub(crate) const fn set_history(&mut self, history: TensorHistory) {
        self.history = Some(history);
    }
}

impl fmt::Display for SymbolicTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<SymbolicTensor shape={}, dtype={}, name={}>",
            self.spec, self.spec.dtype, self.name
        )
    }
}
