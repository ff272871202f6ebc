/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : 图执行所需的少量张量运算（矩阵乘、广播加、激活、轴变换、拼接）
 */

use super::Tensor;
use crate::errors::{Operator, TensorError};
use ndarray::{Array2, Axis, IxDyn};

impl Tensor {
    /// 将负数轴换算为正数轴
    pub fn normalize_axis(&self, axis: isize) -> Result<usize, TensorError> {
        let rank = self.dimension();
        let resolved = if axis < 0 { rank as isize + axis } else { axis };
        if resolved < 0 || resolved as usize >= rank {
            return Err(TensorError::AxisOutOfRange { axis, rank });
        }
        Ok(resolved as usize)
    }

    /// 最后一维的矩阵乘：`[..., k] x [k, n] -> [..., n]`
    pub fn matmul_last(&self, kernel: &Self) -> Result<Self, TensorError> {
        let op_err = || TensorError::OperatorError {
            operator: Operator::MatMul,
            tensor1_shape: self.shape().to_vec(),
            tensor2_shape: kernel.shape().to_vec(),
        };
        if self.dimension() == 0 || kernel.dimension() != 2 {
            return Err(op_err());
        }
        let k = self.shape()[self.dimension() - 1];
        let (kk, n) = (kernel.shape()[0], kernel.shape()[1]);
        if k != kk {
            return Err(op_err());
        }
        let rows = self.size() / k.max(1);
        let lhs = Array2::from_shape_vec((rows, k), self.data_as_slice()).map_err(|_| op_err())?;
        let rhs = Array2::from_shape_vec((kk, n), kernel.data_as_slice()).map_err(|_| op_err())?;
        let product = lhs.dot(&rhs);

        let mut out_shape = self.shape().to_vec();
        if let Some(last) = out_shape.last_mut() {
            *last = n;
        }
        let data = product
            .into_shape(IxDyn(&out_shape))
            .map_err(|_| op_err())?;
        Ok(self.with_same_meta(data))
    }

    /// 支持广播的逐元素相加
    pub fn add(&self, other: &Self) -> Result<Self, TensorError> {
        let lhs = &self.data;
        let rhs = &other.data;
        if let Some(rhs_view) = rhs.broadcast(lhs.raw_dim()) {
            return Ok(self.with_same_meta(lhs + &rhs_view));
        }
        if let Some(lhs_view) = lhs.broadcast(rhs.raw_dim()) {
            return Ok(self.with_same_meta(&lhs_view + rhs));
        }
        Err(TensorError::OperatorError {
            operator: Operator::Add,
            tensor1_shape: self.shape().to_vec(),
            tensor2_shape: other.shape().to_vec(),
        })
    }

    pub fn scale(&self, factor: f32) -> Self {
        self.with_same_meta(self.data.mapv(|x| x * factor))
    }

    /// 逐元素相乘（形状须严格一致）
    pub fn mul_elementwise(&self, other: &Self) -> Result<Self, TensorError> {
        if !self.is_same_shape(other) {
            return Err(TensorError::IncompatibleShape);
        }
        Ok(self.with_same_meta(&self.data * &other.data))
    }

    pub fn relu(&self) -> Self {
        self.with_same_meta(self.data.mapv(|x| x.max(0.)))
    }

    pub fn sigmoid(&self) -> Self {
        self.with_same_meta(self.data.mapv(|x| 1. / (1. + (-x).exp())))
    }

    pub fn tanh(&self) -> Self {
        self.with_same_meta(self.data.mapv(f32::tanh))
    }

    /// 沿指定轴做数值稳定的 softmax
    pub fn softmax(&self, axis: isize) -> Result<Self, TensorError> {
        let axis = self.normalize_axis(axis)?;
        let mut data = self.data.clone();
        for mut lane in data.lanes_mut(Axis(axis)) {
            let max = lane.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
            lane.mapv_inplace(|x| (x - max).exp());
            let sum = lane.sum();
            lane.mapv_inplace(|x| x / sum);
        }
        Ok(self.with_same_meta(data))
    }

    /// 去掉长度为1的最后一维
    pub fn squeeze_last(&self) -> Result<Self, TensorError> {
        match self.shape().last() {
            Some(1) => {
                let last = self.dimension() - 1;
                Ok(self.with_same_meta(self.data.index_axis(Axis(last), 0).to_owned()))
            }
            _ => Err(TensorError::IncompatibleShape),
        }
    }

    /// 在末尾追加一个长度为1的维度
    pub fn expand_last(&self) -> Self {
        let rank = self.dimension();
        self.with_same_meta(self.data.clone().insert_axis(Axis(rank)))
    }

    /// 沿指定轴拼接多个张量
    pub fn concatenate(tensors: &[&Self], axis: isize) -> Result<Self, TensorError> {
        let first = tensors.first().ok_or(TensorError::EmptyList)?;
        let axis = first.normalize_axis(axis)?;
        let views = tensors.iter().map(|t| t.data.view()).collect::<Vec<_>>();
        let data = ndarray::concatenate(Axis(axis), &views).map_err(|_| {
            TensorError::OperatorError {
                operator: Operator::Concat,
                tensor1_shape: first.shape().to_vec(),
                tensor2_shape: tensors
                    .iter()
                    .find(|t| !t.is_same_shape(first))
                    .map(|t| t.shape().to_vec())
                    .unwrap_or_default(),
            }
        })?;
        Ok(first.with_same_meta(data))
    }
}
