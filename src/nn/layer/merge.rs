/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 合并层：Add（逐元素相加）、Concatenate（拼接）
 */

use super::{base_config, config_dtype, config_str, list_input, Layer, LayerError};
use crate::nn::graph::{CallArguments, TensorSpec};
use crate::saving::Trackable;
use crate::tensor::{DType, Tensor};
use crate::utils::Nest;
use serde_json::Value;

/// 逐元素运算的输出形状（从右对齐，长度为1的维度可广播，未知维度保持未知）
fn elementwise_merge_shape(
    layer: &str,
    a: &[Option<usize>],
    b: &[Option<usize>],
) -> Result<Vec<Option<usize>>, LayerError> {
    let (longer, shorter) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let offset = longer.len() - shorter.len();
    let mut shape = longer[..offset].to_vec();
    for (&x, &y) in longer[offset..].iter().zip(shorter) {
        let dim = match (x, y) {
            (None, _) | (_, None) => None,
            (Some(1), y) => y,
            (x, Some(1)) => x,
            (Some(x), Some(y)) if x == y => Some(x),
            (Some(x), Some(y)) => {
                return Err(LayerError::invalid_input(
                    layer,
                    format!("输入形状不兼容：{a:?}与{b:?}（维度{x}与{y}）"),
                ));
            }
        };
        shape.push(dim);
    }
    Ok(shape)
}

// ========== Add ==========

/// 对列表中的所有张量逐元素相加
pub struct Add {
    name: String,
    trainable: bool,
    dtype: DType,
}

impl Add {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            trainable: true,
            dtype: DType::Float32,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn from_config(config: &Value) -> Result<Self, LayerError> {
        let name = config_str(config, "name").unwrap_or_default().to_string();
        Ok(Self {
            trainable: config.get("trainable").and_then(Value::as_bool).unwrap_or(true),
            dtype: config_dtype(config, &name)?,
            name,
        })
    }
}

impl Default for Add {
    fn default() -> Self {
        Self::new()
    }
}

impl Trackable for Add {
    fn class_name(&self) -> &'static str {
        "Add"
    }
}

impl Layer for Add {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn trainable(&self) -> bool {
        self.trainable
    }

    fn is_built(&self) -> bool {
        true
    }

    fn compute_output_spec(
        &self,
        inputs: &CallArguments<TensorSpec>,
    ) -> Result<Nest<TensorSpec>, LayerError> {
        let specs = list_input(&self.name, inputs)?;
        let mut shape = specs[0].shape.clone();
        for spec in &specs[1..] {
            shape = elementwise_merge_shape(&self.name, &shape, &spec.shape)?;
        }
        Ok(Nest::Leaf(TensorSpec::new(shape, specs[0].dtype)))
    }

    fn call(
        &self,
        inputs: &CallArguments<Tensor>,
        _training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError> {
        let tensors = list_input(&self.name, inputs)?;
        let mut sum = tensors[0].clone();
        for t in &tensors[1..] {
            sum = sum.add(t)?;
        }
        Ok(Nest::Leaf(sum))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn get_config(&self) -> Result<Value, LayerError> {
        Ok(Value::Object(base_config(&self.name, self.trainable, self.dtype)))
    }
}

// ========== Concatenate ==========

/// 沿指定轴拼接列表中的张量
pub struct Concatenate {
    name: String,
    trainable: bool,
    dtype: DType,
    axis: isize,
}

impl Concatenate {
    pub fn new(axis: isize) -> Self {
        Self {
            name: String::new(),
            trainable: true,
            dtype: DType::Float32,
            axis,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn from_config(config: &Value) -> Result<Self, LayerError> {
        let name = config_str(config, "name").unwrap_or_default().to_string();
        Ok(Self {
            axis: config.get("axis").and_then(Value::as_i64).unwrap_or(-1) as isize,
            trainable: config.get("trainable").and_then(Value::as_bool).unwrap_or(true),
            dtype: config_dtype(config, &name)?,
            name,
        })
    }

    fn resolve_axis(&self, rank: usize) -> Result<usize, LayerError> {
        let axis = if self.axis < 0 { rank as isize + self.axis } else { self.axis };
        if axis < 0 || axis as usize >= rank {
            return Err(LayerError::invalid_input(
                &self.name,
                format!("轴{}超出了输入阶数{rank}的范围", self.axis),
            ));
        }
        Ok(axis as usize)
    }
}

impl Trackable for Concatenate {
    fn class_name(&self) -> &'static str {
        "Concatenate"
    }
}

impl Layer for Concatenate {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn trainable(&self) -> bool {
        self.trainable
    }

    fn is_built(&self) -> bool {
        true
    }

    fn compute_output_spec(
        &self,
        inputs: &CallArguments<TensorSpec>,
    ) -> Result<Nest<TensorSpec>, LayerError> {
        let specs = list_input(&self.name, inputs)?;
        let rank = specs[0].rank();
        let axis = self.resolve_axis(rank)?;
        let mut shape = specs[0].shape.clone();
        for spec in &specs[1..] {
            if spec.rank() != rank {
                return Err(LayerError::invalid_input(&self.name, "所有输入的阶数必须相同"));
            }
            for (i, (merged, &dim)) in shape.iter_mut().zip(&spec.shape).enumerate() {
                if i == axis {
                    *merged = merged.zip(dim).map(|(a, b)| a + b);
                    continue;
                }
                match (*merged, dim) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(LayerError::invalid_input(
                            &self.name,
                            format!(
                                "除拼接轴外其余维度必须一致：{:?}与{:?}",
                                specs[0].shape, spec.shape
                            ),
                        ));
                    }
                    (None, b) => *merged = b,
                    _ => {}
                }
            }
        }
        Ok(Nest::Leaf(TensorSpec::new(shape, specs[0].dtype)))
    }

    fn call(
        &self,
        inputs: &CallArguments<Tensor>,
        _training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError> {
        let tensors = list_input(&self.name, inputs)?;
        Ok(Nest::Leaf(Tensor::concatenate(&tensors, self.axis)?))
    }

    fn get_config(&self) -> Result<Value, LayerError> {
        let mut config = base_config(&self.name, self.trainable, self.dtype);
        config.insert("axis".to_string(), Value::from(self.axis as i64));
        Ok(Value::Object(config))
    }
}
