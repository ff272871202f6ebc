/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : 激活函数，以及 Activation / Softmax 层
 */

use super::{base_config, config_dtype, config_str, single_input, Layer, LayerError};
use crate::errors::TensorError;
use crate::nn::graph::{CallArguments, TensorSpec};
use crate::saving::Trackable;
use crate::tensor::{DType, Tensor};
use crate::utils::Nest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 激活函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl ActivationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
        }
    }

    /// softmax 作用于最后一维
    pub fn apply(&self, x: &Tensor) -> Result<Tensor, TensorError> {
        Ok(match self {
            Self::Linear => x.clone(),
            Self::Relu => x.relu(),
            Self::Sigmoid => x.sigmoid(),
            Self::Tanh => x.tanh(),
            Self::Softmax => x.softmax(-1)?,
        })
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActivationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" | "" => Ok(Self::Linear),
            "relu" => Ok(Self::Relu),
            "sigmoid" => Ok(Self::Sigmoid),
            "tanh" => Ok(Self::Tanh),
            "softmax" => Ok(Self::Softmax),
            other => Err(format!("未知的激活函数：{other}")),
        }
    }
}

/// 配置中的激活函数：字符串，或`{"class_name": ..., "config": ...}`形式的对象
pub(crate) fn parse_activation(config: &Value, layer: &str) -> Result<ActivationKind, LayerError> {
    let name = match config.get("activation") {
        None | Some(Value::Null) => return Ok(ActivationKind::Linear),
        Some(Value::String(s)) => s.as_str(),
        Some(other) => other
            .get("config")
            .and_then(|c| config_str(c, "name"))
            .or_else(|| config_str(other, "class_name"))
            .unwrap_or_default(),
    };
    name.parse().map_err(|e: String| LayerError::invalid_config(layer, e))
}

// ========== Activation ==========

/// 对输入逐元素施加激活函数
pub struct Activation {
    name: String,
    trainable: bool,
    dtype: DType,
    activation: ActivationKind,
}

impl Activation {
    pub fn new(activation: ActivationKind) -> Self {
        Self {
            name: String::new(),
            trainable: true,
            dtype: DType::Float32,
            activation,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub const fn activation(&self) -> ActivationKind {
        self.activation
    }

    pub fn from_config(config: &Value) -> Result<Self, LayerError> {
        let name = config_str(config, "name").unwrap_or_default().to_string();
        Ok(Self {
            activation: parse_activation(config, &name)?,
            trainable: config.get("trainable").and_then(Value::as_bool).unwrap_or(true),
            dtype: config_dtype(config, &name)?,
            name,
        })
    }
}

impl Trackable for Activation {
    fn class_name(&self) -> &'static str {
        "Activation"
    }
}

impl Layer for Activation {
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
        Ok(Nest::Leaf(single_input(&self.name, inputs)?.clone()))
    }

    fn call(
        &self,
        inputs: &CallArguments<Tensor>,
        _training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError> {
        let x = single_input(&self.name, inputs)?;
        Ok(Nest::Leaf(self.activation.apply(x)?))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn get_config(&self) -> Result<Value, LayerError> {
        let mut config = base_config(&self.name, self.trainable, self.dtype);
        config.insert("activation".to_string(), Value::from(self.activation.as_str()));
        Ok(Value::Object(config))
    }
}

// ========== Softmax ==========

/// 沿指定轴做 softmax
pub struct Softmax {
    name: String,
    trainable: bool,
    dtype: DType,
    axis: isize,
}

impl Softmax {
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
        // 旧配置中 axis 可能是列表，只取第一个
        let axis = match config.get("axis") {
            None | Some(Value::Null) => -1,
            Some(Value::Array(axes)) => axes.first().and_then(Value::as_i64).unwrap_or(-1),
            Some(axis) => axis
                .as_i64()
                .ok_or_else(|| LayerError::invalid_config(&name, format!("无效的 axis：{axis}")))?,
        };
        Ok(Self {
            axis: axis as isize,
            trainable: config.get("trainable").and_then(Value::as_bool).unwrap_or(true),
            dtype: config_dtype(config, &name)?,
            name,
        })
    }
}

impl Trackable for Softmax {
    fn class_name(&self) -> &'static str {
        "Softmax"
    }
}

impl Layer for Softmax {
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
        Ok(Nest::Leaf(single_input(&self.name, inputs)?.clone()))
    }

    fn call(
        &self,
        inputs: &CallArguments<Tensor>,
        _training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError> {
        let x = single_input(&self.name, inputs)?;
        Ok(Nest::Leaf(x.softmax(self.axis)?))
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn get_config(&self) -> Result<Value, LayerError> {
        let mut config = base_config(&self.name, self.trainable, self.dtype);
        config.insert("axis".to_string(), Value::from(self.axis as i64));
        Ok(Value::Object(config))
    }
}
