/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : InputLayer：模型输入的源操作
 */

use super::{config_dtype, config_str, single_input, Layer, LayerError};
use crate::nn::graph::{CallArguments, TensorSpec};
use crate::saving::Trackable;
use crate::tensor::Tensor;
use crate::utils::Nest;
use serde_json::{Map, Value};

/// 源操作：没有输入，唯一的（第0个）节点在登记到图时即创建，输出规格即`batch_shape`
pub struct InputLayer {
    name: String,
    spec: TensorSpec,
}

impl InputLayer {
    /// `shape`不含批维
    pub fn new(shape: &[usize]) -> Self {
        Self::from_spec(TensorSpec::with_batch(shape))
    }

    pub const fn from_spec(spec: TensorSpec) -> Self {
        Self {
            name: String::new(),
            spec,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub const fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    pub fn from_config(config: &Value) -> Result<Self, LayerError> {
        let name = config_str(config, "name").unwrap_or_default().to_string();
        let raw_shape = config
            .get("batch_shape")
            .or_else(|| config.get("batch_input_shape"))
            .and_then(Value::as_array)
            .ok_or_else(|| LayerError::invalid_config(&name, "缺少 batch_shape"))?;
        let shape = raw_shape
            .iter()
            .map(|d| match d {
                Value::Null => Ok(None),
                d => d
                    .as_u64()
                    .map(|d| Some(d as usize))
                    .ok_or_else(|| LayerError::invalid_config(&name, format!("无效的维度：{d}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut spec = TensorSpec::new(shape, config_dtype(config, &name)?);
        spec.sparse = config.get("sparse").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self { name, spec })
    }
}

impl Trackable for InputLayer {
    fn class_name(&self) -> &'static str {
        "InputLayer"
    }
}

impl Layer for InputLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn is_built(&self) -> bool {
        true
    }

    fn compute_output_spec(
        &self,
        _inputs: &CallArguments<TensorSpec>,
    ) -> Result<Nest<TensorSpec>, LayerError> {
        Ok(Nest::Leaf(self.spec.clone()))
    }

    /// 直接返回输入
    fn call(
        &self,
        inputs: &CallArguments<Tensor>,
        _training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError> {
        Ok(Nest::Leaf(single_input(&self.name, inputs)?.clone()))
    }

    fn get_config(&self) -> Result<Value, LayerError> {
        let mut config = Map::new();
        config.insert("batch_shape".to_string(), serde_json::to_value(&self.spec.shape)?);
        config.insert("dtype".to_string(), Value::from(self.spec.dtype.as_str()));
        config.insert("sparse".to_string(), Value::from(self.spec.sparse));
        config.insert("name".to_string(), Value::from(self.name.as_str()));
        Ok(Value::Object(config))
    }

    fn source_spec(&self) -> Option<TensorSpec> {
        Some(self.spec.clone())
    }
}

