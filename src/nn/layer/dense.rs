/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : Dense (全连接) 层
 */

use super::activation::parse_activation;
use super::{base_config, config_dtype, config_str, single_input, ActivationKind, Layer, LayerError};
use crate::nn::graph::{CallArguments, TensorSpec};
use crate::saving::{SavingError, Trackable, VarsGroup};
use crate::tensor::{DType, Tensor};
use crate::utils::Nest;
use rand::rngs::StdRng;
use serde_json::Value;

/// Dense (全连接) 层：`output = activation(x @ kernel + bias)`
///
/// # 输入/输出形状
/// - 输入：[..., input_dim]
/// - 输出：[..., units]
///
/// # 变量
/// 保存时按创建顺序命名：`"0"`为 kernel [input_dim, units]，`"1"`为 bias [units]。
///
/// # 使用示例
/// ```ignore
/// let x = graph.input(&[4], None)?;
/// let y = graph.add_layer(Dense::new(3).with_activation(ActivationKind::Relu))?.call_single(&x)?;
/// ```
pub struct Dense {
    name: String,
    trainable: bool,
    dtype: DType,
    units: usize,
    activation: ActivationKind,
    use_bias: bool,
    /// 权重参数 [input_dim, units]，构建后才存在
    kernel: Option<Tensor>,
    /// 偏置参数 [units]
    bias: Option<Tensor>,
}

impl Dense {
    pub fn new(units: usize) -> Self {
        Self {
            name: String::new(),
            trainable: true,
            dtype: DType::Float32,
            units,
            activation: ActivationKind::Linear,
            use_bias: true,
            kernel: None,
            bias: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub const fn with_activation(mut self, activation: ActivationKind) -> Self {
        self.activation = activation;
        self
    }

    pub const fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub const fn units(&self) -> usize {
        self.units
    }

    pub const fn activation(&self) -> ActivationKind {
        self.activation
    }

    pub const fn kernel(&self) -> Option<&Tensor> {
        self.kernel.as_ref()
    }

    pub const fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn from_config(config: &Value) -> Result<Self, LayerError> {
        let name = config_str(config, "name").unwrap_or_default().to_string();
        let units = config
            .get("units")
            .and_then(Value::as_u64)
            .filter(|&u| u > 0)
            .ok_or_else(|| LayerError::invalid_config(&name, "units 须为正整数"))?;
        Ok(Self {
            units: units as usize,
            activation: parse_activation(config, &name)?,
            use_bias: config.get("use_bias").and_then(Value::as_bool).unwrap_or(true),
            trainable: config.get("trainable").and_then(Value::as_bool).unwrap_or(true),
            dtype: config_dtype(config, &name)?,
            name,
            kernel: None,
            bias: None,
        })
    }

    /// 按创建顺序排列的变量
    fn variables(&self) -> Vec<&Tensor> {
        self.kernel.iter().chain(self.bias.iter()).collect()
    }
}

impl Trackable for Dense {
    fn class_name(&self) -> &'static str {
        "Dense"
    }

    fn save_own_variables(&self, store: &mut VarsGroup) -> Result<(), SavingError> {
        for (i, variable) in self.variables().into_iter().enumerate() {
            store.insert(i.to_string(), variable.to_array());
        }
        Ok(())
    }

    fn load_own_variables(&mut self, store: &VarsGroup) -> Result<(), SavingError> {
        let expected = self.variables().len();
        if store.len() != expected {
            return Err(SavingError::VariableCountMismatch {
                layer: self.name.clone(),
                expected,
                received: store.len(),
                names: (0..expected).map(|i| i.to_string()).collect(),
            });
        }
        let slots = [&mut self.kernel, &mut self.bias];
        for (i, slot) in slots.into_iter().enumerate() {
            let Some(current) = slot.as_mut() else {
                continue;
            };
            let key = i.to_string();
            let value = store.get(&key).ok_or_else(|| SavingError::VariableCountMismatch {
                layer: self.name.clone(),
                expected,
                received: store.len(),
                names: (0..expected).map(|i| i.to_string()).collect(),
            })?;
            if value.shape() != current.shape() {
                return Err(SavingError::VariableShapeMismatch {
                    layer: self.name.clone(),
                    variable: key,
                    expected: current.shape().to_vec(),
                    got: value.shape().to_vec(),
                });
            }
            *current = Tensor::from_array(value.clone());
        }
        Ok(())
    }
}

impl Layer for Dense {
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
        self.kernel.is_some()
    }

    fn build(
        &mut self,
        inputs: &CallArguments<TensorSpec>,
        rng: &mut StdRng,
    ) -> Result<(), LayerError> {
        let spec = single_input(&self.name, inputs)?;
        let input_dim = spec.last_dim().ok_or_else(|| {
            LayerError::invalid_input(&self.name, format!("输入{spec}的最后一维必须已知"))
        })?;
        // Glorot 均匀初始化
        let limit = (6. / (input_dim + self.units) as f32).sqrt();
        self.kernel = Some(Tensor::uniform_with_rng(-limit, limit, &[input_dim, self.units], rng));
        self.bias = self.use_bias.then(|| Tensor::zeros(&[self.units]));
        Ok(())
    }

    fn compute_output_spec(
        &self,
        inputs: &CallArguments<TensorSpec>,
    ) -> Result<Nest<TensorSpec>, LayerError> {
        let spec = single_input(&self.name, inputs)?;
        if spec.rank() == 0 {
            return Err(LayerError::invalid_input(&self.name, "输入至少为1阶"));
        }
        if let (Some(kernel), Some(dim)) = (&self.kernel, spec.last_dim()) {
            if kernel.shape()[0] != dim {
                return Err(LayerError::invalid_input(
                    &self.name,
                    format!("输入的最后一维应为{}，实际为{dim}", kernel.shape()[0]),
                ));
            }
        }
        let mut shape = spec.shape.clone();
        if let Some(last) = shape.last_mut() {
            *last = Some(self.units);
        }
        Ok(Nest::Leaf(TensorSpec::new(shape, self.dtype)))
    }

    fn call(
        &self,
        inputs: &CallArguments<Tensor>,
        _training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError> {
        let x = single_input(&self.name, inputs)?;
        let kernel = self.kernel.as_ref().ok_or_else(|| LayerError::NotBuilt(self.name.clone()))?;
        let mut y = x.matmul_last(kernel)?;
        if let Some(bias) = &self.bias {
            y = y.add(bias)?;
        }
        Ok(Nest::Leaf(self.activation.apply(&y)?))
    }

    fn get_config(&self) -> Result<Value, LayerError> {
        let mut config = base_config(&self.name, self.trainable, self.dtype);
        config.insert("units".to_string(), Value::from(self.units));
        config.insert("activation".to_string(), Value::from(self.activation.as_str()));
        config.insert("use_bias".to_string(), Value::from(self.use_bias));
        Ok(Value::Object(config))
    }

    fn softmax_axis(&self) -> Option<isize> {
        (self.activation == ActivationKind::Softmax).then_some(-1)
    }

    fn count_params(&self) -> usize {
        self.variables().iter().map(|v| v.size()).sum()
    }
}
