/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : Dropout 层（仅训练时生效的反向缩放随机丢弃）
 */

use super::{base_config, config_dtype, config_str, single_input, Layer, LayerError};
use crate::nn::graph::{CallArguments, TensorSpec};
use crate::saving::Trackable;
use crate::tensor::{DType, Tensor};
use crate::utils::Nest;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::cell::RefCell;

/// 训练时以概率`rate`将元素置零，并把保留的元素放大`1 / (1 - rate)`；推理时原样输出
pub struct Dropout {
    name: String,
    trainable: bool,
    dtype: DType,
    rate: f32,
    seed: Option<u64>,
    built: bool,
    rng: RefCell<StdRng>,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self {
            name: String::new(),
            trainable: true,
            dtype: DType::Float32,
            rate,
            seed: None,
            built: false,
            rng: RefCell::new(StdRng::seed_from_u64(0)),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 固定种子，使丢弃模式可复现
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.rng = RefCell::new(StdRng::seed_from_u64(seed));
        self
    }

    pub const fn rate(&self) -> f32 {
        self.rate
    }

    pub fn from_config(config: &Value) -> Result<Self, LayerError> {
        let name = config_str(config, "name").unwrap_or_default().to_string();
        let rate = config
            .get("rate")
            .and_then(Value::as_f64)
            .filter(|r| (0. ..=1.).contains(r))
            .ok_or_else(|| LayerError::invalid_config(&name, "rate 须在[0, 1]内"))?;
        let mut layer = Self::new(rate as f32);
        if let Some(seed) = config.get("seed").and_then(Value::as_u64) {
            layer = layer.with_seed(seed);
        }
        layer.trainable = config.get("trainable").and_then(Value::as_bool).unwrap_or(true);
        layer.dtype = config_dtype(config, &name)?;
        layer.name = name;
        Ok(layer)
    }
}

impl Trackable for Dropout {
    fn class_name(&self) -> &'static str {
        "Dropout"
    }
}

impl Layer for Dropout {
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
        self.built
    }

    /// 未指定种子时从图的随机数生成器派生
    fn build(
        &mut self,
        _inputs: &CallArguments<TensorSpec>,
        rng: &mut StdRng,
    ) -> Result<(), LayerError> {
        if self.seed.is_none() {
            self.rng = RefCell::new(StdRng::seed_from_u64(rng.r#gen()));
        }
        self.built = true;
        Ok(())
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
        training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError> {
        let x = single_input(&self.name, inputs)?;
        if training != Some(true) || self.rate <= 0. {
            return Ok(Nest::Leaf(x.clone()));
        }
        if self.rate >= 1. {
            return Ok(Nest::Leaf(x.scale(0.)));
        }
        let keep_prob = 1. - self.rate;
        let noise = Tensor::uniform_with_rng(0., 1., x.shape(), &mut self.rng.borrow_mut());
        let keep = noise.view().mapv(|u| if u < keep_prob { 1. / keep_prob } else { 0. });
        Ok(Nest::Leaf(x.mul_elementwise(&Tensor::from_array(keep))?))
    }

    fn call_has_training_arg(&self) -> bool {
        true
    }

    fn supports_masking(&self) -> bool {
        true
    }

    fn get_config(&self) -> Result<Value, LayerError> {
        let mut config = base_config(&self.name, self.trainable, self.dtype);
        config.insert("rate".to_string(), Value::from(f64::from(self.rate)));
        config.insert("seed".to_string(), self.seed.map_or(Value::Null, Value::from));
        Ok(Value::Object(config))
    }
}
