/*
 * @Author       : 老董
 * @Date         : 2026-02-12
 * @Description  : Layer 模块：图中的操作（operation）
 *
 * 每个层既能对符号张量调用（记录为图中的节点，只推导输出规格），
 * 也能对真实张量调用（执行计算）。层本身不持有图，
 * 由 `Graph` 统一登记，并以 `LayerRef` 共享。
 *
 * 这里只提供构建和执行函数式模型所需的少量内置层。
 */

mod activation;
mod dense;
mod dropout;
mod error;
mod input_layer;
mod merge;

pub use activation::{Activation, ActivationKind, Softmax};
pub use dense::Dense;
pub use dropout::Dropout;
pub use error::LayerError;
pub use input_layer::InputLayer;
pub use merge::{Add, Concatenate};

use crate::nn::graph::{CallArguments, TensorSpec};
use crate::nn::Functional;
use crate::saving::Trackable;
use crate::tensor::{DType, Tensor};
use crate::utils::Nest;
use rand::rngs::StdRng;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// 图中的操作
pub trait Layer: Trackable {
    fn name(&self) -> &str;

    /// 由图在登记时为未命名的层分配名称
    fn set_name(&mut self, name: String);

    fn trainable(&self) -> bool {
        true
    }

    fn is_built(&self) -> bool;

    /// 首次被调用时根据输入规格创建变量
    fn build(
        &mut self,
        _inputs: &CallArguments<TensorSpec>,
        _rng: &mut StdRng,
    ) -> Result<(), LayerError> {
        Ok(())
    }

    /// 符号调用：由输入规格推导输出规格
    fn compute_output_spec(
        &self,
        inputs: &CallArguments<TensorSpec>,
    ) -> Result<Nest<TensorSpec>, LayerError>;

    /// 真实调用。`training`只会传给`call_has_training_arg()`为真的层
    fn call(
        &self,
        inputs: &CallArguments<Tensor>,
        training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError>;

    /// 调用是否接收`training`参数（如 Dropout）
    fn call_has_training_arg(&self) -> bool {
        false
    }

    /// 为真时，若输出没有掩码，则沿用第一个输入的掩码
    fn supports_masking(&self) -> bool {
        false
    }

    /// 配置中的`module`字段
    fn module(&self) -> &'static str {
        "keras.layers"
    }

    /// 自定义层在注册表中的名称（如`my_package>MyLayer`）；内置层为 None
    fn registered_name(&self) -> Option<String> {
        None
    }

    fn get_config(&self) -> Result<Value, LayerError>;

    /// 自带激活（如 Dense）为 softmax 时返回其作用的轴，用于检查模型的输出层
    fn softmax_axis(&self) -> Option<isize> {
        None
    }

    fn count_params(&self) -> usize {
        0
    }

    /// 源操作（InputLayer）的输出规格；登记时据此直接创建源节点
    fn source_spec(&self) -> Option<TensorSpec> {
        None
    }

    fn as_functional(&self) -> Option<&Functional> {
        None
    }
}

/// 层的共享引用。同一个层可在多个节点（多次调用）中共享
pub type LayerRef = Rc<RefCell<dyn Layer>>;

pub fn layer_ref<L: Layer + 'static>(layer: L) -> LayerRef {
    Rc::new(RefCell::new(layer))
}

/// 层实例的身份（地址），用于判断是否为同一个共享实例
pub(crate) fn layer_addr(layer: &LayerRef) -> usize {
    Rc::as_ptr(layer).cast::<()>() as usize
}

// ========== 供各内置层使用的辅助函数 ==========

/// 所有层共有的配置项
pub(crate) fn base_config(name: &str, trainable: bool, dtype: DType) -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("name".to_string(), Value::from(name));
    config.insert("trainable".to_string(), Value::from(trainable));
    config.insert("dtype".to_string(), Value::from(dtype.as_str()));
    config
}

/// 从配置读取可选的字符串字段
pub(crate) fn config_str<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

pub(crate) fn config_dtype(config: &Value, layer: &str) -> Result<DType, LayerError> {
    match config.get("dtype") {
        None | Some(Value::Null) => Ok(DType::default()),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|e: String| LayerError::invalid_config(layer, e)),
        // 形如 {"class_name": "DTypePolicy", "config": {"name": "float32"}} 的策略对象
        Some(policy) => policy
            .pointer("/config/name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LayerError::invalid_config(layer, format!("无法识别的 dtype：{policy}"))
            })?
            .parse()
            .map_err(|e: String| LayerError::invalid_config(layer, e)),
    }
}

/// 第一个位置参数须恰为单个张量
pub(crate) fn single_input<'a, T>(
    layer: &str,
    inputs: &'a CallArguments<T>,
) -> Result<&'a T, LayerError> {
    inputs
        .single_tensor()
        .ok_or_else(|| LayerError::invalid_input(layer, "应接收单个张量"))
}

/// 第一个位置参数须为至少两个张量的列表
pub(crate) fn list_input<'a, T>(
    layer: &str,
    inputs: &'a CallArguments<T>,
) -> Result<Vec<&'a T>, LayerError> {
    let tensors = inputs.first_tensors();
    if !matches!(inputs.first(), Some(Nest::List(_))) || tensors.len() < 2 {
        return Err(LayerError::invalid_input(
            layer,
            format!("应接收至少两个张量组成的列表，实际得到{}个张量", tensors.len()),
        ));
    }
    Ok(tensors)
}
