/*
 * @Author       : 老董
 * @Date         : 2026-02-13
 * @Description  : 层/模型配置的（反）序列化
 *
 * 序列化结果形如：
 * `{"module": "keras.layers", "class_name": "Dense", "config": {...}, "registered_name": null}`
 *
 * 同一个层实例若在一次序列化中出现多次（如同时出现在外层模型和嵌套模型中），
 * 各处都带上相同的 `shared_object_id`，反序列化时解析为同一个实例。
 * 共享状态由显式传递的上下文持有，而不是全局作用域。
 */

pub mod codec;
mod error;

pub use error::SerializationError;

use crate::nn::layer::{
    layer_addr, layer_ref, Activation, Add, Concatenate, Dense, Dropout, InputLayer, Layer, Softmax,
};
use crate::nn::{functional_from_config, Functional, LayerRef};
use serde_json::{json, Value};
use std::collections::HashMap;

// ========== 序列化 ==========

/// 一次序列化过程的上下文
#[derive(Debug, Default)]
pub struct SerializationContext {
    /// 层实例地址 -> 共享 ID（按首次出现的先后编号）
    ids: HashMap<usize, u64>,
    /// 共享 ID -> 出现次数
    counts: HashMap<u64, usize>,
}

impl SerializationContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn shared_id(&mut self, addr: usize) -> u64 {
        let next = self.ids.len() as u64;
        let id = *self.ids.entry(addr).or_insert(next);
        *self.counts.entry(id).or_insert(0) += 1;
        id
    }

    /// 序列化一个共享的层（嵌套模型按其完整配置递归序列化）
    pub fn serialize_layer(&mut self, layer: &LayerRef) -> Result<Value, SerializationError> {
        let id = self.shared_id(layer_addr(layer));
        let borrowed = layer
            .try_borrow()
            .map_err(|_| SerializationError::LayerBusy(format!("#{id}")))?;
        let mut value = self.serialize_object(&*borrowed)?;
        value["shared_object_id"] = Value::from(id);
        Ok(value)
    }

    /// 序列化一个（不被共享的）层或模型
    pub fn serialize_object(&mut self, layer: &dyn Layer) -> Result<Value, SerializationError> {
        let config = match layer.as_functional() {
            Some(model) => model.get_config_with(self)?,
            None => layer.get_config()?,
        };
        Ok(json!({
            "module": layer.module(),
            "class_name": layer.class_name(),
            "config": config,
            "registered_name": layer.registered_name(),
        }))
    }

    /// 结束序列化：去掉只出现过一次的`shared_object_id`
    pub fn finish(self, mut value: Value) -> Value {
        strip_unshared_ids(&mut value, &self.counts);
        value
    }
}

fn strip_unshared_ids(value: &mut Value, counts: &HashMap<u64, usize>) {
    match value {
        Value::Object(items) => {
            let unshared = items
                .get("shared_object_id")
                .and_then(Value::as_u64)
                .is_some_and(|id| counts.get(&id).copied().unwrap_or(0) <= 1);
            if unshared {
                items.remove("shared_object_id");
            }
            items.values_mut().for_each(|x| strip_unshared_ids(x, counts));
        }
        Value::Array(items) => items.iter_mut().for_each(|x| strip_unshared_ids(x, counts)),
        _ => {}
    }
}

/// 以新的上下文序列化一个模型
pub fn serialize_model(model: &Functional) -> Result<Value, SerializationError> {
    let mut ctx = SerializationContext::new();
    let value = ctx.serialize_object(model)?;
    Ok(ctx.finish(value))
}

// ========== 注册表 ==========

/// 由配置（`config`字段）构造层
pub type LayerFactory =
    fn(&Value, &mut DeserializationContext<'_>) -> Result<LayerRef, SerializationError>;

#[derive(Clone, Copy)]
struct RegistryEntry {
    factory: LayerFactory,
    /// 为假时仅在关闭安全模式后才能反序列化
    safe: bool,
}

/// 类名（或自定义层的注册名）-> 构造函数
#[derive(Clone)]
pub struct LayerRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl Default for LayerRegistry {
    /// 已包含所有内置层
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("InputLayer", |config, _| Ok(layer_ref(InputLayer::from_config(config)?)))
            .register("Dense", |config, _| Ok(layer_ref(Dense::from_config(config)?)))
            .register("Activation", |config, _| Ok(layer_ref(Activation::from_config(config)?)))
            .register("Softmax", |config, _| Ok(layer_ref(Softmax::from_config(config)?)))
            .register("Add", |config, _| Ok(layer_ref(Add::from_config(config)?)))
            .register("Concatenate", |config, _| Ok(layer_ref(Concatenate::from_config(config)?)))
            .register("Dropout", |config, _| Ok(layer_ref(Dropout::from_config(config)?)))
            .register("Functional", |config, ctx| {
                Ok(layer_ref(functional_from_config(config, ctx)?))
            });
        registry
    }
}

impl LayerRegistry {
    /// 不含任何层的注册表
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// 注册（或覆盖）一个层
    pub fn register(&mut self, name: impl Into<String>, factory: LayerFactory) -> &mut Self {
        self.entries
            .insert(name.into(), RegistryEntry { factory, safe: true });
        self
    }

    /// 注册一个可能执行任意代码的层（如 Lambda），只有关闭安全模式时才能反序列化
    pub fn register_unsafe(&mut self, name: impl Into<String>, factory: LayerFactory) -> &mut Self {
        self.entries
            .insert(name.into(), RegistryEntry { factory, safe: false });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<RegistryEntry> {
        self.entries.get(name).copied()
    }
}

// ========== 反序列化 ==========

/// 一次反序列化过程的上下文
pub struct DeserializationContext<'a> {
    registry: &'a LayerRegistry,
    /// 共享 ID -> 已创建的实例
    shared: HashMap<u64, LayerRef>,
    safe_mode: bool,
}

impl<'a> DeserializationContext<'a> {
    pub fn new(registry: &'a LayerRegistry, safe_mode: bool) -> Self {
        Self {
            registry,
            shared: HashMap::new(),
            safe_mode,
        }
    }

    pub const fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    /// 由`{"class_name", "config", ...}`创建层；相同的`shared_object_id`得到同一个实例
    pub fn deserialize_layer(&mut self, value: &Value) -> Result<LayerRef, SerializationError> {
        let shared_id = value.get("shared_object_id").and_then(Value::as_u64);
        if let Some(existing) = shared_id.and_then(|id| self.shared.get(&id)) {
            return Ok(existing.clone());
        }

        let class_name = value
            .get("class_name")
            .and_then(Value::as_str)
            .ok_or_else(|| SerializationError::invalid(format!("缺少 class_name：{value}")))?;
        let key = value
            .get("registered_name")
            .and_then(Value::as_str)
            .filter(|name| self.registry.contains(name))
            .unwrap_or(class_name);
        let entry = self
            .registry
            .get(key)
            .ok_or_else(|| SerializationError::UnknownClass(key.to_string()))?;
        if !entry.safe && self.safe_mode {
            return Err(SerializationError::UnsafeClass(key.to_string()));
        }
        let config = value.get("config").ok_or_else(|| {
            SerializationError::invalid(format!("类“{class_name}”的配置缺少 config"))
        })?;

        let layer = (entry.factory)(config, self)?;
        if let Some(id) = shared_id {
            self.shared.insert(id, layer.clone());
        }
        Ok(layer)
    }

    /// 反序列化顶层模型
    pub fn deserialize_model(&mut self, value: &Value) -> Result<Functional, SerializationError> {
        let class_name = value.get("class_name").and_then(Value::as_str).unwrap_or_default();
        if class_name != "Functional" && class_name != "Model" {
            return Err(SerializationError::invalid(format!(
                "顶层对象应为函数式模型（Functional），实际为“{class_name}”"
            )));
        }
        let config = value
            .get("config")
            .ok_or_else(|| SerializationError::invalid("模型配置缺少 config"))?;
        functional_from_config(config, self)
    }
}
