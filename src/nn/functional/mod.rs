/*
 * @Author       : 老董
 * @Date         : 2026-02-13
 * @Description  : Functional 模型：由输入/输出符号张量确定的有向无环图
 *
 * Functional 在 `Function`（子图 + 解释器）之上增加：
 * - 输入标准化（按名称匹配字典输入、dtype 转换、末尾单位维的增减）
 * - 掩码与 `training` 的传递
 * - 配置的导出与重建（节点重新编号）
 * - 输出层激活的检查
 *
 * Functional 自身也是一个 `Layer`，可作为操作嵌入到另一个模型的图中。
 */

mod config;
mod inputs;
mod summary;
mod validate;

#[cfg(test)]
mod tests;

pub use config::functional_from_config;
pub use inputs::InputSpec;

use crate::nn::function::Function;
use crate::nn::graph::{ArgValue, CallArguments, Graph, GraphError, SymbolicTensor, TensorSpec};
use crate::nn::layer::{Layer, LayerError};
use crate::nn::LayerRef;
use crate::saving::{Trackable, TrackableChild, TrackableKind, TrackableRef};
use crate::tensor::Tensor;
use crate::utils::Nest;
use rand::rngs::StdRng;
use serde_json::Value;
use std::fmt;

/// 构建 Functional 的选项
#[derive(Debug, Clone)]
pub struct FunctionalOptions {
    /// 模型名称；缺省时由图分配`functional`、`functional_1`……
    pub name: Option<String>,
    pub trainable: bool,
    /// 是否检查输出层的 softmax 是否作用在长度为1的轴上
    pub validate_output_activation: bool,
}

impl Default for FunctionalOptions {
    fn default() -> Self {
        Self {
            name: None,
            trainable: true,
            validate_output_activation: true,
        }
    }
}

impl FunctionalOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

pub struct Functional {
    name: String,
    trainable: bool,
    function: Function,
    /// 每个扁平输入对应的 InputLayer 名称
    input_names: Vec<String>,
    /// 每个扁平输出对应的产生它的层的名称
    output_names: Vec<String>,
    /// 构建后附加的、不属于图的可追踪对象
    attached: Vec<(String, TrackableRef)>,
}

impl fmt::Debug for Functional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Functional")
            .field("name", &self.name)
            .field("trainable", &self.trainable)
            .field("input_names", &self.input_names)
            .field("output_names", &self.output_names)
            .finish()
    }
}

impl Functional {
    // ========== 构建 ==========

    /// 由`inputs`到`outputs`的子图构建模型。
    ///
    /// `inputs`/`outputs`可以是单个张量、张量列表或以字符串为键的张量字典。
    /// 若某个输入不是 InputLayer 的输出（而是中间张量），会先克隆这部分子图，
    /// 以新的 InputLayer 代替该中间张量，原图不受影响。
    pub fn new(
        graph: &Graph,
        inputs: impl Into<Nest<SymbolicTensor>>,
        outputs: impl Into<Nest<SymbolicTensor>>,
        options: FunctionalOptions,
    ) -> Result<Self, GraphError> {
        let inputs = inputs.into();
        let outputs = outputs.into();
        Self::check_structure("inputs", &inputs)?;
        Self::check_structure("outputs", &outputs)?;
        if let Nest::Dict(items) = &inputs {
            for (key, value) in items {
                if let Nest::Leaf(x) = value {
                    if key != x.name() {
                        tracing::warn!(
                            "以字典提供输入时，键应与对应张量的名称一致：\
                             键“{key}”对应的张量名为“{}”，\
                             可通过 `graph.input(.., Some(\"{key}\"))` 修改张量名",
                            x.name()
                        );
                    }
                }
            }
        }

        let all_sources = {
            let g = graph.inner();
            inputs.flatten().into_iter().all(|x| g.is_source(x))
        };
        let (inputs, outputs) = if all_sources {
            (inputs, outputs)
        } else {
            graph.clone_graph_nodes(&inputs, &outputs)?
        };

        let mut g = graph.inner_mut();
        let function = Function::from_inner(&g, inputs, outputs)?;
        let name = match options.name {
            Some(name) => name,
            None => g.unique_layer_name("functional"),
        };
        let producer_names = |xs: &[SymbolicTensor]| {
            xs.iter()
                .map(|x| {
                    x.history()
                        .map_or_else(|| x.name().to_string(), |h| g.operation_name(h.operation))
                })
                .collect::<Vec<_>>()
        };
        let input_names = producer_names(function.inputs());
        let output_names = producer_names(function.outputs());
        drop(g);

        let model = Self {
            name,
            trainable: options.trainable,
            function,
            input_names,
            output_names,
            attached: Vec::new(),
        };
        if options.validate_output_activation {
            model.check_output_activation_softmax()?;
        }
        Ok(model)
    }

    /// 输入输出只能是单个张量、张量列表或张量字典（不能再嵌套）
    fn check_structure(what: &str, nest: &Nest<SymbolicTensor>) -> Result<(), GraphError> {
        let flat = match nest {
            Nest::Leaf(_) => true,
            Nest::List(items) => items.iter().all(|x| !x.is_nested()),
            Nest::Dict(items) => items.values().all(|x| !x.is_nested()),
        };
        if flat {
            Ok(())
        } else {
            Err(GraphError::InvalidInput(format!(
                "`{what}`只能是单个张量、张量列表或张量字典，不支持多层嵌套"
            )))
        }
    }

    // ========== 执行 ==========

    /// 对真实张量执行模型。
    ///
    /// - `training`只传给声明了该参数的层（如 Dropout）
    /// - `mask`与`inputs`结构相同，逐个附加到标准化后的输入上
    /// - 只有一个输出时直接返回该张量
    pub fn call(
        &self,
        inputs: impl Into<Nest<Tensor>>,
        training: Option<bool>,
        mask: Option<Nest<Tensor>>,
    ) -> Result<Nest<Tensor>, GraphError> {
        let mut flat_inputs = self.standardize_inputs(inputs.into())?;
        if let Some(mask) = mask {
            let masks = self.flatten_to_reference_inputs(mask)?;
            if masks.len() != flat_inputs.len() {
                return Err(GraphError::InvalidInput(format!(
                    "掩码个数（{}）与模型输入个数（{}）不一致",
                    masks.len(),
                    flat_inputs.len()
                )));
            }
            for (x, mask) in flat_inputs.iter_mut().zip(masks) {
                x.set_mask(Some(mask));
            }
        }
        Ok(self.function.call(flat_inputs, training)?.unpack_singleton())
    }

    /// 推理：`call(inputs, Some(false), None)`
    pub fn predict(&self, inputs: impl Into<Nest<Tensor>>) -> Result<Nest<Tensor>, GraphError> {
        self.call(inputs, Some(false), None)
    }

    /// 由扁平的输入规格推导输出规格
    pub fn compute_output_spec(
        &self,
        inputs: Vec<TensorSpec>,
    ) -> Result<Nest<TensorSpec>, GraphError> {
        Ok(self.function.compute_output_spec(inputs)?.unpack_singleton())
    }

    // ========== 查询 ==========

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn trainable(&self) -> bool {
        self.trainable
    }

    pub const fn set_trainable(&mut self, trainable: bool) {
        self.trainable = trainable;
    }

    pub const fn function(&self) -> &Function {
        &self.function
    }

    /// 扁平的输入张量
    pub fn inputs(&self) -> &[SymbolicTensor] {
        self.function.inputs()
    }

    pub fn outputs(&self) -> &[SymbolicTensor] {
        self.function.outputs()
    }

    /// 构建时给出的输入结构
    pub const fn input(&self) -> &Nest<SymbolicTensor> {
        self.function.inputs_struct()
    }

    pub const fn output(&self) -> &Nest<SymbolicTensor> {
        self.function.outputs_struct()
    }

    /// 各输入的形状；只有一个输入时直接返回其形状
    pub fn input_shape(&self) -> Nest<Vec<Option<usize>>> {
        Nest::list(self.inputs().iter().map(|x| x.shape().to_vec())).unpack_singleton()
    }

    pub fn output_shape(&self) -> Nest<Vec<Option<usize>>> {
        Nest::list(self.outputs().iter().map(|x| x.shape().to_vec())).unpack_singleton()
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// 按执行顺序排列的层（含 InputLayer）
    pub fn layers(&self) -> Vec<LayerRef> {
        self.function.layers()
    }

    pub fn get_layer(&self, name: &str) -> Result<LayerRef, GraphError> {
        self.layers()
            .into_iter()
            .find(|layer| layer.try_borrow().is_ok_and(|l| l.name() == name))
            .ok_or_else(|| GraphError::UnknownOperation(name.to_string()))
    }

    pub fn get_layer_at(&self, index: usize) -> Result<LayerRef, GraphError> {
        let layers = self.layers();
        let count = layers.len();
        layers.into_iter().nth(index).ok_or_else(|| {
            GraphError::InvalidInput(format!("模型只有{count}个层，无法获取第{index}个层"))
        })
    }

    pub fn count_params(&self) -> usize {
        self.layers()
            .iter()
            .filter_map(|layer| layer.try_borrow().ok().map(|l| l.count_params()))
            .sum()
    }

    // ========== 附加对象 ==========

    /// 附加一个不属于图的可追踪对象（如优化器），保存/加载状态时一并遍历。
    /// 同名属性会被替换
    pub fn attach(&mut self, attr: impl Into<String>, trackable: impl Into<TrackableRef>) {
        let attr = attr.into();
        let trackable = trackable.into();
        match self.attached.iter_mut().find(|(name, _)| *name == attr) {
            Some(slot) => slot.1 = trackable,
            None => self.attached.push((attr, trackable)),
        }
    }

    pub fn attached(&self, attr: &str) -> Option<&TrackableRef> {
        self.attached
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, trackable)| trackable)
    }
}

/// 层调用的第一个位置参数即模型输入，其中不能含字面量
fn nest_from_arguments<T: Clone>(
    layer: &str,
    inputs: &CallArguments<T>,
) -> Result<Nest<T>, LayerError> {
    let first = inputs
        .first()
        .ok_or_else(|| LayerError::invalid_input(layer, "缺少模型输入"))?;
    first.try_map(&mut |v: &ArgValue<T>| {
        v.as_tensor()
            .cloned()
            .ok_or_else(|| LayerError::invalid_input(layer, "模型输入中不能含有字面量"))
    })
}

impl Trackable for Functional {
    fn kind(&self) -> TrackableKind {
        TrackableKind::Functional
    }

    fn class_name(&self) -> &'static str {
        "Functional"
    }

    fn children(&self) -> Vec<(String, TrackableChild)> {
        let layers = self.layers().into_iter().map(TrackableRef::Layer).collect();
        let mut children = vec![("layers".to_string(), TrackableChild::Container(layers))];
        children.extend(
            self.attached
                .iter()
                .map(|(attr, trackable)| (attr.clone(), TrackableChild::Single(trackable.clone()))),
        );
        children
    }
}

impl Layer for Functional {
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

    fn build(
        &mut self,
        _inputs: &CallArguments<TensorSpec>,
        _rng: &mut StdRng,
    ) -> Result<(), LayerError> {
        Ok(())
    }

    fn compute_output_spec(
        &self,
        inputs: &CallArguments<TensorSpec>,
    ) -> Result<Nest<TensorSpec>, LayerError> {
        let nest = nest_from_arguments(&self.name, inputs)?;
        let flat = self
            .flatten_to_reference_inputs(nest)
            .map_err(|e| LayerError::nested(&self.name, e))?;
        Functional::compute_output_spec(self, flat).map_err(|e| LayerError::nested(&self.name, e))
    }

    fn call(
        &self,
        inputs: &CallArguments<Tensor>,
        training: Option<bool>,
    ) -> Result<Nest<Tensor>, LayerError> {
        let nest = nest_from_arguments(&self.name, inputs)?;
        Functional::call(self, nest, training, None).map_err(|e| LayerError::nested(&self.name, e))
    }

    fn call_has_training_arg(&self) -> bool {
        true
    }

    fn module(&self) -> &'static str {
        "keras.src.models.functional"
    }

    fn get_config(&self) -> Result<Value, LayerError> {
        Functional::get_config(self)
            .map_err(|e| LayerError::invalid_config(&self.name, e.to_string()))
    }

    fn count_params(&self) -> usize {
        Functional::count_params(self)
    }

    fn as_functional(&self) -> Option<&Functional> {
        Some(self)
    }
}
