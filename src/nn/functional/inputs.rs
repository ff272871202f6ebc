/*
 * @Author       : 老董
 * @Date         : 2026-02-13
 * @Description  : Functional 的输入标准化与输入规格
 */

use super::Functional;
use crate::nn::graph::GraphError;
use crate::tensor::Tensor;
use crate::utils::Nest;

/// 模型对某个输入的要求（不含批维）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    /// 批维总是 None
    pub shape: Vec<Option<usize>>,
    /// 是否允许多出/缺少一个长度为1的末尾维
    pub allow_last_axis_squeeze: bool,
    pub name: String,
}

fn shape_with_no_batch_size(shape: &[Option<usize>]) -> Vec<Option<usize>> {
    let mut shape = shape.to_vec();
    if let Some(first) = shape.first_mut() {
        *first = None;
    }
    shape
}

impl Functional {
    /// 各输入的规格：以字典构建的模型按键排序并以键命名，否则以 InputLayer 名称命名
    pub fn input_spec(&self) -> Vec<InputSpec> {
        match self.input() {
            Nest::Dict(items) => items
                .iter()
                .filter_map(|(name, x)| {
                    x.as_leaf().map(|x| InputSpec {
                        shape: shape_with_no_batch_size(x.shape()),
                        allow_last_axis_squeeze: true,
                        name: name.clone(),
                    })
                })
                .collect(),
            _ => self
                .inputs()
                .iter()
                .zip(&self.input_names)
                .map(|(x, name)| InputSpec {
                    shape: shape_with_no_batch_size(x.shape()),
                    allow_last_axis_squeeze: true,
                    name: name.clone(),
                })
                .collect(),
        }
    }

    /// 把（可能以字典给出的）输入按模型输入的顺序展平。
    ///
    /// 以字典构建的模型按键的字典序匹配，否则按 InputLayer 的名称匹配；
    /// 多余的键被忽略，缺少的键报错。非字典的输入直接展平。
    pub(crate) fn flatten_to_reference_inputs<T>(
        &self,
        inputs: Nest<T>,
    ) -> Result<Vec<T>, GraphError> {
        let Nest::Dict(mut items) = inputs else {
            return Ok(inputs.into_flat());
        };
        let ref_input_names: Vec<String> = match self.input() {
            Nest::Dict(reference) => reference.keys().cloned().collect(),
            _ => self.input_names.clone(),
        };
        let extra_keys = items
            .keys()
            .filter(|k| !ref_input_names.contains(k))
            .cloned()
            .collect::<Vec<_>>();
        if !extra_keys.is_empty() {
            tracing::warn!("输入字典中的键{extra_keys:?}不对应模型的任何输入，将被忽略");
        }

        let mut flat = Vec::with_capacity(ref_input_names.len());
        for name in &ref_input_names {
            let value = items.remove(name).ok_or_else(|| {
                GraphError::InvalidInput(format!(
                    "输入字典中缺少模型输入“{name}”，模型的输入为{ref_input_names:?}"
                ))
            })?;
            flat.extend(value.into_flat());
        }
        Ok(flat)
    }

    /// 按模型输入的 dtype 转换
    pub(crate) fn convert_inputs_to_tensors(&self, flat_inputs: Vec<Tensor>) -> Vec<Tensor> {
        flat_inputs
            .into_iter()
            .zip(self.inputs())
            .map(|(x, reference)| {
                if x.dtype() == reference.dtype() {
                    x
                } else {
                    x.cast(reference.dtype())
                }
            })
            .collect()
    }

    /// 阶数比模型输入多1且末维为1时去掉末维；少1且模型输入末维为1时补上末维；
    /// 其余阶数不一致的情况报错。调整后，除批维外已知的维度必须一致
    pub(crate) fn adjust_input_rank(
        &self,
        flat_inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, GraphError> {
        let references = self.inputs();
        if flat_inputs.len() != references.len() {
            return Err(GraphError::InvalidInput(format!(
                "模型需要{}个输入，实际得到{}个",
                references.len(),
                flat_inputs.len()
            )));
        }

        let mut adjusted = Vec::with_capacity(flat_inputs.len());
        for (x, reference) in flat_inputs.into_iter().zip(references) {
            let ref_shape = reference.shape();
            let ref_rank = ref_shape.len();
            let x_rank = x.dimension();
            let mismatch = || GraphError::ShapeMismatch {
                input: reference.name().to_string(),
                expected: ref_shape.to_vec(),
                got: x.shape().to_vec(),
            };

            let y = if x_rank == ref_rank {
                x.clone()
            } else if x_rank == ref_rank + 1 && x.shape().last() == Some(&1) {
                x.squeeze_last()?.with_mask(x.mask().cloned())
            } else if x_rank + 1 == ref_rank && ref_shape.last() == Some(&Some(1)) {
                x.expand_last().with_mask(x.mask().cloned())
            } else {
                return Err(mismatch());
            };

            let dims_match = ref_shape
                .iter()
                .zip(y.shape())
                .skip(1)
                .all(|(expected, got)| expected.is_none_or(|e| e == *got));
            if !dims_match {
                return Err(mismatch());
            }
            adjusted.push(y);
        }
        Ok(adjusted)
    }

    pub(crate) fn standardize_inputs(
        &self,
        inputs: Nest<Tensor>,
    ) -> Result<Vec<Tensor>, GraphError> {
        let flat_inputs = self.flatten_to_reference_inputs(inputs)?;
        let flat_inputs = self.convert_inputs_to_tensors(flat_inputs);
        self.adjust_input_rank(flat_inputs)
    }
}
