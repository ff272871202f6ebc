/*
 * @Author       : 老董
 * @Date         : 2026-02-13
 * @Description  : 输出层激活函数的检查
 */

use super::Functional;
use crate::nn::graph::GraphError;
use std::collections::HashSet;

impl Functional {
    /// softmax 作用在长度为1的轴上时，输出恒为1.0，几乎总是误用。
    /// 只检查自带激活的输出层（如 Dense）
    pub(super) fn check_output_activation_softmax(&self) -> Result<(), GraphError> {
        let mut checked = HashSet::new();
        for x in self.outputs() {
            let Some(history) = x.history() else {
                continue;
            };
            if !checked.insert(history.operation) {
                continue;
            }
            let Some(layer) = self.function.layer(history.operation) else {
                continue;
            };
            let layer = layer
                .try_borrow()
                .map_err(|_| GraphError::LayerBusy(history.operation.to_string()))?;
            let Some(axis) = layer.softmax_axis() else {
                continue;
            };

            let shape = x.shape();
            let axis = if axis < 0 { shape.len() as isize + axis } else { axis };
            if axis < 0 {
                continue;
            }
            if shape.get(axis as usize) == Some(&Some(1)) {
                return Err(GraphError::SoftmaxOnSingleUnit {
                    layer: layer.name().to_string(),
                });
            }
        }
        Ok(())
    }
}
