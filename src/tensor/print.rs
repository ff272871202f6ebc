/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : 张量的文本展示（调试与模型摘要用）
 */

use crate::tensor::Tensor;
use std::fmt;

/// 超过该元素个数时只展示形状
const MAX_DISPLAY_ELEMENTS: usize = 64;

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let shape = self.shape();
        if self.data.len() > MAX_DISPLAY_ELEMENTS {
            write!(f, "<{}个元素，略>", self.data.len())?;
        } else {
            write!(f, "{:.4}", self.data)?;
        }
        write!(f, "\n形状: {shape:?}，类型: {}", self.dtype)?;
        if let Some(mask) = self.mask() {
            write!(f, "，掩码形状: {:?}", mask.shape())?;
        }
        writeln!(f)
    }
}
