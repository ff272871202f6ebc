use ndarray::{Array, ArrayD, IxDyn};

use crate::errors::TensorError;

mod dtype;
mod math;
mod print;
mod property;

pub use dtype::DType;


/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
/// 注：只要通Tensor初始化的都是张量（即使标量也是张量）；
/// 而通常意义上的数字（类型为usize、i32、f64等）就只是纯数（number），在这里不被认为是张量。
///
/// 与图中的符号张量（`SymbolicTensor`）不同，这里的张量携带真实数据；
/// `mask` 为调用函数式模型时附加的掩码标注，不参与数值运算。
#[derive(Debug, Clone)]
pub struct Tensor {
    data: Array<f32, IxDyn>,
    dtype: DType,
    mask: Option<Box<Tensor>>,
}

impl Tensor {
    /// 创建一个张量，若为标量，`shape`可以是[]、[1]、[1,1]、[1,1,1]...
    /// 若为向量，`shape`可以是[n]、[1,n]、[n,1]；
    /// 若为矩阵，`shape`可以是[n,m]；
    /// 若为更高维度的数组，`shape`可以是[c,n,m,...]；
    /// 注：`data`的长度必须和`shape`中所有元素的乘积相等，否则会panic（可用`try_new`获取错误）。
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        match Self::try_new(data, shape) {
            Ok(t) => t,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_new(data: &[f32], shape: &[usize]) -> Result<Self, TensorError> {
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec()).map_err(|_| {
            TensorError::DataShapeMismatch {
                data_len: data.len(),
                shape: shape.to_vec(),
            }
        })?;
        Ok(Self::from_array(data))
    }

    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self {
            data,
            dtype: DType::Float32,
            mask: None,
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::zeros(IxDyn(shape)))
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::ones(IxDyn(shape)))
    }

    /// 以给定值填满整个张量
    pub fn full(shape: &[usize], value: f32) -> Self {
        Self::from_array(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// 创建一个[min, max]闭区间内均匀分布的随机张量（使用指定的随机数生成器）
    pub fn uniform_with_rng(
        min: f32,
        max: f32,
        shape: &[usize],
        rng: &mut rand::rngs::StdRng,
    ) -> Self {
        use rand::distributions::{Distribution, Uniform};
        let dist = Uniform::from(min..=max);
        let len = shape.iter().product::<usize>();
        let data = (0..len).map(|_| dist.sample(rng)).collect::<Vec<_>>();
        Self::new(&data, shape)
    }
}

// 数据类型与掩码
impl Tensor {
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    /// 按目标 dtype 转换数值（返回新张量）
    /// - `int32`：向零取整
    /// - `bool`：非零即为 1.0
    /// - 浮点：数值不变
    pub fn cast(&self, dtype: DType) -> Self {
        let data = match dtype {
            DType::Float32 | DType::Float64 => self.data.clone(),
            DType::Int32 => self.data.mapv(f32::trunc),
            DType::Bool => self.data.mapv(|x| if x != 0. { 1. } else { 0. }),
        };
        Self {
            data,
            dtype,
            mask: self.mask.clone(),
        }
    }

    pub fn mask(&self) -> Option<&Tensor> {
        self.mask.as_deref()
    }

    pub fn set_mask(&mut self, mask: Option<Tensor>) {
        self.mask = mask.map(Box::new);
    }

    pub fn with_mask(mut self, mask: Option<Tensor>) -> Self {
        self.set_mask(mask);
        self
    }
}

// 私有方法
impl Tensor {
    fn with_same_meta(&self, data: ArrayD<f32>) -> Self {
        Self {
            data,
            dtype: self.dtype,
            mask: None,
        }
    }
}
