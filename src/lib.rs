//! # Only Keras
//!
//! `only_keras`项目用纯rust实现[keras](https://keras.io)中最“系统化”的两块核心：
//! 函数式（Functional）模型的计算图引擎，以及`.keras`/`.weights.h5`模型存档层。
//!
//! - `nn`：符号张量、节点（Node）竞技场、拓扑执行、子图克隆、函数式模型与配置往返
//! - `saving`：序列化编解码、可追踪对象（trackable）状态遍历、各类IO存储与存档入口
//! - `tensor`：基于`ndarray`的具体张量（仅提供图执行所需的少量运算）
//!

pub mod errors;
pub mod nn;
pub mod saving;
pub mod tensor;
pub mod utils;
