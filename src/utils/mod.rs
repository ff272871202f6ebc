//! # 常用接口模块
//!
//! 本模块提供一些常用的操作接口：嵌套结构（`Nest`）、命名工具以及单元测试宏

#[cfg(test)]
mod tests;

pub mod naming;
pub mod nest;

pub use nest::Nest;
