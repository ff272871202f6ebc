use std::fmt::{self, Display};

/// 张量的二元运算符
#[derive(Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    MatMul,
    Concat,
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation_name = match self {
            Self::Add => "相加",
            Self::MatMul => "矩阵相乘",
            Self::Concat => "拼接",
        };
        write!(f, "{operation_name}")
    }
}
