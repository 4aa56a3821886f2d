use serde::Serialize;
use std::fmt;

/// データベース変更に対するフィルター条件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseFilter {
    /// フィルター対象のカラム名
    pub column: String,
    /// 比較演算子
    pub operator: FilterOperator,
    /// 比較する値
    pub value: String,
}

impl fmt::Display for DatabaseFilter {
    /// Realtime expects PostgREST syntax: `column=op.value`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            FilterOperator::In => write!(f, "{}=in.({})", self.column, self.value),
            _ => write!(f, "{}={}.{}", self.column, self.operator, self.value),
        }
    }
}

/// フィルター演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterOperator {
    Eq,
    In,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOperator::Eq => "eq",
            FilterOperator::In => "in",
        };
        write!(f, "{}", s)
    }
}
