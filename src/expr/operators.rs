//! Operator types for expression nodes

use std::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    /// bare value used as a boolean
    Truthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    RegexEq,
    RegexNeq,
    In,
    NotIn,
    And,
    Or,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 12] = [
        BinaryOp::Eq,
        BinaryOp::Neq,
        BinaryOp::Gt,
        BinaryOp::Gte,
        BinaryOp::Lt,
        BinaryOp::Lte,
        BinaryOp::RegexEq,
        BinaryOp::RegexNeq,
        BinaryOp::In,
        BinaryOp::NotIn,
        BinaryOp::And,
        BinaryOp::Or,
    ];

    /// Config-language spelling, for diagnostics and pretty printing only
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::RegexEq => "=~",
            BinaryOp::RegexNeq => "!~",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// Serialized name, as written in expression trees
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Eq => "eq",
            BinaryOp::Neq => "neq",
            BinaryOp::Gt => "gt",
            BinaryOp::Gte => "gte",
            BinaryOp::Lt => "lt",
            BinaryOp::Lte => "lte",
            BinaryOp::RegexEq => "regex_eq",
            BinaryOp::RegexNeq => "regex_neq",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not_in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// Accepts either the serialized name or the config-language symbol
    pub fn lookup(s: &str) -> Option<BinaryOp> {
        let s = s.trim();
        BinaryOp::ALL
            .into_iter()
            .find(|op| op.name() == s || op.symbol() == s)
    }

    pub fn is_connective(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => f.write_str("!"),
            UnaryOp::Truthy => Ok(()),
        }
    }
}
