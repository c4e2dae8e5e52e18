use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of node kinds the translator knows how to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Block,
    Call,
    KeywordArg,
    Literal,
    Identifier,
    Attribute,
    Index,
    List,
    Tuple,
    Dict,
    Pair,
    BinaryOp,
    UnaryOp,
    Assign,
    AugAssign,
    Expression,
    If,
    While,
    For,
    Function,
    Return,
    Pass,
    Break,
    Continue,
}

impl NodeKind {
    pub const ALL: [NodeKind; 24] = [
        NodeKind::Block,
        NodeKind::Call,
        NodeKind::KeywordArg,
        NodeKind::Literal,
        NodeKind::Identifier,
        NodeKind::Attribute,
        NodeKind::Index,
        NodeKind::List,
        NodeKind::Tuple,
        NodeKind::Dict,
        NodeKind::Pair,
        NodeKind::BinaryOp,
        NodeKind::UnaryOp,
        NodeKind::Assign,
        NodeKind::AugAssign,
        NodeKind::Expression,
        NodeKind::If,
        NodeKind::While,
        NodeKind::For,
        NodeKind::Function,
        NodeKind::Return,
        NodeKind::Pass,
        NodeKind::Break,
        NodeKind::Continue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Block => "block",
            NodeKind::Call => "call",
            NodeKind::KeywordArg => "keyword_arg",
            NodeKind::Literal => "literal",
            NodeKind::Identifier => "identifier",
            NodeKind::Attribute => "attribute",
            NodeKind::Index => "index",
            NodeKind::List => "list",
            NodeKind::Tuple => "tuple",
            NodeKind::Dict => "dict",
            NodeKind::Pair => "pair",
            NodeKind::BinaryOp => "binary_op",
            NodeKind::UnaryOp => "unary_op",
            NodeKind::Assign => "assign",
            NodeKind::AugAssign => "aug_assign",
            NodeKind::Expression => "expression",
            NodeKind::If => "if",
            NodeKind::While => "while",
            NodeKind::For => "for",
            NodeKind::Function => "function",
            NodeKind::Return => "return",
            NodeKind::Pass => "pass",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
        }
    }

    pub fn parse(kind: &str) -> Option<NodeKind> {
        NodeKind::ALL.iter().copied().find(|k| k.as_str() == kind)
    }

    /// Kinds that can only appear in statement position
    pub fn is_statement_only(&self) -> bool {
        matches!(
            self,
            NodeKind::Block
                | NodeKind::Assign
                | NodeKind::AugAssign
                | NodeKind::Expression
                | NodeKind::If
                | NodeKind::While
                | NodeKind::For
                | NodeKind::Function
                | NodeKind::Return
                | NodeKind::Pass
                | NodeKind::Break
                | NodeKind::Continue
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_inverse_of_as_str() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::parse("Block"), None);
        assert_eq!(NodeKind::parse(""), None);
    }

    #[test]
    fn test_serde_name_matches_wire_name() {
        for kind in NodeKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}
