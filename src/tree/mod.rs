//! Program tree data model
//!
//! The client-supplied JSON syntax tree. A [`Node`] keeps its `kind` as the raw
//! string from the wire so that unrecognised kinds survive decoding and are
//! reported by the translator instead of failing the whole request body.
//! [`NodeKind`] is the closed set the translator understands.

mod kind;

pub use kind::NodeKind;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal payload carried by `literal`, `identifier` and a few other kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`; must precede `Float` so they stay exact
    UInt(u64),
    Float(f64),
    Str(String),
    /// Arrays and objects; always rejected by the translator
    Other(serde_json::Value),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Bool(_) => "boolean",
            Literal::Int(_) | Literal::UInt(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Str(_) => "string",
            Literal::Other(serde_json::Value::Array(_)) => "array",
            Literal::Other(serde_json::Value::Object(_)) => "object",
            Literal::Other(_) => "value",
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Str(s)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Int(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Int(n.into())
    }
}

impl From<u64> for Literal {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(signed) => Literal::Int(signed),
            Err(_) => Literal::UInt(n),
        }
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Float(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// One node of a program tree. Children are owned; the tree has no sharing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: String,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
}

impl Node {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            children: Vec::new(),
            value: None,
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_value(mut self, value: impl Into<Literal>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Decode a tree from JSON text
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Resolve the wire kind against the closed set
    pub fn node_kind(&self) -> Option<NodeKind> {
        NodeKind::parse(&self.kind)
    }

    pub fn block(statements: Vec<Node>) -> Self {
        Self::new(NodeKind::Block.as_str()).with_children(statements)
    }

    pub fn identifier(name: &str) -> Self {
        Self::new(NodeKind::Identifier.as_str()).with_value(name)
    }

    pub fn literal(value: impl Into<Literal>) -> Self {
        Self::new(NodeKind::Literal.as_str()).with_value(value)
    }

    /// `literal` with no payload, emitted as `None`
    pub fn none() -> Self {
        Self::new(NodeKind::Literal.as_str())
    }

    pub fn call(callee: Node, args: Vec<Node>) -> Self {
        let mut children = Vec::with_capacity(args.len() + 1);
        children.push(callee);
        children.extend(args);
        Self::new(NodeKind::Call.as_str()).with_children(children)
    }

    pub fn binary(op: &str, lhs: Node, rhs: Node) -> Self {
        Self::new(NodeKind::BinaryOp.as_str())
            .with_value(op)
            .with_children(vec![lhs, rhs])
    }

    pub fn assign(target: Node, value: Node) -> Self {
        Self::new(NodeKind::Assign.as_str()).with_children(vec![target, value])
    }

    /// Total number of nodes in the subtree rooted here
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Node::size).sum::<usize>()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}({:?})", self.kind, v),
            None => write!(f, "{}[{}]", self.kind, self.children.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_minimal_node() {
        let node = Node::from_json(r#"{"kind": "pass"}"#).unwrap();
        assert_eq!(node.kind, "pass");
        assert!(node.children.is_empty());
        assert!(node.value.is_none());
        assert_eq!(node.node_kind(), Some(NodeKind::Pass));
    }

    #[test]
    fn test_unknown_kind_survives_decoding() {
        let node = Node::from_json(r#"{"kind": "frobnicate", "children": []}"#).unwrap();
        assert_eq!(node.kind, "frobnicate");
        assert_eq!(node.node_kind(), None);
    }

    #[test]
    fn test_literal_payload_types() {
        let decode = |v: &str| {
            Node::from_json(&format!(r#"{{"kind": "literal", "value": {v}}}"#))
                .unwrap()
                .value
        };
        assert_eq!(decode("true"), Some(Literal::Bool(true)));
        assert_eq!(decode("42"), Some(Literal::Int(42)));
        assert_eq!(decode("1.5"), Some(Literal::Float(1.5)));
        assert_eq!(decode(r#""hi""#), Some(Literal::Str("hi".into())));
        assert_eq!(decode("null"), None);
        assert!(matches!(decode("[1, 2]"), Some(Literal::Other(_))));
    }

    #[test]
    fn test_large_unsigned_integers_stay_integers() {
        let node = Node::from_json(r#"{"kind": "literal", "value": 18446744073709551615}"#).unwrap();
        assert_eq!(node.value, Some(Literal::UInt(u64::MAX)));
        assert_eq!(Literal::from(7u64), Literal::Int(7));
        assert_eq!(Literal::from(u64::MAX).type_name(), "integer");
    }

    #[test]
    fn test_builders_match_wire_shape() {
        let tree = Node::block(vec![Node::call(
            Node::identifier("print"),
            vec![Node::literal("hi")],
        )]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["kind"], "block");
        assert_eq!(json["children"][0]["kind"], "call");
        assert_eq!(json["children"][0]["children"][1]["value"], "hi");
        assert_eq!(tree.size(), 4);

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
