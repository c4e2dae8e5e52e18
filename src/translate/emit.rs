/// Recursive code emission for program trees
use super::error::TranslationError;
use super::grammar::{
    format_float, is_valid_identifier, quote_string, AUGMENTED_OPERATORS, BINARY_OPERATORS,
    UNARY_OPERATORS,
};
use crate::tree::{Literal, Node, NodeKind};

type EmitResult<T> = std::result::Result<T, TranslationError>;

const INDENT: &str = "    ";

/// Walks one tree and produces Python source lines.
///
/// State is limited to the current location (for error paths and the depth
/// limit) and loop/function nesting (so `break` and `return` are only emitted
/// where Python accepts them).
pub(crate) struct Emitter {
    path: Vec<usize>,
    max_depth: usize,
    loop_depth: usize,
    function_depth: usize,
}

impl Emitter {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            path: Vec::new(),
            max_depth,
            loop_depth: 0,
            function_depth: 0,
        }
    }

    pub(crate) fn emit_program(&mut self, root: &Node) -> EmitResult<String> {
        let mut lines = Vec::new();
        if self.resolve(root)? == NodeKind::Block {
            self.emit_statements(root, 0, &mut lines)?;
        } else {
            self.emit_statement(root, 0, &mut lines)?;
        }

        if lines.is_empty() {
            return Ok(String::new());
        }
        let mut body = lines.join("\n");
        body.push('\n');
        Ok(body)
    }

    fn location(&self) -> String {
        if self.path.is_empty() {
            return "/".to_string();
        }
        self.path
            .iter()
            .map(|i| format!("/children/{i}"))
            .collect::<String>()
    }

    /// Descend into `node.children[index]`, tracking location and depth
    fn child<T>(
        &mut self,
        node: &Node,
        index: usize,
        f: impl FnOnce(&mut Self, &Node) -> EmitResult<T>,
    ) -> EmitResult<T> {
        self.path.push(index);
        if self.path.len() > self.max_depth {
            return Err(TranslationError::TooDeep {
                limit: self.max_depth,
            });
        }
        let out = f(self, &node.children[index])?;
        self.path.pop();
        Ok(out)
    }

    fn resolve(&self, node: &Node) -> EmitResult<NodeKind> {
        node.node_kind().ok_or_else(|| TranslationError::UnknownKind {
            kind: node.kind.clone(),
            path: self.location(),
        })
    }

    fn arity(
        &self,
        node: &Node,
        kind: NodeKind,
        ok: bool,
        expected: &'static str,
    ) -> EmitResult<()> {
        if ok {
            return Ok(());
        }
        Err(TranslationError::Arity {
            kind,
            expected,
            found: node.children.len(),
            path: self.location(),
        })
    }

    fn exact(&self, node: &Node, kind: NodeKind, n: usize, expected: &'static str) -> EmitResult<()> {
        self.arity(node, kind, node.children.len() == n, expected)
    }

    fn misplaced(&self, kind: &str, context: &'static str) -> TranslationError {
        TranslationError::Misplaced {
            kind: kind.to_string(),
            context,
            path: self.location(),
        }
    }

    /// The node's payload as a validated identifier
    fn name_value(&self, node: &Node) -> EmitResult<String> {
        match &node.value {
            Some(Literal::Str(name)) if is_valid_identifier(name) => Ok(name.clone()),
            Some(Literal::Str(name)) => Err(TranslationError::InvalidIdentifier {
                name: name.clone(),
                path: self.location(),
            }),
            Some(other) => Err(TranslationError::InvalidIdentifier {
                name: format!("<{}>", other.type_name()),
                path: self.location(),
            }),
            None => Err(TranslationError::InvalidIdentifier {
                name: "<missing>".to_string(),
                path: self.location(),
            }),
        }
    }

    fn operator(&self, node: &Node, kind: NodeKind, allowed: &[&str]) -> EmitResult<String> {
        match node.value.as_ref().and_then(Literal::as_str) {
            Some(op) if allowed.contains(&op) => Ok(op.to_string()),
            Some(op) => Err(TranslationError::InvalidOperator {
                op: op.to_string(),
                kind,
                path: self.location(),
            }),
            None => Err(TranslationError::InvalidOperator {
                op: "<missing>".to_string(),
                kind,
                path: self.location(),
            }),
        }
    }

    // ===== Statements =====

    fn emit_statements(&mut self, node: &Node, indent: usize, out: &mut Vec<String>) -> EmitResult<()> {
        for i in 0..node.children.len() {
            self.child(node, i, |e, n| e.emit_statement(n, indent, out))?;
        }
        Ok(())
    }

    /// Emit an indented suite; `node` must be a block
    fn emit_body(&mut self, node: &Node, indent: usize, out: &mut Vec<String>) -> EmitResult<()> {
        if self.resolve(node)? != NodeKind::Block {
            return Err(self.misplaced(&node.kind, "where a block body is required"));
        }
        let before = out.len();
        self.emit_statements(node, indent, out)?;
        if out.len() == before {
            out.push(format!("{}pass", INDENT.repeat(indent)));
        }
        Ok(())
    }

    fn emit_statement(&mut self, node: &Node, indent: usize, out: &mut Vec<String>) -> EmitResult<()> {
        let kind = self.resolve(node)?;
        let pad = INDENT.repeat(indent);

        match kind {
            // Python has no bare blocks; a nested block is spliced in place.
            NodeKind::Block => self.emit_statements(node, indent, out)?,
            NodeKind::Assign => {
                self.exact(node, kind, 2, "exactly 2")?;
                let target = self.child(node, 0, |e, n| e.emit_target(n))?;
                let value = self.child(node, 1, |e, n| e.emit_expr(n))?;
                out.push(format!("{pad}{target} = {value}"));
            }
            NodeKind::AugAssign => {
                self.exact(node, kind, 2, "exactly 2")?;
                let op = self.operator(node, kind, AUGMENTED_OPERATORS)?;
                let target = self.child(node, 0, |e, n| e.emit_single_target(n))?;
                let value = self.child(node, 1, |e, n| e.emit_expr(n))?;
                out.push(format!("{pad}{target} {op} {value}"));
            }
            NodeKind::Expression => {
                self.exact(node, kind, 1, "exactly 1")?;
                let expr = self.child(node, 0, |e, n| e.emit_expr(n))?;
                out.push(format!("{pad}{expr}"));
            }
            NodeKind::If => self.emit_if(node, indent, "if", out)?,
            NodeKind::While => {
                self.exact(node, kind, 2, "exactly 2")?;
                let cond = self.child(node, 0, |e, n| e.emit_expr(n))?;
                out.push(format!("{pad}while {cond}:"));
                self.loop_depth += 1;
                self.child(node, 1, |e, n| e.emit_body(n, indent + 1, out))?;
                self.loop_depth -= 1;
            }
            NodeKind::For => {
                self.exact(node, kind, 3, "exactly 3")?;
                let target = self.child(node, 0, |e, n| e.emit_target(n))?;
                let iterable = self.child(node, 1, |e, n| e.emit_expr(n))?;
                out.push(format!("{pad}for {target} in {iterable}:"));
                self.loop_depth += 1;
                self.child(node, 2, |e, n| e.emit_body(n, indent + 1, out))?;
                self.loop_depth -= 1;
            }
            NodeKind::Function => self.emit_function(node, indent, out)?,
            NodeKind::Return => {
                self.arity(node, kind, node.children.len() <= 1, "0 or 1")?;
                if self.function_depth == 0 {
                    return Err(self.misplaced(&node.kind, "outside a function"));
                }
                if node.children.is_empty() {
                    out.push(format!("{pad}return"));
                } else {
                    let value = self.child(node, 0, |e, n| e.emit_expr(n))?;
                    out.push(format!("{pad}return {value}"));
                }
            }
            NodeKind::Pass => {
                self.exact(node, kind, 0, "no")?;
                out.push(format!("{pad}pass"));
            }
            NodeKind::Break | NodeKind::Continue => {
                self.exact(node, kind, 0, "no")?;
                if self.loop_depth == 0 {
                    return Err(self.misplaced(&node.kind, "outside a loop"));
                }
                out.push(format!("{pad}{kind}"));
            }
            NodeKind::KeywordArg => return Err(self.misplaced(&node.kind, "outside a call")),
            NodeKind::Pair => return Err(self.misplaced(&node.kind, "outside a dict")),
            NodeKind::Call
            | NodeKind::Literal
            | NodeKind::Identifier
            | NodeKind::Attribute
            | NodeKind::Index
            | NodeKind::List
            | NodeKind::Tuple
            | NodeKind::Dict
            | NodeKind::BinaryOp
            | NodeKind::UnaryOp => {
                let expr = self.emit_expr(node)?;
                out.push(format!("{pad}{expr}"));
            }
        }
        Ok(())
    }

    fn emit_if(
        &mut self,
        node: &Node,
        indent: usize,
        keyword: &str,
        out: &mut Vec<String>,
    ) -> EmitResult<()> {
        let n = node.children.len();
        self.arity(node, NodeKind::If, (2..=3).contains(&n), "2 or 3")?;
        let pad = INDENT.repeat(indent);

        let cond = self.child(node, 0, |e, c| e.emit_expr(c))?;
        out.push(format!("{pad}{keyword} {cond}:"));
        self.child(node, 1, |e, c| e.emit_body(c, indent + 1, out))?;

        if n == 3 {
            let else_kind = self.child(node, 2, |e, c| e.resolve(c))?;
            if else_kind == NodeKind::If {
                self.child(node, 2, |e, c| e.emit_if(c, indent, "elif", out))?;
            } else {
                out.push(format!("{pad}else:"));
                self.child(node, 2, |e, c| e.emit_body(c, indent + 1, out))?;
            }
        }
        Ok(())
    }

    fn emit_function(&mut self, node: &Node, indent: usize, out: &mut Vec<String>) -> EmitResult<()> {
        let count = node.children.len();
        self.arity(node, NodeKind::Function, count >= 1, "at least 1")?;
        let name = self.name_value(node)?;

        let mut params: Vec<String> = Vec::with_capacity(count - 1);
        for i in 0..count - 1 {
            let param = self.child(node, i, |e, n| {
                if e.resolve(n)? != NodeKind::Identifier {
                    return Err(e.misplaced(&n.kind, "in a parameter list"));
                }
                e.exact(n, NodeKind::Identifier, 0, "no")?;
                let param = e.name_value(n)?;
                if params.contains(&param) {
                    return Err(e.misplaced("identifier", "twice in one parameter list"));
                }
                Ok(param)
            })?;
            params.push(param);
        }

        out.push(format!(
            "{}def {}({}):",
            INDENT.repeat(indent),
            name,
            params.join(", ")
        ));

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        self.child(node, count - 1, |e, n| e.emit_body(n, indent + 1, out))?;
        self.function_depth -= 1;
        self.loop_depth = saved_loops;
        Ok(())
    }

    fn emit_target(&mut self, node: &Node) -> EmitResult<String> {
        match self.resolve(node)? {
            NodeKind::Tuple => {
                if node.children.is_empty() {
                    return Err(self.misplaced(&node.kind, "as an empty assignment target"));
                }
                let mut parts = Vec::with_capacity(node.children.len());
                for i in 0..node.children.len() {
                    parts.push(self.child(node, i, |e, n| e.emit_target(n))?);
                }
                Ok(tuple_text(&parts))
            }
            _ => self.emit_single_target(node),
        }
    }

    fn emit_single_target(&mut self, node: &Node) -> EmitResult<String> {
        match self.resolve(node)? {
            NodeKind::Identifier | NodeKind::Attribute | NodeKind::Index => self.emit_expr(node),
            _ => Err(self.misplaced(&node.kind, "as an assignment target")),
        }
    }

    // ===== Expressions =====

    fn emit_expr(&mut self, node: &Node) -> EmitResult<String> {
        let kind = self.resolve(node)?;
        match kind {
            NodeKind::Literal => {
                self.exact(node, kind, 0, "no")?;
                self.emit_literal(node)
            }
            NodeKind::Identifier => {
                self.exact(node, kind, 0, "no")?;
                self.name_value(node)
            }
            NodeKind::Attribute => {
                self.exact(node, kind, 1, "exactly 1")?;
                let name = self.name_value(node)?;
                let object = self.child(node, 0, |e, n| e.emit_expr(n))?;
                // `1.real` does not tokenize; numeric receivers need parentheses
                if node.children[0].node_kind() == Some(NodeKind::Literal) {
                    Ok(format!("({object}).{name}"))
                } else {
                    Ok(format!("{object}.{name}"))
                }
            }
            NodeKind::Index => {
                self.exact(node, kind, 2, "exactly 2")?;
                let object = self.child(node, 0, |e, n| e.emit_expr(n))?;
                let index = self.child(node, 1, |e, n| e.emit_expr(n))?;
                Ok(format!("{object}[{index}]"))
            }
            NodeKind::Call => {
                self.arity(node, kind, !node.children.is_empty(), "at least 1")?;
                let callee = self.child(node, 0, |e, n| e.emit_expr(n))?;
                let mut args = Vec::with_capacity(node.children.len() - 1);
                let mut keywords: Vec<String> = Vec::new();
                for i in 1..node.children.len() {
                    args.push(self.child(node, i, |e, n| e.emit_argument(n, &mut keywords))?);
                }
                Ok(format!("{}({})", callee, args.join(", ")))
            }
            NodeKind::List => {
                let items = self.emit_elements(node)?;
                Ok(format!("[{}]", items.join(", ")))
            }
            NodeKind::Tuple => {
                let items = self.emit_elements(node)?;
                Ok(tuple_text(&items))
            }
            NodeKind::Dict => {
                let mut entries = Vec::with_capacity(node.children.len());
                for i in 0..node.children.len() {
                    entries.push(self.child(node, i, |e, n| e.emit_pair(n))?);
                }
                Ok(format!("{{{}}}", entries.join(", ")))
            }
            NodeKind::BinaryOp => {
                self.exact(node, kind, 2, "exactly 2")?;
                let op = self.operator(node, kind, BINARY_OPERATORS)?;
                let lhs = self.child(node, 0, |e, n| e.emit_expr(n))?;
                let rhs = self.child(node, 1, |e, n| e.emit_expr(n))?;
                Ok(format!("({lhs} {op} {rhs})"))
            }
            NodeKind::UnaryOp => {
                self.exact(node, kind, 1, "exactly 1")?;
                let op = self.operator(node, kind, UNARY_OPERATORS)?;
                let operand = self.child(node, 0, |e, n| e.emit_expr(n))?;
                if op == "not" {
                    Ok(format!("(not {operand})"))
                } else {
                    Ok(format!("({op}{operand})"))
                }
            }
            NodeKind::KeywordArg => Err(self.misplaced(&node.kind, "outside a call")),
            NodeKind::Pair => Err(self.misplaced(&node.kind, "outside a dict")),
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
            | NodeKind::Continue => Err(self.misplaced(&node.kind, "in expression position")),
        }
    }

    fn emit_elements(&mut self, node: &Node) -> EmitResult<Vec<String>> {
        let mut items = Vec::with_capacity(node.children.len());
        for i in 0..node.children.len() {
            items.push(self.child(node, i, |e, n| e.emit_expr(n))?);
        }
        Ok(items)
    }

    fn emit_argument(&mut self, node: &Node, keywords: &mut Vec<String>) -> EmitResult<String> {
        let kind = self.resolve(node)?;
        if kind != NodeKind::KeywordArg {
            if !keywords.is_empty() {
                return Err(self.misplaced(&node.kind, "after a keyword argument"));
            }
            return self.emit_expr(node);
        }

        self.exact(node, kind, 1, "exactly 1")?;
        let name = self.name_value(node)?;
        if keywords.contains(&name) {
            return Err(self.misplaced(&node.kind, "twice with the same name in one call"));
        }
        let value = self.child(node, 0, |e, n| e.emit_expr(n))?;
        keywords.push(name.clone());
        Ok(format!("{name}={value}"))
    }

    fn emit_pair(&mut self, node: &Node) -> EmitResult<String> {
        let kind = self.resolve(node)?;
        if kind != NodeKind::Pair {
            return Err(self.misplaced(&node.kind, "as a dict entry"));
        }
        self.exact(node, kind, 2, "exactly 2")?;
        let key = self.child(node, 0, |e, n| e.emit_expr(n))?;
        let value = self.child(node, 1, |e, n| e.emit_expr(n))?;
        Ok(format!("{key}: {value}"))
    }

    fn emit_literal(&self, node: &Node) -> EmitResult<String> {
        match &node.value {
            None => Ok("None".to_string()),
            Some(Literal::Bool(true)) => Ok("True".to_string()),
            Some(Literal::Bool(false)) => Ok("False".to_string()),
            Some(Literal::Int(n)) => Ok(n.to_string()),
            Some(Literal::UInt(n)) => Ok(n.to_string()),
            Some(Literal::Float(f)) => format_float(*f).ok_or_else(|| TranslationError::InvalidLiteral {
                reason: format!("non-finite float {f}"),
                path: self.location(),
            }),
            Some(Literal::Str(s)) => Ok(quote_string(s)),
            Some(other) => Err(TranslationError::InvalidLiteral {
                reason: format!("{} values cannot be emitted as literals", other.type_name()),
                path: self.location(),
            }),
        }
    }
}

fn tuple_text(items: &[String]) -> String {
    match items {
        [] => "()".to_string(),
        [one] => format!("({one},)"),
        many => format!("({})", many.join(", ")),
    }
}
