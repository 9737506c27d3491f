//! Arena-allocated syntax tree.
//!
//! Nodes live in a flat vector and refer to each other through `NodeId`
//! indices, so the semantic analyzer can rewrite a subtree by overwriting
//! a single slot without touching the parent. Children are ordered and may
//! be either nodes or bare leaf strings (identifier names, literal text).

use std::fmt::Display;

use serde::Serialize;

pub type NodeId = usize;

/// Syntactic category of a node. Structural categories render uppercase,
/// leaf-ish categories lowercase, matching the token vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Prog,
    Main,
    Class,
    Extends,
    Var,
    Method,
    Params,
    Type,
    Array,
    Cmd,
    If,
    Else,
    While,
    Print,
    Exp,
    RExp,
    AExp,
    MExp,
    SExp,
    PExp,
    Exps,
    Identifier,
    Number,
    Reserved,
    Operator,
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Label::Prog => "PROG",
            Label::Main => "MAIN",
            Label::Class => "CLASS",
            Label::Extends => "EXTENDS",
            Label::Var => "VAR",
            Label::Method => "METHOD",
            Label::Params => "PARAMS",
            Label::Type => "TYPE",
            Label::Array => "ARRAY",
            Label::Cmd => "CMD",
            Label::If => "if",
            Label::Else => "else",
            Label::While => "while",
            Label::Print => "System.out.println",
            Label::Exp => "EXP",
            Label::RExp => "REXP",
            Label::AExp => "AEXP",
            Label::MExp => "MEXP",
            Label::SExp => "SEXP",
            Label::PExp => "PEXP",
            Label::Exps => "EXPS",
            Label::Identifier => "identifier",
            Label::Number => "number",
            Label::Reserved => "reserved",
            Label::Operator => "operator",
        })
    }
}

/// Distinguishes syntactically similar shapes that lower differently.
/// `Inherited` marks class members copied in from an ancestor during
/// flattening, so the class table keeps attributing them to the class
/// that actually declares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NodeTag {
    #[default]
    None,
    MethodCall,
    ArrayInit,
    ArrayAssign,
    ArrayLength,
    ArrayIndex,
    Inherited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Child {
    Node(NodeId),
    Leaf(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub label: Label,
    pub tag: NodeTag,
    pub children: Vec<Child>,
}

/// A fully evaluated literal subexpression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    pub root: NodeId,
}

impl Default for SyntaxTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![],
            root: 0,
        }
    }

    pub fn add(&mut self, label: Label, children: Vec<Child>) -> NodeId {
        self.add_tagged(label, NodeTag::None, children)
    }

    pub fn add_tagged(&mut self, label: Label, tag: NodeTag, children: Vec<Child>) -> NodeId {
        self.nodes.push(Node {
            label,
            tag,
            children,
        });
        self.nodes.len() - 1
    }

    /// Convenience for the `label(leaf)` shape, e.g. `identifier(foo)`.
    pub fn add_leaf(&mut self, label: Label, text: impl ToString) -> NodeId {
        self.add(label, vec![Child::Leaf(text.to_string())])
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Overwrite a node in place. Parents referring to `id` keep pointing
    /// at the replacement, which is what makes folding rewrites cheap.
    pub fn replace(&mut self, id: NodeId, label: Label, tag: NodeTag, children: Vec<Child>) {
        self.nodes[id] = Node {
            label,
            tag,
            children,
        };
    }

    /// Child node id at position `index`, if that child is a node.
    pub fn child_node(&self, id: NodeId, index: usize) -> Option<NodeId> {
        match self.node(id).children.get(index) {
            Some(Child::Node(child)) => Some(*child),
            _ => None,
        }
    }

    /// The single leaf string under a `label(leaf)` node.
    pub fn leaf_text(&self, id: NodeId) -> Option<&str> {
        match self.node(id).children.as_slice() {
            [Child::Leaf(text)] => Some(text),
            _ => None,
        }
    }

    /// Leaf string of the child node at `index`, e.g. the name under an
    /// `identifier` child.
    pub fn child_leaf_text(&self, id: NodeId, index: usize) -> Option<&str> {
        self.child_node(id, index).and_then(|c| self.leaf_text(c))
    }

    /// Deep-copies the subtree rooted at `id`, returning the new root.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id).clone();
        let children = node
            .children
            .iter()
            .map(|child| match child {
                Child::Node(child_id) => Child::Node(self.deep_copy(*child_id)),
                Child::Leaf(text) => Child::Leaf(text.clone()),
            })
            .collect();
        self.add_tagged(node.label, node.tag, children)
    }

    /// Whether the subtree mentions any identifier. Subtrees that do can
    /// never be folded to a literal.
    pub fn mentions_identifier(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if node.label == Label::Identifier {
            return true;
        }
        node.children.iter().any(|child| match child {
            Child::Node(child_id) => self.mentions_identifier(*child_id),
            Child::Leaf(_) => false,
        })
    }

    /// Evaluate a subexpression whose leaves are all literal, with 32-bit
    /// two's-complement wrapping arithmetic. Signed `<`, bitwise equality.
    /// Returns `None` for anything that is not a closed literal shape.
    pub fn evaluate(&self, id: NodeId) -> Option<Value> {
        let node = self.node(id);
        match node.label {
            Label::Number => {
                let text = self.leaf_text(id)?;
                Some(Value::Int(text.parse::<i64>().ok()? as i32))
            }
            Label::Reserved => match self.leaf_text(id)? {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            Label::AExp | Label::MExp => {
                let (lhs, op, rhs) = self.binary_parts(id)?;
                let (Value::Int(lhs), Value::Int(rhs)) = (lhs, rhs) else {
                    return None;
                };
                match op {
                    "+" => Some(Value::Int(lhs.wrapping_add(rhs))),
                    "-" => Some(Value::Int(lhs.wrapping_sub(rhs))),
                    "*" => Some(Value::Int(lhs.wrapping_mul(rhs))),
                    _ => None,
                }
            }
            Label::RExp => {
                let (lhs, op, rhs) = self.binary_parts(id)?;
                let (Value::Int(lhs), Value::Int(rhs)) = (lhs, rhs) else {
                    return None;
                };
                match op {
                    "<" => Some(Value::Bool(lhs < rhs)),
                    "==" => Some(Value::Bool(lhs == rhs)),
                    "!=" => Some(Value::Bool(lhs != rhs)),
                    _ => None,
                }
            }
            Label::Exp => {
                let (lhs, op, rhs) = self.binary_parts(id)?;
                let (Value::Bool(lhs), Value::Bool(rhs)) = (lhs, rhs) else {
                    return None;
                };
                match op {
                    "&&" => Some(Value::Bool(lhs && rhs)),
                    _ => None,
                }
            }
            Label::SExp => match node.children.as_slice() {
                [Child::Node(child)] => self.evaluate(*child),
                [Child::Node(op), Child::Node(operand)] => {
                    let op = self.leaf_text(*op)?;
                    match (op, self.evaluate(*operand)?) {
                        ("-", Value::Int(value)) => Some(Value::Int(value.wrapping_neg())),
                        ("!", Value::Bool(value)) => Some(Value::Bool(!value)),
                        _ => None,
                    }
                }
                _ => None,
            },
            Label::PExp => match node.children.as_slice() {
                // parenthesized expression
                [Child::Node(child)] if node.tag == NodeTag::None => self.evaluate(*child),
                _ => None,
            },
            _ => None,
        }
    }

    fn binary_parts(&self, id: NodeId) -> Option<(Value, &str, Value)> {
        let node = self.node(id);
        let [Child::Node(lhs), Child::Node(op), Child::Node(rhs)] = node.children.as_slice() else {
            return None;
        };
        Some((
            self.evaluate(*lhs)?,
            self.leaf_text(*op)?,
            self.evaluate(*rhs)?,
        ))
    }

    /// Render the subtree as `LABEL(child, ...)`, mirroring how nodes are
    /// shown in diagnostics.
    pub fn render(&self, id: NodeId) -> String {
        let node = self.node(id);
        if let Some(text) = self.leaf_text(id) {
            return format!("{}({})", node.label, text);
        }
        let children = node
            .children
            .iter()
            .map(|child| match child {
                Child::Node(child_id) => self.render(*child_id),
                Child::Leaf(text) => text.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", node.label, children)
    }
}
