//! Semantic analysis over the parsed tree.
//!
//! Runs, in order: class-graph construction and topological reordering of
//! `PROG`, inheritance flattening, symbol collection with
//! use-before-declaration checks, method-call validation, constant folding,
//! and simplification of `if` commands with literal conditions. The tree is
//! mutated in place; everything later reads it as-is.

mod error;
mod symbols;

pub use error::*;
pub use symbols::*;

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::ast::{Child, Label, NodeId, NodeTag, SyntaxTree, Value};

pub type SemResult<T> = Result<T, SemanticError>;

/// Everything later stages need besides the rewritten tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub classes: ClassTable,
    /// Name of the class holding `main`.
    pub main_class: String,
}

pub fn analyze(tree: &mut SyntaxTree) -> SemResult<Analysis> {
    Semantic::new(tree).run()
}

struct Semantic<'t> {
    tree: &'t mut SyntaxTree,
    symbols: SymbolTable,
    classes: ClassTable,
    main_class: String,
}

impl<'t> Semantic<'t> {
    fn new(tree: &'t mut SyntaxTree) -> Self {
        Self {
            tree,
            symbols: SymbolTable::default(),
            classes: ClassTable::default(),
            main_class: String::new(),
        }
    }

    fn run(mut self) -> SemResult<Analysis> {
        self.sort_classes()?;
        self.build_class_table()?;
        self.flatten_inheritance();
        self.collect_and_check()?;
        self.validate_calls(self.tree.root)?;
        self.fold_constants(self.tree.root);
        self.simplify_literal_ifs(self.tree.root);

        Ok(Analysis {
            symbols: self.symbols,
            classes: self.classes,
            main_class: self.main_class,
        })
    }

    /// Topologically sort `PROG`'s classes so every class follows its
    /// parent, with `MAIN` pinned last. Kahn's algorithm; leftovers mean
    /// an inheritance cycle.
    fn sort_classes(&mut self) -> SemResult<()> {
        let mut main = None;
        let mut classes = vec![];

        for child in self.tree.node(self.tree.root).children.clone() {
            let Child::Node(id) = child else { continue };
            match self.tree.node(id).label {
                Label::Main => main = Some(id),
                Label::Class => {
                    let name = self
                        .tree
                        .child_leaf_text(id, 0)
                        .unwrap_or_default()
                        .to_string();
                    let parent = self.class_parent(id);
                    classes.push((name, parent, id));
                }
                _ => {}
            }
        }

        for (name, parent, _) in &classes {
            if let Some(parent) = parent {
                if !classes.iter().any(|(other, _, _)| other == parent) {
                    return Err(SemanticError::new(format!(
                        "class '{name}' extends unknown class '{parent}'"
                    )));
                }
            }
        }

        let mut in_degree: HashMap<&str, usize> = classes
            .iter()
            .map(|(name, parent, _)| (name.as_str(), usize::from(parent.is_some())))
            .collect();
        let mut queue: VecDeque<&str> = classes
            .iter()
            .filter(|(name, _, _)| in_degree[name.as_str()] == 0)
            .map(|(name, _, _)| name.as_str())
            .collect();

        let mut sorted = vec![];
        while let Some(current) = queue.pop_front() {
            let (_, _, id) = classes
                .iter()
                .find(|(name, _, _)| name.as_str() == current)
                .expect("queued classes were collected above");
            sorted.push(*id);
            for (name, parent, _) in &classes {
                if parent.as_deref() == Some(current) {
                    let degree = in_degree.get_mut(name.as_str()).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(name);
                    }
                }
            }
        }

        if sorted.len() != classes.len() {
            return Err(SemanticError::new("cyclic inheritance between classes"));
        }

        let mut children: Vec<Child> = sorted.into_iter().map(Child::Node).collect();
        if let Some(main) = main {
            children.push(Child::Node(main));
        }
        debug!("class order after topological sort: {} entries", children.len());
        self.tree.node_mut(self.tree.root).children = children;
        Ok(())
    }

    fn class_parent(&self, class: NodeId) -> Option<String> {
        let extends = self.tree.child_node(class, 1)?;
        if self.tree.node(extends).label != Label::Extends {
            return None;
        }
        self.tree.child_leaf_text(extends, 0).map(str::to_string)
    }

    /// Record every class with its own (unflattened) members so method
    /// resolution can climb to the declaring class later.
    fn build_class_table(&mut self) -> SemResult<()> {
        for child in self.tree.node(self.tree.root).children.clone() {
            let Child::Node(id) = child else { continue };
            match self.tree.node(id).label {
                Label::Main => {
                    self.main_class = self
                        .tree
                        .child_leaf_text(id, 0)
                        .unwrap_or_default()
                        .to_string();
                }
                Label::Class => {
                    let name = self
                        .tree
                        .child_leaf_text(id, 0)
                        .unwrap_or_default()
                        .to_string();
                    let mut fields = vec![];
                    let mut methods = vec![];

                    for member in self.member_ids(id) {
                        if self.tree.node(member).tag == NodeTag::Inherited {
                            continue;
                        }
                        match self.tree.node(member).label {
                            Label::Var => {
                                let field_type = self.type_text(member, 0);
                                let field_name = self
                                    .tree
                                    .child_leaf_text(member, 1)
                                    .unwrap_or_default()
                                    .to_string();
                                fields.push((field_name, field_type));
                            }
                            Label::Method => {
                                methods.push(self.method_signature(member, &name));
                            }
                            _ => {}
                        }
                    }

                    self.classes.insert(ClassInfo {
                        name: name.clone(),
                        parent: self.class_parent(id),
                        fields,
                        methods,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn method_signature(&self, method: NodeId, class: &str) -> MethodSig {
        let return_type = self.type_text(method, 0);
        let name = self
            .tree
            .child_leaf_text(method, 1)
            .unwrap_or_default()
            .to_string();
        let mut param_types = vec![];
        if let Some(params) = self.tree.child_node(method, 2) {
            let count = self.tree.node(params).children.len();
            for index in (0..count).step_by(2) {
                if let Some(tipo) = self.tree.child_node(params, index) {
                    param_types.push(self.type_node_text(tipo));
                }
            }
        }
        MethodSig {
            name,
            return_type,
            param_types,
            class: class.to_string(),
        }
    }

    /// Textual form of the TYPE child at `index` of `node`.
    fn type_text(&self, node: NodeId, index: usize) -> String {
        self.tree
            .child_node(node, index)
            .map(|tipo| self.type_node_text(tipo))
            .unwrap_or_default()
    }

    fn type_node_text(&self, tipo: NodeId) -> String {
        let node = self.tree.node(tipo);
        let base = self
            .tree
            .child_leaf_text(tipo, 0)
            .unwrap_or_default()
            .to_string();
        if node.children.len() == 2 {
            format!("{base}[]")
        } else {
            base
        }
    }

    /// Member node ids of a class (children after name and EXTENDS).
    fn member_ids(&self, class: NodeId) -> Vec<NodeId> {
        self.tree.node(class).children[2..]
            .iter()
            .filter_map(|child| match child {
                Child::Node(id) => Some(*id),
                Child::Leaf(_) => None,
            })
            .collect()
    }

    fn member_name(&self, member: NodeId) -> Option<String> {
        self.tree.child_leaf_text(member, 1).map(str::to_string)
    }

    /// Copy ancestor members into each subclass right after its header so
    /// later passes never have to climb the hierarchy. A member the child
    /// already declares shadows the ancestor's and is not copied, which
    /// also keeps repeated analysis runs from duplicating members.
    fn flatten_inheritance(&mut self) {
        for child in self.tree.node(self.tree.root).children.clone() {
            let Child::Node(class) = child else { continue };
            if self.tree.node(class).label != Label::Class {
                continue;
            }
            let Some(parent_name) = self.class_parent(class) else {
                continue;
            };
            let Some(parent) = self.find_class_node(&parent_name) else {
                continue;
            };

            let own_names: Vec<String> = self
                .member_ids(class)
                .iter()
                .filter_map(|member| self.member_name(*member))
                .collect();

            let mut inherited = vec![];
            for member in self.member_ids(parent) {
                let label = self.tree.node(member).label;
                if !matches!(label, Label::Var | Label::Method) {
                    continue;
                }
                match self.member_name(member) {
                    Some(name) if !own_names.contains(&name) => {
                        let copy = self.tree.deep_copy(member);
                        self.tree.node_mut(copy).tag = NodeTag::Inherited;
                        inherited.push(Child::Node(copy));
                    }
                    _ => {}
                }
            }

            let class_node = self.tree.node_mut(class);
            class_node.children.splice(2..2, inherited);
        }
    }

    fn find_class_node(&self, name: &str) -> Option<NodeId> {
        for child in &self.tree.node(self.tree.root).children {
            let Child::Node(id) = child else { continue };
            if self.tree.node(*id).label == Label::Class
                && self.tree.child_leaf_text(*id, 0) == Some(name)
            {
                return Some(*id);
            }
        }
        None
    }

    /// Walk declarations in document order and check every identifier use
    /// against what has been declared so far.
    fn collect_and_check(&mut self) -> SemResult<()> {
        for child in self.tree.node(self.tree.root).children.clone() {
            let Child::Node(id) = child else { continue };
            match self.tree.node(id).label {
                Label::Main => self.collect_main(id)?,
                Label::Class => self.collect_class(id)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn declare(&mut self, symbol: Symbol) -> SemResult<()> {
        self.symbols.declare(symbol).map_err(SemanticError::new)
    }

    fn collect_main(&mut self, main: NodeId) -> SemResult<()> {
        let class = self.main_class.clone();
        let arg = self
            .tree
            .child_leaf_text(main, 1)
            .unwrap_or_default()
            .to_string();
        self.declare(Symbol {
            name: arg,
            declared_type: "String[]".into(),
            kind: SymbolKind::Param,
            class: class.clone(),
            method: Some("main".into()),
            position: Some(0),
        })?;

        for index in 2..self.tree.node(main).children.len() {
            if let Some(cmd) = self.tree.child_node(main, index) {
                self.check_uses(cmd, &class, Some("main"))?;
            }
        }
        Ok(())
    }

    fn collect_class(&mut self, class: NodeId) -> SemResult<()> {
        let class_name = self
            .tree
            .child_leaf_text(class, 0)
            .unwrap_or_default()
            .to_string();

        for member in self.member_ids(class) {
            match self.tree.node(member).label {
                Label::Var => {
                    let declared_type = self.type_text(member, 0);
                    let name = self.member_name(member).unwrap_or_default();
                    self.declare(Symbol {
                        name,
                        declared_type,
                        kind: SymbolKind::Field,
                        class: class_name.clone(),
                        method: None,
                        position: None,
                    })?;
                }
                Label::Method => self.collect_method(member, &class_name)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn collect_method(&mut self, method: NodeId, class_name: &str) -> SemResult<()> {
        let method_name = self.member_name(method).unwrap_or_default();
        let return_type = self.type_text(method, 0);
        self.declare(Symbol {
            name: method_name.clone(),
            declared_type: return_type,
            kind: SymbolKind::Method,
            class: class_name.to_string(),
            method: None,
            position: None,
        })?;

        if let Some(params) = self.tree.child_node(method, 2) {
            let count = self.tree.node(params).children.len();
            for (position, index) in (0..count).step_by(2).enumerate() {
                let declared_type = self
                    .tree
                    .child_node(params, index)
                    .map(|tipo| self.type_node_text(tipo))
                    .unwrap_or_default();
                let name = self
                    .tree
                    .child_leaf_text(params, index + 1)
                    .unwrap_or_default()
                    .to_string();
                self.declare(Symbol {
                    name,
                    declared_type,
                    kind: SymbolKind::Param,
                    class: class_name.to_string(),
                    method: Some(method_name.clone()),
                    position: Some(position),
                })?;
            }
        }

        for index in 3..self.tree.node(method).children.len() {
            let Some(child) = self.tree.child_node(method, index) else {
                continue;
            };
            if self.tree.node(child).label == Label::Var {
                let declared_type = self.type_text(child, 0);
                let name = self.member_name(child).unwrap_or_default();
                self.declare(Symbol {
                    name,
                    declared_type,
                    kind: SymbolKind::Local,
                    class: class_name.to_string(),
                    method: Some(method_name.clone()),
                    position: None,
                })?;
            } else {
                self.check_uses(child, class_name, Some(&method_name))?;
            }
        }
        Ok(())
    }

    /// Every variable reference inside commands and expressions must
    /// already be in the symbol table.
    fn check_uses(&self, node: NodeId, class: &str, method: Option<&str>) -> SemResult<()> {
        let current = self.tree.node(node).clone();
        match current.label {
            Label::Cmd if !current.children.is_empty() => {
                // assignment targets are identifier children in slot 0
                if let Some(target) = self.tree.child_node(node, 0) {
                    if self.tree.node(target).label == Label::Identifier {
                        self.check_variable(target, class, method)?;
                    }
                }
            }
            Label::PExp => match current.children.as_slice() {
                [Child::Node(base)] if self.tree.node(*base).label == Label::Identifier => {
                    self.check_variable(*base, class, method)?;
                }
                [Child::Node(base), Child::Node(name)]
                    if current.tag == NodeTag::None
                        && self.tree.node(*base).label == Label::PExp
                        && self.tree.node(*name).label == Label::Identifier =>
                {
                    self.check_field_access(node, class, method)?;
                }
                _ => {}
            },
            Label::Type => {
                if let Some(name) = self.tree.child_node(node, 0) {
                    if self.tree.node(name).label == Label::Identifier {
                        let class_name = self.tree.leaf_text(name).unwrap_or_default();
                        if !self.classes.contains(class_name) {
                            return Err(SemanticError::new(format!(
                                "unknown class '{class_name}'"
                            )));
                        }
                    }
                }
            }
            _ => {}
        }

        for child in &current.children {
            if let Child::Node(id) = child {
                self.check_uses(*id, class, method)?;
            }
        }
        Ok(())
    }

    fn check_variable(&self, identifier: NodeId, class: &str, method: Option<&str>) -> SemResult<()> {
        let name = self.tree.leaf_text(identifier).unwrap_or_default();
        if self.symbols.lookup(class, method, name).is_none() {
            return Err(SemanticError::new(format!(
                "tried using variable '{name}' before declaration"
            )));
        }
        Ok(())
    }

    fn check_field_access(&self, access: NodeId, class: &str, method: Option<&str>) -> SemResult<()> {
        let base = self.tree.child_node(access, 0).expect("shape checked by caller");
        let field = self
            .tree
            .child_leaf_text(access, 1)
            .unwrap_or_default()
            .to_string();
        let Some(receiver) = self.receiver_class(base, class, method) else {
            // receiver type not statically known here; the shape was
            // already validated grammatically
            return Ok(());
        };
        if self.classes.resolve_field(&receiver, &field).is_none() {
            return Err(SemanticError::new(format!(
                "class '{receiver}' has no field '{field}'"
            )));
        }
        Ok(())
    }

    /// Static class of a receiver expression: `this`, `new C()`, a typed
    /// variable, or a nested call's return type.
    fn receiver_class(&self, base: NodeId, class: &str, method: Option<&str>) -> Option<String> {
        let node = self.tree.node(base);
        if node.label != Label::PExp {
            return None;
        }
        if node.tag == NodeTag::MethodCall {
            let inner = self.tree.child_node(base, 0)?;
            let receiver = self.receiver_class(inner, class, method)?;
            let name = self.tree.child_leaf_text(base, 1)?;
            return self
                .classes
                .resolve_method(&receiver, name)
                .map(|sig| sig.return_type.clone());
        }
        match node.children.as_slice() {
            [Child::Node(only)] => match self.tree.node(*only).label {
                Label::Reserved if self.tree.leaf_text(*only) == Some("this") => {
                    Some(class.to_string())
                }
                Label::Identifier => {
                    let name = self.tree.leaf_text(*only)?;
                    self.symbols
                        .lookup(class, method, name)
                        .map(|symbol| symbol.declared_type.clone())
                }
                _ => None,
            },
            [Child::Node(new), Child::Node(name)]
                if self.tree.leaf_text(*new) == Some("new")
                    && self.tree.node(*name).label == Label::Identifier =>
            {
                self.tree.leaf_text(*name).map(str::to_string)
            }
            _ => None,
        }
    }

    /// Validate arity and argument types of every `method_call` node.
    fn validate_calls(&self, node: NodeId) -> SemResult<()> {
        self.validate_calls_in(node, &self.main_class, Some("main"))
    }

    fn validate_calls_in(&self, node: NodeId, class: &str, method: Option<&str>) -> SemResult<()> {
        let current = self.tree.node(node).clone();

        let (class, method) = match current.label {
            Label::Class => (
                self.tree
                    .child_leaf_text(node, 0)
                    .unwrap_or_default()
                    .to_string(),
                None,
            ),
            Label::Method => (
                class.to_string(),
                self.tree.child_leaf_text(node, 1).map(str::to_string),
            ),
            Label::Main => (self.main_class.clone(), Some("main".to_string())),
            _ => (class.to_string(), method.map(str::to_string)),
        };

        if current.label == Label::PExp && current.tag == NodeTag::MethodCall {
            self.validate_call(node, &class, method.as_deref())?;
        }

        for child in &current.children {
            if let Child::Node(id) = child {
                self.validate_calls_in(*id, &class, method.as_deref())?;
            }
        }
        Ok(())
    }

    fn validate_call(&self, call: NodeId, class: &str, method: Option<&str>) -> SemResult<()> {
        let base = self.tree.child_node(call, 0).expect("method_call shape");
        let name = self
            .tree
            .child_leaf_text(call, 1)
            .unwrap_or_default()
            .to_string();

        let Some(receiver) = self.receiver_class(base, class, method) else {
            return Err(SemanticError::new(format!(
                "cannot determine the receiver class of call to '{name}'"
            )));
        };
        let Some(signature) = self.classes.resolve_method(&receiver, &name) else {
            return Err(SemanticError::new(format!(
                "unknown method '{name}' on class '{receiver}'"
            )));
        };

        let exps = self.tree.child_node(call, 2).expect("method_call shape");
        let arguments: Vec<NodeId> = self
            .tree
            .node(exps)
            .children
            .iter()
            .filter_map(|child| match child {
                Child::Node(id) => Some(*id),
                Child::Leaf(_) => None,
            })
            .collect();

        if arguments.len() != signature.param_types.len() {
            return Err(SemanticError::new(format!(
                "invalid number of arguments for method '{name}': expected {}, got {}",
                signature.param_types.len(),
                arguments.len()
            )));
        }

        for (position, (argument, expected)) in
            arguments.iter().zip(&signature.param_types).enumerate()
        {
            let Some(actual) = self.infer_type(*argument, class, method) else {
                continue;
            };
            if !Self::types_compatible(&actual, expected) {
                return Err(SemanticError::new(format!(
                    "invalid type for argument {position} of method '{name}': expected {expected}, got {actual}"
                )));
            }
        }
        Ok(())
    }

    fn types_compatible(actual: &str, expected: &str) -> bool {
        if actual == expected {
            return true;
        }
        // `null` fits any reference-like parameter
        actual == "null" && expected != "int" && expected != "boolean"
    }

    /// Static type of an expression node, where determinable.
    fn infer_type(&self, node: NodeId, class: &str, method: Option<&str>) -> Option<String> {
        let current = self.tree.node(node);
        match current.label {
            Label::Number => Some("int".into()),
            Label::AExp | Label::MExp => Some("int".into()),
            Label::RExp | Label::Exp => Some("boolean".into()),
            Label::Reserved => match self.tree.leaf_text(node)? {
                "true" | "false" => Some("boolean".into()),
                "null" => Some("null".into()),
                _ => None,
            },
            Label::SExp => match current.tag {
                NodeTag::ArrayInit => Some("int[]".into()),
                _ => match current.children.as_slice() {
                    [Child::Node(only)] => self.infer_type(*only, class, method),
                    [Child::Node(op), Child::Node(_)] => {
                        match self.tree.leaf_text(*op)? {
                            "-" => Some("int".into()),
                            "!" => Some("boolean".into()),
                            _ => None,
                        }
                    }
                    _ => None,
                },
            },
            Label::PExp => match current.tag {
                NodeTag::ArrayLength | NodeTag::ArrayIndex => Some("int".into()),
                NodeTag::MethodCall => {
                    let base = self.tree.child_node(node, 0)?;
                    let receiver = self.receiver_class(base, class, method)?;
                    let name = self.tree.child_leaf_text(node, 1)?;
                    self.classes
                        .resolve_method(&receiver, name)
                        .map(|sig| sig.return_type.clone())
                }
                NodeTag::None => match current.children.as_slice() {
                    [Child::Node(only)] => match self.tree.node(*only).label {
                        Label::Identifier => {
                            let name = self.tree.leaf_text(*only)?;
                            self.symbols
                                .lookup(class, method, name)
                                .map(|symbol| symbol.declared_type.clone())
                        }
                        Label::Reserved if self.tree.leaf_text(*only) == Some("this") => {
                            Some(class.to_string())
                        }
                        _ => self.infer_type(*only, class, method),
                    },
                    [Child::Node(new), Child::Node(name)]
                        if self.tree.leaf_text(*new) == Some("new") =>
                    {
                        self.tree.leaf_text(*name).map(str::to_string)
                    }
                    [Child::Node(_), Child::Node(_)] => {
                        // field access: type of the field on the receiver
                        let base = self.tree.child_node(node, 0)?;
                        let receiver = self.receiver_class(base, class, method)?;
                        let field = self.tree.child_leaf_text(node, 1)?;
                        self.classes
                            .resolve_field(&receiver, field)
                            .map(|(_, tipo)| tipo.clone())
                    }
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    /// Bottom-up folding: any arithmetic, relational or logical subtree
    /// built entirely from literals becomes a single literal node.
    fn fold_constants(&mut self, node: NodeId) {
        for child in self.tree.node(node).children.clone() {
            if let Child::Node(id) = child {
                self.fold_constants(id);
            }
        }

        let label = self.tree.node(node).label;
        if !matches!(label, Label::AExp | Label::MExp | Label::RExp | Label::Exp) {
            return;
        }
        if self.tree.mentions_identifier(node) {
            return;
        }
        match self.tree.evaluate(node) {
            Some(Value::Int(value)) => {
                let literal = self.tree.add_leaf(Label::Number, value);
                self.tree
                    .replace(node, Label::SExp, NodeTag::None, vec![Child::Node(literal)]);
            }
            Some(Value::Bool(value)) => {
                let literal = self.tree.add_leaf(Label::Reserved, value);
                self.tree
                    .replace(node, Label::SExp, NodeTag::None, vec![Child::Node(literal)]);
            }
            None => {}
        }
    }

    /// `if (true)`/`if (false)` after folding: keep only the live branch.
    fn simplify_literal_ifs(&mut self, node: NodeId) {
        for child in self.tree.node(node).children.clone() {
            if let Child::Node(id) = child {
                self.simplify_literal_ifs(id);
            }
        }

        if self.tree.node(node).label != Label::Cmd {
            return;
        }
        let Some(if_node) = self.tree.child_node(node, 0) else {
            return;
        };
        if self.tree.node(if_node).label != Label::If {
            return;
        }
        let Some(condition) = self.tree.child_node(if_node, 0) else {
            return;
        };
        let literal = match self.tree.evaluate(condition) {
            Some(Value::Bool(value)) => value,
            _ => return,
        };

        if literal {
            let then_cmd = self.tree.child_node(if_node, 1).expect("if shape");
            self.tree.node_mut(node).children = vec![Child::Node(then_cmd)];
        } else {
            let else_branch = self.tree.child_node(node, 1);
            match else_branch {
                Some(else_node) if self.tree.node(else_node).label == Label::Else => {
                    let else_cmd = self.tree.child_node(else_node, 0).expect("else shape");
                    self.tree.node_mut(node).children = vec![Child::Node(else_cmd)];
                }
                _ => self.tree.node_mut(node).children = vec![],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::Lexer, parser};

    fn analyzed(source: &str) -> (SyntaxTree, Analysis) {
        let tokens = Lexer::new(source).lex().unwrap();
        let mut tree = parser::parse(tokens).unwrap();
        let analysis = analyze(&mut tree).unwrap();
        (tree, analysis)
    }

    fn analyze_err(source: &str) -> SemanticError {
        let tokens = Lexer::new(source).lex().unwrap();
        let mut tree = parser::parse(tokens).unwrap();
        analyze(&mut tree).unwrap_err()
    }

    const MAIN_ONLY: &str = "class P { public static void main(String[] a) { } }";

    #[test]
    fn test_classes_sorted_parent_first_main_last() {
        let (tree, _) = analyzed(
            "class P { public static void main(String[] a) { } }
             class B extends A { public int b() { return 1; } }
             class A { public int a() { return 0; } }",
        );

        let order: Vec<_> = tree
            .node(tree.root)
            .children
            .iter()
            .map(|child| match child {
                Child::Node(id) => tree
                    .child_leaf_text(*id, 0)
                    .unwrap_or_default()
                    .to_string(),
                Child::Leaf(_) => unreachable!(),
            })
            .collect();

        assert_eq!(order, vec!["A", "B", "P"]);
    }

    #[test]
    fn test_cyclic_inheritance_is_fatal() {
        let error = analyze_err(
            "class P { public static void main(String[] a) { } }
             class A extends B { public int a() { return 0; } }
             class B extends A { public int b() { return 1; } }",
        );

        assert!(error.message.contains("cyclic"));
    }

    #[test]
    fn test_flattening_copies_parent_members() {
        let (tree, _) = analyzed(
            "class P { public static void main(String[] a) { } }
             class A { int x; public int get() { return x; } }
             class B extends A { public int twice() { return this.get() + this.get(); } }",
        );

        // B is second after sorting: [A, B, P]
        let b = tree.child_node(tree.root, 1).unwrap();
        let labels: Vec<_> = tree.node(b).children[2..]
            .iter()
            .map(|child| match child {
                Child::Node(id) => tree.node(*id).label,
                Child::Leaf(_) => unreachable!(),
            })
            .collect();

        assert_eq!(
            labels,
            vec![Label::Var, Label::Method, Label::Method],
            "B should gain A's field and method before its own"
        );
    }

    #[test]
    fn test_child_declaration_shadows_parent() {
        let (tree, analysis) = analyzed(
            "class P { public static void main(String[] a) { } }
             class A { public int get() { return 1; } }
             class B extends A { public int get() { return 2; } }",
        );

        let b = tree.child_node(tree.root, 1).unwrap();
        let methods = tree.node(b).children[2..].len();
        assert_eq!(methods, 1, "A.get must not be copied next to B.get");

        let sig = analysis.classes.resolve_method("B", "get").unwrap();
        assert_eq!(sig.class, "B");
    }

    #[test]
    fn test_use_before_declaration_is_fatal() {
        let error = analyze_err(
            "class P { public static void main(String[] a) { x = 1; } }",
        );

        assert!(error.message.contains("before declaration"));
    }

    #[test]
    fn test_unknown_method_is_fatal() {
        let error = analyze_err(
            "class P { public static void main(String[] a) { System.out.println(new A().missing()); } }
             class A { public int a() { return 0; } }",
        );

        assert!(error.message.contains("unknown method 'missing'"));
    }

    #[test]
    fn test_arity_mismatch_is_fatal() {
        let error = analyze_err(
            "class P { public static void main(String[] a) { } }
             class A {
                 public int add(int x, int y) { return x + y; }
                 public int call() { return this.add(1); }
             }",
        );

        assert!(error.message.contains("expected 2, got 1"));
    }

    #[test]
    fn test_argument_type_mismatch_is_fatal() {
        let error = analyze_err(
            "class P { public static void main(String[] a) { } }
             class A {
                 public int add(int x) { return x; }
                 public int call() { return this.add(true); }
             }",
        );

        assert!(error.message.contains("expected int, got boolean"));
    }

    #[test]
    fn test_method_resolution_climbs_ancestors() {
        let (_, analysis) = analyzed(
            "class P { public static void main(String[] a) { System.out.println(new B().m()); } }
             class A { public int m() { return 1; } }
             class B extends A { public int own() { return 2; } }",
        );

        let sig = analysis.classes.resolve_method("B", "m").unwrap();
        assert_eq!(sig.class, "A");
    }

    #[test]
    fn test_constant_folding_produces_single_literal() {
        let (tree, _) = analyzed(
            "class P { public static void main(String[] a) { } }
             class C { public int m() { int x; x = 2 + 3 * 4; return x; } }",
        );

        let class = tree.child_node(tree.root, 0).unwrap();
        let method = tree.child_node(class, 2).unwrap();
        let cmd = tree.child_node(method, 4).unwrap();
        let rhs = tree.child_node(cmd, 2).unwrap();

        assert_eq!(tree.node(rhs).label, Label::SExp);
        let literal = tree.child_node(rhs, 0).unwrap();
        assert_eq!(tree.node(literal).label, Label::Number);
        assert_eq!(tree.leaf_text(literal), Some("14"));
    }

    #[test]
    fn test_relational_folding_yields_reserved_literal() {
        let (tree, _) = analyzed(
            "class P { public static void main(String[] a) { } }
             class C { public boolean m() { return 1 < 2; } }",
        );

        let class = tree.child_node(tree.root, 0).unwrap();
        let method = tree.child_node(class, 2).unwrap();
        let count = tree.node(method).children.len();
        let returned = tree.child_node(method, count - 1).unwrap();

        assert_eq!(tree.node(returned).label, Label::SExp);
        let literal = tree.child_node(returned, 0).unwrap();
        assert_eq!(tree.node(literal).label, Label::Reserved);
        assert_eq!(tree.leaf_text(literal), Some("true"));
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let source = "class P { public static void main(String[] a) { if (1 < 2) { System.out.println(3 * 3); } } }
             class A { int x; public int get() { return x; } }
             class B extends A { public int call() { return this.get(); } }";

        let tokens = Lexer::new(source).lex().unwrap();
        let mut tree = parser::parse(tokens).unwrap();
        let first = analyze(&mut tree).unwrap();
        let snapshot = tree.clone();
        let second = analyze(&mut tree).unwrap();

        assert_eq!(tree, snapshot);
        assert_eq!(first, second);
    }

    #[test]
    fn test_main_only_program_analyzes() {
        let (_, analysis) = analyzed(MAIN_ONLY);
        assert_eq!(analysis.main_class, "P");
    }
}
