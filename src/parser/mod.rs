//! Recursive-descent parser.
//!
//! One method per grammar nonterminal, driven by an index cursor over the
//! significant tokens (whitespace and comments are dropped on entry). The
//! parser needs one token of lookahead almost everywhere and two to tell
//! `new int[...]` from `new ClassName()` and `.length` from a method call.

use std::{error::Error, fmt::Display};

use colored::Colorize;

use crate::{
    ast::{Child, Label, NodeId, NodeTag, SyntaxTree},
    lexer::{Token, TokenKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub expected: String,
    pub actual: Option<Token>,
    pub index: usize,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let actual = match &self.actual {
            Some(token) => token.to_string(),
            None => "end of input".to_string(),
        };
        write!(
            f,
            "expected {}, got {} @ token {}",
            self.expected,
            actual.red(),
            self.index
        )
    }
}

impl Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    tree: SyntaxTree,
}

/// Parse a token stream into a syntax tree rooted at `PROG`.
pub fn parse(tokens: Vec<Token>) -> ParseResult<SyntaxTree> {
    Parser::new(tokens).parse()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .filter(Token::is_significant)
                .collect(),
            index: 0,
            tree: SyntaxTree::new(),
        }
    }

    pub fn parse(mut self) -> ParseResult<SyntaxTree> {
        let root = self.parse_prog()?;
        self.tree.root = root;
        Ok(self.tree)
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn lookahead(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset)
    }

    fn current_value(&self) -> Option<&str> {
        self.current().map(|token| token.lexeme.as_str())
    }

    fn current_is(&self, value: &str) -> bool {
        self.current_value() == Some(value)
    }

    fn error(&self, expected: impl ToString) -> ParseError {
        ParseError {
            expected: expected.to_string(),
            actual: self.current().cloned(),
            index: self.index,
        }
    }

    fn consume(&mut self, kind: TokenKind, value: Option<&str>) -> ParseResult<Token> {
        match self.current() {
            Some(token) if token.kind == kind && value.map_or(true, |v| token.lexeme == v) => {
                let token = token.clone();
                self.index += 1;
                Ok(token)
            }
            _ => {
                let expected = match value {
                    Some(value) => format!("{kind} ('{value}')"),
                    None => kind.to_string(),
                };
                Err(self.error(expected))
            }
        }
    }

    fn identifier(&mut self) -> ParseResult<NodeId> {
        let token = self.consume(TokenKind::Identifier, None)?;
        Ok(self.tree.add_leaf(Label::Identifier, token.lexeme))
    }

    fn reserved(&mut self, word: &str) -> ParseResult<NodeId> {
        self.consume(TokenKind::Reserved, Some(word))?;
        Ok(self.tree.add_leaf(Label::Reserved, word))
    }

    fn operator(&mut self, op: &str) -> ParseResult<NodeId> {
        self.consume(TokenKind::Operator, Some(op))?;
        Ok(self.tree.add_leaf(Label::Operator, op))
    }

    fn punctuation(&mut self, value: &str) -> ParseResult<()> {
        self.consume(TokenKind::Punctuation, Some(value))?;
        Ok(())
    }

    /// `PROG = MAIN CLASSE*`
    fn parse_prog(&mut self) -> ParseResult<NodeId> {
        let main = self.parse_main()?;
        let mut children = vec![Child::Node(main)];
        while self.current().is_some() {
            children.push(Child::Node(self.parse_class()?));
        }
        Ok(self.tree.add(Label::Prog, children))
    }

    fn parse_main(&mut self) -> ParseResult<NodeId> {
        self.consume(TokenKind::Reserved, Some("class"))?;
        let class_name = self.identifier()?;
        self.punctuation("{")?;
        self.consume(TokenKind::Reserved, Some("public"))?;
        self.consume(TokenKind::Reserved, Some("static"))?;
        self.consume(TokenKind::Reserved, Some("void"))?;
        self.consume(TokenKind::Reserved, Some("main"))?;
        self.punctuation("(")?;
        self.consume(TokenKind::Reserved, Some("String"))?;
        self.punctuation("[")?;
        self.punctuation("]")?;
        let parameter = self.identifier()?;
        self.punctuation(")")?;
        self.punctuation("{")?;

        let mut children = vec![Child::Node(class_name), Child::Node(parameter)];
        while !self.current_is("}") {
            children.push(Child::Node(self.parse_cmd()?));
        }
        self.punctuation("}")?;
        self.punctuation("}")?;
        Ok(self.tree.add(Label::Main, children))
    }

    /// `CLASSE = "class" id ("extends" id)? "{" VAR* METODO* "}"`
    fn parse_class(&mut self) -> ParseResult<NodeId> {
        self.consume(TokenKind::Reserved, Some("class"))?;
        let class_name = self.identifier()?;

        let extends = if self.current_is("extends") {
            self.consume(TokenKind::Reserved, Some("extends"))?;
            let parent = self.identifier()?;
            self.tree.add(Label::Extends, vec![Child::Node(parent)])
        } else {
            self.tree.add(Label::Extends, vec![])
        };

        self.punctuation("{")?;
        let mut children = vec![Child::Node(class_name), Child::Node(extends)];
        while !self.current_is("public") && !self.current_is("}") {
            children.push(Child::Node(self.parse_var()?));
        }
        while !self.current_is("}") {
            children.push(Child::Node(self.parse_method()?));
        }
        self.punctuation("}")?;
        Ok(self.tree.add(Label::Class, children))
    }

    /// `VAR = TIPO id ";"`
    fn parse_var(&mut self) -> ParseResult<NodeId> {
        let tipo = self.parse_type()?;
        let name = self.identifier()?;
        self.punctuation(";")?;
        Ok(self
            .tree
            .add(Label::Var, vec![Child::Node(tipo), Child::Node(name)]))
    }

    /// A local declaration starts with a primitive type keyword or with
    /// two identifiers in a row (`ClassName localName`).
    fn at_var_declaration(&self) -> bool {
        match self.current() {
            Some(token) if token.kind == TokenKind::Reserved => {
                matches!(token.lexeme.as_str(), "int" | "boolean")
            }
            Some(token) if token.kind == TokenKind::Identifier => self
                .lookahead(1)
                .is_some_and(|next| next.kind == TokenKind::Identifier),
            _ => false,
        }
    }

    /// `METODO = "public" TIPO id "(" PARAMS? ")" "{" VAR* CMD* "return" EXP ";" "}"`
    fn parse_method(&mut self) -> ParseResult<NodeId> {
        self.consume(TokenKind::Reserved, Some("public"))?;
        let tipo = self.parse_type()?;
        let name = self.identifier()?;
        self.punctuation("(")?;
        let params = if self.current_is(")") {
            self.tree.add(Label::Params, vec![])
        } else {
            self.parse_params()?
        };
        self.punctuation(")")?;
        self.punctuation("{")?;

        let mut children = vec![Child::Node(tipo), Child::Node(name), Child::Node(params)];
        while self.at_var_declaration() {
            children.push(Child::Node(self.parse_var()?));
        }
        while !self.current_is("return") {
            children.push(Child::Node(self.parse_cmd()?));
        }
        self.consume(TokenKind::Reserved, Some("return"))?;
        children.push(Child::Node(self.parse_exp()?));
        self.punctuation(";")?;
        self.punctuation("}")?;
        Ok(self.tree.add(Label::Method, children))
    }

    fn parse_params(&mut self) -> ParseResult<NodeId> {
        let mut children = vec![];
        self.parse_params_entry(&mut children)?;
        while self.current_is(",") {
            self.punctuation(",")?;
            self.parse_params_entry(&mut children)?;
        }
        Ok(self.tree.add(Label::Params, children))
    }

    fn parse_params_entry(&mut self, children: &mut Vec<Child>) -> ParseResult<()> {
        let tipo = self.parse_type()?;
        let name = self.identifier()?;
        children.push(Child::Node(tipo));
        children.push(Child::Node(name));
        Ok(())
    }

    /// `TIPO = "int" ("[" "]")? | "boolean" | id`
    fn parse_type(&mut self) -> ParseResult<NodeId> {
        match self.current() {
            Some(token)
                if token.kind == TokenKind::Reserved
                    && matches!(token.lexeme.as_str(), "int" | "boolean") =>
            {
                let word = token.lexeme.clone();
                let reserved = self.reserved(&word)?;
                if word == "int" && self.current_is("[") {
                    self.punctuation("[")?;
                    self.punctuation("]")?;
                    let array = self.tree.add(Label::Array, vec![]);
                    return Ok(self
                        .tree
                        .add(Label::Type, vec![Child::Node(reserved), Child::Node(array)]));
                }
                Ok(self.tree.add(Label::Type, vec![Child::Node(reserved)]))
            }
            Some(token) if token.kind == TokenKind::Identifier => {
                let name = self.identifier()?;
                Ok(self.tree.add(Label::Type, vec![Child::Node(name)]))
            }
            _ => Err(self.error("a type")),
        }
    }

    fn parse_cmd(&mut self) -> ParseResult<NodeId> {
        match self.current_value() {
            Some("{") => {
                self.punctuation("{")?;
                let mut children = vec![];
                while !self.current_is("}") {
                    children.push(Child::Node(self.parse_cmd()?));
                }
                self.punctuation("}")?;
                Ok(self.tree.add(Label::Cmd, children))
            }
            Some("if") => {
                self.consume(TokenKind::Reserved, Some("if"))?;
                self.punctuation("(")?;
                let condition = self.parse_exp()?;
                self.punctuation(")")?;
                let then_cmd = self.parse_cmd()?;
                let if_node = self.tree.add(
                    Label::If,
                    vec![Child::Node(condition), Child::Node(then_cmd)],
                );

                if self.current_is("else") {
                    self.consume(TokenKind::Reserved, Some("else"))?;
                    let else_cmd = self.parse_cmd()?;
                    let else_node = self.tree.add(Label::Else, vec![Child::Node(else_cmd)]);
                    return Ok(self.tree.add(
                        Label::Cmd,
                        vec![Child::Node(if_node), Child::Node(else_node)],
                    ));
                }
                Ok(self.tree.add(Label::Cmd, vec![Child::Node(if_node)]))
            }
            Some("while") => {
                self.consume(TokenKind::Reserved, Some("while"))?;
                self.punctuation("(")?;
                let condition = self.parse_exp()?;
                self.punctuation(")")?;
                let body = self.parse_cmd()?;
                let while_node = self
                    .tree
                    .add(Label::While, vec![Child::Node(condition), Child::Node(body)]);
                Ok(self.tree.add(Label::Cmd, vec![Child::Node(while_node)]))
            }
            Some("System.out.println") => {
                self.consume(TokenKind::Reserved, Some("System.out.println"))?;
                self.punctuation("(")?;
                let exp = self.parse_exp()?;
                self.punctuation(")")?;
                self.punctuation(";")?;
                let print = self.tree.add(Label::Print, vec![Child::Node(exp)]);
                Ok(self.tree.add(Label::Cmd, vec![Child::Node(print)]))
            }
            Some(_) if self.current().is_some_and(|t| t.kind == TokenKind::Identifier) => {
                let target = self.identifier()?;
                if self.current_is("[") {
                    self.punctuation("[")?;
                    let index = self.parse_exp()?;
                    self.punctuation("]")?;
                    let equals = self.operator("=")?;
                    let value = self.parse_exp()?;
                    self.punctuation(";")?;
                    return Ok(self.tree.add_tagged(
                        Label::Cmd,
                        NodeTag::ArrayAssign,
                        vec![
                            Child::Node(target),
                            Child::Node(index),
                            Child::Node(equals),
                            Child::Node(value),
                        ],
                    ));
                }
                let equals = self.operator("=")?;
                let value = self.parse_exp()?;
                self.punctuation(";")?;
                Ok(self.tree.add(
                    Label::Cmd,
                    vec![Child::Node(target), Child::Node(equals), Child::Node(value)],
                ))
            }
            _ => Err(self.error("a command")),
        }
    }

    /// `EXP = REXP ("&&" REXP)*`, left-associative.
    fn parse_exp(&mut self) -> ParseResult<NodeId> {
        let mut left = self.parse_rexp()?;
        while self.current_is("&&") {
            let op = self.operator("&&")?;
            let right = self.parse_rexp()?;
            left = self.tree.add(
                Label::Exp,
                vec![Child::Node(left), Child::Node(op), Child::Node(right)],
            );
        }
        Ok(left)
    }

    /// `REXP = AEXP (("<" | "==" | "!=") AEXP)*`
    fn parse_rexp(&mut self) -> ParseResult<NodeId> {
        let mut left = self.parse_aexp()?;
        while matches!(self.current_value(), Some("<" | "==" | "!=")) {
            let op = self.current_value().unwrap().to_string();
            let op = self.operator(&op)?;
            let right = self.parse_aexp()?;
            left = self.tree.add(
                Label::RExp,
                vec![Child::Node(left), Child::Node(op), Child::Node(right)],
            );
        }
        Ok(left)
    }

    /// `AEXP = MEXP (("+" | "-") MEXP)*`
    fn parse_aexp(&mut self) -> ParseResult<NodeId> {
        let mut left = self.parse_mexp()?;
        while matches!(self.current_value(), Some("+" | "-")) {
            let op = self.current_value().unwrap().to_string();
            let op = self.operator(&op)?;
            let right = self.parse_mexp()?;
            left = self.tree.add(
                Label::AExp,
                vec![Child::Node(left), Child::Node(op), Child::Node(right)],
            );
        }
        Ok(left)
    }

    /// `MEXP = SEXP ("*" SEXP)*`
    fn parse_mexp(&mut self) -> ParseResult<NodeId> {
        let mut left = self.parse_sexp()?;
        while self.current_is("*") {
            let op = self.operator("*")?;
            let right = self.parse_sexp()?;
            left = self.tree.add(
                Label::MExp,
                vec![Child::Node(left), Child::Node(op), Child::Node(right)],
            );
        }
        Ok(left)
    }

    fn parse_sexp(&mut self) -> ParseResult<NodeId> {
        match self.current_value() {
            Some("!") => {
                let op = self.operator("!")?;
                let operand = self.parse_sexp()?;
                Ok(self
                    .tree
                    .add(Label::SExp, vec![Child::Node(op), Child::Node(operand)]))
            }
            Some("-") => {
                let op = self.operator("-")?;
                let operand = self.parse_sexp()?;
                Ok(self
                    .tree
                    .add(Label::SExp, vec![Child::Node(op), Child::Node(operand)]))
            }
            Some("true") => {
                let literal = self.reserved("true")?;
                Ok(self.tree.add(Label::SExp, vec![Child::Node(literal)]))
            }
            Some("false") => {
                let literal = self.reserved("false")?;
                Ok(self.tree.add(Label::SExp, vec![Child::Node(literal)]))
            }
            Some("null") => {
                let literal = self.reserved("null")?;
                Ok(self.tree.add(Label::SExp, vec![Child::Node(literal)]))
            }
            Some(_) if self.current().is_some_and(|t| t.kind == TokenKind::Number) => {
                let token = self.consume(TokenKind::Number, None)?;
                let number = self.tree.add_leaf(Label::Number, token.lexeme);
                Ok(self.tree.add(Label::SExp, vec![Child::Node(number)]))
            }
            // `new int [ EXP ]` needs the second token to discriminate from
            // `new ClassName()`.
            Some("new") if self.lookahead(1).is_some_and(|t| t.lexeme == "int") => {
                let new = self.reserved("new")?;
                let int = self.reserved("int")?;
                self.punctuation("[")?;
                let size = self.parse_exp()?;
                self.punctuation("]")?;
                Ok(self.tree.add_tagged(
                    Label::SExp,
                    NodeTag::ArrayInit,
                    vec![Child::Node(new), Child::Node(int), Child::Node(size)],
                ))
            }
            _ => self.parse_pexp(),
        }
    }

    /// `PEXP` base plus any chain of postfixes: `.length`, `.id(...)`,
    /// `.id`, `[ EXP ]`.
    fn parse_pexp(&mut self) -> ParseResult<NodeId> {
        let mut base = self.parse_base_pexp()?;
        loop {
            if self.current_is(".") && self.lookahead(1).is_some_and(|t| t.lexeme == "length") {
                self.punctuation(".")?;
                self.consume(TokenKind::Reserved, Some("length"))?;
                base = self
                    .tree
                    .add_tagged(Label::PExp, NodeTag::ArrayLength, vec![Child::Node(base)]);
            } else if self.current_is(".") {
                self.punctuation(".")?;
                let member = self.identifier()?;
                if self.current_is("(") {
                    self.punctuation("(")?;
                    let exps = if self.current_is(")") {
                        self.tree.add(Label::Exps, vec![])
                    } else {
                        self.parse_exps()?
                    };
                    self.punctuation(")")?;
                    base = self.tree.add_tagged(
                        Label::PExp,
                        NodeTag::MethodCall,
                        vec![Child::Node(base), Child::Node(member), Child::Node(exps)],
                    );
                } else {
                    base = self
                        .tree
                        .add(Label::PExp, vec![Child::Node(base), Child::Node(member)]);
                }
            } else if self.current_is("[") {
                self.punctuation("[")?;
                let index = self.parse_exp()?;
                self.punctuation("]")?;
                base = self.tree.add_tagged(
                    Label::PExp,
                    NodeTag::ArrayIndex,
                    vec![Child::Node(base), Child::Node(index)],
                );
            } else {
                return Ok(base);
            }
        }
    }

    fn parse_base_pexp(&mut self) -> ParseResult<NodeId> {
        match self.current() {
            Some(token) if token.kind == TokenKind::Identifier => {
                let name = self.identifier()?;
                Ok(self.tree.add(Label::PExp, vec![Child::Node(name)]))
            }
            Some(token) if token.lexeme == "this" => {
                let this = self.reserved("this")?;
                Ok(self.tree.add(Label::PExp, vec![Child::Node(this)]))
            }
            Some(token) if token.lexeme == "new" => {
                let new = self.reserved("new")?;
                let class_name = self.identifier()?;
                self.punctuation("(")?;
                self.punctuation(")")?;
                Ok(self
                    .tree
                    .add(Label::PExp, vec![Child::Node(new), Child::Node(class_name)]))
            }
            Some(token) if token.lexeme == "(" => {
                self.punctuation("(")?;
                let exp = self.parse_exp()?;
                self.punctuation(")")?;
                Ok(self.tree.add(Label::PExp, vec![Child::Node(exp)]))
            }
            _ => Err(self.error("a primary expression")),
        }
    }

    fn parse_exps(&mut self) -> ParseResult<NodeId> {
        let mut children = vec![Child::Node(self.parse_exp()?)];
        while self.current_is(",") {
            self.punctuation(",")?;
            children.push(Child::Node(self.parse_exp()?));
        }
        Ok(self.tree.add(Label::Exps, children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_source(source: &str) -> ParseResult<SyntaxTree> {
        parse(Lexer::new(source).lex().unwrap())
    }

    const EMPTY_MAIN: &str = "class P { public static void main(String[] a) { } }";

    #[test]
    fn test_parse_empty_main() {
        let tree = parse_source(EMPTY_MAIN).unwrap();
        let root = tree.node(tree.root);

        assert_eq!(root.label, Label::Prog);
        assert_eq!(root.children.len(), 1);

        let main = tree.child_node(tree.root, 0).unwrap();
        assert_eq!(tree.node(main).label, Label::Main);
        assert_eq!(tree.child_leaf_text(main, 0), Some("P"));
        assert_eq!(tree.child_leaf_text(main, 1), Some("a"));
    }

    #[test]
    fn test_parse_class_with_extends() {
        let tree = parse_source(
            "class P { public static void main(String[] a) { } }
             class B extends A { int x; public int get() { return x; } }",
        )
        .unwrap();

        let class = tree.child_node(tree.root, 1).unwrap();
        assert_eq!(tree.node(class).label, Label::Class);
        assert_eq!(tree.child_leaf_text(class, 0), Some("B"));

        let extends = tree.child_node(class, 1).unwrap();
        assert_eq!(tree.node(extends).label, Label::Extends);
        assert_eq!(tree.child_leaf_text(extends, 0), Some("A"));
    }

    #[test]
    fn test_parse_precedence_shapes() {
        // 1 + 2 * 3 must parse as AEXP(1, +, MEXP(2, *, 3)).
        let tree = parse_source(
            "class P { public static void main(String[] a) { } }
             class C { public int m() { int x; x = 1 + 2 * 3; return x; } }",
        )
        .unwrap();

        let class = tree.child_node(tree.root, 1).unwrap();
        let method = tree.child_node(class, 2).unwrap();
        // children: TYPE, name, PARAMS, VAR, CMD, return EXP
        let cmd = tree.child_node(method, 4).unwrap();
        let rhs = tree.child_node(cmd, 2).unwrap();

        assert_eq!(tree.node(rhs).label, Label::AExp);
        let product = tree.child_node(rhs, 2).unwrap();
        assert_eq!(tree.node(product).label, Label::MExp);
    }

    #[test]
    fn test_parse_method_call_is_tagged() {
        let tree = parse_source(
            "class P { public static void main(String[] a) { x = new C().m(1, 2); } }",
        )
        .unwrap();

        let main = tree.child_node(tree.root, 0).unwrap();
        let cmd = tree.child_node(main, 2).unwrap();
        let call = tree.child_node(cmd, 2).unwrap();

        assert_eq!(tree.node(call).label, Label::PExp);
        assert_eq!(tree.node(call).tag, NodeTag::MethodCall);
        assert_eq!(tree.child_leaf_text(call, 1), Some("m"));

        let exps = tree.child_node(call, 2).unwrap();
        assert_eq!(tree.node(exps).children.len(), 2);
    }

    #[test]
    fn test_parse_array_forms_are_tagged() {
        let tree = parse_source(
            "class P { public static void main(String[] a) {
                v = new int[10];
                v[0] = 1;
                x = v.length;
             } }",
        )
        .unwrap();

        let main = tree.child_node(tree.root, 0).unwrap();

        let init_cmd = tree.child_node(main, 2).unwrap();
        let init = tree.child_node(init_cmd, 2).unwrap();
        assert_eq!(tree.node(init).tag, NodeTag::ArrayInit);

        let assign_cmd = tree.child_node(main, 3).unwrap();
        assert_eq!(tree.node(assign_cmd).tag, NodeTag::ArrayAssign);
        assert_eq!(tree.node(assign_cmd).children.len(), 4);

        let length_cmd = tree.child_node(main, 4).unwrap();
        let length = tree.child_node(length_cmd, 2).unwrap();
        assert_eq!(tree.node(length).tag, NodeTag::ArrayLength);
    }

    #[test]
    fn test_parse_error_names_expected_and_index() {
        let error = parse_source("class P { public static void main(String[] a) { x 1; } }")
            .unwrap_err();

        assert_eq!(error.expected, "operator ('=')");
        assert!(error.actual.is_some());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = parse_source(EMPTY_MAIN).unwrap();
        let second = parse_source(EMPTY_MAIN).unwrap();

        assert_eq!(first, second);
    }
}
