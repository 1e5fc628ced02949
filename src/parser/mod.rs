//! Recursive-descent parser for Safyr token streams.
//!
//! Statements are separated by one or more `Break` tokens; expressions
//! use precedence climbing through a fixed tower of binary operator
//! levels. Block-bearing constructs accept either an inline form
//! (`: statement`) or a braced form (`{` newline … newline `}`).

pub mod node;

pub use node::*;

use crate::error::{Error, ErrorKind};
use crate::lexer::{Token, TokenKind};

pub type ParseResult<T> = Result<T, Error>;

pub struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    static_mode: bool,
    /// Non-fatal findings, e.g. `var` outside static mode.
    pub warnings: Vec<String>,
    /// Error left behind by a statement sequence that stopped early;
    /// fatal only at the top level.
    resid_err: Option<Error>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_static_mode(tokens, false)
    }

    pub fn with_static_mode(tokens: Vec<Token>, static_mode: bool) -> Self {
        Self {
            tokens,
            idx: 0,
            static_mode,
            warnings: vec![],
            resid_err: None,
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn peek(&self, amt: usize) -> Option<&Token> {
        if self.idx + amt < self.tokens.len() {
            Some(&self.tokens[self.idx + amt])
        } else {
            None
        }
    }

    fn advance(&mut self) {
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
    }

    fn err_here(&self, kind: ErrorKind, message: impl Into<String>) -> Error {
        let tok = self.current();
        Error::new(kind, tok.pos_start.clone(), tok.pos_end.clone(), message)
    }

    /// Entry point. A residual error from the statement loop means the
    /// input had trailing content that could not be parsed.
    pub fn parse(&mut self) -> ParseResult<Node> {
        let node = self.statements()?;
        if let Some(err) = self.resid_err.take() {
            return Err(err);
        }
        Ok(node)
    }

    fn statements(&mut self) -> ParseResult<Node> {
        let pos_start = self.current().pos_start.clone();

        while self.current().kind == TokenKind::Break {
            self.advance();
        }

        let first = self.statement()?;
        self.resid_err = None;
        let mut statements = vec![first];

        loop {
            let mut newline_count = 0;
            while self.current().kind == TokenKind::Break {
                self.advance();
                newline_count += 1;
            }
            // `use` statements and if-chains consume their own newline
            if matches!(
                statements.last(),
                Some(Node::Use { .. }) | Some(Node::If { .. })
            ) {
                newline_count += 1;
            }

            let mut more = newline_count != 0;
            if self.current().kind == TokenKind::Eof {
                more = false;
            }
            if !more {
                break;
            }

            let mark = self.idx;
            match self.statement() {
                Ok(stmt) => {
                    self.resid_err = None;
                    statements.push(stmt);
                }
                Err(e) => {
                    self.idx = mark;
                    self.resid_err = Some(e);
                    break;
                }
            }
        }

        let n = statements.len();
        if let Some(i) = statements
            .iter()
            .position(|s| matches!(s, Node::Return { .. }))
        {
            if i < n - 1 {
                let last = &statements[n - 1];
                return Err(Error::new(
                    ErrorKind::InvalidSyntax,
                    last.pos_start().clone(),
                    last.pos_end().clone(),
                    "Return statement must come last",
                ));
            }
        }

        let pos_end = self.current().pos_end.clone();
        Ok(Node::Capsule {
            statements,
            span: Span::new(pos_start, pos_end),
        })
    }

    fn statement(&mut self) -> ParseResult<Node> {
        let pos_start = self.current().pos_start.clone();

        if self.current().is_kwd("use") {
            self.advance();

            if self.current().kind != TokenKind::Sym {
                return Err(Error::new(
                    ErrorKind::InvalidSyntax,
                    pos_start,
                    self.current().pos_end.clone(),
                    "Expected file identifier",
                ));
            }
            let name_tok = self.current().clone();
            self.advance();

            if self.current().kind == TokenKind::Break {
                self.advance();
            } else if self.current().kind != TokenKind::Eof {
                return Err(Error::new(
                    ErrorKind::InvalidSyntax,
                    pos_start,
                    self.current().pos_end.clone(),
                    "Expected newline",
                ));
            }

            return Ok(Node::Use {
                name: name_tok.lexeme(),
                span: Span::new(name_tok.pos_start, name_tok.pos_end),
            });
        }

        if self.current().is_kwd("return") {
            self.advance();

            let mark = self.idx;
            let value = match self.expr() {
                Ok(expr) => Some(Box::new(expr)),
                Err(_) => {
                    self.idx = mark;
                    None
                }
            };

            return Ok(Node::Return {
                value,
                span: Span::new(pos_start, self.current().pos_start.clone()),
            });
        }

        if self.current().is_kwd("del") {
            self.advance();

            if self.current().kind != TokenKind::Sym {
                return Err(Error::new(
                    ErrorKind::InvalidSyntax,
                    pos_start,
                    self.current().pos_end.clone(),
                    "Expected identifier",
                ));
            }
            let name_tok = self.current().clone();
            self.advance();

            return Ok(Node::Delete {
                name: name_tok.lexeme(),
                span: Span::new(name_tok.pos_start, name_tok.pos_end),
            });
        }

        if self.current().is_kwd("continue") {
            self.advance();
            return Ok(Node::Continue {
                span: Span::new(pos_start, self.current().pos_start.clone()),
            });
        }

        if self.current().is_kwd("once") {
            self.advance();
            return Ok(Node::Once {
                span: Span::new(pos_start, self.current().pos_start.clone()),
            });
        }

        if self.current().is_kwd("break") {
            self.advance();
            return Ok(Node::Break {
                span: Span::new(pos_start, self.current().pos_start.clone()),
            });
        }

        self.expr()
    }

    fn expr(&mut self) -> ParseResult<Node> {
        let mut warn: Option<String> = None;
        let mut constant = false;
        let mut global = false;
        let mut type_tag = TypeTag::Default;

        if self.current().is_kwd("const") {
            constant = true;
            self.advance();
        }

        if self.current().is_kwd("global") {
            global = true;
            self.advance();
        }

        if self.current().is_kwd("var") {
            if !self.static_mode {
                warn = Some("kwd <var> has no effect".into());
            }
            type_tag = TypeTag::Var;
            self.advance();
        }

        if self.current().kind == TokenKind::Kwd {
            if let Some(tag) = self.current().value.text().and_then(TypeTag::from_kwd) {
                type_tag = tag;
                self.advance();
            }
        }

        if self.current().is_ops(":") {
            let def = self.func_def()?;
            return self.finish_call(def);
        }
        if self.current().is_ops("::") {
            let def = self.struct_def()?;
            return self.finish_call(def);
        }
        if self.current().kind == TokenKind::Dot {
            return self.interface_def();
        }

        // named variable assignment
        if self.current().kind == TokenKind::Sym
            && self.peek(1).map(|t| t.kind) == Some(TokenKind::Asg)
        {
            let name_tok = self.current().clone();
            self.advance();
            let op_tok = self.current().clone();
            self.advance();

            let value = self.expr()?;
            if let Some(w) = warn.take() {
                self.warnings.push(w);
            }

            let op = AssignOp::from_lexeme(&op_tok.lexeme())
                .ok_or_else(|| self.err_here(ErrorKind::InvalidSyntax, "Expected assignment operator"))?;
            let span = Span::new(name_tok.pos_start.clone(), value.pos_end().clone());
            return Ok(Node::VarAssign {
                name: name_tok.lexeme(),
                op,
                value: Box::new(value),
                constant,
                global,
                type_tag,
                span,
            });
        }

        let node = self.bin_op(
            Self::comp_expr,
            &[
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Nand,
                TokenKind::Nor,
                TokenKind::Xor,
                TokenKind::Inj,
                TokenKind::In,
            ],
            Self::comp_expr,
        )?;
        if let Some(w) = warn.take() {
            self.warnings.push(w);
        }

        // a chained access expression on the left of an assignment
        // operator becomes an l-value
        if self.current().kind == TokenKind::Asg {
            let op_tok = self.current().clone();
            self.advance();

            let value = self.expr()?;
            let op = AssignOp::from_lexeme(&op_tok.lexeme())
                .ok_or_else(|| self.err_here(ErrorKind::InvalidSyntax, "Expected assignment operator"))?;
            let span = Span::new(node.pos_start().clone(), value.pos_end().clone());
            let head = Node::ReferenceAssign {
                target: Box::new(node),
                op,
                value: Box::new(value),
                span: span.clone(),
            };
            return Ok(Node::ReferenceAccess {
                head: Box::new(head),
                span,
            });
        }

        Ok(node)
    }

    fn comp_expr(&mut self) -> ParseResult<Node> {
        if self.current().kind == TokenKind::Not {
            let op_tok = self.current().clone();
            self.advance();

            let operand = self.comp_expr()?;
            let span = Span::new(op_tok.pos_start, operand.pos_end().clone());
            return Ok(Node::UnaryOp {
                op: TokenKind::Not,
                operand: Box::new(operand),
                span,
            });
        }

        self.bin_op(
            Self::arith_expr,
            &[
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Le,
                TokenKind::Ge,
            ],
            Self::arith_expr,
        )
    }

    fn arith_expr(&mut self) -> ParseResult<Node> {
        self.bin_op(Self::term, &[TokenKind::Pls, TokenKind::Mns], Self::term)
    }

    fn term(&mut self) -> ParseResult<Node> {
        self.bin_op(
            Self::factor,
            &[TokenKind::Mul, TokenKind::Div, TokenKind::Mod],
            Self::factor,
        )
    }

    fn factor(&mut self) -> ParseResult<Node> {
        let tok = self.current().clone();

        if matches!(tok.kind, TokenKind::Pls | TokenKind::Mns) {
            self.advance();
            let operand = self.factor()?;
            let span = Span::new(tok.pos_start, operand.pos_end().clone());
            return Ok(Node::UnaryOp {
                op: tok.kind,
                operand: Box::new(operand),
                span,
            });
        }

        self.power()
    }

    fn power(&mut self) -> ParseResult<Node> {
        // right associative: the right-hand side re-enters factor
        self.bin_op(Self::index_expr, &[TokenKind::Pow], Self::factor)
    }

    fn index_expr(&mut self) -> ParseResult<Node> {
        self.bin_op(
            Self::property_expr,
            &[TokenKind::Lslc, TokenKind::Rslc, TokenKind::At],
            Self::property_expr,
        )
    }

    fn property_expr(&mut self) -> ParseResult<Node> {
        // a dot may only be followed by an atom, and binds tighter than
        // indexing, so `a.b @ 0` reads the property first
        self.bin_op(Self::call, &[TokenKind::Dot], Self::atom)
    }

    fn call(&mut self) -> ParseResult<Node> {
        let atom = self.atom()?;
        self.finish_call(atom)
    }

    /// Wrap `callee` in a call node when an argument list follows.
    fn finish_call(&mut self, callee: Node) -> ParseResult<Node> {
        if self.current().kind != TokenKind::Lpr {
            return Ok(callee);
        }
        self.advance();

        let mut args = vec![];
        if self.current().kind == TokenKind::Rpr {
            self.advance();
        } else {
            while self.current().kind != TokenKind::Rpr {
                args.push(self.expr()?);

                if self.current().kind == TokenKind::Eof {
                    return Err(self.err_here(ErrorKind::PrematureEof, "Expected ')'"));
                }
            }
            self.advance();
        }

        let pos_start = callee.pos_start().clone();
        let pos_end = args
            .last()
            .map(|a| a.pos_end().clone())
            .unwrap_or_else(|| callee.pos_end().clone());
        Ok(Node::Call {
            callee: Box::new(callee),
            args,
            span: Span::new(pos_start, pos_end),
        })
    }

    fn atom(&mut self) -> ParseResult<Node> {
        let tok = self.current().clone();
        let span = Span::new(tok.pos_start.clone(), tok.pos_end.clone());

        match tok.kind {
            TokenKind::Int => {
                self.advance();
                let crate::lexer::TokenValue::Int(value) = tok.value else {
                    return Err(self.err_here(ErrorKind::InvalidSyntax, "Malformed integer token"));
                };
                Ok(Node::Number {
                    value: NumberLit::Int(value),
                    span,
                })
            }
            TokenKind::Flt => {
                self.advance();
                let crate::lexer::TokenValue::Float(value) = tok.value else {
                    return Err(self.err_here(ErrorKind::InvalidSyntax, "Malformed float token"));
                };
                Ok(Node::Number {
                    value: NumberLit::Flt(value),
                    span,
                })
            }
            TokenKind::Str => {
                self.advance();
                Ok(Node::Str {
                    value: tok.lexeme(),
                    span,
                })
            }
            TokenKind::Sym => {
                self.advance();
                Ok(Node::VarAccess {
                    name: tok.lexeme(),
                    span,
                })
            }
            TokenKind::Lpr => {
                self.advance();
                let expr = self.expr()?;
                if self.current().kind == TokenKind::Rpr {
                    self.advance();
                    Ok(expr)
                } else {
                    Err(self.err_here(ErrorKind::InvalidSyntax, "Expected ')'"))
                }
            }
            TokenKind::Lbr => self.list_expr(),
            TokenKind::Lcr => self.map_expr(),
            TokenKind::Kwd if tok.is_kwd("?") || tok.is_kwd("if") => self.if_expr(),
            TokenKind::Kwd if tok.is_kwd("for") => self.for_expr(),
            TokenKind::Kwd if tok.is_kwd("foreach") => self.foreach_expr(),
            TokenKind::Kwd if tok.is_kwd("while") => self.while_expr(),
            TokenKind::Kwd if tok.is_kwd("when") => self.when_expr(),
            TokenKind::Kwd if tok.is_kwd("defer") => self.defer_expr(),
            TokenKind::Kwd if tok.is_kwd("try") => self.try_expr(),
            TokenKind::Ops if tok.is_ops(":") => self.func_def(),
            TokenKind::Ops if tok.is_ops("::") => self.struct_def(),
            _ => Err(self.err_here(ErrorKind::InvalidSyntax, "Expected atom")),
        }
    }

    fn list_expr(&mut self) -> ParseResult<Node> {
        let pos_start = self.current().pos_start.clone();
        let mut elements = vec![];

        if self.current().kind != TokenKind::Lbr {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '['"));
        }
        self.advance();

        if self.current().kind == TokenKind::Rbr {
            self.advance();
        } else {
            while !matches!(self.current().kind, TokenKind::Rbr | TokenKind::Eof) {
                let element = self.expr().map_err(|_| {
                    self.err_here(ErrorKind::UnclosedScope, "Expected expression or ']'")
                })?;
                elements.push(element);
            }

            if self.current().kind != TokenKind::Rbr {
                return Err(self.err_here(ErrorKind::UnclosedScope, "Expected ']'"));
            }
            self.advance();
        }

        let pos_end = self.current().pos_end.clone();
        Ok(Node::List {
            elements,
            span: Span::new(pos_start, pos_end),
        })
    }

    fn map_expr(&mut self) -> ParseResult<Node> {
        let pos_start = self.current().pos_start.clone();
        let mut entries = vec![];

        if self.current().kind != TokenKind::Lcr {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '{'"));
        }
        self.advance();

        if self.current().kind == TokenKind::Rcr {
            self.advance();
        } else {
            // format is { key : value key : value ... } with optional
            // newlines between entries
            while !matches!(self.current().kind, TokenKind::Rcr | TokenKind::Eof) {
                let key = self.expr().map_err(|_| {
                    self.err_here(ErrorKind::InvalidSyntax, "Expected expression or '}'")
                })?;

                if !self.current().is_ops(":") {
                    return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected ':'"));
                }
                self.advance();

                let value = self.expr()?;
                entries.push((key, value));

                while self.current().kind == TokenKind::Break {
                    self.advance();
                }
            }

            if self.current().kind != TokenKind::Rcr {
                return Err(self.err_here(ErrorKind::UnclosedScope, "Expected expression or '}'"));
            }
            self.advance();
        }

        let pos_end = self.current().pos_end.clone();
        Ok(Node::Map {
            entries,
            span: Span::new(pos_start, pos_end),
        })
    }

    fn if_expr(&mut self) -> ParseResult<Node> {
        let pos_start = self.current().pos_start.clone();
        let (cases, else_case) = self.if_expr_cases(&["?", "if"])?;

        let pos_end = else_case
            .as_ref()
            .map(|e| e.pos_end().clone())
            .or_else(|| cases.last().map(|c| c.body.pos_end().clone()))
            .unwrap_or_else(|| pos_start.clone());

        Ok(Node::If {
            cases,
            else_case: else_case.map(Box::new),
            span: Span::new(pos_start, pos_end),
        })
    }

    fn if_expr_b(&mut self) -> ParseResult<(Vec<IfCase>, Option<Node>)> {
        self.if_expr_cases(&["!?", "elif"])
    }

    fn if_expr_c(&mut self) -> ParseResult<Option<Node>> {
        if !(self.current().is_kwd("!") || self.current().is_kwd("else")) {
            return Ok(None);
        }
        self.advance();

        if self.current().kind == TokenKind::Lcr {
            self.advance();

            if self.current().kind != TokenKind::Break {
                return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected newline"));
            }
            self.advance();

            let statements = self.statements()?;

            if self.current().kind != TokenKind::Rcr {
                return Err(self.err_here(ErrorKind::UnclosedScope, "Expected '}'"));
            }
            self.advance();

            Ok(Some(statements))
        } else {
            if !self.current().is_ops(":") {
                return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected ':'"));
            }
            self.advance();

            Ok(Some(self.expr()?))
        }
    }

    fn if_expr_b_or_c(&mut self) -> ParseResult<(Vec<IfCase>, Option<Node>)> {
        while self.current().kind == TokenKind::Break {
            self.advance();
        }

        if self.current().is_kwd("!?") || self.current().is_kwd("elif") {
            self.if_expr_b()
        } else {
            Ok((vec![], self.if_expr_c()?))
        }
    }

    fn if_expr_cases(&mut self, case_keywords: &[&str]) -> ParseResult<(Vec<IfCase>, Option<Node>)> {
        let mut cases = vec![];

        if !case_keywords.iter().any(|k| self.current().is_kwd(k)) {
            return Err(self.err_here(
                ErrorKind::InvalidSyntax,
                format!("Expected one of {case_keywords:?}"),
            ));
        }
        self.advance();

        let condition = self.expr()?;

        if self.current().kind == TokenKind::Lcr {
            self.advance();

            if self.current().kind != TokenKind::Break {
                return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected newline"));
            }
            self.advance();

            let body = self.statements()?;
            cases.push(IfCase {
                condition,
                body,
                braced: true,
            });

            if self.current().kind != TokenKind::Rcr {
                return Err(self.err_here(ErrorKind::UnclosedScope, "Expected '}'"));
            }
            self.advance();

            let (more, else_case) = self.if_expr_b_or_c()?;
            cases.extend(more);
            Ok((cases, else_case))
        } else {
            if !self.current().is_ops(":") {
                return Err(self.err_here(ErrorKind::UnopenedScope, "Expected ':'"));
            }
            self.advance();

            let body = self.statement()?;
            cases.push(IfCase {
                condition,
                body,
                braced: false,
            });

            let (more, else_case) = self.if_expr_b_or_c()?;
            cases.extend(more);
            Ok((cases, else_case))
        }
    }

    /// The inline (`: statement`) or braced (`{` newline … `}`) body of a
    /// block construct.
    fn block_or_inline(&mut self) -> ParseResult<(Node, bool)> {
        if self.current().kind == TokenKind::Lcr {
            self.advance();

            if self.current().kind != TokenKind::Break {
                return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected newline"));
            }
            self.advance();

            let body = self.statements()?;

            if self.current().kind != TokenKind::Rcr {
                return Err(self.err_here(ErrorKind::UnclosedScope, "Expected '}'"));
            }
            self.advance();

            Ok((body, true))
        } else if self.current().is_ops(":") {
            self.advance();
            Ok((self.statement()?, false))
        } else {
            Err(self.err_here(ErrorKind::UnopenedScope, "Expected ':' or '{'"))
        }
    }

    fn for_expr(&mut self) -> ParseResult<Node> {
        if !self.current().is_kwd("for") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected 'for'"));
        }
        self.advance();

        if self.current().kind != TokenKind::Sym {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected identifier"));
        }
        let var_tok = self.current().clone();
        self.advance();

        if self.current().lexeme() != "=" {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '='"));
        }
        self.advance();

        let start = self.expr()?;

        if !self.current().is_ops("..") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '..'"));
        }
        self.advance();

        let end = self.expr()?;

        let step = if self.current().is_ops("..") {
            self.advance();
            Some(Box::new(self.expr()?))
        } else {
            None
        };

        let (body, braced) = self.block_or_inline()?;
        let span = Span::new(var_tok.pos_start.clone(), body.pos_end().clone());

        Ok(Node::For {
            var: var_tok.lexeme(),
            start: Box::new(start),
            end: Box::new(end),
            step,
            body: Box::new(body),
            braced,
            span,
        })
    }

    fn foreach_expr(&mut self) -> ParseResult<Node> {
        if !self.current().is_kwd("foreach") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected 'foreach'"));
        }
        self.advance();

        if self.current().kind != TokenKind::Sym {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected identifier"));
        }
        let var_tok = self.current().clone();
        self.advance();

        if !self.current().is_kwd("in") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected 'in'"));
        }
        self.advance();

        let container = self.expr()?;
        let (body, braced) = self.block_or_inline()?;
        let span = Span::new(var_tok.pos_start.clone(), body.pos_end().clone());

        Ok(Node::ForEach {
            var: var_tok.lexeme(),
            container: Box::new(container),
            body: Box::new(body),
            braced,
            span,
        })
    }

    fn while_expr(&mut self) -> ParseResult<Node> {
        if !self.current().is_kwd("while") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected 'while'"));
        }
        self.advance();

        let condition = self.expr()?;
        let (body, braced) = self.block_or_inline()?;
        let span = Span::new(condition.pos_start().clone(), body.pos_end().clone());

        Ok(Node::While {
            condition: Box::new(condition),
            body: Box::new(body),
            braced,
            span,
        })
    }

    fn when_expr(&mut self) -> ParseResult<Node> {
        if !self.current().is_kwd("when") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected 'when'"));
        }
        self.advance();

        let condition = self.expr()?;

        // triggers attach to the variable on the left of the condition
        let target = match &condition {
            Node::BinOp { left, .. } => match left.as_ref() {
                Node::VarAccess { name, .. } => name.clone(),
                _ => {
                    return Err(self.err_here(
                        ErrorKind::InvalidSyntax,
                        "Condition of 'when' must test a named variable",
                    ))
                }
            },
            _ => {
                return Err(self.err_here(
                    ErrorKind::InvalidSyntax,
                    "Condition of 'when' must test a named variable",
                ))
            }
        };

        let (body, braced) = self.block_or_inline()?;
        let span = Span::new(condition.pos_start().clone(), body.pos_end().clone());

        Ok(Node::When {
            condition: std::rc::Rc::new(condition),
            target,
            body: std::rc::Rc::new(body),
            braced,
            span,
        })
    }

    fn defer_expr(&mut self) -> ParseResult<Node> {
        let pos_start = self.current().pos_start.clone();
        if !self.current().is_kwd("defer") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected 'defer'"));
        }
        self.advance();

        let (body, braced) = self.block_or_inline()?;
        let span = Span::new(pos_start, body.pos_end().clone());

        Ok(Node::Defer {
            body: Box::new(body),
            braced,
            span,
        })
    }

    fn try_expr(&mut self) -> ParseResult<Node> {
        let try_tok = self.current().clone();
        if !try_tok.is_kwd("try") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected 'try'"));
        }
        self.advance();

        let (try_body, _) = self.block_or_inline()?;

        while self.current().kind == TokenKind::Break {
            self.advance();
        }

        if !self.current().is_kwd("catch") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected 'catch'"));
        }
        self.advance();

        let (catch_body, _) = self.block_or_inline()?;
        let span = Span::new(try_tok.pos_start, catch_body.pos_end().clone());

        Ok(Node::ErrorHandler {
            try_body: Box::new(try_body),
            catch_body: Box::new(catch_body),
            span,
        })
    }

    fn func_def(&mut self) -> ParseResult<Node> {
        if !self.current().is_ops(":") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected ':'"));
        }
        let pos_start = self.current().pos_start.clone();
        self.advance();

        let name = if self.current().kind == TokenKind::Sym {
            let name_tok = self.current().clone();
            self.advance();
            if self.current().kind != TokenKind::Lbr {
                return Err(self.err_here(ErrorKind::UnopenedScope, "Expected '['"));
            }
            Some(name_tok.lexeme())
        } else {
            if self.current().kind != TokenKind::Lbr {
                return Err(self.err_here(ErrorKind::UnopenedScope, "Expected identifier or '['"));
            }
            None
        };
        self.advance();

        let mut params = vec![];
        if self.current().kind == TokenKind::Sym {
            while self.current().kind == TokenKind::Sym {
                params.push(self.current().lexeme());
                self.advance();
            }
            if self.current().kind != TokenKind::Rbr {
                return Err(self.err_here(ErrorKind::UnclosedScope, "Expected ']'"));
            }
        } else if self.current().kind != TokenKind::Rbr {
            return Err(self.err_here(ErrorKind::UnclosedScope, "Expected identifier or ']'"));
        }
        self.advance();

        if self.current().kind != TokenKind::Inj {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '<~'"));
        }
        self.advance();

        if self.current().kind == TokenKind::Lcr {
            self.advance();

            if self.current().kind != TokenKind::Break {
                return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected newline"));
            }
            self.advance();

            let body = self.statements()?;

            if self.current().kind != TokenKind::Rcr {
                return Err(self.err_here(ErrorKind::UnclosedScope, "Expected '}'"));
            }
            self.advance();

            let span = Span::new(pos_start, body.pos_end().clone());
            return Ok(Node::FunctionDef {
                name,
                params,
                body: std::rc::Rc::new(body),
                auto_return: false,
                span,
            });
        }

        // one-line functions auto-return; a leading `return` is allowed
        // but redundant
        if self.current().is_kwd("return") {
            self.advance();
        }

        let body = self.expr()?;
        let span = Span::new(pos_start, body.pos_end().clone());

        Ok(Node::FunctionDef {
            name,
            params,
            body: std::rc::Rc::new(body),
            auto_return: true,
            span,
        })
    }

    fn struct_def(&mut self) -> ParseResult<Node> {
        if !self.current().is_ops("::") {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '::'"));
        }
        let pos_start = self.current().pos_start.clone();
        self.advance();

        let name = if self.current().kind == TokenKind::Sym {
            let name_tok = self.current().clone();
            self.advance();
            if self.current().kind != TokenKind::Lbr {
                return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '['"));
            }
            Some(name_tok.lexeme())
        } else {
            if self.current().kind != TokenKind::Lbr {
                return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected identifier or '['"));
            }
            None
        };
        self.advance();

        let mut params = vec![];
        while self.current().kind == TokenKind::Sym {
            params.push(self.current().lexeme());
            self.advance();
        }
        if self.current().kind != TokenKind::Rbr {
            return Err(self.err_here(ErrorKind::UnclosedScope, "Expected identifier or ']'"));
        }
        self.advance();

        // struct bodies are always braced
        if self.current().kind == TokenKind::Lcr {
            self.advance();

            if self.current().kind == TokenKind::Break {
                self.advance();

                let body = self.statements()?;

                if self.current().kind != TokenKind::Rcr {
                    return Err(self.err_here(ErrorKind::UnclosedScope, "Expected '}'"));
                }
                self.advance();

                let span = Span::new(pos_start, body.pos_end().clone());
                return Ok(Node::StructDef {
                    name,
                    params,
                    body: std::rc::Rc::new(body),
                    span,
                });
            }
        }

        Err(self.err_here(ErrorKind::InvalidSyntax, "Expected newline"))
    }

    fn interface_def(&mut self) -> ParseResult<Node> {
        if self.current().kind != TokenKind::Dot {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '.'"));
        }
        let pos_start = self.current().pos_start.clone();
        self.advance();

        if self.current().kind != TokenKind::Sym {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected identifier"));
        }
        let name_tok = self.current().clone();
        self.advance();

        if self.current().kind != TokenKind::Inj {
            return Err(self.err_here(ErrorKind::InvalidSyntax, "Expected '<~'"));
        }
        self.advance();

        let body = self.statement()?;
        let span = Span::new(pos_start, body.pos_end().clone());

        Ok(Node::InterfaceDef {
            name: name_tok.lexeme(),
            body: std::rc::Rc::new(body),
            span,
        })
    }

    /// Precedence-climbing helper: parse `func_a (op func_b)*` for the
    /// given operator kinds, folding left.
    fn bin_op(
        &mut self,
        func_a: fn(&mut Self) -> ParseResult<Node>,
        ops: &[TokenKind],
        func_b: fn(&mut Self) -> ParseResult<Node>,
    ) -> ParseResult<Node> {
        let mut left = func_a(self)?;

        while ops.contains(&self.current().kind) {
            let op = self.current().kind;
            self.advance();

            let right = func_b(self)?;
            let span = Span::new(left.pos_start().clone(), right.pos_end().clone());
            left = Node::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }
}
