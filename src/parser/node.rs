use std::rc::Rc;

use serde::Serialize;

use crate::lexer::{Position, TokenKind};

/// The region of source a node covers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Numeric literal payload; the subtype distinction survives into the
/// runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum NumberLit {
    Int(i64),
    Flt(f64),
}

/// Explicit type specifier on an assignment (`int a = 1`), the `var`
/// opt-out, or nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeTag {
    Default,
    Var,
    Int,
    Flt,
    Str,
    Lst,
    Map,
}

impl TypeTag {
    pub fn from_kwd(kwd: &str) -> Option<Self> {
        match kwd {
            "int" => Some(TypeTag::Int),
            "flt" => Some(TypeTag::Flt),
            "str" => Some(TypeTag::Str),
            "lst" => Some(TypeTag::Lst),
            "map" => Some(TypeTag::Map),
            _ => None,
        }
    }

    /// The runtime type an explicit tag demands, if any.
    pub fn declared_type(&self) -> Option<&'static str> {
        match self {
            TypeTag::Int => Some("INT"),
            TypeTag::Flt => Some("FLT"),
            TypeTag::Str => Some("STR"),
            TypeTag::Lst => Some("LST"),
            TypeTag::Map => Some("MAP"),
            TypeTag::Default | TypeTag::Var => None,
        }
    }
}

/// Assignment operator lexemes. `Walrus` (`:=`) lexes and parses but the
/// interpreter rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Set,
    Walrus,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl AssignOp {
    pub fn from_lexeme(lexeme: &str) -> Option<Self> {
        match lexeme {
            "=" => Some(AssignOp::Set),
            ":=" => Some(AssignOp::Walrus),
            "+=" => Some(AssignOp::Add),
            "-=" => Some(AssignOp::Sub),
            "*=" => Some(AssignOp::Mul),
            "/=" => Some(AssignOp::Div),
            "%=" => Some(AssignOp::Mod),
            "^=" => Some(AssignOp::Pow),
            _ => None,
        }
    }

    pub fn lexeme(&self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Walrus => ":=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::Pow => "^=",
        }
    }
}

/// One arm of a conditional chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfCase {
    pub condition: Node,
    pub body: Node,
    pub braced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Node {
    Number {
        value: NumberLit,
        span: Span,
    },
    Str {
        value: String,
        span: Span,
    },
    List {
        elements: Vec<Node>,
        span: Span,
    },
    Map {
        entries: Vec<(Node, Node)>,
        span: Span,
    },
    /// A statement sequence. Evaluates to the single statement's value
    /// when it holds exactly one, and to a list of values otherwise.
    Capsule {
        statements: Vec<Node>,
        span: Span,
    },
    VarAccess {
        name: String,
        span: Span,
    },
    VarAssign {
        name: String,
        op: AssignOp,
        value: Box<Node>,
        constant: bool,
        global: bool,
        type_tag: TypeTag,
        span: Span,
    },
    /// Wrapper over a chained-access assignment head.
    ReferenceAccess {
        head: Box<Node>,
        span: Span,
    },
    /// `a.b@i = expr` and friends; `target` is the access chain.
    ReferenceAssign {
        target: Box<Node>,
        op: AssignOp,
        value: Box<Node>,
        span: Span,
    },
    BinOp {
        left: Box<Node>,
        op: TokenKind,
        right: Box<Node>,
        span: Span,
    },
    UnaryOp {
        op: TokenKind,
        operand: Box<Node>,
        span: Span,
    },
    If {
        cases: Vec<IfCase>,
        else_case: Option<Box<Node>>,
        span: Span,
    },
    For {
        var: String,
        start: Box<Node>,
        end: Box<Node>,
        step: Option<Box<Node>>,
        body: Box<Node>,
        braced: bool,
        span: Span,
    },
    ForEach {
        var: String,
        container: Box<Node>,
        body: Box<Node>,
        braced: bool,
        span: Span,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
        braced: bool,
        span: Span,
    },
    /// A reactive trigger bound to the variable on the left of the
    /// condition.
    When {
        condition: Rc<Node>,
        target: String,
        body: Rc<Node>,
        braced: bool,
        span: Span,
    },
    Defer {
        body: Box<Node>,
        braced: bool,
        span: Span,
    },
    Continue {
        span: Span,
    },
    Break {
        span: Span,
    },
    Once {
        span: Span,
    },
    Return {
        value: Option<Box<Node>>,
        span: Span,
    },
    Use {
        name: String,
        span: Span,
    },
    Delete {
        name: String,
        span: Span,
    },
    FunctionDef {
        name: Option<String>,
        params: Vec<String>,
        body: Rc<Node>,
        auto_return: bool,
        span: Span,
    },
    InterfaceDef {
        name: String,
        body: Rc<Node>,
        span: Span,
    },
    StructDef {
        name: Option<String>,
        params: Vec<String>,
        body: Rc<Node>,
        span: Span,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
        span: Span,
    },
    ErrorHandler {
        try_body: Box<Node>,
        catch_body: Box<Node>,
        span: Span,
    },
}

impl Node {
    pub fn span(&self) -> &Span {
        match self {
            Node::Number { span, .. }
            | Node::Str { span, .. }
            | Node::List { span, .. }
            | Node::Map { span, .. }
            | Node::Capsule { span, .. }
            | Node::VarAccess { span, .. }
            | Node::VarAssign { span, .. }
            | Node::ReferenceAccess { span, .. }
            | Node::ReferenceAssign { span, .. }
            | Node::BinOp { span, .. }
            | Node::UnaryOp { span, .. }
            | Node::If { span, .. }
            | Node::For { span, .. }
            | Node::ForEach { span, .. }
            | Node::While { span, .. }
            | Node::When { span, .. }
            | Node::Defer { span, .. }
            | Node::Continue { span }
            | Node::Break { span }
            | Node::Once { span }
            | Node::Return { span, .. }
            | Node::Use { span, .. }
            | Node::Delete { span, .. }
            | Node::FunctionDef { span, .. }
            | Node::InterfaceDef { span, .. }
            | Node::StructDef { span, .. }
            | Node::Call { span, .. }
            | Node::ErrorHandler { span, .. } => span,
        }
    }

    pub fn pos_start(&self) -> &Position {
        &self.span().start
    }

    pub fn pos_end(&self) -> &Position {
        &self.span().end
    }
}
