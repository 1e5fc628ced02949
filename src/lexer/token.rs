use std::collections::HashMap;
use std::fmt::Display;

use once_cell::sync::Lazy;
use serde::Serialize;

/// A location in the source text. `line_text` carries the full line the
/// position sits on, so diagnostics can render an excerpt without going
/// back to the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub index: usize,
    pub line: usize,
    pub column: usize,
    pub source_name: String,
    pub line_text: String,
}

impl Position {
    pub fn new(
        index: usize,
        line: usize,
        column: usize,
        source_name: &str,
        line_text: &str,
    ) -> Self {
        Self {
            index,
            line,
            column,
            source_name: source_name.to_string(),
            line_text: line_text.to_string(),
        }
    }

    pub fn advance(&mut self) {
        self.index += 1;
        self.column += 1;
    }
}

/// All reserved keywords.
pub const KEYWORDS: &[&str] = &[
    "use", "by", "end", "const", "global", "del", "?", "!?", "!", "if", "elif", "else", "while",
    "when", "for", "foreach", "in", "return", "continue", "break", "once", "int", "flt", "str",
    "lst", "map", "var", "try", "catch", "defer",
];

/// All multi-character operators.
pub const BIGRAPHS: &[&str] = &[
    "+=", "-=", "*=", "/=", "^=", "%=", "++", "--", "==", "!=", "<=", ">=", "<~", "~>", "~&",
    "~|", "><", "!?", "</", "/>", "..", ":=", "::",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    // literals and names
    Int,
    Flt,
    Str,
    Sym,
    Kwd,
    // operators without a dedicated tag (`:`, `::`, `..`, `++`, `--`)
    Ops,
    // named operators and delimiters
    Pls,
    Mns,
    Mul,
    Div,
    Mod,
    Pow,
    And,
    Or,
    Not,
    Lbr,
    Rbr,
    Lpr,
    Rpr,
    Lcr,
    Rcr,
    At,
    Dot,
    Asg,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Eq,
    Inj,
    In,
    Nand,
    Nor,
    Xor,
    Rng,
    Lslc,
    Rslc,
    // structure
    Break,
    Eof,
}

/// The closed lexeme-to-kind mapping for operators and delimiters. All
/// augmented assignment forms share the `Asg` tag; the lexeme stays on
/// the token so the interpreter can tell them apart.
pub static OP_KINDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("+", TokenKind::Pls);
    m.insert("-", TokenKind::Mns);
    m.insert("*", TokenKind::Mul);
    m.insert("/", TokenKind::Div);
    m.insert("%", TokenKind::Mod);
    m.insert("^", TokenKind::Pow);
    m.insert("&", TokenKind::And);
    m.insert("|", TokenKind::Or);
    m.insert("~", TokenKind::Not);
    m.insert("[", TokenKind::Lbr);
    m.insert("]", TokenKind::Rbr);
    m.insert("(", TokenKind::Lpr);
    m.insert(")", TokenKind::Rpr);
    m.insert("{", TokenKind::Lcr);
    m.insert("}", TokenKind::Rcr);
    m.insert("@", TokenKind::At);
    m.insert(".", TokenKind::Dot);
    m.insert("=", TokenKind::Asg);
    m.insert(":=", TokenKind::Asg);
    m.insert("+=", TokenKind::Asg);
    m.insert("-=", TokenKind::Asg);
    m.insert("*=", TokenKind::Asg);
    m.insert("/=", TokenKind::Asg);
    m.insert("%=", TokenKind::Asg);
    m.insert("^=", TokenKind::Asg);
    m.insert("<", TokenKind::Lt);
    m.insert(">", TokenKind::Gt);
    m.insert("<=", TokenKind::Le);
    m.insert(">=", TokenKind::Ge);
    m.insert("!=", TokenKind::Ne);
    m.insert("==", TokenKind::Eq);
    m.insert("<~", TokenKind::Inj);
    m.insert("~>", TokenKind::In);
    m.insert("~&", TokenKind::Nand);
    m.insert("~|", TokenKind::Nor);
    m.insert("><", TokenKind::Xor);
    m.insert("..", TokenKind::Rng);
    m.insert("</", TokenKind::Lslc);
    m.insert("/>", TokenKind::Rslc);
    m
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenValue {
    None,
    Int(i64),
    Float(f64),
    Text(String),
}

impl TokenValue {
    pub fn text(&self) -> Option<&str> {
        match self {
            TokenValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub pos_start: Position,
    pub pos_end: Position,
}

impl Token {
    pub fn new(kind: TokenKind, value: TokenValue, pos_start: Position, pos_end: Position) -> Self {
        Self {
            kind,
            value,
            pos_start,
            pos_end,
        }
    }

    /// Whether this token is the given keyword.
    pub fn is_kwd(&self, kwd: &str) -> bool {
        self.kind == TokenKind::Kwd && self.value.text() == Some(kwd)
    }

    /// Whether this token is an un-tagged operator with the given lexeme.
    pub fn is_ops(&self, op: &str) -> bool {
        self.kind == TokenKind::Ops && self.value.text() == Some(op)
    }

    pub fn lexeme(&self) -> String {
        match &self.value {
            TokenValue::None => String::new(),
            TokenValue::Int(n) => n.to_string(),
            TokenValue::Float(n) => format!("{n:?}"),
            TokenValue::Text(s) => s.clone(),
        }
    }
}

// Tokens compare by kind and value only; positions never take part, so
// test fixtures can use default positions.
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value == other.value
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            TokenValue::None => write!(f, "{:?}", self.kind),
            _ => write!(f, "{:?}:{}", self.kind, self.lexeme()),
        }
    }
}
