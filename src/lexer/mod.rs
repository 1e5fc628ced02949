//! Lexical analysis for Safyr source text.
//!
//! The lexer is a deterministic state machine over character classes.
//! Each step looks up `(state, character)` in the transition table and
//! either keeps building the current lexeme, finishes it, or fails.
//! Standalone newlines become `Break` tokens and the stream always ends
//! with `Eof`.

mod token;

pub use token::*;

use crate::error::{Error, ErrorKind};

pub type LexResult<T> = Result<T, Error>;

const PUNCT: &str = "+-*/=_?/\\|><.,;:'\"&^%$#@![]{}()~";
const OPCHARS: &str = "+-*/=%^?!><&|~:.@;";
const CONTAINERS: &str = "{}[]()";
const WHITESPACE: &str = "\n\t ";

/// Lexer states.
///
/// `new`: ready for a new token, `int`/`flt`: numeric literal, `dec`: a
/// lone `.` that may become a float or the range operator, `con`: a
/// container symbol, `ops`: a one- or two-character operator, `st1`/`st2`:
/// single-/double-quoted string, `sym`: identifier or keyword, `cmt`/`cm2`:
/// line and block comments, `fin`: current token complete, `xxx`: fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Int,
    Flt,
    Dec,
    Con,
    Ops,
    St1,
    St2,
    Sym,
    Cmt,
    Cm2,
    Fin,
    Xxx,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::New => "new",
            State::Int => "int",
            State::Flt => "flt",
            State::Dec => "dec",
            State::Con => "con",
            State::Ops => "ops",
            State::St1 => "st1",
            State::St2 => "st2",
            State::Sym => "sym",
            State::Cmt => "cmt",
            State::Cm2 => "cm2",
            State::Fin => "fin",
            State::Xxx => "xxx",
        }
    }
}

/// The transition table: `(next_state, advance)` for every supported
/// `(state, character)` pair. Characters outside every class are
/// unsupported input.
fn lookup(state: State, c: char) -> Option<(State, usize)> {
    use State::*;

    let digit = c.is_ascii_digit();
    let letter = c.is_ascii_alphabetic();
    let op = OPCHARS.contains(c);
    let con = CONTAINERS.contains(c);
    let punct = PUNCT.contains(c);
    let white = WHITESPACE.contains(c);

    match state {
        New => match c {
            '.' => Some((Dec, 1)),
            '\'' => Some((St1, 1)),
            '"' => Some((St2, 1)),
            ';' => Some((Cmt, 1)),
            _ if digit => Some((Int, 1)),
            _ if letter => Some((Sym, 1)),
            _ if op => Some((Ops, 1)),
            _ if con => Some((Con, 1)),
            _ if white => Some((New, 1)),
            _ if punct => Some((Xxx, 0)),
            _ => None,
        },
        Int => match c {
            '.' => Some((Flt, 1)),
            _ if digit => Some((Int, 1)),
            _ if letter => Some((Xxx, 0)),
            _ if op || con => Some((Fin, 0)),
            _ if white => Some((Fin, 1)),
            _ if punct => Some((Xxx, 0)),
            _ => None,
        },
        Flt => match c {
            _ if digit => Some((Flt, 1)),
            _ if letter => Some((Xxx, 0)),
            // a second `.` ends the float; `..` restarts as a range
            _ if op || con => Some((Fin, 0)),
            _ if white => Some((Fin, 1)),
            _ if punct => Some((Fin, 0)),
            _ => None,
        },
        Dec => match c {
            '.' => Some((Fin, 1)),
            _ if digit => Some((Flt, 1)),
            _ if letter => Some((Fin, 0)),
            _ if white => Some((Fin, 1)),
            _ if op || con || punct => Some((Fin, 0)),
            _ => None,
        },
        Con => match c {
            _ if digit || letter || op || con || punct || white => Some((Fin, 0)),
            _ => None,
        },
        Ops => match c {
            '\'' | '"' => Some((Fin, 0)),
            ';' => Some((Fin, 0)),
            _ if digit || letter => Some((Fin, 0)),
            _ if op => Some((Fin, 1)),
            _ if con => Some((Fin, 0)),
            _ if white => Some((Fin, 1)),
            _ if punct => Some((Xxx, 0)),
            _ => None,
        },
        St1 => match c {
            '\'' => Some((Fin, 1)),
            _ if digit || letter || punct || white => Some((St1, 1)),
            _ => None,
        },
        St2 => match c {
            '"' => Some((Fin, 1)),
            _ if digit || letter || punct || white => Some((St2, 1)),
            _ => None,
        },
        Sym => match c {
            _ if digit || letter => Some((Sym, 1)),
            _ if op || con => Some((Fin, 0)),
            _ if white => Some((Fin, 1)),
            _ if punct => Some((Xxx, 0)),
            _ => None,
        },
        Cmt => match c {
            ';' => Some((Cm2, 1)),
            '\n' => Some((New, 1)),
            _ if digit || letter || punct || c == ' ' || c == '\t' => Some((Cmt, 1)),
            _ => None,
        },
        Cm2 => match c {
            _ if digit || letter || op || con || punct || white => Some((Cm2, 1)),
            _ => None,
        },
        // never current states
        Fin | Xxx => None,
    }
}

pub struct Lexer {
    input: Vec<char>,
    name: String,
    state: State,
    pos: usize,
    token: String,
    tokens: Vec<Token>,
    line: usize,
    col: usize,
    line_start: usize,
    curr_line: String,
    start_pos: Position,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self::named("<input>", input)
    }

    pub fn named(name: &str, input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            name: name.to_string(),
            state: State::New,
            pos: 0,
            token: String::new(),
            tokens: vec![],
            line: 0,
            col: 0,
            line_start: 0,
            curr_line: String::new(),
            start_pos: Position::default(),
        }
    }

    fn here(&self, col_offset: usize) -> Position {
        Position::new(
            self.pos,
            self.line,
            self.col + col_offset,
            &self.name,
            &self.curr_line,
        )
    }

    pub fn tokenize(mut self) -> LexResult<Vec<Token>> {
        while self.pos < self.input.len() {
            self.transition()?;
        }

        // an unterminated token at end of input still gets stored
        if !self.token.is_empty() {
            if matches!(self.state, State::St1 | State::St2) {
                return Err(Error::new(
                    ErrorKind::UnmatchedQuote,
                    self.start_pos.clone(),
                    self.here(1),
                    "Unmatched quotation mark",
                ));
            }
            let tok = self.finish_token()?;
            self.tokens.push(tok);
        }

        let eof_pos = self.here(0);
        self.tokens.push(Token::new(
            TokenKind::Eof,
            TokenValue::None,
            eof_pos.clone(),
            eof_pos,
        ));

        Ok(self.tokens)
    }

    /// Execute a single processing step.
    fn transition(&mut self) -> LexResult<()> {
        self.curr_line = self.input[self.line_start..]
            .iter()
            .take_while(|&&c| c != '\n')
            .collect();

        let c = self.input[self.pos];

        if self.state == State::New {
            self.start_pos = self.here(0);
        }

        let Some((next, advance)) = lookup(self.state, c) else {
            return Err(Error::new(
                ErrorKind::IllegalInputCharacter,
                self.start_pos.clone(),
                self.here(1),
                format!("Character [{c}] not supported."),
            ));
        };
        let (mut next, mut delta) = (next, advance);

        // a string literal may directly follow an assignment operator
        if self.token == "=" && (c == '\'' || c == '"') {
            next = State::Fin;
            delta = 0;
        }

        match next {
            State::Xxx => {
                return Err(Error::new(
                    ErrorKind::IllegalTokenFormat,
                    self.start_pos.clone(),
                    self.here(1),
                    format!("Encountered character [{c}] in state [{}]", self.state.name()),
                ));
            }
            State::New if self.state == State::New => {}
            State::Cmt => {
                self.state = State::Cmt;
            }
            State::Cm2 => {
                if c == ';' && self.input.get(self.pos + 1) == Some(&';') {
                    self.pos += 2;
                    self.state = State::New;
                } else {
                    self.state = State::Cm2;
                }
            }
            State::Fin => {
                if self.token == "~" && c == '~' {
                    delta = 0;
                }
                if self.state == State::Ops {
                    let joined = format!("{}{c}", self.token);
                    if !BIGRAPHS.contains(&joined.as_str()) {
                        delta = 0;
                    }
                }
                if !WHITESPACE.contains(c) && delta == 1 {
                    self.token.push(c);
                }

                let tok = self.finish_token()?;
                self.tokens.push(tok);
                self.token.clear();
                self.state = State::New;
            }
            _ => {
                self.token.push(c);
                self.state = next;
            }
        }

        if c == '\n' {
            if matches!(self.state, State::St1 | State::St2) {
                return Err(Error::new(
                    ErrorKind::UnmatchedQuote,
                    self.start_pos.clone(),
                    self.here(0),
                    "Unmatched quotation mark",
                ));
            }

            let end = self.here(0);
            self.line += 1;
            self.col = 0;
            self.curr_line.clear();
            self.line_start = self.pos + 1;
            self.token.clear();
            self.tokens.push(Token::new(
                TokenKind::Break,
                TokenValue::None,
                self.start_pos.clone(),
                end,
            ));
        } else {
            self.col += delta;
        }

        self.pos += delta;

        Ok(())
    }

    /// Convert the accumulated lexeme into a token with its decoded value.
    fn finish_token(&mut self) -> LexResult<Token> {
        let s = self.token.clone();
        let start = self.start_pos.clone();
        let end = self.here(0);

        let first = s.chars().next().expect("finished an empty lexeme");

        // numeric literal (or the dot/range operators that start like one)
        if first.is_ascii_digit() || first == '.' {
            if s.contains('.') {
                if s == "." {
                    return Ok(Token::new(TokenKind::Dot, TokenValue::Text(s), start, end));
                }
                if s == ".." {
                    return Ok(Token::new(TokenKind::Ops, TokenValue::Text(s), start, end));
                }
                let value: f64 = s.parse().map_err(|_| {
                    Error::new(
                        ErrorKind::IllegalTokenFormat,
                        start.clone(),
                        end.clone(),
                        format!("Token [{s}] not supported."),
                    )
                })?;
                return Ok(Token::new(
                    TokenKind::Flt,
                    TokenValue::Float(value),
                    start,
                    end,
                ));
            }
            let value: i64 = s.parse().map_err(|_| {
                Error::new(
                    ErrorKind::IllegalTokenFormat,
                    start.clone(),
                    end.clone(),
                    format!("Token [{s}] not supported."),
                )
            })?;
            return Ok(Token::new(
                TokenKind::Int,
                TokenValue::Int(value),
                start,
                end,
            ));
        }

        // identifier or keyword
        if first.is_ascii_alphabetic() {
            let kind = if KEYWORDS.contains(&s.as_str()) {
                TokenKind::Kwd
            } else {
                TokenKind::Sym
            };
            return Ok(Token::new(kind, TokenValue::Text(s), start, end));
        }

        // string literal; the surrounding quotes are part of the lexeme
        if first == '\'' || first == '"' {
            let count = s.chars().count();
            let inner: String = s.chars().skip(1).take(count.saturating_sub(2)).collect();
            return Ok(Token::new(
                TokenKind::Str,
                TokenValue::Text(inner),
                start,
                end,
            ));
        }

        // operator or container
        if s.chars().count() == 2 && !BIGRAPHS.contains(&s.as_str()) {
            return Err(Error::new(
                ErrorKind::IllegalTokenFormat,
                start,
                end,
                format!("Token [{s}] not supported."),
            ));
        }
        if KEYWORDS.contains(&s.as_str()) {
            return Ok(Token::new(TokenKind::Kwd, TokenValue::Text(s), start, end));
        }
        if let Some(kind) = OP_KINDS.get(s.as_str()) {
            return Ok(Token::new(*kind, TokenValue::Text(s), start, end));
        }
        Ok(Token::new(TokenKind::Ops, TokenValue::Text(s), start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: TokenKind, value: TokenValue) -> Token {
        Token::new(kind, value, Position::default(), Position::default())
    }

    fn eof() -> Token {
        tok(TokenKind::Eof, TokenValue::None)
    }

    fn text(s: &str) -> TokenValue {
        TokenValue::Text(s.into())
    }

    #[test]
    fn test_lex_empty_input() {
        assert_eq!(Ok(vec![eof()]), Lexer::new("").tokenize());
    }

    #[test]
    fn test_lex_whitespace_only() {
        assert_eq!(Ok(vec![eof()]), Lexer::new("  \t").tokenize());
    }

    #[test]
    fn test_lex_newline_emits_break() {
        assert_eq!(
            Ok(vec![tok(TokenKind::Break, TokenValue::None), eof()]),
            Lexer::new("\n").tokenize()
        );
    }

    #[test]
    fn test_lex_line_comment() {
        assert_eq!(Ok(vec![eof()]), Lexer::new("; a comment").tokenize());
    }

    #[test]
    fn test_lex_block_comment() {
        assert_eq!(Ok(vec![eof()]), Lexer::new(";; a comment ;;").tokenize());
    }

    #[test]
    fn test_lex_int() {
        assert_eq!(
            Ok(vec![tok(TokenKind::Int, TokenValue::Int(1337)), eof()]),
            Lexer::new("1337").tokenize()
        );
    }

    #[test]
    fn test_lex_flt() {
        assert_eq!(
            Ok(vec![tok(TokenKind::Flt, TokenValue::Float(1.5)), eof()]),
            Lexer::new("1.5").tokenize()
        );
    }

    #[test]
    fn test_lex_trailing_dot_flt() {
        assert_eq!(
            Ok(vec![tok(TokenKind::Flt, TokenValue::Float(1.0)), eof()]),
            Lexer::new("1.").tokenize()
        );
    }

    #[test]
    fn test_lex_sym() {
        assert_eq!(
            Ok(vec![tok(TokenKind::Sym, text("letter")), eof()]),
            Lexer::new("letter").tokenize()
        );
    }

    #[test]
    fn test_lex_keyword() {
        assert_eq!(
            Ok(vec![tok(TokenKind::Kwd, text("while")), eof()]),
            Lexer::new("while").tokenize()
        );
    }

    #[test]
    fn test_lex_punctuation_keywords() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Kwd, text("?")),
                tok(TokenKind::Kwd, text("!?")),
                tok(TokenKind::Kwd, text("!")),
                eof()
            ]),
            Lexer::new("? !? !").tokenize()
        );
    }

    #[test]
    fn test_lex_strings() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Str, text("a")),
                tok(TokenKind::Str, text("b")),
                eof()
            ]),
            Lexer::new("\"a\" 'b'").tokenize()
        );
    }

    #[test]
    fn test_lex_empty_string() {
        assert_eq!(
            Ok(vec![tok(TokenKind::Str, text("")), eof()]),
            Lexer::new("\"\"").tokenize()
        );
    }

    #[test]
    fn test_lex_single_char_operators() {
        let expected = vec![
            tok(TokenKind::Pls, text("+")),
            tok(TokenKind::Mns, text("-")),
            tok(TokenKind::Mul, text("*")),
            tok(TokenKind::Div, text("/")),
            tok(TokenKind::Mod, text("%")),
            tok(TokenKind::Pow, text("^")),
            tok(TokenKind::And, text("&")),
            tok(TokenKind::Or, text("|")),
            tok(TokenKind::Not, text("~")),
            tok(TokenKind::Lt, text("<")),
            tok(TokenKind::Gt, text(">")),
            tok(TokenKind::Asg, text("=")),
            tok(TokenKind::At, text("@")),
            eof(),
        ];
        assert_eq!(
            Ok(expected),
            Lexer::new("+ - * / % ^ & | ~ < > = @").tokenize()
        );
    }

    #[test]
    fn test_lex_bigraph_operators() {
        let expected = vec![
            tok(TokenKind::Asg, text("+=")),
            tok(TokenKind::Asg, text(":=")),
            tok(TokenKind::Eq, text("==")),
            tok(TokenKind::Ne, text("!=")),
            tok(TokenKind::Le, text("<=")),
            tok(TokenKind::Ge, text(">=")),
            tok(TokenKind::Inj, text("<~")),
            tok(TokenKind::In, text("~>")),
            tok(TokenKind::Nand, text("~&")),
            tok(TokenKind::Nor, text("~|")),
            tok(TokenKind::Xor, text("><")),
            tok(TokenKind::Lslc, text("</")),
            tok(TokenKind::Rslc, text("/>")),
            eof(),
        ];
        assert_eq!(
            Ok(expected),
            Lexer::new("+= := == != <= >= <~ ~> ~& ~| >< </ />").tokenize()
        );
    }

    #[test]
    fn test_lex_colon_forms() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Ops, text(":")),
                tok(TokenKind::Ops, text("::")),
                eof()
            ]),
            Lexer::new(": ::").tokenize()
        );
    }

    #[test]
    fn test_lex_range_operator() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Int, TokenValue::Int(1)),
                tok(TokenKind::Ops, text("..")),
                tok(TokenKind::Int, TokenValue::Int(5)),
                eof()
            ]),
            Lexer::new("1 .. 5").tokenize()
        );
    }

    #[test]
    fn test_lex_double_tilde_is_two_tokens() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Not, text("~")),
                tok(TokenKind::Not, text("~")),
                eof()
            ]),
            Lexer::new("~~").tokenize()
        );
    }

    #[test]
    fn test_lex_assignment_without_spaces() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Sym, text("a")),
                tok(TokenKind::Asg, text("=")),
                tok(TokenKind::Int, TokenValue::Int(1)),
                eof()
            ]),
            Lexer::new("a=1").tokenize()
        );
    }

    #[test]
    fn test_lex_string_directly_after_assign() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Sym, text("a")),
                tok(TokenKind::Asg, text("=")),
                tok(TokenKind::Str, text("s")),
                eof()
            ]),
            Lexer::new("a=\"s\"").tokenize()
        );
    }

    #[test]
    fn test_lex_containers() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Lbr, text("[")),
                tok(TokenKind::Rbr, text("]")),
                tok(TokenKind::Lpr, text("(")),
                tok(TokenKind::Rpr, text(")")),
                tok(TokenKind::Lcr, text("{")),
                tok(TokenKind::Rcr, text("}")),
                eof()
            ]),
            Lexer::new("[ ] ( ) { }").tokenize()
        );
    }

    #[test]
    fn test_lex_letter_after_int_fails() {
        let err = Lexer::new("1a").tokenize().unwrap_err();
        assert_eq!(ErrorKind::IllegalTokenFormat, err.kind);
    }

    #[test]
    fn test_lex_punctuation_after_sym_fails() {
        let err = Lexer::new("a_").tokenize().unwrap_err();
        assert_eq!(ErrorKind::IllegalTokenFormat, err.kind);
    }

    #[test]
    fn test_lex_non_bigraph_pair_splits() {
        assert_eq!(
            Ok(vec![
                tok(TokenKind::Asg, text("=")),
                tok(TokenKind::Not, text("~")),
                eof()
            ]),
            Lexer::new("=~").tokenize()
        );
    }

    #[test]
    fn test_lex_unsupported_character_fails() {
        let err = Lexer::new("`").tokenize().unwrap_err();
        assert_eq!(ErrorKind::IllegalInputCharacter, err.kind);
    }

    #[test]
    fn test_lex_unmatched_quote_at_end() {
        let err = Lexer::new("\"hello").tokenize().unwrap_err();
        assert_eq!(ErrorKind::UnmatchedQuote, err.kind);
    }

    #[test]
    fn test_lex_unmatched_quote_before_newline() {
        let err = Lexer::new("'hello\n").tokenize().unwrap_err();
        assert_eq!(ErrorKind::UnmatchedQuote, err.kind);
    }

    #[test]
    fn test_lex_positions_track_lines_and_columns() {
        let tokens = Lexer::new("a = 1\nbb = 2").tokenize().unwrap();

        let a = &tokens[0];
        assert_eq!((0, 0), (a.pos_start.line, a.pos_start.column));

        let bb = &tokens[4];
        assert_eq!(TokenKind::Sym, bb.kind);
        assert_eq!((1, 0), (bb.pos_start.line, bb.pos_start.column));
        assert_eq!("bb = 2", bb.pos_start.line_text);
    }

    #[test]
    fn test_lex_stream_always_ends_with_eof() {
        for src in ["", "1", "a = 1\n", "; comment"] {
            let tokens = Lexer::new(src).tokenize().unwrap();
            assert_eq!(TokenKind::Eof, tokens.last().unwrap().kind);
        }
    }
}
