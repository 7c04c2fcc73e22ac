//! Lexer for annotated Python kernels using logos
//!
//! logos produces the raw token stream; [`Lexer::tokenize`] layers Python's
//! offside rule on top of it, turning line breaks into `Newline` tokens and
//! changes of indentation into `Indent`/`Dedent` pairs. Line breaks inside
//! brackets are ignored, as in Python.

use std::ops::Range;

use logos::Logos;

use crate::ast::Span;
use crate::error::{CompileError, CompileResult};

/// Token types for the kernel language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r]+")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"\\\r?\n")]
pub enum Token {
    /// Physical line break plus the indentation of the following line
    #[regex(r"\n[ \t\f\r]*", |lex| indent_width(&lex.slice()[1..]))]
    LineBreak(usize),

    // Synthesized by the indentation layer, never produced by logos
    Newline,
    Indent,
    Dedent,
    EndOfFile,

    // Literals
    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+", parse_float)]
    Float(f64),

    #[regex(r"[0-9][0-9_]*", |lex| lex.slice().replace('_', "").parse::<i64>().ok())]
    #[regex(r"0[xX][0-9a-fA-F_]+", |lex| i64::from_str_radix(&lex.slice()[2..].replace('_', ""), 16).ok())]
    Int(i64),

    #[regex(r#""([^"\\\n]|\\.)*""#, unquote)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, unquote)]
    #[regex(r#""""([^"]|"[^"]|""[^"])*""""#, unquote_triple)]
    #[regex(r#"'''([^']|'[^']|''[^'])*'''"#, unquote_triple)]
    Str(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Keywords of the compiled subset
    #[token("def")]
    Def,
    #[token("return")]
    Return,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("while")]
    While,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("pass")]
    Pass,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("is")]
    Is,
    #[token("lambda")]
    Lambda,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    NoneLit,

    /// Python keywords that open statements outside the subset
    #[token("class", |lex| lex.slice().to_string())]
    #[token("import", |lex| lex.slice().to_string())]
    #[token("from", |lex| lex.slice().to_string())]
    #[token("with", |lex| lex.slice().to_string())]
    #[token("try", |lex| lex.slice().to_string())]
    #[token("except", |lex| lex.slice().to_string())]
    #[token("finally", |lex| lex.slice().to_string())]
    #[token("raise", |lex| lex.slice().to_string())]
    #[token("yield", |lex| lex.slice().to_string())]
    #[token("global", |lex| lex.slice().to_string())]
    #[token("nonlocal", |lex| lex.slice().to_string())]
    #[token("del", |lex| lex.slice().to_string())]
    #[token("assert", |lex| lex.slice().to_string())]
    #[token("async", |lex| lex.slice().to_string())]
    #[token("await", |lex| lex.slice().to_string())]
    ForeignKeyword(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("@")]
    At,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("=")]
    Equals,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("//=")]
    DoubleSlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("->")]
    Arrow,

    // Punctuation
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
}

fn indent_width(whitespace: &str) -> usize {
    whitespace.chars().fold(0, |col, c| match c {
        '\t' => (col / 8 + 1) * 8,
        ' ' | '\x0c' => col + 1,
        _ => col,
    })
}

fn parse_float(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().replace('_', "").parse::<f64>().ok()
}

fn unquote(lex: &mut logos::Lexer<Token>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_string()
}

fn unquote_triple(lex: &mut logos::Lexer<Token>) -> String {
    let slice = lex.slice();
    slice[3..slice.len() - 3].to_string()
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LineBreak(_) | Token::Newline => write!(f, "end of line"),
            Token::Indent => write!(f, "indent"),
            Token::Dedent => write!(f, "dedent"),
            Token::EndOfFile => write!(f, "end of input"),
            Token::Float(n) => write!(f, "{}", n),
            Token::Int(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Ident(s) | Token::ForeignKeyword(s) => write!(f, "{}", s),
            Token::Def => write!(f, "def"),
            Token::Return => write!(f, "return"),
            Token::For => write!(f, "for"),
            Token::In => write!(f, "in"),
            Token::While => write!(f, "while"),
            Token::If => write!(f, "if"),
            Token::Elif => write!(f, "elif"),
            Token::Else => write!(f, "else"),
            Token::Pass => write!(f, "pass"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Is => write!(f, "is"),
            Token::Lambda => write!(f, "lambda"),
            Token::True => write!(f, "True"),
            Token::False => write!(f, "False"),
            Token::NoneLit => write!(f, "None"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::DoubleStar => write!(f, "**"),
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::At => write!(f, "@"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::Tilde => write!(f, "~"),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::Equals => write!(f, "="),
            Token::PlusEq => write!(f, "+="),
            Token::MinusEq => write!(f, "-="),
            Token::StarEq => write!(f, "*="),
            Token::SlashEq => write!(f, "/="),
            Token::DoubleSlashEq => write!(f, "//="),
            Token::PercentEq => write!(f, "%="),
            Token::AmpEq => write!(f, "&="),
            Token::PipeEq => write!(f, "|="),
            Token::CaretEq => write!(f, "^="),
            Token::ShlEq => write!(f, "<<="),
            Token::ShrEq => write!(f, ">>="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Arrow => write!(f, "->"),
            Token::Dot => write!(f, "."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
        }
    }
}

/// A token together with its location in the source
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
    pub range: Range<usize>,
}

/// Maps byte offsets to line/column positions
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { line_starts }
    }

    pub fn position(&self, offset: usize) -> Span {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Span::new(line + 1, offset - self.line_starts[line] + 1)
    }
}

/// Indentation-aware lexer producing a complete token stream
pub struct Lexer<'source> {
    source: &'source str,
    lines: LineIndex,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
        }
    }

    /// Tokenize the whole source, always ending in `EndOfFile`
    pub fn tokenize(&self) -> CompileResult<Vec<SpannedToken>> {
        let mut raw = Token::lexer(self.source).spanned();
        let mut tokens: Vec<SpannedToken> = Vec::new();
        let mut indents: Vec<usize> = Vec::new();
        let mut pending_indent: Option<usize> = None;
        let mut depth = 0usize;

        while let Some((result, range)) = raw.next() {
            let span = self.lines.position(range.start);
            let token = result.map_err(|_| CompileError::LexerError {
                location: span,
                message: format!(
                    "unexpected character {:?}",
                    &self.source[range.clone()]
                ),
            })?;

            if let Token::LineBreak(width) = token {
                if depth == 0 {
                    pending_indent = Some(width);
                }
                continue;
            }

            // First token of a logical line: settle indentation
            if indents.is_empty() {
                indents.push(span.column - 1);
                pending_indent = None;
            } else if let Some(width) = pending_indent.take() {
                self.push_synthetic(&mut tokens, Token::Newline, range.start);
                self.adjust_indent(&mut tokens, &mut indents, width, range.start)?;
            }

            match token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }

            tokens.push(SpannedToken { token, span, range });
        }

        let end = self.source.len();
        if !tokens.is_empty() {
            self.push_synthetic(&mut tokens, Token::Newline, end);
        }
        while indents.len() > 1 {
            indents.pop();
            self.push_synthetic(&mut tokens, Token::Dedent, end);
        }
        self.push_synthetic(&mut tokens, Token::EndOfFile, end);
        Ok(tokens)
    }

    fn adjust_indent(
        &self,
        tokens: &mut Vec<SpannedToken>,
        indents: &mut Vec<usize>,
        width: usize,
        offset: usize,
    ) -> CompileResult<()> {
        let current = indents.last().copied().unwrap_or(0);
        if width > current {
            indents.push(width);
            self.push_synthetic(tokens, Token::Indent, offset);
            return Ok(());
        }

        while indents.len() > 1 && width < indents.last().copied().unwrap_or(0) {
            indents.pop();
            self.push_synthetic(tokens, Token::Dedent, offset);
        }

        if indents.last().copied() != Some(width) {
            return Err(CompileError::LexerError {
                location: self.lines.position(offset),
                message: "unindent does not match any outer indentation level".to_string(),
            });
        }
        Ok(())
    }

    fn push_synthetic(&self, tokens: &mut Vec<SpannedToken>, token: Token, offset: usize) {
        tokens.push(SpannedToken {
            token,
            span: self.lines.position(offset),
            range: offset..offset,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        assert_eq!(
            kinds("c = a @ b"),
            vec![
                Token::Ident("c".to_string()),
                Token::Equals,
                Token::Ident("a".to_string()),
                Token::At,
                Token::Ident("b".to_string()),
                Token::Newline,
                Token::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_indentation() {
        let source = "def f(a):\n    for i in range(4):\n        a[i] = 0\n    return a\n";
        let tokens = kinds(source);
        let indents = tokens.iter().filter(|t| **t == Token::Indent).count();
        let dedents = tokens.iter().filter(|t| **t == Token::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last(), Some(&Token::EndOfFile));
    }

    #[test]
    fn test_blank_lines_and_comments_are_ignored() {
        let source = "x = 1\n\n    # indented comment\ny = 2\n";
        assert_eq!(
            kinds(source),
            vec![
                Token::Ident("x".to_string()),
                Token::Equals,
                Token::Int(1),
                Token::Newline,
                Token::Ident("y".to_string()),
                Token::Equals,
                Token::Int(2),
                Token::Newline,
                Token::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_newlines_inside_brackets() {
        let tokens = kinds("y = f(a,\n      b)\n");
        assert!(!tokens[..tokens.len() - 2].contains(&Token::Newline));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 1e3 0x10 .5"),
            vec![
                Token::Int(1),
                Token::Float(2.5),
                Token::Float(1000.0),
                Token::Int(16),
                Token::Float(0.5),
                Token::Newline,
                Token::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_keyword_classes() {
        let tokens = kinds("import numpy");
        assert_eq!(tokens[0], Token::ForeignKeyword("import".to_string()));
        assert_eq!(kinds("lambda")[0], Token::Lambda);
    }

    #[test]
    fn test_bad_dedent() {
        let source = "def f():\n    x = 1\n  y = 2\n";
        let err = Lexer::new(source).tokenize().unwrap_err();
        assert!(matches!(err, CompileError::LexerError { .. }));
    }

    #[test]
    fn test_indented_source_is_dedented() {
        let tokens = kinds("    x = 1\n    y = 2\n");
        assert!(!tokens.contains(&Token::Indent));
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::new("x = 1\n  \ny = 2").tokenize().unwrap();
        let y = tokens
            .iter()
            .find(|t| t.token == Token::Ident("y".to_string()))
            .unwrap();
        assert_eq!(y.span, Span::new(3, 1));
    }
}
