//! Line-oriented, indentation-aware lexer.
//!
//! Every physical line yields at most one content token. Indentation is only
//! tracked inside node bodies (between `---` and `===`); header regions are
//! flat. The lexer never fails: anything it does not recognise becomes a
//! [`TokenKind::Text`] token for the parser to judge.

use std::sync::LazyLock;

use regex::Regex;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*:\s*(.*)$").expect("header regex is valid")
});
static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<<(.+?)>>\s*$").expect("command regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    HeaderKey,
    HeaderValue,
    /// `---`
    NodeStart,
    /// `===`
    NodeEnd,
    /// `-> text`
    Option,
    /// `<<content>>` on a line of its own
    Command,
    Text,
    Empty,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based source line.
    pub line: usize,
    /// 1-based column of the token's first character.
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }
}

/// Tokenize a complete source file.
pub fn lex(input: &str) -> Vec<Token> {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let mut tokens = Vec::new();
    let mut indents = vec![0usize];
    let mut in_headers = true;

    for (idx, raw) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let content = raw.trim_start_matches([' ', '\t']);
        let width = raw.len() - content.len();
        let column = width + 1;

        if content.trim().is_empty() {
            tokens.push(Token::new(TokenKind::Empty, "", line_no, 1));
            continue;
        }

        if !in_headers {
            let top = indents.last().copied().unwrap_or(0);
            if width > top {
                indents.push(width);
                tokens.push(Token::new(TokenKind::Indent, "", line_no, 1));
            } else {
                while indents.len() > 1 && indents.last().is_some_and(|&top| width < top) {
                    indents.pop();
                    tokens.push(Token::new(TokenKind::Dedent, "", line_no, 1));
                }
            }
        }

        let trimmed = content.trim_end();
        if trimmed == "---" {
            in_headers = false;
            tokens.push(Token::new(TokenKind::NodeStart, trimmed, line_no, column));
            continue;
        }
        if trimmed == "===" {
            in_headers = true;
            while indents.len() > 1 {
                indents.pop();
                tokens.push(Token::new(TokenKind::Dedent, "", line_no, 1));
            }
            tokens.push(Token::new(TokenKind::NodeEnd, trimmed, line_no, column));
            continue;
        }

        if in_headers && let Some(caps) = HEADER_RE.captures(content) {
            let key = caps.get(1).map_or("", |m| m.as_str());
            let (value, value_col) = caps.get(2).map_or(("", column), |m| (m.as_str(), column + m.start()));
            tokens.push(Token::new(TokenKind::HeaderKey, key, line_no, column));
            tokens.push(Token::new(TokenKind::HeaderValue, value, line_no, value_col));
            continue;
        }

        if let Some(rest) = content.strip_prefix("->") {
            tokens.push(Token::new(TokenKind::Option, rest.trim(), line_no, column));
            continue;
        }

        if let Some(caps) = COMMAND_RE.captures(content) {
            let inner = caps.get(1).map_or("", |m| m.as_str());
            tokens.push(Token::new(TokenKind::Command, inner.trim(), line_no, column));
            continue;
        }

        tokens.push(Token::new(TokenKind::Text, content, line_no, column));
    }

    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token::new(TokenKind::Dedent, "", lines.len(), 1));
    }
    tokens.push(Token::new(TokenKind::Eof, "", lines.len() + 1, 1));
    tokens
}
