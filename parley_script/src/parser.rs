//! Recursive-descent parser over the lexer's token stream.
//!
//! The parser is strict: the first structural problem aborts the whole
//! document with a [`ParseError`] carrying the offending token's position.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::ast::{Branch, Document, EnumDef, LineAst, NodeAst, OptionAst, Statement};
use crate::lexer::{Token, TokenKind, lex};

static SPEAKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:\s][^:]*)\s*:\s*(.*)$").expect("speaker regex is valid"));
static OPTION_CONDITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*<<if\s+(.+?)>>\s*$").expect("option condition regex is valid"));
static INLINE_IF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{if\s+(.+)\}$").expect("inline if regex is valid"));
static INLINE_ELSE_IF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{else\s+if\s+(.+)\}$").expect("inline else-if regex is valid"));

const CSS_OPEN: &str = "&css{";

/// Errors that abort parsing of a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{line}:{column}: node has no title header")]
    MissingTitle { line: usize, column: usize },
    #[error("{line}:{column}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("{line}:{column}: malformed {block} block: {reason}")]
    MalformedBlock {
        block: &'static str,
        reason: String,
        line: usize,
        column: usize,
    },
    #[error("{line}:{column}: unmatched conditional: {reason}")]
    UnmatchedConditional { reason: String, line: usize, column: usize },
}

impl ParseError {
    /// 1-based source line of the offending token.
    pub fn line(&self) -> usize {
        match self {
            ParseError::MissingTitle { line, .. }
            | ParseError::UnexpectedToken { line, .. }
            | ParseError::MalformedBlock { line, .. }
            | ParseError::UnmatchedConditional { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            ParseError::MissingTitle { column, .. }
            | ParseError::UnexpectedToken { column, .. }
            | ParseError::MalformedBlock { column, .. }
            | ParseError::UnmatchedConditional { column, .. } => *column,
        }
    }
}

/// Parse a complete source file into a [`Document`].
///
/// # Errors
/// Returns the first structural error found; no partial document is produced.
pub fn parse_document(source: &str) -> Result<Document, ParseError> {
    Parser::new(lex(source)).document()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InlineMarker {
    If(String),
    ElseIf(String),
    Else,
    EndIf,
}

fn inline_marker(text: &str) -> Option<InlineMarker> {
    let trimmed = text.trim();
    if trimmed == "{else}" {
        return Some(InlineMarker::Else);
    }
    if trimmed == "{endif}" {
        return Some(InlineMarker::EndIf);
    }
    if let Some(caps) = INLINE_ELSE_IF_RE.captures(trimmed) {
        return Some(InlineMarker::ElseIf(caps[1].trim().to_string()));
    }
    INLINE_IF_RE
        .captures(trimmed)
        .map(|caps| InlineMarker::If(caps[1].trim().to_string()))
}

/// Command-form `if` arms end at a sibling `elseif`, `else` or `endif`.
fn is_if_terminator(tok: &Token) -> bool {
    tok.kind == TokenKind::Command && {
        let text = tok.text.as_str();
        text == "else" || text == "endif" || keyword_arg(text, "elseif").is_some() || else_if_arg(text).is_some()
    }
}

/// `keyword rest` -> `rest` (trimmed), requiring whitespace after the keyword.
fn keyword_arg<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(keyword)?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

fn else_if_arg(text: &str) -> Option<&str> {
    keyword_arg(text, "else").and_then(|rest| keyword_arg(rest, "if"))
}

fn describe(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Indent => "indentation".to_string(),
        TokenKind::Dedent => "dedent".to_string(),
        TokenKind::Empty => "blank line".to_string(),
        kind => format!("{kind:?} '{}'", tok.text),
    }
}

/// Remove the first `&css{...}` block anywhere in `input`.
pub(crate) fn extract_css(input: &str) -> (String, Option<String>) {
    let Some(open) = input.find(CSS_OPEN) else {
        return (input.to_string(), None);
    };
    let inner_start = open + CSS_OPEN.len();
    let Some(close) = input[inner_start..].find('}').map(|idx| inner_start + idx) else {
        return (input.to_string(), None);
    };
    let css = input[inner_start..close].trim().to_string();
    let before = input[..open].trim_end();
    let after = &input[close + 1..];
    let text = if before.is_empty() {
        after.trim_start().to_string()
    } else {
        format!("{before}{after}")
    };
    (text.trim_end().to_string(), Some(css))
}

/// Pull out whitespace-preceded `#tag` annotations.
pub(crate) fn extract_tags(input: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = input.chars().collect();
    let mut text = String::with_capacity(input.len());
    let mut tags = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let starts_tag = chars[i].is_whitespace()
            && chars.get(i + 1) == Some(&'#')
            && chars.get(i + 2).is_some_and(|c| c.is_ascii_alphabetic() || *c == '_');
        if starts_tag {
            let start = i + 2;
            let end = (start..chars.len())
                .find(|&j| !(chars[j].is_ascii_alphanumeric() || matches!(chars[j], '_' | ':')))
                .unwrap_or(chars.len());
            tags.push(chars[start..end].iter().collect());
            i = end;
            continue;
        }
        text.push(chars[i]);
        i += 1;
    }
    if tags.is_empty() {
        (input.to_string(), tags)
    } else {
        (text.trim_end().to_string(), tags)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    enums: Vec<EnumDef>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            enums: Vec::new(),
        }
    }

    fn peek(&self) -> &Token {
        // the lexer always terminates the stream with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn skip_empty(&mut self) {
        while self.at(TokenKind::Empty) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let tok = self.peek();
        ParseError::UnexpectedToken {
            expected,
            found: describe(tok),
            line: tok.line,
            column: tok.column,
        }
    }

    fn document(mut self) -> Result<Document, ParseError> {
        let mut nodes = Vec::new();
        loop {
            self.skip_empty();
            if self.at(TokenKind::Eof) {
                break;
            }
            if self.at(TokenKind::Command)
                && let Some(name) = keyword_arg(&self.peek().text, "enum")
            {
                let name = name.to_string();
                let tok = self.advance();
                let def = self.enum_block(name, &tok)?;
                self.enums.push(def);
                continue;
            }
            nodes.push(self.node()?);
        }
        Ok(Document {
            enums: self.enums,
            nodes,
        })
    }

    fn node(&mut self) -> Result<NodeAst, ParseError> {
        let start = self.peek().clone();
        let mut headers = BTreeMap::new();
        let mut title = None;
        let mut tags = Vec::new();
        let mut when = Vec::new();
        let mut css = None;

        while !self.at(TokenKind::NodeStart) {
            if self.at(TokenKind::Eof) && title.is_none() && !headers.is_empty() {
                return Err(ParseError::MissingTitle {
                    line: start.line,
                    column: start.column,
                });
            }
            let key = self.expect(TokenKind::HeaderKey, "node header or '---'")?;
            let value = self.expect(TokenKind::HeaderValue, "header value")?;
            let trimmed = value.text.trim();
            match key.text.as_str() {
                "title" => title = Some(trimmed.to_string()),
                "tags" => tags = trimmed.split_whitespace().map(str::to_string).collect(),
                "when" => when.push(trimmed.to_string()),
                _ => {},
            }
            if let Some(rest) = trimmed.strip_prefix(CSS_OPEN) {
                css = Some(self.css_header(rest));
            }
            headers.insert(key.text, value.text);
            self.skip_empty();
        }

        let title = title.filter(|t| !t.is_empty()).ok_or(ParseError::MissingTitle {
            line: start.line,
            column: start.column,
        })?;
        self.expect(TokenKind::NodeStart, "'---'")?;
        let body = self.statements_until(TokenKind::NodeEnd)?;
        self.expect(TokenKind::NodeEnd, "'==='")?;

        Ok(NodeAst {
            title,
            headers,
            tags,
            when,
            css,
            body,
            src_line: start.line,
        })
    }

    /// Collect a `&css{` header value that may continue over several lines.
    fn css_header(&mut self, first: &str) -> String {
        if let Some((inside, _)) = first.split_once('}') {
            return inside.trim().to_string();
        }
        let mut parts = vec![first.to_string()];
        loop {
            let line = match self.peek().kind {
                TokenKind::Text => self.advance().text,
                TokenKind::HeaderKey => {
                    let key = self.advance().text;
                    let value = if self.at(TokenKind::HeaderValue) {
                        self.advance().text
                    } else {
                        String::new()
                    };
                    format!("{key}: {value}")
                },
                TokenKind::Empty => {
                    self.advance();
                    continue;
                },
                _ => break,
            };
            if let Some((inside, _)) = line.split_once('}') {
                parts.push(inside.to_string());
                break;
            }
            parts.push(line);
        }
        parts.retain(|p| !p.trim().is_empty());
        parts.join("\n").trim().to_string()
    }

    /// Statements up to (not including) a token of kind `end`.
    fn statements_until(&mut self, end: TokenKind) -> Result<Vec<Statement>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_empty();
            if self.at(end) || self.at(TokenKind::Eof) {
                break;
            }
            self.item(&mut out)?;
        }
        Ok(out)
    }

    /// Statements up to a `stop` token or the end of the enclosing scope.
    fn statements_until_stop(&mut self, stop: impl Fn(&Token) -> bool) -> Result<Vec<Statement>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_empty();
            let tok = self.peek();
            if stop(tok) || matches!(tok.kind, TokenKind::Eof | TokenKind::NodeEnd | TokenKind::Dedent) {
                break;
            }
            self.item(&mut out)?;
        }
        Ok(out)
    }

    fn item(&mut self, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        match self.peek().kind {
            TokenKind::Option => out.push(self.option_group()?),
            TokenKind::Indent => out.extend(self.indented_block()?),
            _ => out.push(self.statement()?),
        }
        Ok(())
    }

    fn indented_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.expect(TokenKind::Indent, "indentation")?;
        let body = self.statements_until(TokenKind::Dedent)?;
        self.expect(TokenKind::Dedent, "dedent")?;
        Ok(body)
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek().kind {
            TokenKind::Command => {
                let tok = self.advance();
                self.command_statement(&tok)
            },
            TokenKind::Text => {
                let tok = self.advance();
                self.text_statement(&tok)
            },
            _ => Err(self.unexpected("statement")),
        }
    }

    fn command_statement(&mut self, tok: &Token) -> Result<Statement, ParseError> {
        let text = tok.text.trim();
        let malformed = |block: &'static str, reason: &str| ParseError::MalformedBlock {
            block,
            reason: reason.to_string(),
            line: tok.line,
            column: tok.column,
        };

        if let Some(target) = keyword_arg(text, "jump") {
            return Ok(Statement::Jump(target.to_string()));
        }
        if let Some(target) = keyword_arg(text, "detour") {
            return Ok(Statement::Detour(target.to_string()));
        }
        if text == "jump" || text == "detour" {
            return Err(malformed("jump", "missing target node"));
        }
        if let Some(condition) = keyword_arg(text, "if") {
            return self.if_command(condition.to_string(), tok);
        }
        if text == "if" {
            return Err(malformed("if", "missing condition"));
        }
        if text == "once" {
            return self.once_block();
        }
        if let Some(name) = keyword_arg(text, "enum") {
            let def = self.enum_block(name.to_string(), tok)?;
            self.enums.push(def.clone());
            return Ok(Statement::Enum(def));
        }
        if is_if_terminator(tok) {
            return Err(ParseError::UnmatchedConditional {
                reason: format!("<<{text}>> without a matching <<if>>"),
                line: tok.line,
                column: tok.column,
            });
        }
        if text == "endonce" {
            return Err(malformed("once", "<<endonce>> without <<once>>"));
        }
        if text == "endenum" || keyword_arg(text, "case").is_some() {
            return Err(malformed("enum", "case outside of an enum block"));
        }
        Ok(Statement::Command(text.to_string()))
    }

    fn text_statement(&mut self, tok: &Token) -> Result<Statement, ParseError> {
        match inline_marker(&tok.text) {
            Some(InlineMarker::If(condition)) => return self.inline_if(condition, tok),
            Some(_) => {
                return Err(ParseError::UnmatchedConditional {
                    reason: format!("'{}' without a matching {{if}}", tok.text.trim()),
                    line: tok.line,
                    column: tok.column,
                });
            },
            None => {},
        }

        let (text, css) = extract_css(&tok.text);
        let (text, tags) = extract_tags(&text);
        let line = match SPEAKER_RE.captures(&text) {
            Some(caps) => LineAst {
                speaker: Some(caps[1].trim().to_string()),
                text: caps[2].to_string(),
                tags,
                css,
            },
            None => LineAst {
                speaker: None,
                text,
                tags,
                css,
            },
        };
        Ok(Statement::Line(line))
    }

    fn option_group(&mut self) -> Result<Statement, ParseError> {
        let mut options = Vec::new();
        while self.at(TokenKind::Option) {
            let tok = self.advance();
            let (text, condition) = match OPTION_CONDITION_RE.captures(&tok.text) {
                Some(caps) => (caps[1].to_string(), Some(caps[2].trim().to_string())),
                None => (tok.text.clone(), None),
            };
            let (text, css) = extract_css(&text);
            let (text, tags) = extract_tags(&text);
            let body = if self.at(TokenKind::Indent) {
                self.indented_block()?
            } else {
                Vec::new()
            };
            options.push(OptionAst {
                text: text.trim().to_string(),
                tags,
                css,
                condition,
                body,
            });
            self.skip_empty();
        }
        Ok(Statement::Options(options))
    }

    /// `<<if cond>> ... [<<elseif cond>> ...] [<<else>> ...] <<endif>>`
    ///
    /// Nested `<<if>>` blocks are consumed by the recursive statement parser,
    /// so only a sibling terminator ends the current arm.
    fn if_command(&mut self, condition: String, start: &Token) -> Result<Statement, ParseError> {
        let mut branches = vec![Branch {
            condition: Some(condition),
            body: self.statements_until_stop(is_if_terminator)?,
        }];
        let mut seen_else = false;

        loop {
            self.skip_empty();
            let tok = self.peek().clone();
            let text = tok.text.as_str();
            if tok.kind == TokenKind::Command && text == "endif" {
                self.advance();
                break;
            }
            let next_condition = if tok.kind != TokenKind::Command || seen_else {
                None
            } else if text == "else" {
                Some(None)
            } else {
                keyword_arg(text, "elseif")
                    .or_else(|| else_if_arg(text))
                    .map(|c| Some(c.to_string()))
            };
            let Some(condition) = next_condition else {
                return Err(ParseError::UnmatchedConditional {
                    reason: format!("<<if>> opened here is not closed by <<endif>> (found {})", describe(&tok)),
                    line: start.line,
                    column: start.column,
                });
            };
            self.advance();
            seen_else = condition.is_none();
            let body = self.statements_until_stop(is_if_terminator)?;
            branches.push(Branch { condition, body });
        }

        Ok(Statement::If(branches))
    }

    /// `{if cond}` / `{else if cond}` / `{else}` / `{endif}` on text lines.
    fn inline_if(&mut self, condition: String, start: &Token) -> Result<Statement, ParseError> {
        let mut branches = Vec::new();
        let mut condition = Some(condition);
        loop {
            let body = self.inline_if_body()?;
            let seen_else = condition.is_none();
            branches.push(Branch { condition, body });

            let tok = self.peek().clone();
            let marker = (tok.kind == TokenKind::Text).then(|| inline_marker(&tok.text)).flatten();
            condition = match marker {
                Some(InlineMarker::EndIf) => {
                    self.advance();
                    break;
                },
                Some(InlineMarker::ElseIf(next)) if !seen_else => Some(next),
                Some(InlineMarker::Else) if !seen_else => None,
                _ => {
                    return Err(ParseError::UnmatchedConditional {
                        reason: format!("{{if}} opened here is not closed by {{endif}} (found {})", describe(&tok)),
                        line: start.line,
                        column: start.column,
                    });
                },
            };
            self.advance();
        }
        Ok(Statement::If(branches))
    }

    fn inline_if_body(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.statements_until_stop(|tok| {
            tok.kind == TokenKind::Option
                || (tok.kind == TokenKind::Text
                    && matches!(
                        inline_marker(&tok.text),
                        Some(InlineMarker::ElseIf(_) | InlineMarker::Else | InlineMarker::EndIf)
                    ))
        })
    }

    /// `<<once>>` followed by an indented body or statements up to `<<endonce>>`.
    fn once_block(&mut self) -> Result<Statement, ParseError> {
        let is_endonce = |tok: &Token| tok.kind == TokenKind::Command && tok.text == "endonce";
        let body = if self.at(TokenKind::Indent) {
            let body = self.indented_block()?;
            self.skip_empty();
            body
        } else {
            self.statements_until_stop(is_endonce)?
        };
        if is_endonce(self.peek()) {
            self.advance();
        }
        Ok(Statement::Once(body))
    }

    /// `<<case Name>>` lines up to `<<endenum>>`.
    fn enum_block(&mut self, name: String, start: &Token) -> Result<EnumDef, ParseError> {
        let malformed = |reason: String, tok: &Token| ParseError::MalformedBlock {
            block: "enum",
            reason,
            line: tok.line,
            column: tok.column,
        };
        if name.is_empty() {
            return Err(malformed("enum has no name".into(), start));
        }

        let mut cases = Vec::new();
        let mut depth = 0usize;
        loop {
            let tok = self.advance();
            match tok.kind {
                TokenKind::Empty => {},
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent if depth > 0 => depth -= 1,
                TokenKind::Command if tok.text == "endenum" => break,
                TokenKind::Command => match keyword_arg(&tok.text, "case") {
                    Some(case) => cases.push(case.to_string()),
                    None => return Err(malformed(format!("unexpected <<{}>> in enum '{name}'", tok.text), &tok)),
                },
                TokenKind::Eof => return Err(malformed(format!("enum '{name}' is missing <<endenum>>"), start)),
                _ => {
                    return Err(malformed(
                        format!("expected <<case ...>> or <<endenum>>, found {}", describe(&tok)),
                        &tok,
                    ));
                },
            }
        }
        // Close indentation opened inside the block so the caller stays balanced.
        while depth > 0 {
            self.skip_empty();
            if !self.at(TokenKind::Dedent) {
                break;
            }
            self.advance();
            depth -= 1;
        }

        Ok(EnumDef { name, cases })
    }
}
