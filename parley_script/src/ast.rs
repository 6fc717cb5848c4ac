//! Syntax tree produced by the parser and consumed by the compiler.

use std::collections::BTreeMap;

/// A whole parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// Enum definitions, top-level and in-body, in declaration order.
    pub enums: Vec<EnumDef>,
    /// Nodes in source order. Several may share a title (a node group).
    pub nodes: Vec<NodeAst>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub cases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeAst {
    /// Value of the mandatory `title` header.
    pub title: String,
    /// Every header as written (`key` -> raw value), the known ones included.
    pub headers: BTreeMap<String, String>,
    /// Whitespace-separated `tags` header.
    pub tags: Vec<String>,
    /// One entry per `when` header, in order.
    pub when: Vec<String>,
    /// Body of a `&css{...}` header value.
    pub css: Option<String>,
    pub body: Vec<Statement>,
    /// 1-based line of the first header.
    pub src_line: usize,
}

impl NodeAst {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Line(LineAst),
    Command(String),
    Jump(String),
    Detour(String),
    Options(Vec<OptionAst>),
    If(Vec<Branch>),
    Once(Vec<Statement>),
    Enum(EnumDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineAst {
    pub speaker: Option<String>,
    pub text: String,
    pub tags: Vec<String>,
    pub css: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionAst {
    pub text: String,
    pub tags: Vec<String>,
    pub css: Option<String>,
    /// Trailing `<<if expr>>` guard.
    pub condition: Option<String>,
    pub body: Vec<Statement>,
}

/// One arm of a conditional; `condition: None` is `else`.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Option<String>,
    pub body: Vec<Statement>,
}
