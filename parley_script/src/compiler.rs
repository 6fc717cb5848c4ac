//! Lowering of the syntax tree into the flat IR consumed by the engine.
//!
//! Compilation is total over parsed documents. Node references are not
//! checked here (see [`parley_data::validate_program`]).

use std::collections::HashMap;

use parley_data::{
    BranchDef, Instruction, LAST_LINE_TAG, LINE_ID_PREFIX, LineDef, NodeDef, OptionDef, Program, parse_markup,
};

use crate::ast::{Branch, Document, LineAst, NodeAst, OptionAst, Statement};

/// Input to a once-identifier generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnceIdContext<'a> {
    /// Title of the node containing the `once` block.
    pub node: &'a str,
    /// Running count of `once` blocks under this title, group members included.
    pub index: usize,
}

type OnceIdFn = dyn Fn(&OnceIdContext<'_>) -> String;

/// Knobs for [`compile_with`].
#[derive(Default)]
pub struct CompileOptions {
    /// Replaces the default `<title>#once#<n>` scheme.
    pub once_ids: Option<Box<OnceIdFn>>,
}

impl CompileOptions {
    pub fn with_once_ids(generator: impl Fn(&OnceIdContext<'_>) -> String + 'static) -> Self {
        Self {
            once_ids: Some(Box::new(generator)),
        }
    }

    fn once_id(&self, ctx: &OnceIdContext<'_>) -> String {
        match &self.once_ids {
            Some(generator) => generator(ctx),
            None => format!("{}#once#{}", ctx.node, ctx.index),
        }
    }
}

/// Compile with default options.
pub fn compile(doc: &Document) -> Program {
    compile_with(doc, &CompileOptions::default())
}

/// Compile a parsed document into a [`Program`].
///
/// Output is deterministic for a given document and once-id generator.
pub fn compile_with(doc: &Document, options: &CompileOptions) -> Program {
    let mut program = Program::default();
    for def in &doc.enums {
        program.enums.insert(def.name.clone(), def.cases.clone());
    }

    let mut compiler = Compiler {
        options,
        line_counter: 0,
        once_counters: HashMap::new(),
    };
    for node in &doc.nodes {
        let def = compiler.node(node);
        program.nodes.entry(node.title.clone()).or_default().push(def);
    }
    program
}

struct Compiler<'a> {
    options: &'a CompileOptions,
    line_counter: usize,
    once_counters: HashMap<String, usize>,
}

impl Compiler<'_> {
    fn node(&mut self, node: &NodeAst) -> NodeDef {
        NodeDef {
            title: node.title.clone(),
            instructions: self.block(&node.title, &node.body),
            when: node.when.clone(),
            style: node.css.clone(),
            scene: node
                .header("scene")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    fn block(&mut self, title: &str, stmts: &[Statement]) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Statement::Line(line) => out.push(self.line(line)),
                Statement::Command(content) => out.push(Instruction::Command {
                    content: content.clone(),
                }),
                Statement::Jump(target) => out.push(Instruction::Jump { target: target.clone() }),
                Statement::Detour(target) => out.push(Instruction::Detour { target: target.clone() }),
                Statement::Options(options) => {
                    mark_last_line(&mut out);
                    let options = options.iter().map(|opt| self.option(title, opt)).collect();
                    out.push(Instruction::Options { options });
                },
                Statement::If(branches) => {
                    let branches = branches.iter().map(|b| self.branch(title, b)).collect();
                    out.push(Instruction::If { branches });
                },
                Statement::Once(body) => {
                    let id = self.next_once_id(title);
                    let block = self.block(title, body);
                    out.push(Instruction::Once { id, block });
                },
                // already recorded in the program's enum table
                Statement::Enum(_) => {},
            }
        }
        out
    }

    fn line(&mut self, line: &LineAst) -> Instruction {
        let markup = parse_markup(&line.text);
        Instruction::Line(LineDef {
            speaker: line.speaker.clone(),
            text: markup.text.clone(),
            tags: self.with_line_id(&line.tags),
            style: line.css.clone(),
            markup: markup.normalized(),
        })
    }

    fn option(&mut self, title: &str, opt: &OptionAst) -> OptionDef {
        let markup = parse_markup(&opt.text);
        let tags = self.with_line_id(&opt.tags);
        OptionDef {
            text: markup.text.clone(),
            tags,
            style: opt.css.clone(),
            condition: opt.condition.clone(),
            markup: markup.normalized(),
            block: self.block(title, &opt.body),
        }
    }

    fn branch(&mut self, title: &str, branch: &Branch) -> BranchDef {
        BranchDef {
            condition: branch.condition.clone(),
            block: self.block(title, &branch.body),
        }
    }

    fn with_line_id(&mut self, tags: &[String]) -> Vec<String> {
        let mut tags = tags.to_vec();
        if !tags.iter().any(|t| t.starts_with(LINE_ID_PREFIX)) {
            tags.push(format!("{LINE_ID_PREFIX}{:x}", self.line_counter));
            self.line_counter += 1;
        }
        tags
    }

    fn next_once_id(&mut self, title: &str) -> String {
        let counter = self.once_counters.entry(title.to_string()).or_default();
        let index = *counter;
        *counter += 1;
        self.options.once_id(&OnceIdContext { node: title, index })
    }
}

/// Tag the nearest preceding line (looking past commands) as the last line
/// shown before a choice.
fn mark_last_line(block: &mut [Instruction]) {
    for ins in block.iter_mut().rev() {
        match ins {
            Instruction::Line(line) => {
                if !line.tags.iter().any(|t| t == LAST_LINE_TAG) {
                    line.tags.push(LAST_LINE_TAG.to_string());
                }
                return;
            },
            Instruction::Command { .. } => {},
            _ => return,
        }
    }
}
