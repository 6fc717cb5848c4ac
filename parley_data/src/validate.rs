use std::collections::HashSet;
use std::fmt;

use crate::*;

/// Validation finding for a malformed or dangling reference in a Program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateId { kind: &'static str, id: String },
    MissingReference { kind: &'static str, id: String, context: String },
    InvalidValue { context: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateId { kind, id } => {
                write!(f, "duplicate {kind} id '{id}'")
            },
            ValidationError::MissingReference { kind, id, context } => {
                write!(f, "missing {kind} '{id}' ({context})")
            },
            ValidationError::InvalidValue { context } => {
                write!(f, "invalid value ({context})")
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check node references and identifier uniqueness in a compiled Program.
///
/// The program is never modified; callers decide whether findings are fatal.
///
/// ```
/// use parley_data::{Instruction, NodeDef, Program, validate_program};
///
/// let mut program = Program::default();
/// program.nodes.insert(
///     "Start".into(),
///     vec![NodeDef {
///         title: "Start".into(),
///         instructions: vec![Instruction::Jump { target: "Start".into() }],
///         when: Vec::new(),
///         style: None,
///         scene: None,
///     }],
/// );
/// assert!(validate_program(&program).is_empty());
/// ```
pub fn validate_program(program: &Program) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (name, cases) in &program.enums {
        if cases.is_empty() {
            errors.push(ValidationError::InvalidValue {
                context: format!("enum '{name}' has no cases"),
            });
        }
        let mut seen = HashSet::new();
        for case in cases {
            if !seen.insert(case.as_str()) {
                errors.push(ValidationError::DuplicateId {
                    kind: "enum case",
                    id: format!("{name}.{case}"),
                });
            }
        }
    }

    let mut ids = SeenIds::default();
    for (title, group) in &program.nodes {
        if title.trim().is_empty() {
            errors.push(ValidationError::InvalidValue {
                context: "node with empty title".to_string(),
            });
        }
        for node in group {
            walk_block(program, &node.instructions, title, &mut ids, &mut errors);
        }
    }

    errors
}

#[derive(Default)]
struct SeenIds<'a> {
    lines: HashSet<&'a str>,
    once: HashSet<&'a str>,
}

fn walk_block<'a>(
    program: &Program,
    block: &'a [Instruction],
    title: &str,
    ids: &mut SeenIds<'a>,
    errors: &mut Vec<ValidationError>,
) {
    for instruction in block {
        match instruction {
            Instruction::Jump { target } => check_node("jump", target, program, title, errors),
            Instruction::Detour { target } => check_node("detour", target, program, title, errors),
            Instruction::Line(line) => track(line.line_id(), "line", &mut ids.lines, errors),
            Instruction::Options { options } => {
                for option in options {
                    track(option.line_id(), "line", &mut ids.lines, errors);
                }
            },
            Instruction::Once { id, .. } => track(Some(id.as_str()), "once", &mut ids.once, errors),
            Instruction::Command { .. } | Instruction::If { .. } => {},
        }
        for nested in instruction.blocks() {
            walk_block(program, nested, title, ids, errors);
        }
    }
}

fn check_node(kind: &'static str, target: &str, program: &Program, title: &str, errors: &mut Vec<ValidationError>) {
    if !program.nodes.contains_key(target) {
        errors.push(ValidationError::MissingReference {
            kind: "node",
            id: target.to_string(),
            context: format!("{kind} in node '{title}'"),
        });
    }
}

fn track<'a>(
    id: Option<&'a str>,
    kind: &'static str,
    seen: &mut HashSet<&'a str>,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(id) = id
        && !seen.insert(id)
    {
        errors.push(ValidationError::DuplicateId {
            kind,
            id: id.to_string(),
        });
    }
}
