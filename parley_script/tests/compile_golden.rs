use parley_data::{Instruction, LAST_LINE_TAG, Program, validate_program};
use parley_script::{CompileOptions, compile, compile_source, compile_with, parse_document};

const VILLAGE: &str = include_str!("fixtures/village.parley");

fn line_ids(program: &Program) -> Vec<String> {
    fn walk(block: &[Instruction], out: &mut Vec<String>) {
        for ins in block {
            match ins {
                Instruction::Line(line) => out.extend(line.line_id().map(str::to_string)),
                Instruction::Options { options } => {
                    for option in options {
                        out.extend(option.line_id().map(str::to_string));
                    }
                },
                _ => {},
            }
            for nested in ins.blocks() {
                walk(nested, out);
            }
        }
    }
    let mut out = Vec::new();
    for node in program.all_nodes() {
        walk(&node.instructions, &mut out);
    }
    out
}

#[test]
fn village_compiles_and_validates() {
    let program = compile_source(VILLAGE).expect("compile ok");
    assert_eq!(program.enum_cases("Mood").map(<[String]>::len), Some(2));
    assert_eq!(program.group("Work").map(|g| g.len()), Some(2));
    assert!(validate_program(&program).is_empty(), "{:?}", validate_program(&program));

    let start = &program.group("Start").expect("start")[0];
    assert_eq!(start.scene.as_deref(), Some("square"));

    let Instruction::Options { options } = start.instructions.last().expect("instructions") else {
        panic!("expected options last");
    };
    assert_eq!(options.len(), 3);
    assert_eq!(options[1].line_id(), Some("line:passing"));
    assert_eq!(options[2].condition.as_deref(), Some("$rude"));
    assert_eq!(options[2].text, "Insult her");
    assert!(options[2].markup.is_some());

    let Instruction::Line(question) = &start.instructions[start.instructions.len() - 2] else {
        panic!("expected the question line before options");
    };
    assert!(question.tags.iter().any(|t| t == LAST_LINE_TAG));
    assert!(question.tags.iter().all(|t| t != "greeting"));
}

#[test]
fn compilation_is_deterministic() {
    let doc = parse_document(VILLAGE).expect("parse ok");
    let first = compile(&doc);
    let second = compile(&parse_document(VILLAGE).expect("parse ok"));
    assert_eq!(first, second);
    assert_eq!(line_ids(&first), line_ids(&second));

    let custom = CompileOptions::with_once_ids(|ctx| format!("village/{}/{}", ctx.node, ctx.index));
    let a = compile_with(&doc, &custom);
    let b = compile_with(&doc, &custom);
    assert_eq!(a, b);
}

#[test]
fn line_ids_are_unique_across_the_program() {
    let program = compile_source(VILLAGE).expect("compile ok");
    let ids = line_ids(&program);
    let mut deduped = ids.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(ids.len(), deduped.len());
}

#[test]
fn program_survives_ron_round_trip() {
    let program = compile_source(VILLAGE).expect("compile ok");
    let text = ron::ser::to_string_pretty(&program, ron::ser::PrettyConfig::default()).expect("serialize");
    let back: Program = ron::from_str(&text).expect("deserialize");
    assert_eq!(back, program);
}

#[test]
fn parse_errors_report_positions() {
    let err = compile_source("title: A\n---\nfine\n{else}\n===").unwrap_err();
    assert_eq!(err.line(), 4);
    assert_eq!(err.column(), 1);
}
