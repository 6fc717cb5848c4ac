//! CLI entry point for parley_script.
//! Usage: cargo run -p parley_script -- compile story.parley --out story.ron

use std::{env, fs, process};

use parley_data::validate_program;
use parley_script::{ParseError, compile, parse_document};
use ron::ser::PrettyConfig;

const USAGE: &str = "Usage:\n  parley_script compile <file.parley> [--out <out.ron>]\n  parley_script lint <file.parley>";

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let args: &[String] = match args.as_slice() {
        [flag, rest @ ..] if flag == "--" => rest,
        all => all,
    };

    match args {
        [cmd, rest @ ..] if cmd == "compile" => run_compile(rest),
        [cmd, rest @ ..] if cmd == "lint" => run_lint(rest),
        [cmd, ..] => {
            eprintln!("unknown command: {cmd}\n{USAGE}");
            process::exit(2);
        },
        [] => {
            eprintln!("{USAGE}");
            process::exit(2);
        },
    }
}

fn run_compile(args: &[String]) {
    let mut path: Option<&str> = None;
    let mut out_path: Option<&str> = None;
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--out" {
            let Some(out) = args.get(i + 1) else {
                eprintln!("--out requires a filepath");
                process::exit(2);
            };
            out_path = Some(out.as_str());
            i += 2;
            continue;
        }
        if path.is_none() {
            path = Some(args[i].as_str());
        }
        i += 1;
    }
    let Some(path) = path else {
        eprintln!("Usage: parley_script compile <file.parley> [--out <out.ron>]");
        process::exit(2);
    };

    let src = read_source(path);
    let doc = parse_document(&src).unwrap_or_else(|e| report_parse_error(path, &e));
    let program = compile(&doc);
    let text = ron::ser::to_string_pretty(&program, PrettyConfig::default()).unwrap_or_else(|e| {
        eprintln!("error: serializing program: {e}");
        process::exit(1);
    });

    if let Some(out) = out_path {
        fs::write(out, text).unwrap_or_else(|e| {
            eprintln!("error: writing '{out}': {e}");
            process::exit(1);
        });
        let nodes = program.all_nodes().count();
        eprintln!("compiled {nodes} node(s) from '{path}' into '{out}'");
    } else {
        println!("{text}");
    }
}

fn run_lint(args: &[String]) {
    let Some(path) = args.first() else {
        eprintln!("Usage: parley_script lint <file.parley>");
        process::exit(2);
    };
    let src = read_source(path);
    let doc = parse_document(&src).unwrap_or_else(|e| report_parse_error(path, &e));

    for node in &doc.nodes {
        if node.body.is_empty() {
            eprintln!("warning: node '{}' (line {}) has an empty body", node.title, node.src_line);
        }
    }

    let findings = validate_program(&compile(&doc));
    if findings.is_empty() {
        println!("{path}: ok");
        return;
    }
    for finding in &findings {
        eprintln!("{path}: {finding}");
    }
    eprintln!("{} problem(s) found", findings.len());
    process::exit(1);
}

fn read_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: unable to read '{path}': {e}");
        process::exit(1);
    })
}

fn report_parse_error(path: &str, err: &ParseError) -> ! {
    eprintln!("parse error: {path}:{err}");
    process::exit(1);
}
