//! Loading compiled programs from disk.
//!
//! Programs are produced by `parley_script compile` and stored as RON. The
//! validator runs on every load; its findings are logged, not fatal, since a
//! dangling jump only matters if the dialogue actually reaches it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use parley_data::{Program, ValidationError, validate_program};

/// Load a compiled `Program` from a RON file.
///
/// # Errors
/// IO and RON deserialization failures, with the path in the context.
pub fn load_program(path: &Path) -> Result<Program> {
    let text = fs::read_to_string(path).with_context(|| format!("reading program from '{}'", path.display()))?;
    let program = parse_program(&text).with_context(|| format!("parsing program RON from '{}'", path.display()))?;

    let findings = validate_program(&program);
    for finding in &findings {
        warn!("{}: {finding}", path.display());
    }
    info!(
        "loaded {} node(s) under {} title(s) and {} enum(s) from '{}' ({} validation finding(s))",
        program.all_nodes().count(),
        program.nodes.len(),
        program.enums.len(),
        path.display(),
        findings.len()
    );
    Ok(program)
}

/// Deserialize a program from RON text.
///
/// # Errors
/// The RON error, with line and column.
pub fn parse_program(text: &str) -> Result<Program> {
    Ok(ron::from_str(text)?)
}

/// Load a program and refuse it if the validator reports anything.
///
/// # Errors
/// Load failures as for [`load_program`], or every validation finding
/// aggregated into one error.
pub fn load_program_strict(path: &Path) -> Result<Program> {
    let program = load_program(path)?;
    ensure_valid(&validate_program(&program))?;
    Ok(program)
}

fn ensure_valid(findings: &[ValidationError]) -> Result<()> {
    if findings.is_empty() {
        return Ok(());
    }
    let details = findings
        .iter()
        .map(|err| format!("- {err}"))
        .collect::<Vec<_>>()
        .join("\n");
    bail!("program validation failed:\n{details}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_script::compile_source;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_program(src: &str) -> NamedTempFile {
        let program = compile_source(src).unwrap();
        let text = ron::ser::to_string_pretty(&program, ron::ser::PrettyConfig::default()).unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn round_trips_through_ron_on_disk() {
        let src = "<<enum Mood>>\n<<case Calm>>\n<<endenum>>\ntitle: Start\n---\nAda: Hi [b]there[/b]\n===";
        let file = write_program(src);
        let loaded = load_program(file.path()).unwrap();
        assert_eq!(loaded, compile_source(src).unwrap());
    }

    #[test]
    fn findings_are_warnings_unless_strict() {
        let file = write_program("title: Start\n---\n<<jump Nowhere>>\n===");
        assert!(load_program(file.path()).is_ok());
        let err = load_program_strict(file.path()).unwrap_err();
        assert!(err.to_string().contains("Nowhere"), "{err}");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_program(Path::new("/definitely/not/here.ron")).unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.ron"));
    }

    #[test]
    fn malformed_ron_is_an_error() {
        assert!(parse_program("Program(nodes: {").is_err());
    }
}
