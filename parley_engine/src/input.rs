//! Terminal input for the player.
//!
//! Uses rustyline when stdin is a terminal and plain buffered stdin
//! otherwise, so scripted runs (`player < choices.txt`) work too.

use std::io::{self, BufRead, IsTerminal, Write};

use log::{info, warn};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Outcome of reading a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    Eof,
    Interrupted,
}

pub struct InputManager {
    backend: Backend,
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputManager {
    pub fn new() -> Self {
        let backend = if io::stdin().is_terminal() {
            match DefaultEditor::new() {
                Ok(editor) => {
                    info!("using rustyline-backed input");
                    Backend::Rustyline(editor)
                },
                Err(err) => {
                    warn!("failed to initialize rustyline ({err}), falling back to basic stdin");
                    Backend::Plain
                },
            }
        } else {
            info!("stdin is not a TTY; using basic input mode");
            Backend::Plain
        };
        Self { backend }
    }

    /// Read a line. If the interactive backend fails, switch to plain
    /// stdin and retry once.
    ///
    /// # Errors
    /// IO failures from the plain backend.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<InputEvent> {
        match self.backend.read_line(prompt) {
            Ok(event) => Ok(event),
            Err(err) if matches!(self.backend, Backend::Rustyline(_)) => {
                warn!("rustyline input failed: {err} -- switching to basic stdin");
                self.backend = Backend::Plain;
                self.backend.read_line(prompt)
            },
            Err(err) => Err(err),
        }
    }
}

enum Backend {
    Rustyline(DefaultEditor),
    Plain,
}

impl Backend {
    fn read_line(&mut self, prompt: &str) -> io::Result<InputEvent> {
        match self {
            Backend::Rustyline(editor) => match editor.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty()
                        && let Err(err) = editor.add_history_entry(line.as_str())
                    {
                        warn!("failed to append to history: {err}");
                    }
                    Ok(InputEvent::Line(line))
                },
                Err(err) => convert_readline_error(err),
            },
            Backend::Plain => {
                print!("{prompt}");
                io::stdout().flush()?;
                read_plain(&mut io::stdin().lock())
            },
        }
    }
}

fn read_plain(reader: &mut impl BufRead) -> io::Result<InputEvent> {
    let mut buffer = String::new();
    if reader.read_line(&mut buffer)? == 0 {
        return Ok(InputEvent::Eof);
    }
    let trimmed = buffer.trim_end_matches(['\n', '\r']);
    Ok(InputEvent::Line(trimmed.to_string()))
}

fn convert_readline_error(err: ReadlineError) -> io::Result<InputEvent> {
    match err {
        ReadlineError::Interrupted => Ok(InputEvent::Interrupted),
        ReadlineError::Eof => Ok(InputEvent::Eof),
        ReadlineError::Io(io_err) => Err(io_err),
        other => Err(io::Error::other(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_reader_strips_line_endings() {
        let mut input = io::Cursor::new("2\r\nnext\n");
        assert_eq!(read_plain(&mut input).unwrap(), InputEvent::Line("2".into()));
        assert_eq!(read_plain(&mut input).unwrap(), InputEvent::Line("next".into()));
        assert_eq!(read_plain(&mut input).unwrap(), InputEvent::Eof);
    }

    #[test]
    fn readline_interrupts_are_events() {
        assert_eq!(convert_readline_error(ReadlineError::Eof).unwrap(), InputEvent::Eof);
        assert_eq!(
            convert_readline_error(ReadlineError::Interrupted).unwrap(),
            InputEvent::Interrupted
        );
    }
}
