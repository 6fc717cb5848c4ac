//! Terminal presentation of runtime results.
//!
//! The [`Player`] turns each [`RuntimeResult`] into the lines the terminal
//! shows: scene announcements, styled speaker lines, numbered choices and
//! echoed commands. It owns no dialogue state; the runner does.

use parley_data::MarkupResult;
use textwrap::{Options, fill, termwidth};

use crate::config::PlayerConfig;
use crate::result::{OptionsResult, RuntimeResult, TextResult};
use crate::style::{DialogueStyle, apply_wrappers};

/// Render text with its markup as ANSI-styled output.
/// `[br/]` markers become line breaks; other markers are dropped.
pub fn render_markup(text: &str, markup: Option<&MarkupResult>) -> String {
    let Some(markup) = markup else {
        return text.to_string();
    };
    let chars: Vec<char> = markup.text.chars().collect();
    let mut out = String::with_capacity(markup.text.len());
    let mut i = 0;
    while i <= chars.len() {
        if markup.markers_at(i).any(|m| m.wrappers.iter().any(|w| w.name == "br")) {
            out.push('\n');
        }
        if i == chars.len() {
            break;
        }
        let wrappers = markup.wrappers_at(i);
        let mut end = i + 1;
        while end < chars.len() && markup.wrappers_at(end) == wrappers && markup.markers_at(end).next().is_none() {
            end += 1;
        }
        let run: String = chars[i..end].iter().collect();
        if wrappers.is_empty() {
            out.push_str(&run);
        } else {
            out.push_str(&apply_wrappers(&run, wrappers).to_string());
        }
        i = end;
    }
    out
}

/// Parse a 1-based choice typed by the player into a 0-based index.
pub fn parse_choice(input: &str, count: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    (1..=count).contains(&n).then(|| n - 1)
}

#[derive(Debug)]
pub struct Player {
    config: PlayerConfig,
    width: usize,
    scene: Option<String>,
}

impl Player {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            width: termwidth(),
            scene: None,
        }
    }

    #[must_use]
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Lines to print for `result`. Empty end-of-node markers print nothing.
    pub fn render(&mut self, result: &RuntimeResult) -> Vec<String> {
        let mut lines = self.scene_change(result.scene());
        match result {
            RuntimeResult::Text(text) => lines.extend(self.render_text(text)),
            RuntimeResult::Options(options) => lines.extend(self.render_options(options)),
            RuntimeResult::Command(command) => {
                lines.push(format!("<<{}>>", command.command).command_style().to_string());
            },
        }
        lines
    }

    fn scene_change(&mut self, scene: Option<&str>) -> Vec<String> {
        let Some(scene) = scene else {
            return Vec::new();
        };
        if self.scene.as_deref() == Some(scene) {
            return Vec::new();
        }
        self.scene = Some(scene.to_string());
        let background = self
            .config
            .scene(scene)
            .and_then(|s| s.background.as_deref())
            .map(|bg| format!(" ({bg})"))
            .unwrap_or_default();
        vec![format!("== {scene}{background} ==").scene_style().to_string()]
    }

    fn render_text(&self, text: &TextResult) -> Vec<String> {
        if text.text.is_empty() {
            return Vec::new();
        }
        let body = render_markup(&text.text, text.markup.as_ref());
        let line = match &text.speaker {
            Some(speaker) => format!("{}: {body}", speaker.speaker_style()),
            None => body,
        };
        vec![fill(&line, Options::new(self.width))]
    }

    fn render_options(&self, options: &OptionsResult) -> Vec<String> {
        let indent = Options::new(self.width).subsequent_indent("    ");
        options
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| {
                let label = render_markup(&option.text, option.markup.as_ref());
                let line = format!("{} {}", (i + 1).to_string().option_number_style(), label.option_style());
                fill(&line, indent.clone())
            })
            .collect()
    }

    /// Closing line once the dialogue has finished.
    pub fn farewell() -> String {
        "[end of dialogue]".end_style().to_string()
    }

    /// Message shown for an invalid choice.
    pub fn invalid_choice(count: usize) -> String {
        format!("please enter a number from 1 to {count}").error_style().to_string()
    }
}
