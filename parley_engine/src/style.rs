//! Styling helpers for the terminal player.
//!
//! The [`DialogueStyle`] trait provides convenience methods for applying
//! ANSI styling via the `colored` crate. Implementations for `&str` and
//! `String` are provided so string literals can be styled directly.

use colored::{ColoredString, Colorize};
use parley_data::{MarkupValue, Wrapper};

/// Convenience trait for applying color and style to dialogue output.
pub trait DialogueStyle {
    fn speaker_style(&self) -> ColoredString;
    fn line_style(&self) -> ColoredString;
    fn option_number_style(&self) -> ColoredString;
    fn option_style(&self) -> ColoredString;
    fn command_style(&self) -> ColoredString;
    fn scene_style(&self) -> ColoredString;
    fn tag_style(&self) -> ColoredString;
    fn error_style(&self) -> ColoredString;
    fn end_style(&self) -> ColoredString;
}

impl DialogueStyle for &str {
    fn speaker_style(&self) -> ColoredString {
        self.bold().truecolor(13, 130, 60)
    }
    fn line_style(&self) -> ColoredString {
        self.normal()
    }
    fn option_number_style(&self) -> ColoredString {
        let bracketed = format!("[{self}]");
        bracketed.truecolor(220, 180, 40)
    }
    fn option_style(&self) -> ColoredString {
        self.truecolor(220, 180, 40)
    }
    fn command_style(&self) -> ColoredString {
        self.italic().truecolor(75, 80, 75)
    }
    fn scene_style(&self) -> ColoredString {
        self.truecolor(223, 77, 10).underline()
    }
    fn tag_style(&self) -> ColoredString {
        self.dimmed().truecolor(80, 80, 230)
    }
    fn error_style(&self) -> ColoredString {
        self.truecolor(230, 30, 30)
    }
    fn end_style(&self) -> ColoredString {
        self.italic().truecolor(102, 208, 250)
    }
}

impl DialogueStyle for String {
    fn speaker_style(&self) -> ColoredString {
        self.as_str().speaker_style()
    }
    fn line_style(&self) -> ColoredString {
        self.as_str().line_style()
    }
    fn option_number_style(&self) -> ColoredString {
        self.as_str().option_number_style()
    }
    fn option_style(&self) -> ColoredString {
        self.as_str().option_style()
    }
    fn command_style(&self) -> ColoredString {
        self.as_str().command_style()
    }
    fn scene_style(&self) -> ColoredString {
        self.as_str().scene_style()
    }
    fn tag_style(&self) -> ColoredString {
        self.as_str().tag_style()
    }
    fn error_style(&self) -> ColoredString {
        self.as_str().error_style()
    }
    fn end_style(&self) -> ColoredString {
        self.as_str().end_style()
    }
}

/// Apply the terminal rendering of markup wrappers to `text`.
/// Unknown wrapper names leave the text unchanged.
pub fn apply_wrappers(text: &str, wrappers: &[Wrapper]) -> ColoredString {
    wrappers
        .iter()
        .fold(text.normal(), |styled, wrapper| match wrapper.name.as_str() {
            "b" | "strong" => styled.bold(),
            "em" | "i" => styled.italic(),
            "ins" | "u" => styled.underline(),
            "del" | "s" => styled.strikethrough(),
            "small" | "sub" | "sup" => styled.dimmed(),
            "mark" => styled.reversed(),
            "color" => match wrapper.properties.get("color") {
                Some(MarkupValue::Text(name)) => styled.color(name.as_str()),
                _ => styled,
            },
            _ => styled,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_data::parse_markup;

    #[test]
    fn wrappers_stack_onto_one_string() {
        let markup = parse_markup("[b][em]hi[/em][/b]");
        let styled = apply_wrappers("hi", markup.wrappers_at(0));
        assert_eq!(styled.to_string(), "hi".bold().italic().to_string());
    }

    #[test]
    fn color_property_sets_the_foreground() {
        let markup = parse_markup("[color=red]x[/color]");
        assert_eq!(apply_wrappers("x", markup.wrappers_at(0)).to_string(), "x".red().to_string());
        assert_eq!(apply_wrappers("x", &[Wrapper::new("wave")]).to_string(), "x".normal().to_string());
    }
}
