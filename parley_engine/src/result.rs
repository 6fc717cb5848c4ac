//! Results surfaced to the host after each step of a dialogue.

use parley_data::MarkupResult;
use variantly::Variantly;

/// The runner's observable output: what the presentation layer should show.
#[derive(Debug, Clone, PartialEq, Variantly)]
pub enum RuntimeResult {
    Text(TextResult),
    Options(OptionsResult),
    Command(CommandResult),
}

impl RuntimeResult {
    /// True when this result closes the current node.
    pub fn is_dialogue_end(&self) -> bool {
        match self {
            RuntimeResult::Text(t) => t.is_dialogue_end,
            RuntimeResult::Options(o) => o.is_dialogue_end,
            RuntimeResult::Command(c) => c.is_dialogue_end,
        }
    }

    /// Scene of the node that produced this result, if it has one.
    pub fn scene(&self) -> Option<&str> {
        match self {
            RuntimeResult::Text(t) => t.scene.as_deref(),
            RuntimeResult::Options(o) => o.scene.as_deref(),
            RuntimeResult::Command(_) => None,
        }
    }
}

/// A line of dialogue, or the empty end-of-node marker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextResult {
    pub text: String,
    pub speaker: Option<String>,
    pub tags: Vec<String>,
    /// Inline style written on the line itself.
    pub style: Option<String>,
    pub markup: Option<MarkupResult>,
    /// Style block from the node header.
    pub node_style: Option<String>,
    pub scene: Option<String>,
    pub is_dialogue_end: bool,
}

/// A choice the player can pick, after condition filtering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionView {
    pub text: String,
    pub tags: Vec<String>,
    pub style: Option<String>,
    pub markup: Option<MarkupResult>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionsResult {
    /// Only the options whose condition held; `advance(Some(i))` indexes
    /// into this list.
    pub options: Vec<OptionView>,
    pub node_style: Option<String>,
    pub scene: Option<String>,
    pub is_dialogue_end: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandResult {
    /// Raw command text as written between `<<` and `>>`.
    pub command: String,
    pub is_dialogue_end: bool,
}
