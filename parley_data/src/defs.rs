use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::markup::MarkupResult;

/// Tag added to the last line shown before a choice is offered.
pub const LAST_LINE_TAG: &str = "lastline";

/// Prefix of the tag carrying a line's stable identifier (`line:2a`).
pub const LINE_ID_PREFIX: &str = "line:";

/// Enum name -> ordered case names.
pub type EnumTable = BTreeMap<String, Vec<String>>;

/// Top-level compiled dialogue program loaded by the engine.
///
/// Every title maps to an ordered list of node variants. A single node is
/// simply a group of one; groups with several members are disambiguated at
/// run time by each member's `when` conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Program {
    #[serde(default)]
    pub enums: EnumTable,
    #[serde(default)]
    pub nodes: BTreeMap<String, Vec<NodeDef>>,
}

impl Program {
    /// All node variants sharing `title`, in declaration order.
    pub fn group(&self, title: &str) -> Option<&[NodeDef]> {
        self.nodes.get(title).map(Vec::as_slice)
    }

    /// Iterate over every compiled node, group members included.
    pub fn all_nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.values().flatten()
    }

    pub fn enum_cases(&self, name: &str) -> Option<&[String]> {
        self.enums.get(name).map(Vec::as_slice)
    }
}

/// One compiled node (or one member of a node group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub title: String,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    /// `once`, `always`, or a boolean expression; all must hold for selection.
    #[serde(default)]
    pub when: Vec<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub scene: Option<String>,
}

/// A flat instruction. Nested blocks belong to the instruction that owns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Instruction {
    Line(LineDef),
    Command { content: String },
    Jump { target: String },
    Detour { target: String },
    Options { options: Vec<OptionDef> },
    If { branches: Vec<BranchDef> },
    Once { id: String, block: Vec<Instruction> },
}

impl Instruction {
    /// Nested instruction blocks owned by this instruction.
    pub fn blocks(&self) -> Vec<&[Instruction]> {
        match self {
            Instruction::Options { options } => options.iter().map(|o| o.block.as_slice()).collect(),
            Instruction::If { branches } => branches.iter().map(|b| b.block.as_slice()).collect(),
            Instruction::Once { block, .. } => vec![block.as_slice()],
            _ => Vec::new(),
        }
    }
}

/// A line of dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDef {
    #[serde(default)]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Inline `&css{...}` style attached to this line.
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub markup: Option<MarkupResult>,
}

impl LineDef {
    /// The stable `line:` identifier assigned at compile time.
    pub fn line_id(&self) -> Option<&str> {
        line_id(&self.tags)
    }
}

/// One selectable option inside an `Options` instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDef {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub style: Option<String>,
    /// Options whose condition is not satisfied are hidden entirely.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub markup: Option<MarkupResult>,
    #[serde(default)]
    pub block: Vec<Instruction>,
}

impl OptionDef {
    pub fn line_id(&self) -> Option<&str> {
        line_id(&self.tags)
    }
}

/// A conditional branch; `condition: None` is the unconditional `else`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDef {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub block: Vec<Instruction>,
}

fn line_id(tags: &[String]) -> Option<&str> {
    tags.iter().find(|t| t.starts_with(LINE_ID_PREFIX)).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str, tags: &[&str]) -> Instruction {
        Instruction::Line(LineDef {
            speaker: None,
            text: text.into(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            style: None,
            markup: None,
        })
    }

    #[test]
    fn line_id_is_read_from_tags() {
        let Instruction::Line(def) = line("hi", &["mood", "line:1f"]) else {
            unreachable!()
        };
        assert_eq!(def.line_id(), Some("line:1f"));
    }

    #[test]
    fn blocks_exposes_nested_instructions() {
        let ins = Instruction::If {
            branches: vec![
                BranchDef {
                    condition: Some("$a".into()),
                    block: vec![line("a", &[])],
                },
                BranchDef {
                    condition: None,
                    block: vec![line("b", &[]), line("c", &[])],
                },
            ],
        };
        let lens: Vec<usize> = ins.blocks().iter().map(|b| b.len()).collect();
        assert_eq!(lens, vec![1, 2]);
        assert!(Instruction::Jump { target: "x".into() }.blocks().is_empty());
    }

    #[test]
    fn program_round_trips_through_ron() {
        let mut program = Program::default();
        program.enums.insert("Mood".into(), vec!["Happy".into(), "Sad".into()]);
        program.nodes.insert(
            "Start".into(),
            vec![NodeDef {
                title: "Start".into(),
                instructions: vec![line("Hello", &["line:0"]), Instruction::Jump { target: "End".into() }],
                when: Vec::new(),
                style: Some("color: red".into()),
                scene: None,
            }],
        );
        let text = ron::to_string(&program).expect("serialize");
        let back: Program = ron::from_str(&text).expect("deserialize");
        assert_eq!(back, program);
        assert_eq!(back.group("Start").map(<[NodeDef]>::len), Some(1));
        assert_eq!(back.enum_cases("Mood").map(<[String]>::len), Some(2));
    }
}
