#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
//! parley_engine: runtime for compiled Parley dialogue programs.
//!
//! ```
//! use parley_engine::{Runner, RunnerConfig, RuntimeResult};
//! use parley_data::{Instruction, LineDef, NodeDef, Program};
//!
//! let mut program = Program::default();
//! program.nodes.insert(
//!     "Start".into(),
//!     vec![NodeDef {
//!         title: "Start".into(),
//!         instructions: vec![Instruction::Line(LineDef {
//!             speaker: Some("Ada".into()),
//!             text: "You have {$gold} coins.".into(),
//!             tags: Vec::new(),
//!             style: None,
//!             markup: None,
//!         })],
//!         when: Vec::new(),
//!         style: None,
//!         scene: None,
//!     }],
//! );
//!
//! let runner = Runner::new(program, RunnerConfig::new("Start").variable("gold", 3)).unwrap();
//! let Some(RuntimeResult::Text(line)) = runner.current() else { panic!() };
//! assert_eq!(line.text, "You have 3 coins.");
//! ```

pub const PARLEY_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod command;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod functions;
pub mod input;
pub mod interpolate;
pub mod loader;
pub mod once;
pub mod player;
pub mod result;
pub mod runner;
pub mod style;
pub mod value;

// Re-exports for convenience
pub use command::{CommandHandler, CommandOutcome, ParsedCommand, parse_command};
pub use config::PlayerConfig;
pub use error::{CommandError, EvalError, RuntimeError};
pub use evaluator::Evaluator;
pub use functions::{Function, function};
pub use loader::load_program;
pub use once::{OnceState, OnceTracker};
pub use result::{CommandResult, OptionView, OptionsResult, RuntimeResult, TextResult};
pub use runner::{CommandEvent, Runner, RunnerConfig};
pub use value::Value;
