//! The dialogue runner: a suspendable stack machine over a compiled
//! [`Program`].
//!
//! A runner always holds exactly one current [`RuntimeResult`]. The host
//! reads it with [`Runner::current`] as often as it likes and moves on with
//! [`Runner::advance`], passing an option index when the current result is a
//! choice.
//!
//! Two kinds of frames live on the call stack. A detour frame saves the
//! caller's node and position while another node runs. A block frame runs a
//! nested instruction list (an `if` branch, a `once` body, a chosen option)
//! and hands control back to whatever is beneath it when the list runs out.
//! Both are driven by the same loop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use parley_data::{Instruction, NodeDef, Program};

use crate::command::{CommandHandler, CommandOutcome, ParsedCommand, parse_command};
use crate::error::RuntimeError;
use crate::evaluator::Evaluator;
use crate::functions::Function;
use crate::interpolate::interpolate;
use crate::once::OnceTracker;
use crate::result::{CommandResult, OptionView, OptionsResult, RuntimeResult, TextResult};
use crate::value::Value;

/// What the command observer is told after every command instruction.
#[derive(Debug)]
pub struct CommandEvent<'a> {
    /// Command text as written in the script.
    pub raw: &'a str,
    /// `None` when the text could not be tokenized.
    pub parsed: Option<&'a ParsedCommand>,
    pub outcome: &'a CommandOutcome,
}

pub type CommandObserver = Box<dyn Fn(&CommandEvent<'_>) + Send + Sync>;

/// Builder for [`Runner::new`].
pub struct RunnerConfig {
    start_at: String,
    variables: BTreeMap<String, Value>,
    functions: Vec<(String, Function)>,
    on_command: Option<CommandObserver>,
    command_handler: Option<CommandHandler>,
    once: Option<OnceTracker>,
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("start_at", &self.start_at)
            .field("variables", &self.variables)
            .field("functions", &self.functions.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("on_command", &self.on_command.is_some())
            .field("command_handler", &self.command_handler)
            .field("once", &self.once)
            .finish()
    }
}

impl RunnerConfig {
    pub fn new(start_at: impl Into<String>) -> Self {
        Self {
            start_at: start_at.into(),
            variables: BTreeMap::new(),
            functions: Vec::new(),
            on_command: None,
            command_handler: None,
            once: None,
        }
    }

    /// Seed one variable (name with or without `$`).
    #[must_use]
    pub fn variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables
            .insert(name.trim_start_matches('$').to_string(), value.into());
        self
    }

    #[must_use]
    pub fn variables(mut self, variables: impl IntoIterator<Item = (String, Value)>) -> Self {
        for (name, value) in variables {
            self = self.variable(&name, value);
        }
        self
    }

    /// Register an expression function; it replaces a built-in of the same name.
    #[must_use]
    pub fn function(mut self, name: impl Into<String>, function: Function) -> Self {
        self.functions.push((name.into(), function));
        self
    }

    /// Observe every command the runner dispatches, with its outcome.
    #[must_use]
    pub fn on_command(mut self, observer: impl Fn(&CommandEvent<'_>) + Send + Sync + 'static) -> Self {
        self.on_command = Some(Box::new(observer));
        self
    }

    /// Replace the default dispatcher (`set`, `declare`, `stop`).
    #[must_use]
    pub fn command_handler(mut self, handler: CommandHandler) -> Self {
        self.command_handler = Some(handler);
        self
    }

    /// Share once-tracking state with other runners, e.g. the rest of a save slot.
    /// Without one, the runner gets a fresh tracker of its own.
    #[must_use]
    pub fn once_tracker(mut self, tracker: OnceTracker) -> Self {
        self.once = Some(tracker);
        self
    }
}

/// Location of a nested block: one `(instruction index, sub-block index)`
/// step per nesting level, starting from the node's instruction list.
type BlockPath = Vec<(usize, usize)>;

#[derive(Debug, Clone, PartialEq)]
enum Frame {
    /// Caller position saved by `<<detour>>`.
    Detour { title: String, member: usize, ip: usize },
    /// A nested block of the current node and the next instruction in it.
    Block { path: BlockPath, idx: usize },
}

/// Where the options currently on display live.
#[derive(Debug, Clone)]
struct PendingOptions {
    path: BlockPath,
    index: usize,
    /// Visible option position -> index in the `Options` instruction.
    visible: Vec<usize>,
}

enum Step {
    Continue,
    Suspend(RuntimeResult),
}

pub struct Runner {
    program: Arc<Program>,
    evaluator: Evaluator,
    commands: CommandHandler,
    on_command: Option<CommandObserver>,
    once: OnceTracker,
    title: String,
    /// Index of the selected member within the current title's group.
    member: usize,
    ip: usize,
    stack: Vec<Frame>,
    pending_options: Option<PendingOptions>,
    current: Option<RuntimeResult>,
    history: Vec<RuntimeResult>,
    finished: bool,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("title", &self.title)
            .field("member", &self.member)
            .field("ip", &self.ip)
            .field("stack", &self.stack)
            .field("current", &self.current)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Nested instruction list `sub` owned by `ins`.
fn sub_block(ins: &Instruction, sub: usize) -> Option<&[Instruction]> {
    match ins {
        Instruction::Options { options } => options.get(sub).map(|o| o.block.as_slice()),
        Instruction::If { branches } => branches.get(sub).map(|b| b.block.as_slice()),
        Instruction::Once { block, .. } if sub == 0 => Some(block.as_slice()),
        _ => None,
    }
}

fn resolve_block<'p>(root: &'p [Instruction], path: &[(usize, usize)]) -> Option<&'p [Instruction]> {
    path.iter()
        .try_fold(root, |list, &(index, sub)| list.get(index).and_then(|ins| sub_block(ins, sub)))
}

fn is_once(condition: &str) -> bool {
    condition.trim().eq_ignore_ascii_case("once")
}

impl Runner {
    /// Build a runner and execute up to the first result.
    ///
    /// # Errors
    /// [`RuntimeError::UnknownNode`] / [`RuntimeError::NoMatchingNode`] when
    /// the start node cannot be entered, or any fault hit before the first
    /// result is produced.
    pub fn new(program: impl Into<Arc<Program>>, config: RunnerConfig) -> Result<Self, RuntimeError> {
        let program = program.into();
        let mut evaluator = Evaluator::new(program.enums.clone());
        for (name, value) in config.variables {
            evaluator.set_variable(&name, value);
        }
        for (name, function) in config.functions {
            evaluator.register_function(name, function);
        }

        let mut runner = Self {
            program,
            evaluator,
            commands: config.command_handler.unwrap_or_default(),
            on_command: config.on_command,
            once: config.once.unwrap_or_default(),
            title: String::new(),
            member: 0,
            ip: 0,
            stack: Vec::new(),
            pending_options: None,
            current: None,
            history: Vec::new(),
            finished: false,
        };
        info!("starting dialogue at '{}'", config.start_at);
        runner.enter(&config.start_at)?;
        runner.run()?;
        Ok(runner)
    }

    /// The result the host should be showing. Reading it never changes state.
    pub fn current(&self) -> Option<&RuntimeResult> {
        self.current.as_ref()
    }

    /// Every result emitted so far, oldest first.
    pub fn history(&self) -> &[RuntimeResult] {
        &self.history
    }

    /// True once the final node has ended with nothing left to return to.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Title of the node currently executing.
    pub fn current_node_title(&self) -> &str {
        &self.title
    }

    /// Current value of a variable, smart variables included.
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.evaluator.value_of(name).ok()
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) {
        self.evaluator.set_variable(name, value.into());
    }

    /// Snapshot of all variables, smart variables evaluated.
    pub fn variables(&self) -> BTreeMap<String, Value> {
        self.evaluator.snapshot()
    }

    /// Evaluate an expression against the runner's current state.
    ///
    /// # Errors
    /// [`RuntimeError::Eval`] wrapping the evaluation failure.
    pub fn evaluate(&self, expr: &str) -> Result<Value, RuntimeError> {
        Ok(self.evaluator.evaluate(expr)?)
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Tracker holding this runner's once-state, for saving.
    pub fn once_tracker(&self) -> &OnceTracker {
        &self.once
    }

    pub fn visit_count(&self, title: &str) -> u32 {
        self.evaluator.visit_count(title)
    }

    /// Move past the current result. `option` picks from the visible
    /// options when the current result is a choice, and is ignored otherwise.
    ///
    /// # Errors
    /// - [`RuntimeError::OptionRequired`] / [`RuntimeError::InvalidOption`]
    ///   for a missing or out-of-range choice; state is left untouched.
    /// - [`RuntimeError::DialogueFinished`] after the dialogue has ended.
    /// - Reference faults (unknown node, unmatched node group) hit while running.
    pub fn advance(&mut self, option: Option<usize>) -> Result<&RuntimeResult, RuntimeError> {
        if self.finished {
            return Err(RuntimeError::DialogueFinished);
        }
        if let Some(pending) = &self.pending_options {
            let index = option.ok_or(RuntimeError::OptionRequired)?;
            let original = *pending.visible.get(index).ok_or(RuntimeError::InvalidOption {
                index,
                available: pending.visible.len(),
            })?;
            let mut path = pending.path.clone();
            path.push((pending.index, original));
            self.pending_options = None;
            debug!("option {index} chosen in '{}'", self.title);
            self.stack.push(Frame::Block { path, idx: 0 });
        }
        self.run()?;
        self.current.as_ref().ok_or(RuntimeError::DialogueFinished)
    }

    fn node<'p>(program: &'p Program, title: &str, member: usize) -> Result<&'p NodeDef, RuntimeError> {
        program
            .group(title)
            .and_then(|group| group.get(member))
            .ok_or_else(|| RuntimeError::UnknownNode(title.to_string()))
    }

    /// Make `title` the current node, choosing a group member by its `when` list.
    fn enter(&mut self, title: &str) -> Result<(), RuntimeError> {
        let program = Arc::clone(&self.program);
        let group = program
            .group(title)
            .ok_or_else(|| RuntimeError::UnknownNode(title.to_string()))?;
        let member = if group.len() == 1 {
            0
        } else {
            self.select_member(title, group)?
        };
        debug!("entering '{title}' (member {member} of {})", group.len());
        self.title = title.to_string();
        self.member = member;
        self.ip = 0;
        Ok(())
    }

    fn select_member(&self, title: &str, group: &[NodeDef]) -> Result<usize, RuntimeError> {
        for (index, node) in group.iter().enumerate() {
            if self.when_holds(title, index, &node.when) {
                if node.when.iter().any(|w| is_once(w)) {
                    self.once.mark_node_seen(title, index);
                }
                return Ok(index);
            }
        }
        Err(RuntimeError::NoMatchingNode(title.to_string()))
    }

    fn when_holds(&self, title: &str, index: usize, when: &[String]) -> bool {
        when.iter().all(|condition| {
            let condition = condition.trim();
            if is_once(condition) {
                !self.once.node_seen(title, index)
            } else if condition.eq_ignore_ascii_case("always") {
                true
            } else {
                self.evaluator.evaluate_bool(condition)
            }
        })
    }

    /// Execute until something is emitted.
    fn run(&mut self) -> Result<(), RuntimeError> {
        let program = Arc::clone(&self.program);
        loop {
            let node = Self::node(&program, &self.title, self.member)?;
            let (path, index, in_block) = match self.stack.last_mut() {
                Some(Frame::Block { path, idx }) => {
                    let len = resolve_block(&node.instructions, path).map_or(0, <[Instruction]>::len);
                    if *idx >= len {
                        debug!("block {path:?} finished in '{}'", self.title);
                        self.stack.pop();
                        continue;
                    }
                    *idx += 1;
                    (path.clone(), *idx - 1, true)
                },
                _ => {
                    if self.ip >= node.instructions.len() {
                        self.end_node(node);
                        return Ok(());
                    }
                    self.ip += 1;
                    (Vec::new(), self.ip - 1, false)
                },
            };
            let Some(ins) = resolve_block(&node.instructions, &path).and_then(|list| list.get(index)) else {
                warn!("instruction {index} of block {path:?} in '{}' is missing", self.title);
                continue;
            };
            // Only lines at the very end of a node's own list close it.
            let at_end = !in_block && self.ip >= node.instructions.len();
            match self.exec(node, ins, &path, index, at_end)? {
                Step::Continue => {},
                Step::Suspend(result) => {
                    self.emit(result, false);
                    return Ok(());
                },
            }
        }
    }

    fn exec(
        &mut self,
        node: &NodeDef,
        ins: &Instruction,
        path: &[(usize, usize)],
        index: usize,
        at_end: bool,
    ) -> Result<Step, RuntimeError> {
        let nested = |sub: usize| {
            let mut nested = path.to_vec();
            nested.push((index, sub));
            Frame::Block { path: nested, idx: 0 }
        };
        match ins {
            Instruction::Line(line) => {
                let (text, markup) = interpolate(&line.text, line.markup.as_ref(), &self.evaluator);
                Ok(Step::Suspend(RuntimeResult::Text(TextResult {
                    text,
                    speaker: line.speaker.clone(),
                    tags: line.tags.clone(),
                    style: line.style.clone(),
                    markup,
                    node_style: node.style.clone(),
                    scene: node.scene.clone(),
                    is_dialogue_end: at_end,
                })))
            },
            Instruction::Command { content } => {
                self.dispatch(content);
                Ok(Step::Suspend(RuntimeResult::Command(CommandResult {
                    command: content.clone(),
                    is_dialogue_end: at_end,
                })))
            },
            Instruction::Jump { target } => {
                debug!("jump '{}' -> '{target}'", self.title);
                self.evaluator.record_visit(&self.title);
                while matches!(self.stack.last(), Some(Frame::Block { .. })) {
                    self.stack.pop();
                }
                self.enter(target)?;
                Ok(Step::Continue)
            },
            Instruction::Detour { target } => {
                debug!("detour '{}' -> '{target}'", self.title);
                self.stack.push(Frame::Detour {
                    title: self.title.clone(),
                    member: self.member,
                    ip: self.ip,
                });
                self.enter(target)?;
                Ok(Step::Continue)
            },
            Instruction::Options { options } => {
                let mut views = Vec::with_capacity(options.len());
                let mut visible = Vec::with_capacity(options.len());
                for (i, option) in options.iter().enumerate() {
                    if let Some(condition) = &option.condition
                        && !self.evaluator.evaluate_bool(condition)
                    {
                        continue;
                    }
                    let (text, markup) = interpolate(&option.text, option.markup.as_ref(), &self.evaluator);
                    views.push(OptionView {
                        text,
                        tags: option.tags.clone(),
                        style: option.style.clone(),
                        markup,
                    });
                    visible.push(i);
                }
                if views.is_empty() {
                    warn!("every option in '{}' is hidden; skipping the choice", self.title);
                    return Ok(Step::Continue);
                }
                self.pending_options = Some(PendingOptions {
                    path: path.to_vec(),
                    index,
                    visible,
                });
                Ok(Step::Suspend(RuntimeResult::Options(OptionsResult {
                    options: views,
                    node_style: node.style.clone(),
                    scene: node.scene.clone(),
                    is_dialogue_end: at_end,
                })))
            },
            Instruction::If { branches } => {
                let chosen = branches.iter().position(|branch| {
                    branch
                        .condition
                        .as_deref()
                        .is_none_or(|condition| self.evaluator.evaluate_bool(condition))
                });
                if let Some(branch) = chosen {
                    debug!("branch {branch} taken in '{}'", self.title);
                    self.stack.push(nested(branch));
                }
                Ok(Step::Continue)
            },
            Instruction::Once { id, .. } => {
                if self.once.mark_seen(id) {
                    debug!("once block '{id}' runs");
                    self.stack.push(nested(0));
                }
                Ok(Step::Continue)
            },
        }
    }

    /// Parse and execute a command, reporting the outcome to the observer.
    fn dispatch(&mut self, content: &str) {
        let (parsed, outcome) = match parse_command(content) {
            Ok(parsed) => {
                let outcome = self.commands.execute(&parsed, &mut self.evaluator);
                (Some(parsed), outcome)
            },
            Err(e) => {
                warn!("malformed command '{content}': {e}");
                (None, CommandOutcome::Failed(e))
            },
        };
        if let Some(observer) = &self.on_command {
            observer(&CommandEvent {
                raw: content,
                parsed: parsed.as_ref(),
                outcome: &outcome,
            });
        }
    }

    /// The current node ran out of instructions.
    fn end_node(&mut self, node: &NodeDef) {
        self.evaluator.record_visit(&self.title);
        if self.stack.is_empty() {
            info!("dialogue finished at '{}'", self.title);
            self.finished = true;
        }
        let result = RuntimeResult::Text(TextResult {
            node_style: node.style.clone(),
            scene: node.scene.clone(),
            is_dialogue_end: true,
            ..TextResult::default()
        });
        self.emit(result, true);
    }

    /// Publish `result`. A result that closes a detoured node returns control
    /// to the caller here, so the next `advance` resumes after the detour.
    /// Choices never unwind: their bodies still belong to this node.
    fn emit(&mut self, result: RuntimeResult, node_ended: bool) {
        if result.is_dialogue_end()
            && !result.is_options()
            && matches!(self.stack.last(), Some(Frame::Detour { .. }))
            && let Some(Frame::Detour { title, member, ip }) = self.stack.pop()
        {
            if !node_ended {
                self.evaluator.record_visit(&self.title);
            }
            debug!("returning from '{}' to '{title}'", self.title);
            self.title = title;
            self.member = member;
            self.ip = ip;
        }
        self.history.push(result.clone());
        self.current = Some(result);
    }
}
