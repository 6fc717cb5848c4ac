//! Command module
//!
//! Parses `<<command arg ...>>` content and dispatches it to registered
//! handlers. `set`, `declare` and `stop` are built in; hosts register the rest.
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;

use crate::error::CommandError;
use crate::evaluator::Evaluator;
use crate::value::Value;

/// Expressions that make a `declare` smart: operators, variable references
/// or function calls.
static SMART_EXPR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[+\-*/%<>=!&|]|\$\w+|[A-Za-z_]\w*\s*\(").expect("smart expression regex is valid")
});

/// A tokenized command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
    /// The trimmed command text as written.
    pub raw: String,
}

/// What happened when a command was dispatched.
#[derive(Debug, Clone, PartialEq, variantly::Variantly)]
pub enum CommandOutcome {
    Handled,
    /// No handler is registered under the command's name.
    Ignored,
    Failed(CommandError),
}

/// Tokenize a command, splitting on whitespace outside single or double
/// quotes. Quotes are removed and a backslash escapes the next character
/// inside them.
///
/// # Errors
/// [`CommandError::Empty`] for blank input and
/// [`CommandError::UnterminatedQuote`] when a quote is left open.
pub fn parse_command(input: &str) -> Result<ParsedCommand, CommandError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(CommandError::Empty);
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut quoted_token = false;
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        match quote {
            Some(q) if ch == q => {
                quote = None;
            },
            Some(_) if ch == '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            },
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                quoted_token = true;
            },
            None if ch.is_whitespace() => {
                if !current.is_empty() || quoted_token {
                    parts.push(std::mem::take(&mut current));
                    quoted_token = false;
                }
            },
            None => current.push(ch),
        }
    }
    if quote.is_some() {
        return Err(CommandError::UnterminatedQuote(raw.to_string()));
    }
    if !current.is_empty() || quoted_token {
        parts.push(current);
    }

    let mut parts = parts.into_iter();
    let name = parts.next().ok_or(CommandError::Empty)?;
    Ok(ParsedCommand {
        name,
        args: parts.collect(),
        raw: raw.to_string(),
    })
}

/// Signature of a command handler.
pub type HandlerFn = Box<dyn Fn(&ParsedCommand, &mut Evaluator) -> Result<(), CommandError> + Send + Sync>;

/// Name-keyed command dispatcher. Names are matched case-insensitively.
pub struct CommandHandler {
    handlers: HashMap<String, HandlerFn>,
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("CommandHandler").field("handlers", &names).finish()
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler {
    /// Dispatcher with the built-in `set`, `declare` and `stop` commands.
    pub fn new() -> Self {
        let mut handler = Self::empty();
        handler.register("set", set_command);
        handler.register("declare", declare_command);
        handler.register("stop", |_, _| Ok(()));
        handler
    }

    /// Dispatcher with no commands at all.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register (or replace) the handler for `name`.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&ParsedCommand, &mut Evaluator) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_lowercase(), Box::new(handler));
    }

    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_lowercase())
    }

    /// Run a parsed command. Never panics or propagates: failures come back
    /// as [`CommandOutcome::Failed`] and unknown names as
    /// [`CommandOutcome::Ignored`].
    pub fn execute(&self, command: &ParsedCommand, evaluator: &mut Evaluator) -> CommandOutcome {
        let Some(handler) = self.handlers.get(&command.name.to_lowercase()) else {
            warn!("unknown command '{}' ignored", command.name);
            return CommandOutcome::Ignored;
        };
        match handler(command, evaluator) {
            Ok(()) => {
                debug!("command '{}' handled", command.raw);
                CommandOutcome::Handled
            },
            Err(e) => {
                warn!("command '{}' failed: {e}", command.raw);
                CommandOutcome::Failed(e)
            },
        }
    }
}

/// Split `name $var [to|=] expression` into the variable name and the
/// expression text, keeping the expression exactly as written.
fn assignment(command: &ParsedCommand) -> Result<(&str, &str), CommandError> {
    let missing = |what| CommandError::MissingArgument {
        command: command.name.clone(),
        what,
    };
    let rest = command.raw.strip_prefix(command.name.as_str()).unwrap_or_default().trim_start();
    let end = rest.find(|c: char| c.is_whitespace() || c == '=').unwrap_or(rest.len());
    let (variable, rest) = rest.split_at(end);
    if variable.trim_start_matches('$').is_empty() {
        return Err(missing("a variable name"));
    }
    let expr = strip_connector(rest.trim_start()).trim();
    if expr.is_empty() {
        return Err(missing("a value"));
    }
    Ok((variable, expr))
}

/// Drop a leading `to` or `=` between the variable and its value.
fn strip_connector(rest: &str) -> &str {
    if let Some(after) = rest.strip_prefix('=')
        && !after.starts_with('=')
    {
        return after;
    }
    if let Some(word) = rest.get(..2)
        && word.eq_ignore_ascii_case("to")
        && rest[2..].starts_with(char::is_whitespace)
    {
        return &rest[2..];
    }
    rest
}

/// Qualify a bare `.Case` using `enum_name`, or the first enum declaring the case.
fn qualify_shorthand(evaluator: &Evaluator, value: Value, enum_name: Option<&str>) -> Result<Value, CommandError> {
    match value {
        Value::Enum { name, case } if name.is_empty() => {
            let target = enum_name.or_else(|| evaluator.enum_for_case(&case));
            match target {
                Some(target) => Ok(evaluator.enum_case(target, &case)?),
                None => Ok(Value::Enum { name, case }),
            }
        },
        other => Ok(other),
    }
}

fn set_command(command: &ParsedCommand, evaluator: &mut Evaluator) -> Result<(), CommandError> {
    let (variable, expr) = assignment(command)?;
    let value = evaluator.evaluate(expr)?;
    let current_enum = match evaluator.value_of(variable) {
        Ok(Value::Enum { name, .. }) if !name.is_empty() => Some(name),
        _ => None,
    };
    let value = qualify_shorthand(evaluator, value, current_enum.as_deref())?;
    debug!("set ${} = {value}", variable.trim_start_matches('$'));
    evaluator.set_variable(variable, value);
    Ok(())
}

fn declare_command(command: &ParsedCommand, evaluator: &mut Evaluator) -> Result<(), CommandError> {
    let (variable, expr) = assignment(command)?;
    if SMART_EXPR_RE.is_match(expr) {
        evaluator.set_smart_variable(variable, expr);
        let initial = evaluator.value_of(variable)?;
        debug!("declare smart ${} = {expr} (now {initial})", variable.trim_start_matches('$'));
        return Ok(());
    }
    let value = evaluator.evaluate(expr)?;
    let value = qualify_shorthand(evaluator, value, None)?;
    debug!("declare ${} = {value}", variable.trim_start_matches('$'));
    evaluator.set_variable(variable, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use parley_data::EnumTable;

    fn evaluator() -> Evaluator {
        let mut enums = EnumTable::new();
        enums.insert("Mood".into(), vec!["Calm".into(), "Angry".into()]);
        Evaluator::new(enums)
    }

    fn run(handler: &CommandHandler, ev: &mut Evaluator, src: &str) -> CommandOutcome {
        handler.execute(&parse_command(src).unwrap(), ev)
    }

    #[test]
    fn tokenizes_with_quotes() {
        let cmd = parse_command(r#"  say "hello there" 'it\'s' plain  "#).unwrap();
        assert_eq!(cmd.name, "say");
        assert_eq!(cmd.args, vec!["hello there", "it's", "plain"]);
        assert_eq!(cmd.raw, r#"say "hello there" 'it\'s' plain"#);
        assert_eq!(parse_command("fade \"\"").unwrap().args, vec![String::new()]);
    }

    #[test]
    fn rejects_empty_and_unterminated() {
        assert_eq!(parse_command("   "), Err(CommandError::Empty));
        assert!(matches!(parse_command("say \"oops"), Err(CommandError::UnterminatedQuote(_))));
    }

    #[test]
    fn set_accepts_every_connector() {
        let handler = CommandHandler::new();
        let mut ev = evaluator();
        assert!(run(&handler, &mut ev, "set $a to 1 + 1").is_handled());
        assert!(run(&handler, &mut ev, "set $b = 3").is_handled());
        assert!(run(&handler, &mut ev, "set $c=4").is_handled());
        assert!(run(&handler, &mut ev, "SET $d \"to be\"").is_handled());
        assert_eq!(ev.variable("a"), Some(&Value::from(2)));
        assert_eq!(ev.variable("b"), Some(&Value::from(3)));
        assert_eq!(ev.variable("c"), Some(&Value::from(4)));
        assert_eq!(ev.variable("d"), Some(&Value::from("to be")));
    }

    #[test]
    fn set_resolves_enum_shorthand() {
        let handler = CommandHandler::new();
        let mut ev = evaluator();
        run(&handler, &mut ev, "set $mood to Mood.Calm");
        run(&handler, &mut ev, "set $mood to .Angry");
        assert_eq!(ev.variable("mood"), Some(&Value::enum_tag("Mood", "Angry")));
        let outcome = run(&handler, &mut ev, "set $mood to .Sleepy");
        assert_eq!(
            outcome,
            CommandOutcome::Failed(CommandError::Eval(EvalError::InvalidEnumCase {
                name: "Mood".into(),
                case: "Sleepy".into()
            }))
        );
    }

    #[test]
    fn declare_smart_and_plain() {
        let handler = CommandHandler::new();
        let mut ev = evaluator();
        run(&handler, &mut ev, "declare $gold = 5");
        run(&handler, &mut ev, "declare $rich = $gold > 10");
        run(&handler, &mut ev, "declare $mood = Mood.Calm");
        assert!(!ev.is_smart("gold"));
        assert!(ev.is_smart("rich"));
        assert_eq!(ev.value_of("rich").unwrap(), Value::Bool(false));
        run(&handler, &mut ev, "set $gold to 20");
        assert_eq!(ev.value_of("rich").unwrap(), Value::Bool(true));
        assert_eq!(ev.variable("mood"), Some(&Value::enum_tag("Mood", "Calm")));
    }

    #[test]
    fn set_demotes_smart_variables() {
        let handler = CommandHandler::new();
        let mut ev = evaluator();
        run(&handler, &mut ev, "declare $x = 1 + 1");
        run(&handler, &mut ev, "set $x to 7");
        assert!(!ev.is_smart("x"));
        assert_eq!(ev.value_of("x").unwrap(), Value::from(7));
    }

    #[test]
    fn unknown_and_failing_commands_do_not_raise() {
        let handler = CommandHandler::new();
        let mut ev = evaluator();
        assert_eq!(run(&handler, &mut ev, "shake_camera 3"), CommandOutcome::Ignored);
        assert!(run(&handler, &mut ev, "set $x to nope(1)").is_failed());
        assert!(matches!(
            run(&handler, &mut ev, "set $x"),
            CommandOutcome::Failed(CommandError::MissingArgument { .. })
        ));
        assert!(run(&handler, &mut ev, "stop").is_handled());
    }

    #[test]
    fn custom_handlers_are_case_insensitive() {
        let mut handler = CommandHandler::empty();
        handler.register("Give", |cmd, ev| {
            ev.set_variable("given", Value::from(cmd.args.join(" ")));
            Ok(())
        });
        let mut ev = evaluator();
        assert!(handler.handles("give"));
        assert!(run(&handler, &mut ev, "GIVE sword shield").is_handled());
        assert_eq!(ev.variable("given"), Some(&Value::from("sword shield")));
        assert_eq!(run(&handler, &mut ev, "set $x to 1"), CommandOutcome::Ignored);
    }
}
