//! Expression evaluation against variables, smart variables, enums and
//! registered functions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};
use parley_data::EnumTable;

use crate::error::EvalError;
use crate::expr::{BinaryOp, Expr, UnaryOp, parse_expr};
use crate::functions::{Function, builtin_functions};
use crate::value::Value;

/// Nesting depth at which smart-variable evaluation gives up.
pub const MAX_SMART_DEPTH: usize = 32;

/// Variable store plus everything an expression can reference.
///
/// Parsed expressions are cached by source text, so conditions that run on
/// every visit are only parsed once.
pub struct Evaluator {
    variables: BTreeMap<String, Value>,
    smart_variables: BTreeMap<String, String>,
    enums: EnumTable,
    functions: HashMap<String, Function>,
    visits: HashMap<String, u32>,
    cache: Mutex<HashMap<String, Arc<Expr>>>,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("Evaluator")
            .field("variables", &self.variables)
            .field("smart_variables", &self.smart_variables)
            .field("enums", &self.enums)
            .field("functions", &functions)
            .field("visits", &self.visits)
            .finish_non_exhaustive()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EnumTable::new())
    }
}

/// Variable names may be written with or without the `$` sigil.
fn bare(name: &str) -> &str {
    name.trim().trim_start_matches('$')
}

impl Evaluator {
    /// New evaluator with the built-in function library registered.
    pub fn new(enums: EnumTable) -> Self {
        Self {
            variables: BTreeMap::new(),
            smart_variables: BTreeMap::new(),
            enums,
            functions: builtin_functions(),
            visits: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a function, replacing any built-in of the same name.
    pub fn register_function(&mut self, name: impl Into<String>, function: Function) {
        self.functions.insert(name.into(), function);
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn enums(&self) -> &EnumTable {
        &self.enums
    }

    /// Parse `source`, reusing a cached tree when the same text was seen before.
    ///
    /// # Errors
    /// Returns [`EvalError::Syntax`] for malformed expressions.
    pub fn parse(&self, source: &str) -> Result<Arc<Expr>, EvalError> {
        let source = source.trim();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(expr) = cache.get(source) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parse_expr(source)?);
        cache.insert(source.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    /// Evaluate an expression in value context.
    ///
    /// # Errors
    /// Any [`EvalError`]; value-context callers are expected to propagate it.
    pub fn evaluate(&self, source: &str) -> Result<Value, EvalError> {
        let expr = self.parse(source)?;
        self.eval(&expr, 0)
    }

    /// Evaluate a condition. Errors are logged and count as `false`.
    pub fn evaluate_bool(&self, source: &str) -> bool {
        match self.evaluate(source) {
            Ok(value) => value.truthy(),
            Err(e) => {
                warn!("condition '{}' treated as false: {e}", source.trim());
                false
            },
        }
    }

    /// Current value of a variable. Smart variables are evaluated on read.
    ///
    /// # Errors
    /// [`EvalError::UnknownVariable`] when nothing is stored under `name`, or
    /// any error raised by a smart variable's expression.
    pub fn value_of(&self, name: &str) -> Result<Value, EvalError> {
        self.lookup(bare(name), 0)
    }

    /// Stored (non-smart) value of a variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(bare(name))
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Plain variables plus the current value of every smart variable.
    /// Smart variables that fail to evaluate are left out.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let mut all = self.variables.clone();
        for name in self.smart_variables.keys() {
            match self.lookup(name, 0) {
                Ok(value) => {
                    all.insert(name.clone(), value);
                },
                Err(e) => debug!("smart variable '${name}' left out of snapshot: {e}"),
            }
        }
        all
    }

    /// Store a plain value, demoting any smart variable of the same name.
    pub fn set_variable(&mut self, name: &str, value: Value) {
        let name = bare(name);
        self.smart_variables.remove(name);
        self.variables.insert(name.to_string(), value);
    }

    /// Register `name` as a smart variable, dropping any stored value.
    pub fn set_smart_variable(&mut self, name: &str, source: &str) {
        let name = bare(name);
        self.variables.remove(name);
        self.smart_variables.insert(name.to_string(), source.trim().to_string());
    }

    pub fn is_smart(&self, name: &str) -> bool {
        self.smart_variables.contains_key(bare(name))
    }

    pub fn record_visit(&mut self, title: &str) {
        *self.visits.entry(title.to_string()).or_default() += 1;
    }

    pub fn visit_count(&self, title: &str) -> u32 {
        self.visits.get(title).copied().unwrap_or(0)
    }

    /// Name of the first enum declaring `case`, used to qualify `.Case`.
    pub fn enum_for_case(&self, case: &str) -> Option<&str> {
        self.enums
            .iter()
            .find(|(_, cases)| cases.iter().any(|c| c == case))
            .map(|(name, _)| name.as_str())
    }

    /// Validate `name.case` against the enum table. Unknown enum names pass
    /// through unchanged; a known enum rejects cases it does not declare.
    ///
    /// # Errors
    /// [`EvalError::InvalidEnumCase`] for an undeclared case of a known enum.
    pub fn enum_case(&self, name: &str, case: &str) -> Result<Value, EvalError> {
        if let Some(cases) = self.enums.get(name)
            && !cases.iter().any(|c| c == case)
        {
            return Err(EvalError::InvalidEnumCase {
                name: name.to_string(),
                case: case.to_string(),
            });
        }
        Ok(Value::enum_tag(name, case))
    }

    fn lookup(&self, name: &str, depth: usize) -> Result<Value, EvalError> {
        if let Some(source) = self.smart_variables.get(name) {
            if depth >= MAX_SMART_DEPTH {
                return Err(EvalError::RecursionLimit(name.to_string()));
            }
            let expr = self.parse(source)?;
            return self.eval(&expr, depth + 1);
        }
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))
    }

    fn eval(&self, expr: &Expr, depth: usize) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => self.lookup(name, depth),
            Expr::EnumCase { name, case } => self.enum_case(name, case),
            Expr::Call { name, args } => {
                let function = self
                    .functions
                    .get(name)
                    .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                function(self, &args)
            },
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, depth)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => Ok(Value::Number(-number(&value, "-")?)),
                    UnaryOp::Plus => Ok(Value::Number(number(&value, "+")?)),
                }
            },
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, depth),
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr, depth: usize) -> Result<Value, EvalError> {
        let left = self.eval(lhs, depth)?;
        match op {
            BinaryOp::And if !left.truthy() => return Ok(Value::Bool(false)),
            BinaryOp::Or if left.truthy() => return Ok(Value::Bool(true)),
            _ => {},
        }
        let right = self.eval(rhs, depth)?;
        let sym = op.symbol();
        let result = match op {
            BinaryOp::And | BinaryOp::Or => Value::Bool(right.truthy()),
            BinaryOp::Xor => Value::Bool(left.truthy() ^ right.truthy()),
            BinaryOp::Eq => Value::Bool(left.loose_eq(&right)),
            BinaryOp::Ne => Value::Bool(!left.loose_eq(&right)),
            BinaryOp::Lt => Value::Bool(left.to_f64_lossy() < right.to_f64_lossy()),
            BinaryOp::Le => Value::Bool(left.to_f64_lossy() <= right.to_f64_lossy()),
            BinaryOp::Gt => Value::Bool(left.to_f64_lossy() > right.to_f64_lossy()),
            BinaryOp::Ge => Value::Bool(left.to_f64_lossy() >= right.to_f64_lossy()),
            BinaryOp::Add => Value::Number(number(&left, sym)? + number(&right, sym)?),
            BinaryOp::Sub => Value::Number(number(&left, sym)? - number(&right, sym)?),
            BinaryOp::Mul => Value::Number(number(&left, sym)? * number(&right, sym)?),
            BinaryOp::Div => Value::Number(number(&left, sym)? / number(&right, sym)?),
            BinaryOp::Rem => Value::Number(number(&left, sym)? % number(&right, sym)?),
        };
        Ok(result)
    }
}

fn number(value: &Value, op: &'static str) -> Result<f64, EvalError> {
    value.as_number().ok_or_else(|| EvalError::NotANumber {
        op,
        value: value.to_string(),
    })
}
