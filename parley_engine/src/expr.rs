//! Expression syntax tree and the pest-backed parser that produces it.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser as PestParser;

use crate::error::EvalError;
use crate::value::Value;

#[derive(PestParser)]
#[grammar = "src/expr.pest"]
struct ExprParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn from_token(token: &str) -> Option<Self> {
        let op = match token.to_ascii_lowercase().as_str() {
            "||" | "or" => BinaryOp::Or,
            "^" | "xor" => BinaryOp::Xor,
            "&&" | "and" => BinaryOp::And,
            "===" | "==" | "=" | "eq" | "is" => BinaryOp::Eq,
            "!==" | "!=" | "neq" => BinaryOp::Ne,
            "<" | "lt" => BinaryOp::Lt,
            "<=" | "lte" => BinaryOp::Le,
            ">" | "gt" => BinaryOp::Gt,
            ">=" | "gte" => BinaryOp::Ge,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Parsed expression. Variable names are stored without the `$` sigil.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    /// `Enum.Case`, or `.Case` with an empty enum name.
    EnumCase { name: String, case: String },
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

/// Parse an expression string.
///
/// Word operators (`and`, `or`, `xor`, `not`, `is`, `eq`, `neq`, `gt`,
/// `lt`, `gte`, `lte`) are accepted case-insensitively alongside their
/// symbolic forms; a single `=` compares for equality.
///
/// # Errors
/// Returns [`EvalError::Syntax`] when the text is not a valid expression.
pub fn parse_expr(source: &str) -> Result<Expr, EvalError> {
    let syntax = |message: String| EvalError::Syntax {
        expr: source.to_string(),
        message,
    };
    let mut pairs = ExprParser::parse(Rule::expression, source).map_err(|e| syntax(e.variant.message().into_owned()))?;
    let root = pairs.next().ok_or_else(|| syntax("empty expression".into()))?;
    let inner = root
        .into_inner()
        .find(|p| p.as_rule() == Rule::or_expr)
        .ok_or_else(|| syntax("empty expression".into()))?;
    build(inner).map_err(syntax)
}

fn build(pair: Pair<'_, Rule>) -> Result<Expr, String> {
    match pair.as_rule() {
        Rule::or_expr
        | Rule::xor_expr
        | Rule::and_expr
        | Rule::eq_expr
        | Rule::cmp_expr
        | Rule::add_expr
        | Rule::mul_expr => build_chain(pair),
        Rule::unary => build_unary(pair),
        Rule::call => build_call(pair),
        Rule::number => pair
            .as_str()
            .parse::<f64>()
            .map(|n| Expr::Literal(Value::Number(n)))
            .map_err(|e| format!("bad number '{}': {e}", pair.as_str())),
        Rule::boolean => Ok(Expr::Literal(Value::Bool(pair.as_str().eq_ignore_ascii_case("true")))),
        Rule::string => Ok(Expr::Literal(Value::Text(unescape(
            pair.into_inner().next().map_or("", |p| p.as_str()),
        )))),
        Rule::enum_case => {
            let (name, case) = pair.as_str().split_once('.').ok_or("malformed enum case")?;
            Ok(Expr::EnumCase {
                name: name.to_string(),
                case: case.to_string(),
            })
        },
        Rule::shorthand_case => Ok(Expr::EnumCase {
            name: String::new(),
            case: pair.as_str().trim_start_matches('.').to_string(),
        }),
        Rule::variable => Ok(Expr::Variable(pair.as_str().trim_start_matches('$').to_string())),
        Rule::ident => Ok(Expr::Variable(pair.as_str().to_string())),
        rule => Err(format!("unexpected {rule:?}")),
    }
}

/// Left-associative `operand (op operand)*` chain.
fn build_chain(pair: Pair<'_, Rule>) -> Result<Expr, String> {
    let mut inner = pair.into_inner();
    let first = inner.next().ok_or("missing operand")?;
    let mut lhs = build(first)?;
    while let Some(op_pair) = inner.next() {
        let op = BinaryOp::from_token(op_pair.as_str()).ok_or_else(|| format!("unknown operator '{}'", op_pair.as_str()))?;
        let rhs = build(inner.next().ok_or("missing right operand")?)?;
        lhs = Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }
    Ok(lhs)
}

fn build_unary(pair: Pair<'_, Rule>) -> Result<Expr, String> {
    let mut ops = Vec::new();
    let mut operand = None;
    for p in pair.into_inner() {
        if p.as_rule() == Rule::prefix_op {
            let op = match p.as_str().to_ascii_lowercase().as_str() {
                "!" | "not" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                _ => UnaryOp::Plus,
            };
            ops.push(op);
        } else {
            operand = Some(build(p)?);
        }
    }
    let mut expr = operand.ok_or("missing operand")?;
    for op in ops.into_iter().rev() {
        expr = Expr::Unary { op, expr: Box::new(expr) };
    }
    Ok(expr)
}

fn build_call(pair: Pair<'_, Rule>) -> Result<Expr, String> {
    let mut inner = pair.into_inner();
    let name = inner.next().ok_or("missing function name")?.as_str().to_string();
    let args = inner.map(build).collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::Call { name, args })
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Variable(name.into()))
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Number(n)))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse_expr("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: num(1.0),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: num(2.0),
                    rhs: num(3.0),
                }),
            }
        );
    }

    #[test]
    fn word_operators_match_symbols() {
        assert_eq!(parse_expr("$a and not $b").unwrap(), parse_expr("$a && !$b").unwrap());
        assert_eq!(parse_expr("$a GTE 3 or $b is 2").unwrap(), parse_expr("$a >= 3 || $b == 2").unwrap());
        assert_eq!(parse_expr("$a = 1").unwrap(), parse_expr("$a === 1").unwrap());
    }

    #[test]
    fn keywords_need_a_word_boundary() {
        // `order` and `island` are identifiers, not `or` / `is`.
        assert_eq!(parse_expr("order").unwrap(), Expr::Variable("order".into()));
        assert_eq!(parse_expr("island").unwrap(), Expr::Variable("island".into()));
    }

    #[test]
    fn comparison_binds_tighter_than_logic() {
        let expr = parse_expr("$x > 1 && $y").unwrap();
        let Expr::Binary { op, lhs, rhs } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        assert_eq!(
            *lhs,
            Expr::Binary {
                op: BinaryOp::Gt,
                lhs: var("x"),
                rhs: num(1.0),
            }
        );
        assert_eq!(rhs, var("y"));
    }

    #[test]
    fn enum_cases_and_calls() {
        assert_eq!(
            parse_expr("Mood.Calm").unwrap(),
            Expr::EnumCase {
                name: "Mood".into(),
                case: "Calm".into()
            }
        );
        assert_eq!(
            parse_expr(".Calm").unwrap(),
            Expr::EnumCase {
                name: String::new(),
                case: "Calm".into()
            }
        );
        let Expr::Call { name, args } = parse_expr("max($a, dice(6) + 1)").unwrap() else {
            panic!("expected call");
        };
        assert_eq!(name, "max");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn strings_unescape() {
        assert_eq!(
            parse_expr(r#""say \"hi\"""#).unwrap(),
            Expr::Literal(Value::Text("say \"hi\"".into()))
        );
        assert!(parse_expr("'it''").is_err());
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(parse_expr("1 +"), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse_expr("(1"), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse_expr(""), Err(EvalError::Syntax { .. })));
    }
}
