//! Function library callable from expressions.
//!
//! Hosts extend or override it through [`crate::RunnerConfig::function`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EvalError;
use crate::evaluator::Evaluator;
use crate::value::{Value, format_number};

/// A callable registered with the evaluator.
pub type Function = Arc<dyn Fn(&Evaluator, &[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Box a closure as a [`Function`].
pub fn function<F>(f: F) -> Function
where
    F: Fn(&Evaluator, &[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Numeric argument at `index`. Missing or non-numeric arguments are NaN.
fn num(args: &[Value], index: usize) -> f64 {
    args.get(index).and_then(Value::as_number).unwrap_or(f64::NAN)
}

fn text(args: &[Value], index: usize) -> String {
    args.get(index).map(ToString::to_string).unwrap_or_default()
}

fn unary(f: fn(f64) -> f64) -> Function {
    function(move |_, args| Ok(Value::Number(f(num(args, 0)))))
}

fn binary(f: fn(f64, f64) -> f64) -> Function {
    function(move |_, args| Ok(Value::Number(f(num(args, 0), num(args, 1)))))
}

/// Halves round toward positive infinity.
fn round_half_up(n: f64) -> f64 {
    (n + 0.5).floor()
}

fn inc(v: f64) -> f64 {
    if v.fract() == 0.0 { v + 1.0 } else { v.ceil() }
}

fn dec(v: f64) -> f64 {
    if v.fract() == 0.0 { v - 1.0 } else { v.floor() }
}

/// The built-in library.
pub fn builtin_functions() -> HashMap<String, Function> {
    let mut fns: HashMap<String, Function> = HashMap::new();
    let mut add = |name: &str, f: Function| {
        fns.insert(name.to_string(), f);
    };

    add("string", function(|_, args| Ok(Value::Text(text(args, 0)))));
    add("number", function(|_, args| Ok(Value::Number(num(args, 0)))));
    add(
        "bool",
        function(|_, args| Ok(Value::Bool(args.first().is_some_and(Value::truthy)))),
    );
    add(
        "visited",
        function(|ev, args| Ok(Value::Bool(ev.visit_count(&text(args, 0)) > 0))),
    );
    add(
        "visited_count",
        function(|ev, args| Ok(Value::Number(f64::from(ev.visit_count(&text(args, 0)))))),
    );
    add(
        "format_invariant",
        function(|_, args| {
            let n = num(args, 0);
            Ok(Value::Text(if n.is_finite() { format_number(n) } else { "0".into() }))
        }),
    );
    add("random", function(|_, _| Ok(Value::Number(rand::random::<f64>()))));
    add(
        "random_range",
        function(|_, args| {
            let (a, b) = (num(args, 0), num(args, 1));
            let (lo, hi) = (a.min(b), a.max(b));
            Ok(Value::Number(lo + rand::random::<f64>() * (hi - lo)))
        }),
    );
    add(
        "dice",
        function(|_, args| {
            let sides = num(args, 0).floor();
            let sides = if sides.is_nan() { 1.0 } else { sides.max(1.0) };
            Ok(Value::Number((rand::random::<f64>() * sides).floor() + 1.0))
        }),
    );
    add("min", binary(f64::min));
    add("max", binary(f64::max));
    add("round", unary(round_half_up));
    add(
        "round_places",
        function(|_, args| {
            let places = num(args, 1).floor();
            let places = if places.is_nan() { 0.0 } else { places.max(0.0) };
            let factor = 10f64.powf(places);
            Ok(Value::Number(round_half_up(num(args, 0) * factor) / factor))
        }),
    );
    add("floor", unary(f64::floor));
    add("ceil", unary(f64::ceil));
    add("inc", unary(inc));
    add("dec", unary(dec));
    add("decimal", unary(|v| (v - v.trunc()).abs()));
    add("int", unary(f64::trunc));
    fns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> Value {
        Evaluator::default().evaluate(src).unwrap()
    }

    #[test]
    fn rounding_family() {
        assert_eq!(eval("round(2.5)"), Value::from(3));
        assert_eq!(eval("round(-2.5)"), Value::from(-2));
        assert_eq!(eval("round_places(3.14159, 2)"), Value::from(3.14));
        assert_eq!(eval("floor(2.7)"), Value::from(2));
        assert_eq!(eval("ceil(2.1)"), Value::from(3));
        assert_eq!(eval("int(-2.7)"), Value::from(-2));
    }

    #[test]
    fn inc_and_dec_snap_fractions() {
        assert_eq!(eval("inc(2)"), Value::from(3));
        assert_eq!(eval("inc(2.2)"), Value::from(3));
        assert_eq!(eval("dec(2)"), Value::from(1));
        assert_eq!(eval("dec(2.8)"), Value::from(2));
    }

    #[test]
    fn decimal_part_is_positive() {
        let Value::Number(d) = eval("decimal(-3.25)") else {
            panic!("expected number");
        };
        assert!((d - 0.25).abs() < 1e-9);
    }

    #[test]
    fn conversions() {
        assert_eq!(eval("string(4)"), Value::from("4"));
        assert_eq!(eval("number(\"2.5\")"), Value::from(2.5));
        assert_eq!(eval("bool(0)"), Value::from(false));
        assert_eq!(eval("format_invariant(1.5)"), Value::from("1.5"));
        assert_eq!(eval("format_invariant(1 / 0)"), Value::from("0"));
    }

    #[test]
    fn random_values_stay_in_range() {
        for _ in 0..50 {
            let Value::Number(roll) = eval("dice(6)") else {
                panic!("expected number");
            };
            assert!((1.0..=6.0).contains(&roll) && roll.fract() == 0.0);
            let Value::Number(r) = eval("random_range(10, 5)") else {
                panic!("expected number");
            };
            assert!((5.0..10.0).contains(&r));
        }
        assert_eq!(eval("dice(0)"), Value::from(1));
    }

    #[test]
    fn visit_counts() {
        let mut ev = Evaluator::default();
        assert_eq!(ev.evaluate("visited(\"Start\")").unwrap(), Value::from(false));
        ev.record_visit("Start");
        ev.record_visit("Start");
        assert_eq!(ev.evaluate("visited(\"Start\")").unwrap(), Value::from(true));
        assert_eq!(ev.evaluate("visited_count(\"Start\")").unwrap(), Value::from(2));
    }

    #[test]
    fn min_and_max() {
        assert_eq!(eval("min(3, 7)"), Value::from(3));
        assert_eq!(eval("max(3, 7)"), Value::from(7));
    }
}
