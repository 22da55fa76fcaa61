//! Expression evaluation engine for formulas
//!
//! Expressions are parsed with `meval` and evaluated element-wise over the
//! bound variables. Only identifiers explicitly bound in a [`Namespace`] and
//! the whitelisted functions below are visible; there is no other access to
//! the host environment.
//!
//! Aggregate functions (`mean(x)`, `std(x)`, ...) and series functions
//! (`cumsum(x)`, `diff(x)`) operate on a whole variable. They are resolved
//! before element-wise evaluation by rewriting each call into an internal
//! binding, so their argument must be a single variable name.

use meval::{Context, Expr};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Element-wise functions available in formulas
pub const FUNCTIONS: &[&str] = &[
    "sqrt", "exp", "ln", "log", "log10", "log2", "abs", "sin", "cos", "tan", "asin", "acos",
    "atan", "atan2", "sinh", "cosh", "tanh", "asinh", "acosh", "atanh", "floor", "ceil", "round",
    "signum", "min", "max", "pow", "hypot", "clip", "deg2rad", "rad2deg",
];

/// Functions reducing a whole variable to one value
pub const AGGREGATE_FUNCTIONS: &[&str] = &[
    "mean", "median", "std", "var", "sum", "rms", "amin", "amax", "first", "last",
];

/// Functions mapping a whole variable to another series of the same length
pub const SERIES_FUNCTIONS: &[&str] = &["cumsum", "diff"];

/// Named constants
pub const CONSTANTS: &[&str] = &["pi", "e"];

/// Every name that cannot be used verbatim as a variable identifier
pub const RESERVED_NAMES: &[&str] = &[
    "sqrt", "exp", "ln", "log", "log10", "log2", "abs", "sin", "cos", "tan", "asin", "acos",
    "atan", "atan2", "sinh", "cosh", "tanh", "asinh", "acosh", "atanh", "floor", "ceil", "round",
    "signum", "min", "max", "pow", "hypot", "clip", "deg2rad", "rad2deg", "mean", "median", "std",
    "var", "sum", "rms", "amin", "amax", "first", "last", "cumsum", "diff", "pi", "e",
];

/// A whole-variable call with a single identifier argument: `mean( var_3 )`
static WHOLE_VARIABLE_CALL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(mean|median|std|var|sum|rms|amin|amax|first|last|cumsum|diff)\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)",
    )
    .expect("Invalid regex pattern")
});

/// Any remaining whole-variable call after rewriting (i.e. with a non-trivial argument)
static LEFTOVER_CALL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(mean|median|std|var|sum|rms|amin|amax|first|last|cumsum|diff)\s*\(")
        .expect("Invalid regex pattern")
});

/// Errors produced while validating or evaluating an expression
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Formula cannot be empty")]
    Empty,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Function not allowed: {0}")]
    DisallowedFunction(String),

    #[error("Function '{0}' expects a single variable name as its argument")]
    WholeVariableArgument(String),

    #[error("Variables have different lengths: '{first}' has {first_len} values, '{second}' has {second_len}")]
    LengthMismatch {
        first: String,
        first_len: usize,
        second: String,
        second_len: usize,
    },

    #[error("Evaluation error: {0}")]
    Eval(String),
}

/// Result of evaluating an expression
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluated {
    /// The expression referenced no series; one value for every sample
    Scalar(f64),
    /// One value per sample
    Series(Vec<f64>),
}

/// Identifiers visible to an expression and the data bound to them
#[derive(Clone, Debug, Default)]
pub struct Namespace<'a> {
    series: HashMap<String, &'a [f64]>,
}

impl<'a> Namespace<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an identifier to a series
    pub fn bind(&mut self, identifier: impl Into<String>, values: &'a [f64]) {
        self.series.insert(identifier.into(), values);
    }

    pub fn get(&self, identifier: &str) -> Option<&'a [f64]> {
        self.series.get(identifier).copied()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.series.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Build the evaluation context with the whitelisted functions and constants
fn base_context() -> Context<'static> {
    let mut ctx = Context::new();
    ctx.func("log", f64::ln)
        .func("log10", f64::log10)
        .func("log2", f64::log2)
        .func("deg2rad", f64::to_radians)
        .func("rad2deg", f64::to_degrees)
        .func2("atan2", f64::atan2)
        .func2("pow", f64::powf)
        .func2("hypot", f64::hypot)
        .func3("clip", |x: f64, lo: f64, hi: f64| x.max(lo).min(hi));
    ctx
}

/// Identifier tokens in an expression, with whether each is used as a call.
///
/// Number literals (including exponents such as `1e-3`) are skipped so their
/// letters are never mistaken for identifiers.
fn scan_identifiers(text: &str) -> Vec<(String, bool)> {
    let chars: Vec<char> = text.chars().collect();
    let mut found = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            let is_call = chars[i..]
                .iter()
                .find(|c| !c.is_whitespace())
                .is_some_and(|&c| c == '(');
            found.push((name, is_call));
        } else {
            i += 1;
        }
    }

    found
}

/// Reduce a series with one of [`AGGREGATE_FUNCTIONS`]
fn aggregate(function: &str, values: &[f64]) -> f64 {
    let n = values.len() as f64;
    match function {
        "sum" => values.iter().sum(),
        "mean" => values.iter().sum::<f64>() / n,
        "var" | "std" => {
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            if function == "std" {
                variance.sqrt()
            } else {
                variance
            }
        }
        "rms" => (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt(),
        "median" => {
            if values.is_empty() || values.iter().any(|v| v.is_nan()) {
                return f64::NAN;
            }
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
        "amin" | "amax" => {
            if values.is_empty() || values.iter().any(|v| v.is_nan()) {
                return f64::NAN;
            }
            let fold = if function == "amin" { f64::min } else { f64::max };
            values[1..].iter().fold(values[0], |acc, &v| fold(acc, v))
        }
        "first" => values.first().copied().unwrap_or(f64::NAN),
        "last" => values.last().copied().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Map a series with one of [`SERIES_FUNCTIONS`].
///
/// `diff` is a backward difference whose first element is 0 so the result
/// keeps the input length.
fn series_function(function: &str, values: &[f64]) -> Vec<f64> {
    match function {
        "cumsum" => values
            .iter()
            .scan(0.0, |acc, &v| {
                *acc += v;
                Some(*acc)
            })
            .collect(),
        "diff" => {
            let mut out = Vec::with_capacity(values.len());
            if let Some(&first) = values.first() {
                out.push(first - first);
            }
            out.extend(values.windows(2).map(|w| w[1] - w[0]));
            out
        }
        _ => values.to_vec(),
    }
}

/// Whole-variable calls resolved into internal bindings
struct Rewritten {
    text: String,
    scalars: Vec<(String, f64)>,
    series: Vec<(String, Vec<f64>)>,
}

fn rewrite_whole_variable_calls(
    expression: &str,
    namespace: &Namespace<'_>,
) -> Result<Rewritten, ExpressionError> {
    let mut text = String::with_capacity(expression.len());
    let mut scalars = Vec::new();
    let mut series = Vec::new();
    let mut last = 0;

    for caps in WHOLE_VARIABLE_CALL_REGEX.captures_iter(expression) {
        let (Some(whole), Some(function), Some(argument)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let values = namespace
            .get(argument.as_str())
            .ok_or_else(|| ExpressionError::UnknownVariable(argument.as_str().to_string()))?;

        text.push_str(&expression[last..whole.start()]);
        if SERIES_FUNCTIONS.contains(&function.as_str()) {
            let binding = format!("__ser{}", series.len());
            text.push_str(&binding);
            series.push((binding, series_function(function.as_str(), values)));
        } else {
            let binding = format!("__agg{}", scalars.len());
            text.push_str(&binding);
            scalars.push((binding, aggregate(function.as_str(), values)));
        }
        last = whole.end();
    }
    text.push_str(&expression[last..]);

    if let Some(caps) = LEFTOVER_CALL_REGEX.captures(&text) {
        let function = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        return Err(ExpressionError::WholeVariableArgument(function.to_string()));
    }

    Ok(Rewritten {
        text,
        scalars,
        series,
    })
}

/// Evaluate a normalized expression against a namespace.
///
/// The expression must only contain safe identifiers (see
/// [`crate::normalize`]). Every referenced series must have the same length;
/// an expression without series references yields [`Evaluated::Scalar`].
pub fn evaluate(expression: &str, namespace: &Namespace<'_>) -> Result<Evaluated, ExpressionError> {
    if expression.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }

    let rewritten = rewrite_whole_variable_calls(expression, namespace)?;

    let expr: Expr = rewritten
        .text
        .parse()
        .map_err(|e: meval::Error| ExpressionError::Parse(e.to_string()))?;

    // Resolve every identifier before touching any data
    let mut bound: Vec<(String, &[f64])> = Vec::new();
    for (name, is_call) in scan_identifiers(&rewritten.text) {
        if is_call {
            if !FUNCTIONS.contains(&name.as_str()) {
                return Err(ExpressionError::DisallowedFunction(name));
            }
            continue;
        }
        if bound.iter().any(|(b, _)| *b == name)
            || rewritten.scalars.iter().any(|(b, _)| *b == name)
            || CONSTANTS.contains(&name.as_str())
        {
            continue;
        }
        if let Some((_, values)) = rewritten.series.iter().find(|(b, _)| *b == name) {
            bound.push((name, values.as_slice()));
        } else if let Some(values) = namespace.get(&name) {
            bound.push((name, values));
        } else {
            return Err(ExpressionError::UnknownVariable(name));
        }
    }

    if let Some((first, first_values)) = bound.first() {
        if let Some((second, second_values)) =
            bound.iter().find(|(_, v)| v.len() != first_values.len())
        {
            return Err(ExpressionError::LengthMismatch {
                first: first.clone(),
                first_len: first_values.len(),
                second: second.clone(),
                second_len: second_values.len(),
            });
        }
    }

    let mut ctx = base_context();
    for (binding, value) in &rewritten.scalars {
        ctx.var(binding.as_str(), *value);
    }

    let eval = |ctx: &Context<'_>| {
        expr.eval_with_context(ctx).map_err(|e| match e {
            meval::Error::UnknownVariable(name) => ExpressionError::UnknownVariable(name),
            other => ExpressionError::Eval(other.to_string()),
        })
    };

    let Some((_, first_values)) = bound.first() else {
        return Ok(Evaluated::Scalar(eval(&ctx)?));
    };

    let len = first_values.len();
    let mut results = Vec::with_capacity(len);
    for idx in 0..len {
        for (name, values) in &bound {
            ctx.var(name.as_str(), values[idx]);
        }
        results.push(eval(&ctx)?);
    }

    Ok(Evaluated::Series(results))
}

/// Validate a normalized expression for syntax errors and name availability.
///
/// Every identifier in `identifiers` is bound to a one-sample dummy series.
pub fn validate(expression: &str, identifiers: &[&str]) -> Result<(), ExpressionError> {
    let dummy = [1.0];
    let mut namespace = Namespace::new();
    for identifier in identifiers {
        namespace.bind(*identifier, &dummy);
    }
    evaluate(expression, &namespace).map(|_| ())
}
