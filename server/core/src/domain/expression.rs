// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Transform Expression Evaluator
//!
//! Evaluates user-supplied transform and inverse expressions such as
//! `value / 63.0` or `int(value * 63)` against a single input value.
//!
//! The evaluation scope is a sandbox: the engine's builtin functions are
//! disabled and only the names below are defined.
//!
//! | Name | Meaning |
//! |------|---------|
//! | `value` | the input |
//! | `math.floor`, `math.ceil`, `math.trunc` | rounding, returns an integer |
//! | `math.sqrt`, `math.exp`, `math.log`, `math.log10`, `math.pow`, `math.fabs` | float math |
//! | `math.sin`, `math.cos`, `math.tan` | trigonometry |
//! | `math.pi`, `math.e` | constants |
//! | `int`, `float`, `bool`, `round`, `abs`, `min`, `max` | conversions |
//! | `True`, `False`, `None` | constants |
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Sandboxed evaluation of alias transforms

use crate::domain::payload::Payload;
use evalexpr::{
    eval_with_context, Context, ContextWithMutableFunctions, ContextWithMutableVariables,
    EvalexprError, EvalexprResult, Function, HashMapContext, Value as EvalValue,
};
use serde_json::{Number, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("Failed to evaluate {expression:?}: {reason}")]
    Evaluation { expression: String, reason: String },

    #[error("Value {0} cannot be used in an expression")]
    UnsupportedInput(String),

    #[error("Expression {expression:?} produced a non-finite number")]
    NonFinite { expression: String },
}

/// Evaluate `expression` with `value` bound to the input.
pub fn evaluate(expression: &str, value: &Value) -> Result<Value, EvalError> {
    let input = to_eval_value(value)?;
    let context = sandbox(input).map_err(|e| evaluation_error(expression, e))?;
    let result = eval_with_context(expression, &context).map_err(|e| evaluation_error(expression, e))?;
    from_eval_value(result).ok_or_else(|| EvalError::NonFinite {
        expression: expression.to_string(),
    })
}

/// Run an optional expression over a payload.
///
/// No expression is the identity and `NoValue` is never transformed. On
/// failure `on_error` is told why and the original payload is returned
/// untouched.
pub fn apply(expression: Option<&str>, payload: Payload, on_error: impl FnOnce(EvalError)) -> Payload {
    let (Some(expression), Payload::Value(value)) = (expression, &payload) else {
        return payload;
    };
    match evaluate(expression, value) {
        Ok(result) => Payload::Value(result),
        Err(e) => {
            on_error(e);
            payload
        }
    }
}

fn evaluation_error(expression: &str, error: EvalexprError) -> EvalError {
    EvalError::Evaluation {
        expression: expression.to_string(),
        reason: error.to_string(),
    }
}

fn sandbox(input: EvalValue) -> EvalexprResult<HashMapContext> {
    let mut context = HashMapContext::new();
    context.set_builtin_functions_disabled(true)?;

    context.set_value("value".into(), input)?;
    context.set_value("True".into(), EvalValue::Boolean(true))?;
    context.set_value("False".into(), EvalValue::Boolean(false))?;
    context.set_value("None".into(), EvalValue::Empty)?;
    context.set_value("math.pi".into(), EvalValue::Float(std::f64::consts::PI))?;
    context.set_value("math.e".into(), EvalValue::Float(std::f64::consts::E))?;

    context.set_function("math.floor".into(), integral(f64::floor))?;
    context.set_function("math.ceil".into(), integral(f64::ceil))?;
    context.set_function("math.trunc".into(), integral(f64::trunc))?;
    context.set_function("math.sqrt".into(), unary(f64::sqrt))?;
    context.set_function("math.exp".into(), unary(f64::exp))?;
    context.set_function("math.log10".into(), unary(f64::log10))?;
    context.set_function("math.fabs".into(), unary(f64::abs))?;
    context.set_function("math.sin".into(), unary(f64::sin))?;
    context.set_function("math.cos".into(), unary(f64::cos))?;
    context.set_function("math.tan".into(), unary(f64::tan))?;
    context.set_function(
        "math.pow".into(),
        Function::new(|arg| {
            let (base, exponent) = number_pair(arg)?;
            Ok(EvalValue::Float(base.powf(exponent)))
        }),
    )?;
    context.set_function(
        "math.log".into(),
        Function::new(|arg| match arg {
            EvalValue::Tuple(_) => {
                let (x, base) = number_pair(arg)?;
                Ok(EvalValue::Float(x.ln() / base.ln()))
            }
            _ => Ok(EvalValue::Float(arg.as_number()?.ln())),
        }),
    )?;

    context.set_function("int".into(), Function::new(to_int))?;
    context.set_function("float".into(), Function::new(to_float))?;
    context.set_function("bool".into(), Function::new(|arg| Ok(EvalValue::Boolean(truthy(arg)))))?;
    context.set_function("round".into(), Function::new(round))?;
    context.set_function(
        "abs".into(),
        Function::new(|arg| match arg {
            EvalValue::Int(i) => i
                .checked_abs()
                .map(EvalValue::Int)
                .ok_or_else(|| EvalexprError::CustomMessage("integer overflow in abs".into())),
            other => Ok(EvalValue::Float(other.as_number()?.abs())),
        }),
    )?;
    context.set_function("min".into(), Function::new(|arg| extremum(arg, |a, b| a < b)))?;
    context.set_function("max".into(), Function::new(|arg| extremum(arg, |a, b| a > b)))?;

    Ok(context)
}

fn unary(f: fn(f64) -> f64) -> Function {
    Function::new(move |arg| Ok(EvalValue::Float(f(arg.as_number()?))))
}

fn integral(f: fn(f64) -> f64) -> Function {
    Function::new(move |arg| match arg {
        EvalValue::Int(i) => Ok(EvalValue::Int(*i)),
        other => float_to_int(f(other.as_number()?)),
    })
}

fn number_pair(arg: &EvalValue) -> EvalexprResult<(f64, f64)> {
    let pair = arg.as_fixed_len_tuple(2)?;
    Ok((pair[0].as_number()?, pair[1].as_number()?))
}

fn float_to_int(f: f64) -> EvalexprResult<EvalValue> {
    if !f.is_finite() || f < i64::MIN as f64 || f > i64::MAX as f64 {
        return Err(EvalexprError::CustomMessage(format!(
            "cannot convert {} to an integer",
            f
        )));
    }
    Ok(EvalValue::Int(f.trunc() as i64))
}

fn to_int(arg: &EvalValue) -> EvalexprResult<EvalValue> {
    match arg {
        EvalValue::Int(i) => Ok(EvalValue::Int(*i)),
        EvalValue::Float(f) => float_to_int(*f),
        EvalValue::Boolean(b) => Ok(EvalValue::Int(i64::from(*b))),
        EvalValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map(EvalValue::Int)
            .map_err(|_| EvalexprError::CustomMessage(format!("invalid literal for int(): {:?}", s))),
        other => Err(EvalexprError::expected_number(other.clone())),
    }
}

fn to_float(arg: &EvalValue) -> EvalexprResult<EvalValue> {
    match arg {
        EvalValue::Boolean(b) => Ok(EvalValue::Float(if *b { 1.0 } else { 0.0 })),
        EvalValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map(EvalValue::Float)
            .map_err(|_| EvalexprError::CustomMessage(format!("could not convert string to float: {:?}", s))),
        other => Ok(EvalValue::Float(other.as_number()?)),
    }
}

/// Round half to even. `round(x)` yields an integer, `round(x, n)` a float.
fn round(arg: &EvalValue) -> EvalexprResult<EvalValue> {
    fn half_even(x: f64) -> f64 {
        let rounded = x.round();
        if (x - x.trunc()).abs() == 0.5 {
            2.0 * (x / 2.0).round()
        } else {
            rounded
        }
    }

    match arg {
        EvalValue::Int(i) => Ok(EvalValue::Int(*i)),
        EvalValue::Tuple(_) => {
            let (x, digits) = number_pair(arg)?;
            let scale = 10f64.powi(digits as i32);
            Ok(EvalValue::Float(half_even(x * scale) / scale))
        }
        other => float_to_int(half_even(other.as_number()?)),
    }
}

fn truthy(arg: &EvalValue) -> bool {
    match arg {
        EvalValue::Boolean(b) => *b,
        EvalValue::Int(i) => *i != 0,
        EvalValue::Float(f) => *f != 0.0,
        EvalValue::String(s) => !s.is_empty(),
        EvalValue::Tuple(t) => !t.is_empty(),
        EvalValue::Empty => false,
    }
}

fn extremum(arg: &EvalValue, better: fn(f64, f64) -> bool) -> EvalexprResult<EvalValue> {
    let items = arg.as_tuple()?;
    let mut best: Option<&EvalValue> = None;
    for item in &items {
        let candidate = item.as_number()?;
        match best {
            Some(current) if !better(candidate, current.as_number()?) => {}
            _ => best = Some(item),
        }
    }
    best.cloned()
        .ok_or_else(|| EvalexprError::CustomMessage("expected at least one argument".into()))
}

fn to_eval_value(value: &Value) -> Result<EvalValue, EvalError> {
    Ok(match value {
        Value::Null => EvalValue::Empty,
        Value::Bool(b) => EvalValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => EvalValue::Int(i),
            None => EvalValue::Float(
                n.as_f64()
                    .ok_or_else(|| EvalError::UnsupportedInput(n.to_string()))?,
            ),
        },
        Value::String(s) => EvalValue::String(s.clone()),
        Value::Array(items) => EvalValue::Tuple(
            items
                .iter()
                .map(to_eval_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Object(_) => return Err(EvalError::UnsupportedInput(value.to_string())),
    })
}

fn from_eval_value(value: EvalValue) -> Option<Value> {
    Some(match value {
        EvalValue::Empty => Value::Null,
        EvalValue::Boolean(b) => Value::Bool(b),
        EvalValue::Int(i) => Value::Number(i.into()),
        EvalValue::Float(f) => Value::Number(Number::from_f64(f)?),
        EvalValue::String(s) => Value::String(s),
        EvalValue::Tuple(items) => Value::Array(
            items
                .into_iter()
                .map(from_eval_value)
                .collect::<Option<Vec<_>>>()?,
        ),
    })
}
