use super::parser::{BinaryOp, Node};
use super::ExpressionError;
use serde_json::Value;
use std::cmp::Ordering;

type EvalResult = Result<Option<Value>, ExpressionError>;

pub(crate) fn evaluate(node: &Node, input: Option<&Value>, root: &Value) -> EvalResult {
    match node {
        Node::Literal(value) => Ok(Some(value.clone())),
        Node::Context => Ok(input.cloned()),
        Node::Root => Ok(Some(root.clone())),
        Node::Variable(_) => Ok(None),
        Node::Field(name) => Ok(input.and_then(|value| field(value, name))),
        Node::Path(lhs, rhs) => {
            let Some(left) = evaluate(lhs, input, root)? else {
                return Ok(None);
            };
            match left {
                Value::Array(items) => {
                    let mut results = Vec::new();
                    for item in &items {
                        match evaluate(rhs, Some(item), root)? {
                            Some(Value::Array(nested)) => results.extend(nested),
                            Some(value) => results.push(value),
                            None => {}
                        }
                    }
                    Ok(collapse(results))
                }
                other => evaluate(rhs, Some(&other), root),
            }
        }
        Node::Filter(lhs, predicate) => {
            let Some(left) = evaluate(lhs, input, root)? else {
                return Ok(None);
            };
            let items = match left {
                Value::Array(items) => items,
                other => vec![other],
            };
            let len = items.len() as i64;
            let mut selected = Vec::new();
            for (index, item) in items.into_iter().enumerate() {
                let keep = match evaluate(predicate, Some(&item), root)? {
                    Some(Value::Number(n)) => {
                        let wanted = n.as_f64().unwrap_or(f64::NAN).floor() as i64;
                        let wanted = if wanted < 0 { len + wanted } else { wanted };
                        wanted == index as i64
                    }
                    Some(value) => to_boolean(&value),
                    None => false,
                };
                if keep {
                    selected.push(item);
                }
            }
            Ok(collapse(selected))
        }
        Node::Array(elements) => {
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                if let Some(value) = evaluate(element, input, root)? {
                    items.push(value);
                }
            }
            Ok(Some(Value::Array(items)))
        }
        Node::Negate(inner) => match evaluate(inner, input, root)? {
            None => Ok(None),
            Some(Value::Number(n)) => to_number_value(-n.as_f64().unwrap_or_default()).map(Some),
            Some(other) => Err(ExpressionError::evaluation(format!(
                "cannot negate non-numeric value {other}"
            ))),
        },
        Node::Condition(condition, then, otherwise) => {
            let test = evaluate(condition, input, root)?
                .map(|v| to_boolean(&v))
                .unwrap_or(false);
            if test {
                evaluate(then, input, root)
            } else if let Some(otherwise) = otherwise {
                evaluate(otherwise, input, root)
            } else {
                Ok(None)
            }
        }
        Node::Call(function, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, input, root)?);
            }
            function.apply(&values)
        }
        Node::Binary(op, lhs, rhs) => binary(*op, lhs, rhs, input, root),
    }
}

fn binary(op: BinaryOp, lhs: &Node, rhs: &Node, input: Option<&Value>, root: &Value) -> EvalResult {
    // Short-circuit boolean operators before evaluating the right side
    match op {
        BinaryOp::And => {
            let left = truthy(evaluate(lhs, input, root)?);
            return Ok(Some(Value::Bool(left && truthy(evaluate(rhs, input, root)?))));
        }
        BinaryOp::Or => {
            let left = truthy(evaluate(lhs, input, root)?);
            return Ok(Some(Value::Bool(left || truthy(evaluate(rhs, input, root)?))));
        }
        _ => {}
    }

    let left = evaluate(lhs, input, root)?;
    let right = evaluate(rhs, input, root)?;
    apply_binary(op, left, right)
}

/// Apply `op` to operands that are already evaluated
fn apply_binary(op: BinaryOp, left: Option<Value>, right: Option<Value>) -> EvalResult {
    match op {
        BinaryOp::Eq => Ok(Some(Value::Bool(match (&left, &right) {
            (Some(l), Some(r)) => values_equal(l, r),
            _ => false,
        }))),
        BinaryOp::Ne => Ok(Some(Value::Bool(match (&left, &right) {
            (Some(l), Some(r)) => !values_equal(l, r),
            _ => false,
        }))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (Some(l), Some(r)) = (left, right) else {
                return Ok(Some(Value::Bool(false)));
            };
            let ordering = compare(&l, &r, op)?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Some(Value::Bool(result)))
        }
        BinaryOp::In => {
            let (Some(l), Some(r)) = (left, right) else {
                return Ok(Some(Value::Bool(false)));
            };
            let found = match r {
                Value::Array(items) => items.iter().any(|item| values_equal(&l, item)),
                other => values_equal(&l, &other),
            };
            Ok(Some(Value::Bool(found)))
        }
        BinaryOp::Concat => {
            let l = left.map(|v| to_text(&v)).unwrap_or_default();
            let r = right.map(|v| to_text(&v)).unwrap_or_default();
            Ok(Some(Value::String(l + &r)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (Some(l), Some(r)) = (left, right) else {
                return Ok(None);
            };
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Err(ExpressionError::evaluation(format!(
                    "operands of '{}' must be numbers, got {l} and {r}",
                    op.symbol()
                )));
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            to_number_value(result).map(Some)
        }
        BinaryOp::And => Ok(Some(Value::Bool(truthy(left) && truthy(right)))),
        BinaryOp::Or => Ok(Some(Value::Bool(truthy(left) || truthy(right)))),
    }
}

fn field(value: &Value, name: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(name).cloned(),
        Value::Array(items) => {
            let mut results = Vec::new();
            for item in items {
                match field(item, name) {
                    Some(Value::Array(nested)) => results.extend(nested),
                    Some(v) => results.push(v),
                    None => {}
                }
            }
            collapse(results)
        }
        _ => None,
    }
}

/// Sequence semantics: nothing is undefined and a single item stands for itself
fn collapse(mut items: Vec<Value>) -> Option<Value> {
    match items.len() {
        0 => None,
        1 => items.pop(),
        _ => Some(Value::Array(items)),
    }
}

fn truthy(value: Option<Value>) -> bool {
    value.map(|v| to_boolean(&v)).unwrap_or(false)
}

/// JSONata truthiness
pub(crate) fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => items.iter().any(to_boolean),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Strings as-is, everything else as compact JSON
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Integral results become JSON integers so `1 + 1` renders as `2`, not `2.0`
pub(crate) fn to_number_value(n: f64) -> Result<Value, ExpressionError> {
    if !n.is_finite() {
        return Err(ExpressionError::evaluation(
            "number result is out of range (division by zero?)",
        ));
    }
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::evaluation("number result is not representable"))
}

pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (a, b) => a == b,
    }
}

fn compare(left: &Value, right: &Value, op: BinaryOp) -> Result<Ordering, ExpressionError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b))
            .ok_or_else(|| ExpressionError::evaluation("numbers are not comparable")),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExpressionError::evaluation(format!(
            "operands of '{}' must both be numbers or both be strings, got {left} and {right}",
            op.symbol()
        ))),
    }
}
