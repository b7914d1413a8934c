//! Tree-walking interpreter over parsed expressions

use super::parser::{BinaryOp, Expr, UnaryOp};
use super::value::Value;
use crate::errors::{KeystashError, Result};
use std::cmp::Ordering;
use std::collections::HashMap;

fn error(message: impl Into<String>) -> KeystashError {
    KeystashError::evaluation(message)
}

/// Evaluates expressions against a fixed variable scope
pub struct Interpreter<'a> {
    vars: &'a HashMap<String, Value>,
}

impl<'a> Interpreter<'a> {
    pub fn new(vars: &'a HashMap<String, Value>) -> Self {
        Self { vars }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| error(format!("unknown identifier '{}'", name))),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => Ok(Value::Num(-number(&value, "-")?)),
                }
            }
            // Short-circuit: the right side is only evaluated when needed
            Expr::Binary(BinaryOp::And, left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right)
            }
            Expr::Ternary(condition, then, otherwise) => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call(name, args) => {
                let args = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>>>()?;
                call(name, args)
            }
        }
    }
}

fn number(value: &Value, op: &str) -> Result<f64> {
    match value {
        Value::Num(n) => Ok(*n),
        other => {
            Err(error(format!("operator '{}' expects a number, got {}", op, other.type_name())))
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
            (a @ Value::Str(_), b) | (a, b @ Value::Str(_)) => {
                Ok(Value::Str(format!("{}{}", a, b)))
            }
            (a, b) => Err(error(format!("cannot add {} and {}", a.type_name(), b.type_name()))),
        },
        BinaryOp::Sub => Ok(Value::Num(number(&left, "-")? - number(&right, "-")?)),
        BinaryOp::Mul => Ok(Value::Num(number(&left, "*")? * number(&right, "*")?)),
        BinaryOp::Div | BinaryOp::Rem => {
            let symbol = if op == BinaryOp::Div { "/" } else { "%" };
            let a = number(&left, symbol)?;
            let b = number(&right, symbol)?;
            if b == 0.0 {
                return Err(error("division by zero"));
            }
            Ok(Value::Num(if op == BinaryOp::Div { a / b } else { a % b }))
        }
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::And => Ok(if left.is_truthy() { right } else { left }),
        BinaryOp::Or => Ok(if left.is_truthy() { left } else { right }),
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering> {
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => {
            a.partial_cmp(b).ok_or_else(|| error("cannot compare NaN"))
        }
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (a, b) => Err(error(format!("cannot compare {} with {}", a.type_name(), b.type_name()))),
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(error(format!(
            "{}() takes {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn string_arg<'v>(name: &str, value: &'v Value) -> Result<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(error(format!("{}() expects a string, got {}", name, other.type_name()))),
    }
}

fn call(name: &str, args: Vec<Value>) -> Result<Value> {
    match name {
        "upper" | "lower" | "trim" => {
            arity(name, &args, 1)?;
            let s = string_arg(name, &args[0])?;
            Ok(Value::Str(match name {
                "upper" => s.to_uppercase(),
                "lower" => s.to_lowercase(),
                _ => s.trim().to_string(),
            }))
        }
        "len" => {
            arity(name, &args, 1)?;
            Ok(Value::Num(string_arg(name, &args[0])?.chars().count() as f64))
        }
        "string" => {
            arity(name, &args, 1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "concat" => Ok(Value::Str(args.iter().map(Value::to_string).collect())),
        "default" => {
            arity(name, &args, 2)?;
            let mut args = args.into_iter();
            let (value, fallback) = (args.next(), args.next());
            Ok(match (value, fallback) {
                (Some(v), _) if v.is_truthy() => v,
                (_, Some(f)) => f,
                _ => Value::Nil,
            })
        }
        "contains" => {
            arity(name, &args, 2)?;
            Ok(Value::Bool(string_arg(name, &args[0])?.contains(string_arg(name, &args[1])?)))
        }
        "replace" => {
            arity(name, &args, 3)?;
            let s = string_arg(name, &args[0])?;
            let from = string_arg(name, &args[1])?;
            let to = string_arg(name, &args[2])?;
            if from.is_empty() {
                return Err(error("replace() pattern must not be empty"));
            }
            Ok(Value::Str(s.replace(from, to)))
        }
        _ => Err(error(format!("unknown function '{}'", name))),
    }
}
