use core::fmt;
use std::sync::Arc;

use async_recursion::async_recursion;
use serde::{Deserialize, Serialize};

use super::context::ExecutionContext;
use super::evaluator::{EvalError, EvalResult};
use crate::ast::{BinaryOperator, Expression, Literal, UnaryOperator};

// Runtime value system of the fragment language.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    // Return value of statements and side-effecting calls
    Unit,
    #[default]
    Null,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::List(_) => "list",
            Value::Unit => "unit",
            Value::Null => "null",
        }
    }

    /// Conditions must be booleans; there is no implicit truthiness.
    pub fn as_bool(&self) -> EvalResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(EvalError::TypeMismatch {
                expected: "boolean".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            _ => write!(f, "{:?}", self),
        }
    }
}

pub struct ExpressionEvaluator;

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    #[async_recursion]
    pub async fn eval_expression(
        &self,
        expr: &Expression,
        context: Arc<ExecutionContext>,
    ) -> EvalResult<Value> {
        match expr {
            Expression::Literal(lit) => Ok(Self::eval_literal(lit)),
            Expression::Variable(name) => context.lookup_local(name).await,
            Expression::SharedAccess(name) => context.shared_get(name),
            Expression::List(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    list.push(self.eval_expression(item, context.clone()).await?);
                }
                Ok(Value::List(list))
            }
            Expression::FunctionCall {
                function,
                arguments,
            } => self.eval_function_call(function, arguments, context).await,
            Expression::BinaryOp { op, left, right } => {
                self.eval_binary_op(*op, left, right, context).await
            }
            Expression::UnaryOp { op, expr } => {
                let value = self.eval_expression(expr, context).await?;
                Self::apply_unary(*op, value)
            }
        }
    }

    fn eval_literal(lit: &Literal) -> Value {
        match lit {
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
        }
    }

    async fn eval_binary_op(
        &self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        context: Arc<ExecutionContext>,
    ) -> EvalResult<Value> {
        // && and || short-circuit; everything else evaluates both sides.
        match op {
            BinaryOperator::And => {
                let lhs = self.eval_expression(left, context.clone()).await?;
                if !lhs.as_bool()? {
                    return Ok(Value::Boolean(false));
                }
                let rhs = self.eval_expression(right, context).await?;
                Ok(Value::Boolean(rhs.as_bool()?))
            }
            BinaryOperator::Or => {
                let lhs = self.eval_expression(left, context.clone()).await?;
                if lhs.as_bool()? {
                    return Ok(Value::Boolean(true));
                }
                let rhs = self.eval_expression(right, context).await?;
                Ok(Value::Boolean(rhs.as_bool()?))
            }
            _ => {
                let lhs = self.eval_expression(left, context.clone()).await?;
                let rhs = self.eval_expression(right, context).await?;
                Self::apply_binary(op, lhs, rhs)
            }
        }
    }

    fn apply_binary(op: BinaryOperator, lhs: Value, rhs: Value) -> EvalResult<Value> {
        use BinaryOperator::*;
        match op {
            Add => match (&lhs, &rhs) {
                (Value::String(a), Value::String(b)) => {
                    Ok(Value::String(format!("{}{}", a, b)))
                }
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
                _ => Self::numeric_op(op, &lhs, &rhs, |a, b| a + b),
            },
            Subtract => match (&lhs, &rhs) {
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a - b)),
                _ => Self::numeric_op(op, &lhs, &rhs, |a, b| a - b),
            },
            Multiply => match (&lhs, &rhs) {
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a * b)),
                _ => Self::numeric_op(op, &lhs, &rhs, |a, b| a * b),
            },
            Divide => match (&lhs, &rhs) {
                (Value::Integer(_), Value::Integer(0)) => Err(EvalError::DivisionByZero),
                (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a / b)),
                _ => Self::numeric_op(op, &lhs, &rhs, |a, b| a / b),
            },
            Equal => Ok(Value::Boolean(Self::values_equal(&lhs, &rhs))),
            NotEqual => Ok(Value::Boolean(!Self::values_equal(&lhs, &rhs))),
            LessThan => Self::compare(op, &lhs, &rhs, |ord| ord == std::cmp::Ordering::Less),
            LessThanEqual => {
                Self::compare(op, &lhs, &rhs, |ord| ord != std::cmp::Ordering::Greater)
            }
            GreaterThan => {
                Self::compare(op, &lhs, &rhs, |ord| ord == std::cmp::Ordering::Greater)
            }
            GreaterThanEqual => {
                Self::compare(op, &lhs, &rhs, |ord| ord != std::cmp::Ordering::Less)
            }
            And | Or => Err(EvalError::InvalidOperation(format!(
                "{} is handled before operand evaluation",
                op
            ))),
        }
    }

    fn numeric_op(
        op: BinaryOperator,
        lhs: &Value,
        rhs: &Value,
        apply: fn(f64, f64) -> f64,
    ) -> EvalResult<Value> {
        match (lhs.as_numeric(), rhs.as_numeric()) {
            (Some(a), Some(b)) => Ok(Value::Float(apply(a, b))),
            _ => Err(EvalError::InvalidOperation(format!(
                "cannot apply {} to {} and {}",
                op,
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }

    // Numeric comparisons promote across integer/float; everything else
    // needs identical types.
    fn values_equal(lhs: &Value, rhs: &Value) -> bool {
        match (lhs.as_numeric(), rhs.as_numeric()) {
            (Some(a), Some(b)) => a == b,
            _ => lhs == rhs,
        }
    }

    fn compare(
        op: BinaryOperator,
        lhs: &Value,
        rhs: &Value,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> EvalResult<Value> {
        let ordering = match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => match (lhs.as_numeric(), rhs.as_numeric()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        match ordering {
            Some(ord) => Ok(Value::Boolean(accept(ord))),
            None => Err(EvalError::InvalidOperation(format!(
                "cannot apply {} to {} and {}",
                op,
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }

    fn apply_unary(op: UnaryOperator, value: Value) -> EvalResult<Value> {
        match op {
            UnaryOperator::Not => Ok(Value::Boolean(!value.as_bool()?)),
            UnaryOperator::Negate => match value {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(EvalError::InvalidOperation(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
        }
    }

    async fn eval_function_call(
        &self,
        function: &str,
        arguments: &[Expression],
        context: Arc<ExecutionContext>,
    ) -> EvalResult<Value> {
        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.eval_expression(argument, context.clone()).await?);
        }

        // Core builtins are always bound; capability functions arrive via `use`.
        match function {
            "len" => builtin_len(&args),
            "str" => builtin_str(&args),
            "contains" => builtin_contains(&args),
            "reply" => {
                expect_arity("reply", &args, 1)?;
                let text = match &args[0] {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                context.reply(&text).await?;
                Ok(Value::Unit)
            }
            _ => match context.lookup_function(function).await {
                Some(native) => native(&args),
                None => Err(EvalError::UnknownFunction(function.to_string())),
            },
        }
    }
}

fn expect_arity(function: &str, args: &[Value], expected: usize) -> EvalResult<()> {
    if args.len() != expected {
        return Err(EvalError::ArityMismatch {
            function: function.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn builtin_len(args: &[Value]) -> EvalResult<Value> {
    expect_arity("len", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Integer(items.len() as i64)),
        other => Err(EvalError::TypeMismatch {
            expected: "string or list".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}

fn builtin_str(args: &[Value]) -> EvalResult<Value> {
    expect_arity("str", args, 1)?;
    Ok(Value::String(args[0].to_string()))
}

fn builtin_contains(args: &[Value]) -> EvalResult<Value> {
    expect_arity("contains", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::String(haystack), Value::String(needle)) => {
            Ok(Value::Boolean(haystack.contains(needle.as_str())))
        }
        (Value::List(items), needle) => Ok(Value::Boolean(items.contains(needle))),
        (other, _) => Err(EvalError::TypeMismatch {
            expected: "string or list".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}
