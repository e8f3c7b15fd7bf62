//! A small in-memory backend that executes query trees over bound sources.
//!
//! Only what the integration tests need is supported: the filter, project,
//! sort, then-sort, take, skip and count operators, string case conversion,
//! arithmetic, comparisons and record member access. Anything else is an
//! error rather than a guess.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::trace;

use expression_interceptor::ir::classify::{
    is_filter_call, is_project_call, is_skip_call, is_sort_ascending_call, is_sort_descending_call,
    is_take_call, is_then_sort_ascending_call, is_then_sort_descending_call,
};
use expression_interceptor::ir::expr_node::{
    BinaryExpr, BinaryOp, CallExpr, Expr, LambdaExpr, MemberBinding, NewArrayKind, UnaryExpr, UnaryOp,
};
use expression_interceptor::ir::identity::{ConstantValue, TypeRef};
use expression_interceptor::ir::operators::COUNT;

/// A runtime value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Char(char),
    Str(String),
    /// Named fields in declaration order.
    Record(Vec<(String, Value)>),
    Seq(Vec<Value>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(s.to_string())
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(anyhow!("expected a boolean, found {}", other)),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(anyhow!("expected an integer, found {}", other)),
        }
    }

    pub fn into_seq(self) -> Result<Vec<Value>> {
        match self {
            Value::Seq(items) => Ok(items),
            other => Err(anyhow!("expected a sequence, found {}", other)),
        }
    }

    pub fn field(&self, name: &str) -> Result<&Value> {
        match self {
            Value::Record(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value)
                .ok_or_else(|| anyhow!("record has no member {}", name)),
            other => Err(anyhow!("member {} accessed on {}", name, other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Char(c) => write!(f, "{}", c),
            Value::Str(s) => write!(f, "{}", s),
            Value::Record(fields) => {
                let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{} = {}", k, v)).collect();
                write!(f, "{{ {} }}", parts.join(", "))
            }
            Value::Seq(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Char(x), Value::Char(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Parameter bindings, innermost last. Parameters resolve by name so that
/// structurally copied trees evaluate the same as their originals.
type Env = Vec<(Option<Arc<str>>, Value)>;

/// Executes query trees against named in-memory sources.
#[derive(Default)]
pub struct Evaluator {
    sources: HashMap<String, Vec<Value>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the source called `name` to `rows`.
    pub fn bind(mut self, name: &str, rows: Vec<Value>) -> Self {
        self.sources.insert(name.to_string(), rows);
        self
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value> {
        self.eval(expr, &Env::new())
    }

    /// Evaluates a tree that must produce a sequence.
    pub fn evaluate_seq(&self, expr: &Expr) -> Result<Vec<Value>> {
        self.evaluate(expr)?.into_seq()
    }

    fn eval(&self, expr: &Expr, env: &Env) -> Result<Value> {
        match expr {
            Expr::Constant(c) => self.constant(&c.value),
            Expr::Parameter(p) => env
                .iter()
                .rev()
                .find(|(name, _)| name == &p.name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| anyhow!("unbound parameter {:?}", p.name)),
            Expr::Member(m) => match &m.expression {
                Some(target) => Ok(self.eval(target, env)?.field(m.member.name())?.clone()),
                None => bail!("static member {} is not supported", m.member.name()),
            },
            Expr::Unary(u) => self.unary(u, env),
            Expr::Binary(b) => self.binary(b, env),
            Expr::Conditional(c) => {
                if self.eval(&c.test, env)?.as_bool()? {
                    self.eval(&c.if_true, env)
                } else {
                    self.eval(&c.if_false, env)
                }
            }
            Expr::Call(c) => self.call(c, env),
            Expr::Invocation(i) => {
                let lambda = lambda_operand(&i.expression)?;
                let args = i
                    .arguments
                    .iter()
                    .map(|a| self.eval(a, env))
                    .collect::<Result<Vec<_>>>()?;
                self.apply(lambda, args, env)
            }
            Expr::NewArray(n) if n.kind == NewArrayKind::Init => Ok(Value::Seq(
                n.expressions.iter().map(|e| self.eval(e, env)).collect::<Result<_>>()?,
            )),
            Expr::New(n) => {
                let members = n
                    .members
                    .as_ref()
                    .ok_or_else(|| anyhow!("only anonymous-type construction is supported"))?;
                let mut fields = Vec::new();
                for (member, arg) in members.iter().zip(n.arguments.iter()) {
                    fields.push((member.name().to_string(), self.eval(arg, env)?));
                }
                Ok(Value::Record(fields))
            }
            Expr::MemberInit(mi) => {
                let mut fields = match self.eval(&Expr::New(mi.new_expression.clone()), env) {
                    Ok(Value::Record(fields)) => fields,
                    _ => Vec::new(),
                };
                for binding in mi.bindings.iter() {
                    match &**binding {
                        MemberBinding::Assignment { member, expression } => {
                            let value = self.eval(expression, env)?;
                            fields.retain(|(name, _)| name != member.name());
                            fields.push((member.name().to_string(), value));
                        }
                        other => bail!("{:?} bindings are not supported", other.binding_kind()),
                    }
                }
                Ok(Value::Record(fields))
            }
            Expr::Block(b) => {
                let mut value = Value::Null;
                for statement in b.expressions.iter() {
                    value = self.eval(statement, env)?;
                }
                Ok(value)
            }
            Expr::Default(d) => Ok(default_of(&d.ty)),
            other => bail!("cannot evaluate a {} node", other.variant()),
        }
    }

    fn constant(&self, value: &ConstantValue) -> Result<Value> {
        Ok(match value {
            ConstantValue::Null => Value::Null,
            ConstantValue::Bool(b) => Value::Bool(*b),
            ConstantValue::Int(i) => Value::Int(*i),
            ConstantValue::Double(d) => Value::Double(*d),
            ConstantValue::Char(c) => Value::Char(*c),
            ConstantValue::Str(s) => Value::Str(s.to_string()),
            ConstantValue::Array(items) => {
                Value::Seq(items.iter().map(|v| self.constant(v)).collect::<Result<_>>()?)
            }
            ConstantValue::Source(source) => Value::Seq(
                self.sources
                    .get(&*source.name)
                    .cloned()
                    .ok_or_else(|| anyhow!("no rows bound to source {}", source.name))?,
            ),
            ConstantValue::Type(ty) => bail!("type constant {} has no runtime value", ty),
        })
    }

    fn unary(&self, u: &UnaryExpr, env: &Env) -> Result<Value> {
        match u.op {
            UnaryOp::Quote => bail!("quoted lambda outside an operator argument"),
            UnaryOp::Not => Ok(Value::Bool(!self.eval(&u.operand, env)?.as_bool()?)),
            UnaryOp::Negate | UnaryOp::NegateChecked => match self.eval(&u.operand, env)? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Double(d) => Ok(Value::Double(-d)),
                other => bail!("cannot negate {}", other),
            },
            UnaryOp::Convert | UnaryOp::ConvertChecked | UnaryOp::UnaryPlus | UnaryOp::TypeAs => {
                self.eval(&u.operand, env)
            }
            UnaryOp::ArrayLength => Ok(Value::Int(self.eval(&u.operand, env)?.into_seq()?.len() as i64)),
            op => bail!("unsupported unary operator {:?}", op),
        }
    }

    fn binary(&self, b: &BinaryExpr, env: &Env) -> Result<Value> {
        match b.op {
            BinaryOp::AndAlso => {
                return Ok(Value::Bool(
                    self.eval(&b.left, env)?.as_bool()? && self.eval(&b.right, env)?.as_bool()?,
                ));
            }
            BinaryOp::OrElse => {
                return Ok(Value::Bool(
                    self.eval(&b.left, env)?.as_bool()? || self.eval(&b.right, env)?.as_bool()?,
                ));
            }
            BinaryOp::Coalesce => {
                return match self.eval(&b.left, env)? {
                    Value::Null => self.eval(&b.right, env),
                    value => Ok(value),
                };
            }
            _ => {}
        }

        let left = self.eval(&b.left, env)?;
        let right = self.eval(&b.right, env)?;
        Ok(match b.op {
            BinaryOp::Equal => Value::Bool(left == right),
            BinaryOp::NotEqual => Value::Bool(left != right),
            BinaryOp::LessThan => Value::Bool(compare(&left, &right) == Ordering::Less),
            BinaryOp::LessThanOrEqual => Value::Bool(compare(&left, &right) != Ordering::Greater),
            BinaryOp::GreaterThan => Value::Bool(compare(&left, &right) == Ordering::Greater),
            BinaryOp::GreaterThanOrEqual => Value::Bool(compare(&left, &right) != Ordering::Less),
            BinaryOp::Add | BinaryOp::AddChecked => match (left, right) {
                (Value::Str(l), r) => Value::Str(format!("{}{}", l, r)),
                (l, r) => Value::Int(l.as_int()?.wrapping_add(r.as_int()?)),
            },
            BinaryOp::Subtract | BinaryOp::SubtractChecked => Value::Int(left.as_int()?.wrapping_sub(right.as_int()?)),
            BinaryOp::Multiply | BinaryOp::MultiplyChecked => Value::Int(left.as_int()?.wrapping_mul(right.as_int()?)),
            BinaryOp::Divide | BinaryOp::Modulo => {
                let divisor = right.as_int()?;
                if divisor == 0 {
                    bail!("division by zero");
                }
                let dividend = left.as_int()?;
                Value::Int(if b.op == BinaryOp::Divide {
                    dividend.wrapping_div(divisor)
                } else {
                    dividend.wrapping_rem(divisor)
                })
            }
            BinaryOp::ArrayIndex => {
                let items = left.into_seq()?;
                let i = right.as_int()?;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .ok_or_else(|| anyhow!("index {} out of range", i))?
            }
            op => bail!("unsupported binary operator {:?}", op),
        })
    }

    fn call(&self, call: &CallExpr, env: &Env) -> Result<Value> {
        if let Some(object) = &call.object {
            let target = self.eval(object, env)?;
            return match (call.method.name(), target) {
                ("ToUpper", Value::Str(s)) => Ok(Value::Str(s.to_uppercase())),
                ("ToLower", Value::Str(s)) => Ok(Value::Str(s.to_lowercase())),
                ("ToString", value) => Ok(Value::Str(value.to_string())),
                (name, value) => bail!("unsupported method {} on {}", name, value),
            };
        }

        if is_filter_call(call) {
            let predicate = lambda_operand(argument(call, 1)?)?;
            let mut kept = Vec::new();
            for row in self.sequence(call, env)? {
                if self.apply(predicate, vec![row.clone()], env)?.as_bool()? {
                    kept.push(row);
                }
            }
            return Ok(Value::Seq(kept));
        }
        if is_project_call(call) {
            let projection = lambda_operand(argument(call, 1)?)?;
            let rows = self.sequence(call, env)?;
            return Ok(Value::Seq(
                rows.into_iter()
                    .map(|row| self.apply(projection, vec![row], env))
                    .collect::<Result<_>>()?,
            ));
        }
        if is_sort_ascending_call(call)
            || is_sort_descending_call(call)
            || is_then_sort_ascending_call(call)
            || is_then_sort_descending_call(call)
        {
            return self.sorted(call, env);
        }
        if is_take_call(call) || is_skip_call(call) {
            let count = usize::try_from(self.eval(argument(call, 1)?, env)?.as_int()?).unwrap_or(0);
            let rows = self.sequence(call, env)?.into_iter();
            return Ok(Value::Seq(if is_take_call(call) {
                rows.take(count).collect()
            } else {
                rows.skip(count).collect()
            }));
        }
        if call.method.generic_definition() == Some(&*COUNT) {
            return Ok(Value::Int(self.sequence(call, env)?.len() as i64));
        }
        bail!("unsupported static method {}", call.method.name())
    }

    /// Evaluates a sort together with the then-sorts stacked on top of it, so
    /// that later keys only break ties of earlier ones.
    fn sorted(&self, call: &CallExpr, env: &Env) -> Result<Value> {
        let mut keys: Vec<(&Arc<LambdaExpr>, bool)> = Vec::new();
        let mut current = call;
        loop {
            let descending = is_sort_descending_call(current) || is_then_sort_descending_call(current);
            keys.push((lambda_operand(argument(current, 1)?)?, descending));
            if !(is_then_sort_ascending_call(current) || is_then_sort_descending_call(current)) {
                break;
            }
            current = match argument(current, 0)? {
                Expr::Call(inner) => &**inner,
                _ => bail!("then-sort over an unordered source"),
            };
        }
        keys.reverse();

        let mut keyed = Vec::new();
        for row in self.sequence(current, env)? {
            let row_keys = keys
                .iter()
                .map(|(key, _)| self.apply(key, vec![row.clone()], env))
                .collect::<Result<Vec<_>>>()?;
            keyed.push((row_keys, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, (_, descending)) in keys.iter().enumerate() {
                let order = compare(&a[i], &b[i]);
                let order = if *descending { order.reverse() } else { order };
                if order != Ordering::Equal {
                    return order;
                }
            }
            Ordering::Equal
        });
        trace!(keys = keys.len(), rows = keyed.len(), "Sorted rows");
        Ok(Value::Seq(keyed.into_iter().map(|(_, row)| row).collect()))
    }

    /// The rows flowing into an operator call: its first argument.
    fn sequence(&self, call: &CallExpr, env: &Env) -> Result<Vec<Value>> {
        self.eval(argument(call, 0)?, env)?.into_seq()
    }

    fn apply(&self, lambda: &LambdaExpr, args: Vec<Value>, env: &Env) -> Result<Value> {
        if args.len() != lambda.parameters.len() {
            bail!("lambda takes {} arguments, {} given", lambda.parameters.len(), args.len());
        }
        let mut scope = env.clone();
        scope.extend(lambda.parameters.iter().map(|p| p.name.clone()).zip(args));
        self.eval(&lambda.body, &scope)
    }
}

fn argument(call: &CallExpr, index: usize) -> Result<&Expr> {
    call.arguments
        .get(index)
        .ok_or_else(|| anyhow!("{} has no argument {}", call.method.name(), index))
}

/// The lambda behind an operator argument, quoted or not.
fn lambda_operand(expr: &Expr) -> Result<&Arc<LambdaExpr>> {
    match expr {
        Expr::Lambda(lambda) => Ok(lambda),
        Expr::Unary(u) if u.op == UnaryOp::Quote => lambda_operand(&u.operand),
        other => Err(anyhow!("expected a lambda, found a {} node", other.variant())),
    }
}

fn default_of(ty: &TypeRef) -> Value {
    if ty.is_bool() {
        Value::Bool(false)
    } else if ty == &TypeRef::int32() || ty == &TypeRef::int64() {
        Value::Int(0)
    } else if ty == &TypeRef::double() {
        Value::Double(0.0)
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::fixtures;

    #[test]
    fn test_letters_query() {
        let result = fixtures::evaluator().evaluate_seq(&fixtures::letters_query()).unwrap();
        assert_eq!(result, vec![Value::str("A")]);
    }

    #[test]
    fn test_odd_values() {
        let result = fixtures::evaluator().evaluate_seq(&fixtures::odd_values_query()).unwrap();
        let expected: Vec<Value> = [1, 3, 5, 7, 9].iter().map(|i| Value::Int(*i)).collect();
        assert_eq!(result, expected);
        let first = fixtures::evaluator().evaluate_seq(&fixtures::first_odd_value_query()).unwrap();
        assert_eq!(first, vec![Value::Int(1)]);
    }

    #[test]
    fn test_unbound_source_is_an_error() {
        assert!(Evaluator::new().evaluate(&fixtures::letters_query()).is_err());
    }
}
