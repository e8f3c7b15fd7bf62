//! Predicates that recognise well-known operator calls, so observers can make
//! context-aware decisions such as "only rewrite inside a filter".

use super::context::ContextStack;
use super::expr_node::{CallExpr, Expr, UnaryOp};
use super::identity::MethodRef;
use super::operators;

/// True if `call` invokes an instantiation of the generic `operator`.
fn calls_operator(call: &CallExpr, operator: &MethodRef) -> bool {
    if !call.method.is_generic() {
        return false;
    }
    let definition = call.method.generic_definition().unwrap_or(&call.method);
    definition == operator
}

pub fn is_filter_call(call: &CallExpr) -> bool {
    calls_operator(call, &operators::WHERE)
}

pub fn is_project_call(call: &CallExpr) -> bool {
    calls_operator(call, &operators::SELECT)
}

pub fn is_sort_ascending_call(call: &CallExpr) -> bool {
    calls_operator(call, &operators::ORDER_BY)
}

pub fn is_sort_descending_call(call: &CallExpr) -> bool {
    calls_operator(call, &operators::ORDER_BY_DESCENDING)
}

pub fn is_then_sort_ascending_call(call: &CallExpr) -> bool {
    calls_operator(call, &operators::THEN_BY)
}

pub fn is_then_sort_descending_call(call: &CallExpr) -> bool {
    calls_operator(call, &operators::THEN_BY_DESCENDING)
}

pub fn is_take_call(call: &CallExpr) -> bool {
    calls_operator(call, &operators::TAKE)
}

pub fn is_skip_call(call: &CallExpr) -> bool {
    calls_operator(call, &operators::SKIP)
}

/// A static extension helper defined outside the query-operator library.
pub fn is_extension_call(call: &CallExpr) -> bool {
    let method = &call.method;
    method.declaring_type() != &*operators::QUERYABLE && method.is_static() && method.is_extension()
}

/// Whether `expr` denotes a logical value: its own type is boolean, or it is
/// a unary node over a boolean operand, a call returning boolean, or a lambda
/// whose body is boolean.
pub fn is_boolean_valued(expr: &Expr) -> bool {
    let by_shape = match expr {
        Expr::Unary(u) => is_boolean_valued(&u.operand),
        Expr::Call(c) => c.method.return_type().is_bool(),
        Expr::Lambda(l) => l.body.ty().is_bool(),
        _ => false,
    };
    by_shape || expr.ty().is_bool()
}

/// True if `expr` is a quoted lambda, the form predicates and selectors take
/// as operator arguments.
pub fn is_quoted_lambda(expr: &Expr) -> bool {
    matches!(expr, Expr::Unary(u) if u.op == UnaryOp::Quote && matches!(u.operand, Expr::Lambda(_)))
}

/// True if any node on `context` is a filter call.
pub fn is_inside_filter(context: &ContextStack) -> bool {
    context.any(|node| matches!(node, Expr::Call(call) if is_filter_call(call)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::identity::{ConstantValue, MemberRef, TypeRef};
    use crate::ir::operators::*;

    fn record() -> TypeRef {
        TypeRef::named("Record")
    }

    fn identity_key() -> std::sync::Arc<crate::ir::expr_node::LambdaExpr> {
        let x = Expr::parameter(record(), "x");
        let a = MemberRef::property(record(), "A", TypeRef::int32());
        Expr::lambda(Expr::property(Some(Expr::Parameter(x.clone())), a), [x])
    }

    fn call(expr: &Expr) -> &CallExpr {
        expr.as_call().unwrap()
    }

    #[test]
    fn test_operator_calls_classified() {
        let source = query_source("records", record());
        let sorted = order_by_call(source.clone(), identity_key());
        let desc = order_by_descending_call(source.clone(), identity_key());
        let then = then_by_call(sorted.clone(), identity_key());
        let then_desc = then_by_descending_call(sorted.clone(), identity_key());
        let take = take_call(source.clone(), Expr::constant_of(ConstantValue::Int(3)));
        let skip = skip_call(source.clone(), Expr::constant_of(ConstantValue::Int(3)));
        let select = select_call(source, identity_key());

        assert!(is_sort_ascending_call(call(&sorted)) && !is_sort_descending_call(call(&sorted)));
        assert!(is_sort_descending_call(call(&desc)));
        assert!(is_then_sort_ascending_call(call(&then)));
        assert!(is_then_sort_descending_call(call(&then_desc)));
        assert!(is_take_call(call(&take)) && !is_skip_call(call(&take)));
        assert!(is_skip_call(call(&skip)));
        assert!(is_project_call(call(&select)) && !is_filter_call(call(&select)));
    }

    #[test]
    fn test_non_generic_method_never_matches() {
        let fake = MethodRef::static_method(
            (*QUERYABLE).clone(),
            "Where",
            [TypeRef::queryable(record())],
            TypeRef::queryable(record()),
        );
        let expr = Expr::call(None, fake, [query_source("records", record())]);
        assert!(!is_filter_call(call(&expr)));
    }

    #[test]
    fn test_extension_call() {
        let helper = MethodRef::extension(TypeRef::named("StringHelpers"), "Shout", 0, [TypeRef::string()], TypeRef::string());
        let s = Expr::constant_of(ConstantValue::str("a"));
        assert!(is_extension_call(call(&Expr::call(None, helper, [s.clone()]))));
        assert!(!is_extension_call(call(&to_upper_call(s.clone()))));
        assert!(!is_extension_call(call(&take_call(
            query_source("letters", TypeRef::string()),
            Expr::constant_of(ConstantValue::Int(1)),
        ))));
    }

    #[test]
    fn test_boolean_valued() {
        let flag = Expr::constant_of(ConstantValue::Bool(true));
        assert!(is_boolean_valued(&flag));
        assert!(is_boolean_valued(&Expr::convert(flag.clone(), TypeRef::object())));
        assert!(!is_boolean_valued(&Expr::constant_of(ConstantValue::Int(1))));
        let x = Expr::parameter(record(), "x");
        let predicate = Expr::Lambda(Expr::lambda(flag, [x]));
        assert!(is_boolean_valued(&predicate));
        assert!(!is_boolean_valued(&Expr::Lambda(identity_key())));
    }

    #[test]
    fn test_inside_filter() {
        let stack = ContextStack::new();
        assert!(!is_inside_filter(&stack));
        let x = Expr::parameter(record(), "x");
        let predicate = Expr::lambda(Expr::constant_of(ConstantValue::Bool(true)), [x]);
        let filter = where_call(query_source("records", record()), predicate.clone());
        let _outer = stack.enter(filter);
        let _inner = stack.enter(Expr::Lambda(predicate));
        assert!(is_inside_filter(&stack));
        assert!(is_quoted_lambda(&stack.ancestors()[1].as_call().unwrap().arguments[1]));
    }
}
