//! Canonical signatures of the query-operator library and builders that
//! instantiate them, the way a query producer emits operator calls.

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::expr_node::{Expr, LambdaExpr};
use super::identity::{ConstantValue, MethodRef, QuerySource, TypeRef};

/// Static class owning the standard query operators.
pub static QUERYABLE: Lazy<TypeRef> = Lazy::new(|| TypeRef::named("Queryable"));

fn tp(name: &str) -> TypeRef {
    TypeRef::named(name)
}

fn ordered(element: TypeRef) -> TypeRef {
    TypeRef::generic("IOrderedQueryable", [element])
}

fn selector(from: TypeRef, to: TypeRef) -> TypeRef {
    TypeRef::expression(TypeRef::func([from], to))
}

fn operator(name: &str, arity: usize, params: Vec<TypeRef>, ret: TypeRef) -> MethodRef {
    MethodRef::extension(QUERYABLE.clone(), name, arity, params, ret)
}

pub static WHERE: Lazy<MethodRef> = Lazy::new(|| {
    let t = tp("TSource");
    operator(
        "Where",
        1,
        vec![TypeRef::queryable(t.clone()), selector(t.clone(), TypeRef::bool())],
        TypeRef::queryable(t),
    )
});

pub static SELECT: Lazy<MethodRef> = Lazy::new(|| {
    let (t, r) = (tp("TSource"), tp("TResult"));
    operator(
        "Select",
        2,
        vec![TypeRef::queryable(t.clone()), selector(t, r.clone())],
        TypeRef::queryable(r),
    )
});

fn sort_operator(name: &str, source: fn(TypeRef) -> TypeRef) -> MethodRef {
    let (t, k) = (tp("TSource"), tp("TKey"));
    operator(name, 2, vec![source(t.clone()), selector(t.clone(), k)], ordered(t))
}

pub static ORDER_BY: Lazy<MethodRef> = Lazy::new(|| sort_operator("OrderBy", TypeRef::queryable));
pub static ORDER_BY_DESCENDING: Lazy<MethodRef> =
    Lazy::new(|| sort_operator("OrderByDescending", TypeRef::queryable));
pub static THEN_BY: Lazy<MethodRef> = Lazy::new(|| sort_operator("ThenBy", ordered));
pub static THEN_BY_DESCENDING: Lazy<MethodRef> = Lazy::new(|| sort_operator("ThenByDescending", ordered));

pub static TAKE: Lazy<MethodRef> = Lazy::new(|| {
    let t = tp("TSource");
    operator("Take", 1, vec![TypeRef::queryable(t.clone()), TypeRef::int32()], TypeRef::queryable(t))
});

pub static SKIP: Lazy<MethodRef> = Lazy::new(|| {
    let t = tp("TSource");
    operator("Skip", 1, vec![TypeRef::queryable(t.clone()), TypeRef::int32()], TypeRef::queryable(t))
});

pub static JOIN: Lazy<MethodRef> = Lazy::new(|| {
    let (outer, inner, key, result) = (tp("TOuter"), tp("TInner"), tp("TKey"), tp("TResult"));
    operator(
        "Join",
        4,
        vec![
            TypeRef::queryable(outer.clone()),
            TypeRef::enumerable(inner.clone()),
            selector(outer.clone(), key.clone()),
            selector(inner.clone(), key),
            TypeRef::expression(TypeRef::func([outer, inner], result.clone())),
        ],
        TypeRef::queryable(result),
    )
});

pub static GROUP_BY: Lazy<MethodRef> = Lazy::new(|| {
    let (t, k) = (tp("TSource"), tp("TKey"));
    operator(
        "GroupBy",
        2,
        vec![TypeRef::queryable(t.clone()), selector(t.clone(), k.clone())],
        TypeRef::queryable(TypeRef::generic("IGrouping", [k, t])),
    )
});

pub static FIRST: Lazy<MethodRef> = Lazy::new(|| {
    let t = tp("TSource");
    operator("First", 1, vec![TypeRef::queryable(t.clone())], t)
});

pub static COUNT: Lazy<MethodRef> = Lazy::new(|| {
    let t = tp("TSource");
    operator("Count", 1, vec![TypeRef::queryable(t)], TypeRef::int32())
});

pub static TO_UPPER: Lazy<MethodRef> =
    Lazy::new(|| MethodRef::instance(TypeRef::string(), "ToUpper", [], TypeRef::string()));

pub static TO_LOWER: Lazy<MethodRef> =
    Lazy::new(|| MethodRef::instance(TypeRef::string(), "ToLower", [], TypeRef::string()));

/// Root of a pipeline: a named source of `element_type` values.
pub fn query_source(name: &str, element_type: TypeRef) -> Expr {
    Expr::constant(
        ConstantValue::Source(QuerySource::new(name, element_type.clone())),
        TypeRef::queryable(element_type),
    )
}

fn element_of(source: &Expr) -> TypeRef {
    source.ty().element_type().cloned().unwrap_or_else(TypeRef::object)
}

/// `source.Where(predicate)`
pub fn where_call(source: Expr, predicate: Arc<LambdaExpr>) -> Expr {
    let t = element_of(&source);
    let method = WHERE.instantiate(
        [t.clone()],
        [TypeRef::queryable(t.clone()), predicate_type(&t)],
        TypeRef::queryable(t),
    );
    Expr::call(None, method, [source, Expr::quote(predicate)])
}

fn predicate_type(t: &TypeRef) -> TypeRef {
    selector(t.clone(), TypeRef::bool())
}

/// `source.Select(projection)`
pub fn select_call(source: Expr, projection: Arc<LambdaExpr>) -> Expr {
    let t = element_of(&source);
    let r = projection.return_type().clone();
    let method = SELECT.instantiate(
        [t.clone(), r.clone()],
        [TypeRef::queryable(t.clone()), selector(t, r.clone())],
        TypeRef::queryable(r),
    );
    Expr::call(None, method, [source, Expr::quote(projection)])
}

fn sort_call(definition: &MethodRef, source: Expr, key: Arc<LambdaExpr>, source_ty: fn(TypeRef) -> TypeRef) -> Expr {
    let t = element_of(&source);
    let k = key.return_type().clone();
    let method = definition.instantiate(
        [t.clone(), k.clone()],
        [source_ty(t.clone()), selector(t.clone(), k)],
        ordered(t),
    );
    Expr::call(None, method, [source, Expr::quote(key)])
}

/// `source.OrderBy(key)`
pub fn order_by_call(source: Expr, key: Arc<LambdaExpr>) -> Expr {
    sort_call(&ORDER_BY, source, key, TypeRef::queryable)
}

/// `source.OrderByDescending(key)`
pub fn order_by_descending_call(source: Expr, key: Arc<LambdaExpr>) -> Expr {
    sort_call(&ORDER_BY_DESCENDING, source, key, TypeRef::queryable)
}

/// `source.ThenBy(key)`; `source` must already be ordered.
pub fn then_by_call(source: Expr, key: Arc<LambdaExpr>) -> Expr {
    sort_call(&THEN_BY, source, key, ordered)
}

/// `source.ThenByDescending(key)`
pub fn then_by_descending_call(source: Expr, key: Arc<LambdaExpr>) -> Expr {
    sort_call(&THEN_BY_DESCENDING, source, key, ordered)
}

fn paging_call(definition: &MethodRef, source: Expr, count: Expr) -> Expr {
    let t = element_of(&source);
    let method = definition.instantiate(
        [t.clone()],
        [TypeRef::queryable(t.clone()), TypeRef::int32()],
        TypeRef::queryable(t),
    );
    Expr::call(None, method, [source, count])
}

/// `source.Take(count)`
pub fn take_call(source: Expr, count: Expr) -> Expr {
    paging_call(&TAKE, source, count)
}

/// `source.Skip(count)`
pub fn skip_call(source: Expr, count: Expr) -> Expr {
    paging_call(&SKIP, source, count)
}

/// `source.Count()`
pub fn count_call(source: Expr) -> Expr {
    let t = element_of(&source);
    let method = COUNT.instantiate([t.clone()], [TypeRef::queryable(t)], TypeRef::int32());
    Expr::call(None, method, [source])
}

/// `target.ToUpper()`
pub fn to_upper_call(target: Expr) -> Expr {
    Expr::call(Some(target), TO_UPPER.clone(), [])
}

/// `target.ToLower()`
pub fn to_lower_call(target: Expr) -> Expr {
    Expr::call(Some(target), TO_LOWER.clone(), [])
}
