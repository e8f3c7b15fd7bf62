//! Canned data sources and query trees shared by integration tests and
//! benchmarks.
//!
//! Two sources are provided: `letters` holds the strings "A", "B" and "C",
//! and `records` holds ten records `{ A = i, B = i % 2 == 0, C = i.ToString() }`
//! for `i` in `0..10`.

use std::sync::Arc;

use expression_interceptor::ir::expr_node::{Expr, LambdaExpr, ParameterExpr};
use expression_interceptor::ir::identity::{ConstantValue, MemberRef, MethodRef, TypeRef};
use expression_interceptor::ir::operators::{
    order_by_call, order_by_descending_call, query_source, select_call, take_call, to_upper_call, where_call,
};

use super::evaluator::{Evaluator, Value};

pub const LETTERS: &str = "letters";
pub const RECORDS: &str = "records";

pub fn record_type() -> TypeRef {
    TypeRef::named("Record")
}

pub fn member_a() -> MemberRef {
    MemberRef::property(record_type(), "A", TypeRef::int32())
}

pub fn member_b() -> MemberRef {
    MemberRef::property(record_type(), "B", TypeRef::bool())
}

pub fn member_c() -> MemberRef {
    MemberRef::property(record_type(), "C", TypeRef::string())
}

/// `Int32.ToString()`
pub fn int_to_string() -> MethodRef {
    MethodRef::instance(TypeRef::int32(), "ToString", [], TypeRef::string())
}

/// A fresh `x` parameter of the record type.
pub fn record_param() -> Arc<ParameterExpr> {
    Expr::parameter(record_type(), "x")
}

/// `x => x.<member>` for one of the record members.
pub fn record_selector(member: MemberRef) -> Arc<LambdaExpr> {
    let x = record_param();
    Expr::lambda(Expr::property(Some(Expr::Parameter(x.clone())), member), [x])
}

pub fn letters() -> Vec<Value> {
    ["A", "B", "C"].iter().map(|s| Value::str(s)).collect()
}

pub fn record(i: i64) -> Value {
    Value::Record(vec![
        ("A".to_string(), Value::Int(i)),
        ("B".to_string(), Value::Bool(i % 2 == 0)),
        ("C".to_string(), Value::Str(i.to_string())),
    ])
}

pub fn ten_records() -> Vec<Value> {
    (0..10).map(record).collect()
}

/// An evaluator with both sources bound.
pub fn evaluator() -> Evaluator {
    Evaluator::new()
        .bind(LETTERS, letters())
        .bind(RECORDS, ten_records())
}

/// `letters.Where(x => x == "A").OrderByDescending(x => x).Select(x => x.ToUpper())`
pub fn letters_query() -> Expr {
    let source = query_source(LETTERS, TypeRef::string());

    let x = Expr::parameter(TypeRef::string(), "x");
    let is_a = Expr::lambda(
        Expr::equal(Expr::Parameter(x.clone()), Expr::constant_of(ConstantValue::str("A"))),
        [x],
    );
    let filtered = where_call(source, is_a);

    let x = Expr::parameter(TypeRef::string(), "x");
    let sorted = order_by_descending_call(filtered, Expr::lambda(Expr::Parameter(x.clone()), [x]));

    let x = Expr::parameter(TypeRef::string(), "x");
    select_call(sorted, Expr::lambda(to_upper_call(Expr::Parameter(x.clone())), [x]))
}

/// `records.Where(x => !x.B).Select(x => x.A)`
pub fn odd_values_query() -> Expr {
    let x = record_param();
    let not_even = Expr::lambda(
        Expr::not(Expr::property(Some(Expr::Parameter(x.clone())), member_b())),
        [x],
    );
    let filtered = where_call(query_source(RECORDS, record_type()), not_even);
    select_call(filtered, record_selector(member_a()))
}

/// `records.Where(x => !x.B).Select(x => x.A).OrderBy(x => x.ToString()).Take(1)`
pub fn first_odd_value_query() -> Expr {
    let v = Expr::parameter(TypeRef::int32(), "x");
    let as_text = Expr::lambda(Expr::call(Some(Expr::Parameter(v.clone())), int_to_string(), []), [v]);
    let sorted = order_by_call(odd_values_query(), as_text);
    take_call(sorted, Expr::constant_of(ConstantValue::Int(1)))
}
