//! End-to-end rewrites of query pipelines, checked by executing the trees
//! with the in-memory evaluator from `test_utils`.

use std::sync::Arc;

use anyhow::anyhow;
use expression_interceptor::ir::classify::{
    is_filter_call, is_inside_filter, is_quoted_lambda, is_sort_descending_call, is_then_sort_descending_call,
};
use expression_interceptor::ir::expr_node::{BinaryExpr, BinaryOp, CallExpr, ConstantExpr, Expr, UnaryOp};
use expression_interceptor::ir::identity::ConstantValue;
use expression_interceptor::ir::operators::{
    order_by_call, query_source, select_call, then_by_call, then_by_descending_call, to_lower_call, TO_LOWER,
};
use expression_interceptor::ir::pipeline::{HookPass, Pass, Pipeline};
use expression_interceptor::{logging, Interceptor};
use test_utils::ir::evaluator::Value;
use test_utils::ir::fixtures::{self, member_a, member_b, record_selector, record_type, RECORDS};

fn upper_to_lower(c: Arc<CallExpr>) -> anyhow::Result<Arc<CallExpr>> {
    if c.method.name() != "ToUpper" {
        return Ok(c);
    }
    let object = c.object.clone().ok_or_else(|| anyhow!("ToUpper without a receiver"))?;
    to_lower_call(object)
        .as_call()
        .cloned()
        .ok_or_else(|| anyhow!("ToLower builder did not produce a call"))
}

fn equal_to_not_equal(b: Arc<BinaryExpr>) -> anyhow::Result<Arc<BinaryExpr>> {
    if b.op != BinaryOp::Equal {
        return Ok(b);
    }
    Ok(Arc::new(BinaryExpr {
        op: BinaryOp::NotEqual,
        ..(*b).clone()
    }))
}

fn strings(values: &[&str]) -> Vec<Value> {
    values.iter().map(|s| Value::str(s)).collect()
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|i| Value::Int(*i)).collect()
}

#[test]
fn test_letters_rewritten_to_lowercase_inequality() {
    let evaluator = fixtures::evaluator();
    let query = fixtures::letters_query();
    assert_eq!(evaluator.evaluate_seq(&query).unwrap(), strings(&["A"]));

    let mut interceptor = Interceptor::new();
    let lowered = interceptor.visit_with_hook(&query, upper_to_lower).unwrap();
    let rewritten = interceptor.visit_with_hook(&lowered, equal_to_not_equal).unwrap();

    assert_eq!(evaluator.evaluate_seq(&rewritten).unwrap(), strings(&["c", "b"]));
    // The source tree is untouched.
    assert_eq!(evaluator.evaluate_seq(&query).unwrap(), strings(&["A"]));
    assert_eq!(
        rewritten.to_string(),
        "Select(OrderByDescending(Where(letters, x => (x != \"A\")), x => x), x => x.ToLower())"
    );
}

#[test]
fn test_flatten_letters_query() {
    let query = fixtures::letters_query();
    let nodes = Interceptor::new().flatten(&query).unwrap();
    assert_eq!(nodes.len(), 16);
    assert!(Expr::ptr_eq(nodes.last().unwrap(), &query));

    let calls: Vec<&Arc<CallExpr>> = nodes.iter().filter_map(Expr::as_call).collect();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls.iter().filter(|c| is_filter_call(c)).count(), 1);
    assert_eq!(calls.iter().filter(|c| is_sort_descending_call(c)).count(), 1);
    assert_eq!(nodes.iter().filter(|n| is_quoted_lambda(n)).count(), 3);
}

#[test]
fn test_removing_negation_flips_filter() {
    let evaluator = fixtures::evaluator();
    let query = fixtures::odd_values_query();
    assert_eq!(evaluator.evaluate_seq(&query).unwrap(), ints(&[1, 3, 5, 7, 9]));

    let mut interceptor = Interceptor::new();
    let without_not = interceptor
        .visit_with_hook(&query, |node: Expr| {
            if let Expr::Unary(u) = &node {
                if u.op == UnaryOp::Not {
                    return Ok(u.operand.clone());
                }
            }
            Ok(node)
        })
        .unwrap();
    assert_eq!(evaluator.evaluate_seq(&without_not).unwrap(), ints(&[0, 2, 4, 6, 8]));
}

#[test]
fn test_first_odd_value_by_text() {
    let evaluator = fixtures::evaluator();
    assert_eq!(
        evaluator.evaluate_seq(&fixtures::first_odd_value_query()).unwrap(),
        ints(&[1])
    );
}

#[test]
fn test_rewrite_only_inside_filter() {
    let query = fixtures::letters_query();
    let mut interceptor = Interceptor::new();
    let context = interceptor.context().clone();
    let rewritten = interceptor
        .visit_with_hook(&query, move |c: Arc<ConstantExpr>| {
            let is_a = matches!(&c.value, ConstantValue::Str(s) if &**s == "A");
            if !is_a || !is_inside_filter(&context) {
                return Ok(c);
            }
            Ok(Arc::new(ConstantExpr {
                ty: c.ty.clone(),
                value: ConstantValue::str("B"),
            }))
        })
        .unwrap();

    assert_eq!(fixtures::evaluator().evaluate_seq(&rewritten).unwrap(), strings(&["B"]));
}

#[test]
fn test_then_sort_direction_rewrite() {
    let sorted = order_by_call(query_source(RECORDS, record_type()), record_selector(member_b()));
    let query = select_call(
        then_by_descending_call(sorted, record_selector(member_a())),
        record_selector(member_a()),
    );
    let evaluator = fixtures::evaluator();
    assert_eq!(
        evaluator.evaluate_seq(&query).unwrap(),
        ints(&[9, 7, 5, 3, 1, 8, 6, 4, 2, 0])
    );

    let mut interceptor = Interceptor::new();
    let ascending = interceptor
        .visit_with_hook(&query, |c: Arc<CallExpr>| {
            if !is_then_sort_descending_call(&c) {
                return Ok(c);
            }
            let key = match c.arguments.get(1) {
                Some(Expr::Unary(quote)) => quote.operand.as_lambda().cloned(),
                _ => None,
            }
            .ok_or_else(|| anyhow!("then-sort without a quoted key"))?;
            let source = c.arguments.get(0).cloned().ok_or_else(|| anyhow!("then-sort without a source"))?;
            then_by_call(source, key)
                .as_call()
                .cloned()
                .ok_or_else(|| anyhow!("then-sort builder did not produce a call"))
        })
        .unwrap();

    assert_eq!(
        evaluator.evaluate_seq(&ascending).unwrap(),
        ints(&[1, 3, 5, 7, 9, 0, 2, 4, 6, 8])
    );
}

#[test]
fn test_pipeline_runs_passes_in_dependency_order() {
    logging::init_logger(true, Some("debug")).unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add_pass(Pass::new("negate", &["lower"], HookPass::new(equal_to_not_equal)));
    pipeline.add_pass(Pass::new("lower", &[], HookPass::new(upper_to_lower)));
    assert_eq!(pipeline.order().unwrap(), vec!["lower".to_string(), "negate".to_string()]);

    let mut interceptor = Interceptor::new();
    let rewritten = pipeline.apply(&mut interceptor, &fixtures::letters_query()).unwrap();
    assert_eq!(
        fixtures::evaluator().evaluate_seq(&rewritten).unwrap(),
        strings(&["c", "b"])
    );
    assert_eq!(interceptor.observer_count(), 0);

    let lowered = rewritten
        .as_call()
        .and_then(|select| select.arguments.get(1))
        .and_then(|quote| quote.children().pop())
        .and_then(|lambda| lambda.as_lambda().map(|l| l.body.clone()))
        .unwrap();
    assert_eq!(lowered.as_call().unwrap().method, *TO_LOWER);
}
