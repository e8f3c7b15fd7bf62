//! Property tests for structural equality and hashing.
//!
//! Random trees come from `test_utils::ir::generator`; structural copies are
//! made with `deep_copy`, which allocates a new instance for every node.

use std::sync::Arc;

use expression_interceptor::ir::expr_node::{ConstantExpr, Expr};
use expression_interceptor::ir::identity::ConstantValue;
use expression_interceptor::{Interceptor, StructuralComparer};
use quickcheck::{QuickCheck, TestResult};
use rustc_hash::FxHashSet;
use test_utils::ir::generator::{deep_copy, ArbitraryExpr};

#[test]
fn test_property_equality_is_reflexive() {
    fn prop(tree: ArbitraryExpr) -> bool {
        let comparer = StructuralComparer::new();
        comparer.equals(&tree.0, &tree.0) && tree.0 == tree.0
    }

    QuickCheck::new()
        .tests(500)
        .quickcheck(prop as fn(ArbitraryExpr) -> bool);
}

#[test]
fn test_property_copy_is_equal_with_equal_hash() {
    fn prop(tree: ArbitraryExpr) -> TestResult {
        let copy = match deep_copy(&tree.0) {
            Ok(copy) => copy,
            Err(e) => return TestResult::error(e.to_string()),
        };
        let comparer = StructuralComparer::new();
        if !comparer.equals(&tree.0, &copy) || !comparer.equals(&copy, &tree.0) {
            return TestResult::failed();
        }
        TestResult::from_bool(comparer.hash(&tree.0) == comparer.hash(&copy))
    }

    QuickCheck::new()
        .tests(500)
        .quickcheck(prop as fn(ArbitraryExpr) -> TestResult);
}

#[test]
fn test_property_copy_shares_no_instances() {
    fn prop(tree: ArbitraryExpr) -> TestResult {
        let mut interceptor = Interceptor::new();
        let copy = match deep_copy(&tree.0) {
            Ok(copy) => copy,
            Err(e) => return TestResult::error(e.to_string()),
        };
        let (Ok(original_nodes), Ok(copied_nodes)) = (interceptor.flatten(&tree.0), interceptor.flatten(&copy)) else {
            return TestResult::error("flatten failed");
        };
        let original: FxHashSet<usize> = original_nodes.iter().map(Expr::address).collect();
        TestResult::from_bool(copied_nodes.iter().all(|node| !original.contains(&node.address())))
    }

    QuickCheck::new()
        .tests(300)
        .quickcheck(prop as fn(ArbitraryExpr) -> TestResult);
}

#[test]
fn test_property_equality_is_symmetric() {
    fn prop(a: ArbitraryExpr, b: ArbitraryExpr) -> bool {
        let comparer = StructuralComparer::new();
        let ab = comparer.equals(&a.0, &b.0);
        let ba = comparer.equals(&b.0, &a.0);
        ab == ba && (!ab || comparer.hash(&a.0) == comparer.hash(&b.0))
    }

    QuickCheck::new()
        .tests(500)
        .quickcheck(prop as fn(ArbitraryExpr, ArbitraryExpr) -> bool);
}

#[test]
fn test_property_changed_constant_breaks_equality() {
    fn prop(tree: ArbitraryExpr) -> TestResult {
        let mut interceptor = Interceptor::new();
        let has_int = match interceptor.flatten(&tree.0) {
            Ok(nodes) => nodes
                .iter()
                .any(|n| matches!(n.as_constant().map(|c| &c.value), Some(ConstantValue::Int(_)))),
            Err(e) => return TestResult::error(e.to_string()),
        };
        if !has_int {
            return TestResult::discard();
        }

        let bumped = interceptor.visit_with_hook(&tree.0, |c: Arc<ConstantExpr>| {
            if let ConstantValue::Int(v) = &c.value {
                let value = ConstantValue::Int(v + 100);
                return Ok(Arc::new(ConstantExpr { ty: c.ty.clone(), value }));
            }
            Ok(c)
        });
        match bumped {
            Ok(bumped) => TestResult::from_bool(
                !Expr::ptr_eq(&bumped, &tree.0) && !StructuralComparer::new().equals(&bumped, &tree.0),
            ),
            Err(e) => TestResult::error(e.to_string()),
        }
    }

    QuickCheck::new()
        .tests(300)
        .max_tests(3000)
        .quickcheck(prop as fn(ArbitraryExpr) -> TestResult);
}

#[test]
fn test_equal_trees_collapse_in_hash_set() {
    let tree = test_utils::ir::fixtures::letters_query();
    let copy = deep_copy(&tree).unwrap();
    let mut set = FxHashSet::default();
    set.insert(tree.clone());
    set.insert(copy.clone());
    assert_eq!(set.len(), 1);
    assert!(!Expr::ptr_eq(&tree, &copy));
}
