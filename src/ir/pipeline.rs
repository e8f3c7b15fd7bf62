use std::marker::PhantomData;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::expr_node::Expr;
use super::interceptor::{Hookable, Interceptor};
use crate::error::{InterceptError, Result};

/// One rewrite step over a whole tree.
pub trait RewritePass: Send + Sync {
    fn rewrite(&self, interceptor: &mut Interceptor, tree: &Expr) -> Result<Expr>;
}

/// A pass made of a single observer, scoped to one traversal per run.
pub struct HookPass<T, F> {
    hook: F,
    _slot: PhantomData<fn(T) -> T>,
}

impl<T, F> HookPass<T, F>
where
    T: Hookable,
    F: Fn(T) -> anyhow::Result<T> + Clone + Send + Sync + 'static,
{
    pub fn new(hook: F) -> Self {
        HookPass {
            hook,
            _slot: PhantomData,
        }
    }
}

impl<T, F> RewritePass for HookPass<T, F>
where
    T: Hookable,
    F: Fn(T) -> anyhow::Result<T> + Clone + Send + Sync + 'static,
{
    fn rewrite(&self, interceptor: &mut Interceptor, tree: &Expr) -> Result<Expr> {
        interceptor.visit_with_hook::<T>(tree, self.hook.clone())
    }
}

/// A named pass and the passes that must run before it.
#[derive(Clone)]
pub struct Pass {
    pub id: String,
    pub dependencies: Vec<String>,
    pub rewrite: Arc<dyn RewritePass>,
}

impl Pass {
    pub fn new(id: &str, dependencies: &[&str], rewrite: impl RewritePass + 'static) -> Self {
        Pass {
            id: id.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            rewrite: Arc::new(rewrite),
        }
    }
}

/// Rewrite passes organised in a dependency graph and executed in
/// topological order, each feeding its output tree to the next.
#[derive(Default)]
pub struct Pipeline {
    graph: StableGraph<Pass, ()>,
    node_indices: FxHashMap<String, NodeIndex>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Adds a pass. Dependencies may name passes added later; a pass with an
    /// id already present replaces it.
    pub fn add_pass(&mut self, pass: Pass) {
        self.remove_pass(&pass.id);
        let id = pass.id.clone();
        let node = self.graph.add_node(pass);

        for dep_id in self.graph[node].dependencies.clone() {
            if let Some(&dep) = self.node_indices.get(&dep_id) {
                self.graph.add_edge(dep, node, ());
            }
        }
        let dependents: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&other| other != node && self.graph[other].dependencies.contains(&id))
            .collect();
        for dependent in dependents {
            self.graph.add_edge(node, dependent, ());
        }
        self.node_indices.insert(id, node);
    }

    pub fn remove_pass(&mut self, id: &str) -> bool {
        match self.node_indices.remove(id) {
            Some(node) => self.graph.remove_node(node).is_some(),
            None => false,
        }
    }

    /// Pass ids in execution order.
    pub fn order(&self) -> Result<Vec<String>> {
        Ok(self.sorted()?.into_iter().map(|idx| self.graph[idx].id.clone()).collect())
    }

    fn sorted(&self) -> Result<Vec<NodeIndex>> {
        for idx in self.graph.node_indices() {
            let pass = &self.graph[idx];
            if let Some(missing) = pass.dependencies.iter().find(|d| !self.node_indices.contains_key(*d)) {
                return Err(InterceptError::UnknownPass { pass: missing.clone() });
            }
        }
        toposort(&self.graph, None).map_err(|cycle| InterceptError::PipelineCycle {
            pass: self.graph[cycle.node_id()].id.clone(),
        })
    }

    /// Runs every pass over `tree` in dependency order.
    pub fn apply(&self, interceptor: &mut Interceptor, tree: &Expr) -> Result<Expr> {
        let mut current = tree.clone();
        for idx in self.sorted()? {
            let pass = &self.graph[idx];
            let next = pass.rewrite.rewrite(interceptor, &current)?;
            debug!(pass = %pass.id, changed = !Expr::ptr_eq(&next, &current), "Applied rewrite pass");
            current = next;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr_node::{BinaryExpr, BinaryOp, ConstantExpr};
    use crate::ir::identity::{ConstantValue, TypeRef};

    fn int(v: i64) -> Expr {
        Expr::constant_of(ConstantValue::Int(v))
    }

    fn bump(by: i64) -> HookPass<Arc<ConstantExpr>, impl Fn(Arc<ConstantExpr>) -> anyhow::Result<Arc<ConstantExpr>> + Clone + Send + Sync + 'static> {
        HookPass::new(move |c: Arc<ConstantExpr>| {
            let value = match &c.value {
                ConstantValue::Int(v) => ConstantValue::Int(v * 10 + by),
                other => other.clone(),
            };
            Ok(Arc::new(ConstantExpr { ty: c.ty.clone(), value }))
        })
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = Pipeline::new();
        let tree = int(1);
        let result = pipeline.apply(&mut Interceptor::new(), &tree).unwrap();
        assert!(Expr::ptr_eq(&tree, &result));
    }

    #[test]
    fn test_dependencies_order_passes() {
        let mut pipeline = Pipeline::new();
        pipeline.add_pass(Pass::new("second", &["first"], bump(2)));
        pipeline.add_pass(Pass::new("first", &[], bump(1)));
        assert_eq!(pipeline.order().unwrap(), vec!["first".to_string(), "second".to_string()]);

        let mut interceptor = Interceptor::new();
        let result = pipeline.apply(&mut interceptor, &int(0)).unwrap();
        assert_eq!(result, int(12));
        assert_eq!(interceptor.observer_count(), 0);
    }

    #[test]
    fn test_cycle_reported() {
        let mut pipeline = Pipeline::new();
        pipeline.add_pass(Pass::new("a", &["b"], bump(1)));
        pipeline.add_pass(Pass::new("b", &["a"], bump(2)));
        let err = pipeline.apply(&mut Interceptor::new(), &int(0)).unwrap_err();
        assert!(matches!(err, InterceptError::PipelineCycle { .. }));
    }

    #[test]
    fn test_unknown_dependency_reported() {
        let mut pipeline = Pipeline::new();
        pipeline.add_pass(Pass::new("a", &["missing"], bump(1)));
        match pipeline.order() {
            Err(InterceptError::UnknownPass { pass }) => assert_eq!(pass, "missing"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_remove_pass_keeps_others_addressable() {
        let mut pipeline = Pipeline::new();
        pipeline.add_pass(Pass::new("a", &[], bump(1)));
        pipeline.add_pass(Pass::new("b", &[], bump(2)));
        pipeline.add_pass(Pass::new("c", &["b"], bump(3)));
        assert!(pipeline.remove_pass("a"));
        assert!(!pipeline.remove_pass("a"));
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.order().unwrap(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_binary_operator_pass() {
        let flip = HookPass::new(|b: Arc<BinaryExpr>| {
            if b.op != BinaryOp::Equal {
                return Ok(b);
            }
            Ok(Arc::new(BinaryExpr {
                op: BinaryOp::NotEqual,
                ..(*b).clone()
            }))
        });
        let mut pipeline = Pipeline::new();
        pipeline.add_pass(Pass::new("flip", &[], flip));
        let tree = Expr::equal(int(1), int(2));
        let result = pipeline.apply(&mut Interceptor::new(), &tree).unwrap();
        assert_eq!(result, Expr::not_equal(int(1), int(2)));
        assert_eq!(result.ty(), &TypeRef::bool());
    }
}
