//! Ancestor tracking shared by the comparer and the interceptor.
//!
//! A [`ContextStack`] is a cheap cloneable handle. The engine that owns it
//! pushes a frame per visited node; observers capture a clone to ask which
//! node is being visited and what encloses it. The lock is only held for the
//! duration of a single push, pop or query, never across observer calls.

use std::sync::Arc;

use parking_lot::RwLock;

use super::expr_node::Expr;

#[derive(Clone, Default)]
pub struct ContextStack {
    frames: Arc<RwLock<Vec<Expr>>>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `node` and returns a guard that pops it when dropped.
    pub fn enter(&self, node: Expr) -> ContextFrame {
        let mut frames = self.frames.write();
        let index = frames.len();
        frames.push(node);
        ContextFrame {
            stack: self.clone(),
            index,
        }
    }

    /// The node currently being visited.
    pub fn current(&self) -> Option<Expr> {
        self.frames.read().last().cloned()
    }

    /// The parent of the current node, absent at the root.
    pub fn previous(&self) -> Option<Expr> {
        let frames = self.frames.read();
        let len = frames.len();
        if len < 2 { None } else { Some(frames[len - 2].clone()) }
    }

    /// Snapshot of the stack, innermost frame first.
    pub fn ancestors(&self) -> Vec<Expr> {
        self.frames.read().iter().rev().cloned().collect()
    }

    /// True if any frame satisfies `pred`, innermost first. `pred` runs on a
    /// snapshot, so it may push or query frames itself.
    pub fn any(&self, pred: impl FnMut(&Expr) -> bool) -> bool {
        self.ancestors().iter().any(pred)
    }

    pub fn depth(&self) -> usize {
        self.frames.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.read().is_empty()
    }
}

impl std::fmt::Debug for ContextStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStack").field("depth", &self.depth()).finish()
    }
}

/// Scoped frame of a [`ContextStack`]. Dropping it pops the frame and any
/// frame above it, so unwinding out of a nested visit leaves the stack
/// consistent.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct ContextFrame {
    stack: ContextStack,
    index: usize,
}

impl ContextFrame {
    /// Swaps the node recorded for this frame, used once observers have
    /// substituted the node being visited.
    pub fn replace(&self, node: Expr) {
        let mut frames = self.stack.frames.write();
        if let Some(slot) = frames.get_mut(self.index) {
            *slot = node;
        }
    }

    pub fn depth(&self) -> usize {
        self.index + 1
    }
}

impl Drop for ContextFrame {
    fn drop(&mut self) {
        self.stack.frames.write().truncate(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::identity::ConstantValue;

    fn leaf(v: i64) -> Expr {
        Expr::constant_of(ConstantValue::Int(v))
    }

    #[test]
    fn test_current_and_previous() {
        let stack = ContextStack::new();
        assert!(stack.current().is_none());
        assert!(stack.previous().is_none());

        let root = leaf(1);
        let child = leaf(2);
        let _outer = stack.enter(root.clone());
        assert!(Expr::ptr_eq(&stack.current().unwrap(), &root));
        assert!(stack.previous().is_none());
        {
            let _inner = stack.enter(child.clone());
            assert!(Expr::ptr_eq(&stack.current().unwrap(), &child));
            assert!(Expr::ptr_eq(&stack.previous().unwrap(), &root));
            assert_eq!(stack.depth(), 2);
        }
        assert_eq!(stack.depth(), 1);
        assert!(Expr::ptr_eq(&stack.current().unwrap(), &root));
    }

    #[test]
    fn test_ancestors_innermost_first() {
        let stack = ContextStack::new();
        let nodes: Vec<Expr> = (0..3).map(leaf).collect();
        let _a = stack.enter(nodes[0].clone());
        let _b = stack.enter(nodes[1].clone());
        let _c = stack.enter(nodes[2].clone());
        let ancestors = stack.ancestors();
        assert_eq!(ancestors.len(), 3);
        assert!(Expr::ptr_eq(&ancestors[0], &nodes[2]));
        assert!(Expr::ptr_eq(&ancestors[2], &nodes[0]));
    }

    #[test]
    fn test_any_predicate_may_enter_frames() {
        let stack = ContextStack::new();
        let _root = stack.enter(leaf(1));
        let found = stack.any(|node| {
            let _nested = stack.enter(node.clone());
            stack.depth() == 2
        });
        assert!(found);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_replace_swaps_top() {
        let stack = ContextStack::new();
        let frame = stack.enter(leaf(1));
        let replacement = leaf(9);
        frame.replace(replacement.clone());
        assert!(Expr::ptr_eq(&stack.current().unwrap(), &replacement));
        drop(frame);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_dropping_outer_frame_pops_inner() {
        let stack = ContextStack::new();
        let outer = stack.enter(leaf(1));
        let inner = stack.enter(leaf(2));
        std::mem::forget(inner);
        drop(outer);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_clones_share_frames() {
        let stack = ContextStack::new();
        let observer = stack.clone();
        let _frame = stack.enter(leaf(5));
        assert_eq!(observer.depth(), 1);
    }
}
