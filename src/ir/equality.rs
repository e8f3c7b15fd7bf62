//! Structural equality and hashing of expression trees.
//!
//! Two trees are equal when they have the same node kinds, result types,
//! distinguishing fields and children, in the same order. Node identity never
//! matters except as a fast path. Parameters compare by type and by-ref flag,
//! not by name, so `x => x.B` and `y => y.B` over the same record type are
//! equal.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use super::context::ContextStack;
use super::expr_node::*;

/// Comparer that records the node under comparison on its own context stack.
#[derive(Clone, Default, Debug)]
pub struct StructuralComparer {
    context: ContextStack,
}

impl StructuralComparer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames pushed while comparing or hashing (left operand for `equals`).
    pub fn context(&self) -> &ContextStack {
        &self.context
    }

    pub fn equals(&self, a: &Expr, b: &Expr) -> bool {
        Walk::tracked(&self.context).eq_expr(a, b)
    }

    pub fn equals_opt(&self, a: Option<&Expr>, b: Option<&Expr>) -> bool {
        Walk::tracked(&self.context).eq_opt(a, b)
    }

    pub fn hash(&self, expr: &Expr) -> u64 {
        let mut hasher = FxHasher::default();
        Walk::tracked(&self.context).hash_expr(expr, &mut hasher);
        hasher.finish()
    }

    pub fn hash_opt(&self, expr: Option<&Expr>) -> u64 {
        let mut hasher = FxHasher::default();
        Walk::tracked(&self.context).hash_opt(expr, &mut hasher);
        hasher.finish()
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Walk::untracked().eq_expr(self, other)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Walk::untracked().hash_expr(self, state);
    }
}

struct Walk<'a> {
    context: Option<&'a ContextStack>,
}

impl<'a> Walk<'a> {
    fn tracked(context: &'a ContextStack) -> Self {
        Walk { context: Some(context) }
    }

    fn untracked() -> Self {
        Walk { context: None }
    }

    fn eq_opt(&self, a: Option<&Expr>, b: Option<&Expr>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.eq_expr(a, b),
            _ => false,
        }
    }

    fn eq_list(&self, a: &ExprVector, b: &ExprVector) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| self.eq_expr(a, b))
    }

    fn eq_params(&self, a: &ParameterVector, b: &ParameterVector) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| self.eq_param(a, b))
    }

    fn eq_param(&self, a: &ParameterExpr, b: &ParameterExpr) -> bool {
        a.ty == b.ty && a.is_by_ref == b.is_by_ref
    }

    fn eq_param_opt(&self, a: &Option<Arc<ParameterExpr>>, b: &Option<Arc<ParameterExpr>>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.eq_param(a, b),
            _ => false,
        }
    }

    fn eq_lambda(&self, a: &Arc<LambdaExpr>, b: &Arc<LambdaExpr>) -> bool {
        self.eq_expr(&Expr::Lambda(a.clone()), &Expr::Lambda(b.clone()))
    }

    fn eq_new(&self, a: &Arc<NewExpr>, b: &Arc<NewExpr>) -> bool {
        self.eq_expr(&Expr::New(a.clone()), &Expr::New(b.clone()))
    }

    fn eq_label(&self, a: &LabelTarget, b: &LabelTarget) -> bool {
        a.name == b.name && a.ty == b.ty
    }

    fn eq_label_opt(&self, a: &Option<Arc<LabelTarget>>, b: &Option<Arc<LabelTarget>>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.eq_label(a, b),
            _ => false,
        }
    }

    fn eq_case(&self, a: &SwitchCase, b: &SwitchCase) -> bool {
        self.eq_expr(&a.body, &b.body) && self.eq_list(&a.test_values, &b.test_values)
    }

    fn eq_catch(&self, a: &CatchBlock, b: &CatchBlock) -> bool {
        a.test == b.test
            && self.eq_expr(&a.body, &b.body)
            && self.eq_opt(a.filter.as_ref(), b.filter.as_ref())
            && self.eq_param_opt(&a.variable, &b.variable)
    }

    fn eq_init(&self, a: &ElementInit, b: &ElementInit) -> bool {
        a.add_method == b.add_method && self.eq_list(&a.arguments, &b.arguments)
    }

    fn eq_inits(&self, a: &ElementInitVector, b: &ElementInitVector) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| self.eq_init(a, b))
    }

    fn eq_binding(&self, a: &MemberBinding, b: &MemberBinding) -> bool {
        if a.binding_kind() != b.binding_kind() || a.member() != b.member() {
            return false;
        }
        match (a, b) {
            (MemberBinding::Assignment { expression: x, .. }, MemberBinding::Assignment { expression: y, .. }) => {
                self.eq_expr(x, y)
            }
            (MemberBinding::MemberBinding { bindings: x, .. }, MemberBinding::MemberBinding { bindings: y, .. }) => {
                self.eq_bindings(x, y)
            }
            (
                MemberBinding::ListBinding { initializers: x, .. },
                MemberBinding::ListBinding { initializers: y, .. },
            ) => self.eq_inits(x, y),
            _ => false,
        }
    }

    fn eq_bindings(&self, a: &MemberBindingVector, b: &MemberBindingVector) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| self.eq_binding(a, b))
    }

    fn eq_expr(&self, a: &Expr, b: &Expr) -> bool {
        if Expr::ptr_eq(a, b) {
            return true;
        }
        if a.node_kind() != b.node_kind() || a.ty() != b.ty() {
            return false;
        }
        let _frame = self.context.map(|c| c.enter(a.clone()));

        match (a, b) {
            (Expr::Unary(x), Expr::Unary(y)) => {
                x.method == y.method
                    && x.is_lifted == y.is_lifted
                    && x.is_lifted_to_null == y.is_lifted_to_null
                    && self.eq_expr(&x.operand, &y.operand)
            }
            (Expr::Binary(x), Expr::Binary(y)) => {
                x.method == y.method
                    && x.is_lifted == y.is_lifted
                    && x.is_lifted_to_null == y.is_lifted_to_null
                    && self.eq_expr(&x.left, &y.left)
                    && self.eq_expr(&x.right, &y.right)
                    && match (&x.conversion, &y.conversion) {
                        (None, None) => true,
                        (Some(p), Some(q)) => self.eq_lambda(p, q),
                        _ => false,
                    }
            }
            (Expr::Block(x), Expr::Block(y)) => {
                self.eq_params(&x.variables, &y.variables)
                    && self.eq_list(&x.expressions, &y.expressions)
            }
            (Expr::Call(x), Expr::Call(y)) => {
                x.method == y.method
                    && self.eq_opt(x.object.as_ref(), y.object.as_ref())
                    && self.eq_list(&x.arguments, &y.arguments)
            }
            (Expr::Conditional(x), Expr::Conditional(y)) => {
                self.eq_expr(&x.test, &y.test)
                    && self.eq_expr(&x.if_true, &y.if_true)
                    && self.eq_expr(&x.if_false, &y.if_false)
            }
            (Expr::Constant(x), Expr::Constant(y)) => x.value == y.value,
            (Expr::DebugInfo(x), Expr::DebugInfo(y)) => {
                x.document == y.document
                    && x.start_line == y.start_line
                    && x.start_column == y.start_column
                    && x.end_line == y.end_line
                    && x.end_column == y.end_column
                    && x.is_clear == y.is_clear
            }
            (Expr::Default(_), Expr::Default(_)) => true,
            (Expr::Dynamic(x), Expr::Dynamic(y)) => {
                x.binder == y.binder
                    && x.delegate_type == y.delegate_type
                    && self.eq_list(&x.arguments, &y.arguments)
            }
            (Expr::Goto(x), Expr::Goto(y)) => {
                x.kind == y.kind
                    && self.eq_label(&x.target, &y.target)
                    && self.eq_opt(x.value.as_ref(), y.value.as_ref())
            }
            (Expr::Index(x), Expr::Index(y)) => {
                x.indexer == y.indexer
                    && self.eq_opt(x.object.as_ref(), y.object.as_ref())
                    && self.eq_list(&x.arguments, &y.arguments)
            }
            (Expr::Invocation(x), Expr::Invocation(y)) => {
                self.eq_expr(&x.expression, &y.expression)
                    && self.eq_list(&x.arguments, &y.arguments)
            }
            (Expr::Label(x), Expr::Label(y)) => {
                self.eq_label(&x.target, &y.target)
                    && self.eq_opt(x.default_value.as_ref(), y.default_value.as_ref())
            }
            (Expr::Lambda(x), Expr::Lambda(y)) => {
                self.eq_expr(&x.body, &y.body) && self.eq_params(&x.parameters, &y.parameters)
            }
            (Expr::ListInit(x), Expr::ListInit(y)) => {
                self.eq_new(&x.new_expression, &y.new_expression) && self.eq_inits(&x.initializers, &y.initializers)
            }
            (Expr::Loop(x), Expr::Loop(y)) => {
                self.eq_expr(&x.body, &y.body)
                    && self.eq_label_opt(&x.break_label, &y.break_label)
                    && self.eq_label_opt(&x.continue_label, &y.continue_label)
            }
            (Expr::Member(x), Expr::Member(y)) => {
                x.member == y.member && self.eq_opt(x.expression.as_ref(), y.expression.as_ref())
            }
            (Expr::MemberInit(x), Expr::MemberInit(y)) => {
                self.eq_new(&x.new_expression, &y.new_expression) && self.eq_bindings(&x.bindings, &y.bindings)
            }
            (Expr::New(x), Expr::New(y)) => {
                x.constructor == y.constructor
                    && x.members == y.members
                    && self.eq_list(&x.arguments, &y.arguments)
            }
            (Expr::NewArray(x), Expr::NewArray(y)) => self.eq_list(&x.expressions, &y.expressions),
            (Expr::Parameter(x), Expr::Parameter(y)) => self.eq_param(x, y),
            (Expr::RuntimeVariables(x), Expr::RuntimeVariables(y)) => self.eq_params(&x.variables, &y.variables),
            (Expr::Switch(x), Expr::Switch(y)) => {
                x.cases.len() == y.cases.len()
                    && x.cases.iter().zip(y.cases.iter()).all(|(p, q)| self.eq_case(p, q))
                    && x.comparison == y.comparison
                    && self.eq_opt(x.default_body.as_ref(), y.default_body.as_ref())
                    && self.eq_expr(&x.switch_value, &y.switch_value)
            }
            (Expr::Try(x), Expr::Try(y)) => {
                x.handlers.len() == y.handlers.len()
                    && x.handlers.iter().zip(y.handlers.iter()).all(|(p, q)| self.eq_catch(p, q))
                    && self.eq_expr(&x.body, &y.body)
                    && self.eq_opt(x.fault.as_ref(), y.fault.as_ref())
                    && self.eq_opt(x.finally.as_ref(), y.finally.as_ref())
            }
            (Expr::TypeBinary(x), Expr::TypeBinary(y)) => {
                x.type_operand == y.type_operand && self.eq_expr(&x.expression, &y.expression)
            }
            // Equal node kinds imply equal variants.
            _ => false,
        }
    }

    fn hash_opt<H: Hasher>(&self, expr: Option<&Expr>, state: &mut H) {
        match expr {
            Some(expr) => {
                state.write_u8(1);
                self.hash_expr(expr, state);
            }
            None => state.write_u8(0),
        }
    }

    fn hash_list<H: Hasher>(&self, items: &ExprVector, state: &mut H) {
        state.write_usize(items.len());
        for item in items.iter() {
            self.hash_expr(item, state);
        }
    }

    fn hash_param<H: Hasher>(&self, p: &ParameterExpr, state: &mut H) {
        p.ty.hash(state);
        p.is_by_ref.hash(state);
    }

    fn hash_params<H: Hasher>(&self, params: &ParameterVector, state: &mut H) {
        state.write_usize(params.len());
        for p in params.iter() {
            self.hash_param(p, state);
        }
    }

    fn hash_label<H: Hasher>(&self, label: Option<&LabelTarget>, state: &mut H) {
        match label {
            Some(label) => {
                state.write_u8(1);
                label.name.hash(state);
                label.ty.hash(state);
            }
            None => state.write_u8(0),
        }
    }

    fn hash_inits<H: Hasher>(&self, inits: &ElementInitVector, state: &mut H) {
        state.write_usize(inits.len());
        for init in inits.iter() {
            init.add_method.hash(state);
            self.hash_list(&init.arguments, state);
        }
    }

    fn hash_bindings<H: Hasher>(&self, bindings: &MemberBindingVector, state: &mut H) {
        state.write_usize(bindings.len());
        for binding in bindings.iter() {
            binding.binding_kind().hash(state);
            binding.member().hash(state);
            match &**binding {
                MemberBinding::Assignment { expression, .. } => self.hash_expr(expression, state),
                MemberBinding::MemberBinding { bindings, .. } => self.hash_bindings(bindings, state),
                MemberBinding::ListBinding { initializers, .. } => self.hash_inits(initializers, state),
            }
        }
    }

    fn hash_expr<H: Hasher>(&self, expr: &Expr, state: &mut H) {
        expr.node_kind().hash(state);
        expr.ty().hash(state);
        let _frame = self.context.map(|c| c.enter(expr.clone()));

        match expr {
            Expr::Unary(e) => {
                e.method.hash(state);
                e.is_lifted.hash(state);
                e.is_lifted_to_null.hash(state);
                self.hash_expr(&e.operand, state);
            }
            Expr::Binary(e) => {
                e.method.hash(state);
                e.is_lifted.hash(state);
                e.is_lifted_to_null.hash(state);
                self.hash_expr(&e.left, state);
                self.hash_expr(&e.right, state);
                let conversion = e.conversion.clone().map(Expr::Lambda);
                self.hash_opt(conversion.as_ref(), state);
            }
            Expr::Block(e) => {
                self.hash_params(&e.variables, state);
                self.hash_list(&e.expressions, state);
            }
            Expr::Call(e) => {
                e.method.hash(state);
                self.hash_opt(e.object.as_ref(), state);
                self.hash_list(&e.arguments, state);
            }
            Expr::Conditional(e) => {
                self.hash_expr(&e.test, state);
                self.hash_expr(&e.if_true, state);
                self.hash_expr(&e.if_false, state);
            }
            Expr::Constant(e) => e.value.hash(state),
            Expr::DebugInfo(e) => {
                e.document.hash(state);
                e.start_line.hash(state);
                e.start_column.hash(state);
                e.end_line.hash(state);
                e.end_column.hash(state);
                e.is_clear.hash(state);
            }
            Expr::Default(_) => {}
            Expr::Dynamic(e) => {
                e.binder.hash(state);
                e.delegate_type.hash(state);
                self.hash_list(&e.arguments, state);
            }
            Expr::Goto(e) => {
                e.kind.hash(state);
                self.hash_label(Some(&e.target), state);
                self.hash_opt(e.value.as_ref(), state);
            }
            Expr::Index(e) => {
                e.indexer.hash(state);
                self.hash_opt(e.object.as_ref(), state);
                self.hash_list(&e.arguments, state);
            }
            Expr::Invocation(e) => {
                self.hash_expr(&e.expression, state);
                self.hash_list(&e.arguments, state);
            }
            Expr::Label(e) => {
                self.hash_label(Some(&e.target), state);
                self.hash_opt(e.default_value.as_ref(), state);
            }
            Expr::Lambda(e) => {
                self.hash_expr(&e.body, state);
                self.hash_params(&e.parameters, state);
            }
            Expr::ListInit(e) => {
                self.hash_expr(&Expr::New(e.new_expression.clone()), state);
                self.hash_inits(&e.initializers, state);
            }
            Expr::Loop(e) => {
                self.hash_expr(&e.body, state);
                self.hash_label(e.break_label.as_deref(), state);
                self.hash_label(e.continue_label.as_deref(), state);
            }
            Expr::Member(e) => {
                e.member.hash(state);
                self.hash_opt(e.expression.as_ref(), state);
            }
            Expr::MemberInit(e) => {
                self.hash_expr(&Expr::New(e.new_expression.clone()), state);
                self.hash_bindings(&e.bindings, state);
            }
            Expr::New(e) => {
                e.constructor.hash(state);
                e.members.hash(state);
                self.hash_list(&e.arguments, state);
            }
            Expr::NewArray(e) => self.hash_list(&e.expressions, state),
            Expr::Parameter(e) => self.hash_param(e, state),
            Expr::RuntimeVariables(e) => self.hash_params(&e.variables, state),
            Expr::Switch(e) => {
                state.write_usize(e.cases.len());
                for case in e.cases.iter() {
                    self.hash_expr(&case.body, state);
                    self.hash_list(&case.test_values, state);
                }
                e.comparison.hash(state);
                self.hash_opt(e.default_body.as_ref(), state);
                self.hash_expr(&e.switch_value, state);
            }
            Expr::Try(e) => {
                state.write_usize(e.handlers.len());
                for handler in e.handlers.iter() {
                    handler.test.hash(state);
                    self.hash_expr(&handler.body, state);
                    self.hash_opt(handler.filter.as_ref(), state);
                    match &handler.variable {
                        Some(variable) => {
                            state.write_u8(1);
                            self.hash_param(variable, state);
                        }
                        None => state.write_u8(0),
                    }
                }
                self.hash_expr(&e.body, state);
                self.hash_opt(e.fault.as_ref(), state);
                self.hash_opt(e.finally.as_ref(), state);
            }
            Expr::TypeBinary(e) => {
                e.type_operand.hash(state);
                self.hash_expr(&e.expression, state);
            }
        }
    }
}
