//! Interception and rewriting of expression trees.
//!
//! An [`Interceptor`] walks a tree and offers every node to the observers
//! registered for its variant before descending into the (possibly replaced)
//! node's children. Observers registered for [`Expr`] itself see every node
//! once its children have been visited. Unchanged subtrees are shared with
//! the input: a node is rebuilt only when one of its children changed.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use archery::ArcK;
use parking_lot::Mutex;
use rpds::Vector;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use super::context::ContextStack;
use super::expr_node::*;
use crate::config::InterceptorConfig;
use crate::error::{InterceptError, Result};

/// An observer: receives a node and returns it or its replacement.
pub type Hook<T> = Box<dyn FnMut(T) -> anyhow::Result<T> + Send>;

/// Ordered observers of one hookable type, applied in registration order.
pub struct HookList<T> {
    hooks: Vec<(u64, Hook<T>)>,
}

impl<T> Default for HookList<T> {
    fn default() -> Self {
        HookList { hooks: Vec::new() }
    }
}

impl<T> HookList<T> {
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn push(&mut self, id: u64, hook: Hook<T>) {
        self.hooks.push((id, hook));
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(hook_id, _)| *hook_id != id);
        self.hooks.len() != before
    }

    fn clear(&mut self) {
        self.hooks.clear();
    }

    fn apply(&mut self, slot: &'static str, mut value: T) -> Result<T> {
        for (_, hook) in self.hooks.iter_mut() {
            value = hook(value).map_err(|source| InterceptError::Observer { slot, source })?;
        }
        Ok(value)
    }
}

/// Types an observer can be registered for: every node payload, the
/// auxiliary structures and `Expr` (the generic slot).
pub trait Hookable: Sized + 'static {
    /// Slot name used in logs and errors.
    const SLOT: &'static str;

    fn slot(table: &mut HookTable) -> &mut HookList<Self>;
}

macro_rules! hook_table {
    ($($field:ident: $ty:ty => $slot:literal),* $(,)?) => {
        /// One observer list per hookable type.
        pub struct HookTable {
            $($field: HookList<$ty>,)*
        }

        impl Default for HookTable {
            fn default() -> Self {
                HookTable {
                    $($field: HookList::default(),)*
                }
            }
        }

        impl HookTable {
            /// Total number of registered observers.
            pub fn len(&self) -> usize {
                0 $(+ self.$field.len())*
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn clear(&mut self) {
                $(self.$field.clear();)*
            }
        }

        $(
            impl Hookable for $ty {
                const SLOT: &'static str = $slot;

                fn slot(table: &mut HookTable) -> &mut HookList<Self> {
                    &mut table.$field
                }
            }
        )*
    };
}

hook_table! {
    unary: Arc<UnaryExpr> => "Unary",
    binary: Arc<BinaryExpr> => "Binary",
    block: Arc<BlockExpr> => "Block",
    call: Arc<CallExpr> => "Call",
    conditional: Arc<ConditionalExpr> => "Conditional",
    constant: Arc<ConstantExpr> => "Constant",
    debug_info: Arc<DebugInfoExpr> => "DebugInfo",
    default: Arc<DefaultExpr> => "Default",
    dynamic: Arc<DynamicExpr> => "Dynamic",
    goto: Arc<GotoExpr> => "Goto",
    index: Arc<IndexExpr> => "Index",
    invocation: Arc<InvocationExpr> => "Invocation",
    label: Arc<LabelExpr> => "Label",
    lambda: Arc<LambdaExpr> => "Lambda",
    list_init: Arc<ListInitExpr> => "ListInit",
    looping: Arc<LoopExpr> => "Loop",
    member: Arc<MemberExpr> => "Member",
    member_init: Arc<MemberInitExpr> => "MemberInit",
    new: Arc<NewExpr> => "New",
    new_array: Arc<NewArrayExpr> => "NewArray",
    parameter: Arc<ParameterExpr> => "Parameter",
    runtime_variables: Arc<RuntimeVariablesExpr> => "RuntimeVariables",
    switch: Arc<SwitchExpr> => "Switch",
    try_expr: Arc<TryExpr> => "Try",
    type_binary: Arc<TypeBinaryExpr> => "TypeBinary",
    switch_case: Arc<SwitchCase> => "SwitchCase",
    catch_block: Arc<CatchBlock> => "CatchBlock",
    element_init: Arc<ElementInit> => "ElementInit",
    member_binding: Arc<MemberBinding> => "MemberBinding",
    label_target: Arc<LabelTarget> => "LabelTarget",
    any: Expr => "Expr",
}

/// Handle returned by [`Interceptor::subscribe`].
#[derive(Clone, Copy)]
pub struct Subscription {
    engine: u64,
    id: u64,
    slot: &'static str,
    detach: fn(&mut HookTable, u64) -> bool,
}

impl Subscription {
    pub fn slot(&self) -> &'static str {
        self.slot
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("engine", &self.engine)
            .field("id", &self.id).field("slot", &self.slot).finish()
    }
}

fn detach<T: Hookable>(table: &mut HookTable, id: u64) -> bool {
    T::slot(table).remove(id)
}

static NEXT_ENGINE: AtomicU64 = AtomicU64::new(0);

/// Traversal engine holding the observer table and the context stack.
///
/// Not meant to be shared between threads during a traversal; use one
/// instance per concurrent traversal.
pub struct Interceptor {
    engine: u64,
    hooks: HookTable,
    context: ContextStack,
    config: InterceptorConfig,
    next_id: u64,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::with_config(InterceptorConfig::default())
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("observers", &self.hooks.len())
            .field("context", &self.context)
            .field("config", &self.config)
            .finish()
    }
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InterceptorConfig) -> Self {
        Interceptor {
            engine: NEXT_ENGINE.fetch_add(1, Ordering::Relaxed),
            hooks: HookTable::default(),
            context: ContextStack::new(),
            config,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// The stack of nodes being visited. Clone it into an observer to query
    /// the current node and its ancestors during a traversal.
    pub fn context(&self) -> &ContextStack {
        &self.context
    }

    pub fn observer_count(&self) -> usize {
        self.hooks.len()
    }

    /// Registers `hook` for every value of type `T` met during traversal.
    pub fn subscribe<T: Hookable>(
        &mut self,
        hook: impl FnMut(T) -> anyhow::Result<T> + Send + 'static,
    ) -> Subscription {
        self.next_id += 1;
        let id = self.next_id;
        T::slot(&mut self.hooks).push(id, Box::new(hook));
        debug!(slot = T::SLOT, id, "Subscribed observer");
        Subscription {
            engine: self.engine,
            id,
            slot: T::SLOT,
            detach: detach::<T>,
        }
    }

    /// Removes an observer. Returns false if it was already removed or was
    /// issued by another interceptor.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        if subscription.engine != self.engine {
            debug!(slot = subscription.slot, id = subscription.id, "Ignored subscription of another interceptor");
            return false;
        }
        let removed = (subscription.detach)(&mut self.hooks, subscription.id);
        debug!(slot = subscription.slot, id = subscription.id, removed, "Unsubscribed observer");
        removed
    }

    /// Drops every registered observer.
    pub fn clear(&mut self) {
        self.hooks.clear();
    }

    /// Visits `expr` and returns the rewritten tree, or `expr` itself when no
    /// observer replaced anything.
    pub fn visit(&mut self, expr: &Expr) -> Result<Expr> {
        let result = self.visit_node(expr)?;
        trace!(
            root = %expr.variant(),
            rewritten = !Expr::ptr_eq(&result, expr),
            "Traversal complete"
        );
        Ok(result)
    }

    /// Absent trees are returned unchanged without invoking any observer.
    pub fn visit_opt(&mut self, expr: Option<&Expr>) -> Result<Option<Expr>> {
        expr.map(|e| self.visit(e)).transpose()
    }

    /// Registers `hook` for the duration of one traversal. The hook is
    /// removed on every exit path, including observer failures and panics.
    pub fn visit_with_hook<T: Hookable>(
        &mut self,
        expr: &Expr,
        hook: impl FnMut(T) -> anyhow::Result<T> + Send + 'static,
    ) -> Result<Expr> {
        let subscription = self.subscribe(hook);
        let mut this = scopeguard::guard(self, move |this| {
            this.unsubscribe(subscription);
        });
        this.visit(expr)
    }

    /// Every node instance reachable from `expr`, root included, each listed
    /// once in the order its visit completed. Distinct instances that are
    /// structurally equal are all kept.
    pub fn flatten(&mut self, expr: &Expr) -> Result<Vec<Expr>> {
        let collected: Arc<Mutex<(FxHashSet<usize>, Vec<Expr>)>> = Arc::default();
        let sink = Arc::clone(&collected);
        self.visit_with_hook::<Expr>(expr, move |node| {
            let mut guard = sink.lock();
            let (seen, nodes) = &mut *guard;
            if seen.insert(node.address()) {
                nodes.push(node.clone());
            }
            Ok(node)
        })?;
        let nodes = std::mem::take(&mut collected.lock().1);
        debug!(count = nodes.len(), "Flattened expression tree");
        Ok(nodes)
    }

    fn visit_node(&mut self, expr: &Expr) -> Result<Expr> {
        if let Some(limit) = self.config.max_depth {
            if self.context.depth() >= limit {
                return Err(InterceptError::DepthLimitExceeded { limit });
            }
        }

        let frame = self.context.enter(expr.clone());

        let hooked = self.intercept(expr)?;
        if !Expr::ptr_eq(&hooked, expr) {
            if self.config.trace_rewrites {
                debug!(depth = frame.depth(), from = %expr, to = %hooked, "Observer replaced node");
            }
            frame.replace(hooked.clone());
        }

        let descended = self.descend(&hooked)?;
        if self.hooks.any.is_empty() {
            return Ok(descended);
        }
        if !Expr::ptr_eq(&descended, &hooked) {
            frame.replace(descended.clone());
        }
        let result = self.run_hooks(descended.clone())?;
        if self.config.trace_rewrites && !Expr::ptr_eq(&result, &descended) {
            debug!(depth = frame.depth(), from = %descended, to = %result, "Generic observer replaced node");
        }
        Ok(result)
    }

    fn run_hooks<T: Hookable>(&mut self, value: T) -> Result<T> {
        let list = T::slot(&mut self.hooks);
        if list.is_empty() {
            return Ok(value);
        }
        list.apply(T::SLOT, value)
    }

    /// Pipes `expr` through the observers of its variant.
    fn intercept(&mut self, expr: &Expr) -> Result<Expr> {
        Ok(match expr {
            Expr::Unary(e) => Expr::Unary(self.run_hooks(e.clone())?),
            Expr::Binary(e) => Expr::Binary(self.run_hooks(e.clone())?),
            Expr::Block(e) => Expr::Block(self.run_hooks(e.clone())?),
            Expr::Call(e) => Expr::Call(self.run_hooks(e.clone())?),
            Expr::Conditional(e) => Expr::Conditional(self.run_hooks(e.clone())?),
            Expr::Constant(e) => Expr::Constant(self.run_hooks(e.clone())?),
            Expr::DebugInfo(e) => Expr::DebugInfo(self.run_hooks(e.clone())?),
            Expr::Default(e) => Expr::Default(self.run_hooks(e.clone())?),
            Expr::Dynamic(e) => Expr::Dynamic(self.run_hooks(e.clone())?),
            Expr::Goto(e) => Expr::Goto(self.run_hooks(e.clone())?),
            Expr::Index(e) => Expr::Index(self.run_hooks(e.clone())?),
            Expr::Invocation(e) => Expr::Invocation(self.run_hooks(e.clone())?),
            Expr::Label(e) => Expr::Label(self.run_hooks(e.clone())?),
            Expr::Lambda(e) => Expr::Lambda(self.run_hooks(e.clone())?),
            Expr::ListInit(e) => Expr::ListInit(self.run_hooks(e.clone())?),
            Expr::Loop(e) => Expr::Loop(self.run_hooks(e.clone())?),
            Expr::Member(e) => Expr::Member(self.run_hooks(e.clone())?),
            Expr::MemberInit(e) => Expr::MemberInit(self.run_hooks(e.clone())?),
            Expr::New(e) => Expr::New(self.run_hooks(e.clone())?),
            Expr::NewArray(e) => Expr::NewArray(self.run_hooks(e.clone())?),
            Expr::Parameter(e) => Expr::Parameter(self.run_hooks(e.clone())?),
            Expr::RuntimeVariables(e) => Expr::RuntimeVariables(self.run_hooks(e.clone())?),
            Expr::Switch(e) => Expr::Switch(self.run_hooks(e.clone())?),
            Expr::Try(e) => Expr::Try(self.run_hooks(e.clone())?),
            Expr::TypeBinary(e) => Expr::TypeBinary(self.run_hooks(e.clone())?),
        })
    }

    /// Visits the children of `node`, rebuilding it only if one changed.
    fn descend(&mut self, node: &Expr) -> Result<Expr> {
        let mut changed = false;
        let rebuilt = match node {
            Expr::Constant(_) | Expr::DebugInfo(_) | Expr::Default(_) | Expr::Parameter(_) => {
                return Ok(node.clone());
            }
            Expr::Unary(e) => {
                let operand = self.child(&e.operand, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(UnaryExpr { operand, ..(**e).clone() })
            }
            Expr::Binary(e) => {
                let left = self.child(&e.left, &mut changed)?;
                let right = self.child(&e.right, &mut changed)?;
                let conversion = match &e.conversion {
                    Some(c) => Some(self.child_lambda(c, "Binary.conversion", &mut changed)?),
                    None => None,
                };
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(BinaryExpr {
                    left,
                    right,
                    conversion,
                    ..(**e).clone()
                })
            }
            Expr::Block(e) => {
                // Locals before statements, the order `Expr::children` reports.
                let variables = self.child_params(&e.variables, "Block.variables", &mut changed)?;
                let expressions = self.child_list(&e.expressions, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(BlockExpr {
                    variables,
                    expressions,
                    ..(**e).clone()
                })
            }
            Expr::Call(e) => {
                let object = self.child_opt(&e.object, &mut changed)?;
                let arguments = self.child_list(&e.arguments, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(CallExpr {
                    object,
                    arguments,
                    ..(**e).clone()
                })
            }
            Expr::Conditional(e) => {
                let test = self.child(&e.test, &mut changed)?;
                let if_true = self.child(&e.if_true, &mut changed)?;
                let if_false = self.child(&e.if_false, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(ConditionalExpr {
                    test,
                    if_true,
                    if_false,
                    ..(**e).clone()
                })
            }
            Expr::Dynamic(e) => {
                let arguments = self.child_list(&e.arguments, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(DynamicExpr { arguments, ..(**e).clone() })
            }
            Expr::Goto(e) => {
                let target = self.visit_label(&e.target, &mut changed)?;
                let value = self.child_opt(&e.value, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(GotoExpr {
                    target,
                    value,
                    ..(**e).clone()
                })
            }
            Expr::Index(e) => {
                let object = self.child_opt(&e.object, &mut changed)?;
                let arguments = self.child_list(&e.arguments, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(IndexExpr {
                    object,
                    arguments,
                    ..(**e).clone()
                })
            }
            Expr::Invocation(e) => {
                let expression = self.child(&e.expression, &mut changed)?;
                let arguments = self.child_list(&e.arguments, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(InvocationExpr {
                    expression,
                    arguments,
                    ..(**e).clone()
                })
            }
            Expr::Label(e) => {
                let target = self.visit_label(&e.target, &mut changed)?;
                let default_value = self.child_opt(&e.default_value, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(LabelExpr {
                    target,
                    default_value,
                    ..(**e).clone()
                })
            }
            Expr::Lambda(e) => {
                let body = self.child(&e.body, &mut changed)?;
                let parameters = self.child_params(&e.parameters, "Lambda.parameters", &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(LambdaExpr {
                    body,
                    parameters,
                    ..(**e).clone()
                })
            }
            Expr::ListInit(e) => {
                let new_expression = self.child_new(&e.new_expression, "ListInit.new_expression", &mut changed)?;
                let initializers = self.aux_list(&e.initializers, &mut changed, Self::visit_init)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(ListInitExpr {
                    new_expression,
                    initializers,
                    ..(**e).clone()
                })
            }
            Expr::Loop(e) => {
                let body = self.child(&e.body, &mut changed)?;
                let break_label = self.visit_label_opt(&e.break_label, &mut changed)?;
                let continue_label = self.visit_label_opt(&e.continue_label, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(LoopExpr {
                    body,
                    break_label,
                    continue_label,
                    ..(**e).clone()
                })
            }
            Expr::Member(e) => {
                let expression = self.child_opt(&e.expression, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(MemberExpr { expression, ..(**e).clone() })
            }
            Expr::MemberInit(e) => {
                let new_expression = self.child_new(&e.new_expression, "MemberInit.new_expression", &mut changed)?;
                let bindings = self.aux_list(&e.bindings, &mut changed, Self::visit_binding)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(MemberInitExpr {
                    new_expression,
                    bindings,
                    ..(**e).clone()
                })
            }
            Expr::New(e) => {
                let arguments = self.child_list(&e.arguments, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(NewExpr { arguments, ..(**e).clone() })
            }
            Expr::NewArray(e) => {
                let expressions = self.child_list(&e.expressions, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(NewArrayExpr { expressions, ..(**e).clone() })
            }
            Expr::RuntimeVariables(e) => {
                let variables = self.child_params(&e.variables, "RuntimeVariables.variables", &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(RuntimeVariablesExpr { variables, ..(**e).clone() })
            }
            Expr::Switch(e) => {
                let switch_value = self.child(&e.switch_value, &mut changed)?;
                let cases = self.aux_list(&e.cases, &mut changed, Self::visit_case)?;
                let default_body = self.child_opt(&e.default_body, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(SwitchExpr {
                    switch_value,
                    cases,
                    default_body,
                    ..(**e).clone()
                })
            }
            Expr::Try(e) => {
                let body = self.child(&e.body, &mut changed)?;
                let handlers = self.aux_list(&e.handlers, &mut changed, Self::visit_catch)?;
                let finally = self.child_opt(&e.finally, &mut changed)?;
                let fault = self.child_opt(&e.fault, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(TryExpr {
                    body,
                    handlers,
                    finally,
                    fault,
                    ..(**e).clone()
                })
            }
            Expr::TypeBinary(e) => {
                let expression = self.child(&e.expression, &mut changed)?;
                if !changed {
                    return Ok(node.clone());
                }
                Expr::from(TypeBinaryExpr { expression, ..(**e).clone() })
            }
        };
        Ok(rebuilt)
    }

    fn child(&mut self, expr: &Expr, changed: &mut bool) -> Result<Expr> {
        let visited = self.visit_node(expr)?;
        if !Expr::ptr_eq(&visited, expr) {
            *changed = true;
        }
        Ok(visited)
    }

    fn child_opt(&mut self, expr: &Option<Expr>, changed: &mut bool) -> Result<Option<Expr>> {
        match expr {
            Some(expr) => Ok(Some(self.child(expr, changed)?)),
            None => Ok(None),
        }
    }

    fn child_list(&mut self, items: &ExprVector, changed: &mut bool) -> Result<ExprVector> {
        let mut any = false;
        let mut visited = Vector::new_with_ptr_kind();
        for item in items.iter() {
            visited.push_back_mut(self.child(item, &mut any)?);
        }
        if !any {
            return Ok(items.clone());
        }
        *changed = true;
        Ok(visited)
    }

    fn child_param(
        &mut self,
        param: &Arc<ParameterExpr>,
        slot: &'static str,
        changed: &mut bool,
    ) -> Result<Arc<ParameterExpr>> {
        match self.child(&Expr::Parameter(param.clone()), changed)? {
            Expr::Parameter(p) => Ok(p),
            other => Err(InterceptError::ChildVariantMismatch {
                slot,
                expected: ExprVariant::Parameter,
                found: other.variant(),
            }),
        }
    }

    fn child_params(
        &mut self,
        params: &ParameterVector,
        slot: &'static str,
        changed: &mut bool,
    ) -> Result<ParameterVector> {
        let mut any = false;
        let mut visited = Vector::new_with_ptr_kind();
        for param in params.iter() {
            visited.push_back_mut(self.child_param(param, slot, &mut any)?);
        }
        if !any {
            return Ok(params.clone());
        }
        *changed = true;
        Ok(visited)
    }

    fn child_lambda(
        &mut self,
        lambda: &Arc<LambdaExpr>,
        slot: &'static str,
        changed: &mut bool,
    ) -> Result<Arc<LambdaExpr>> {
        match self.child(&Expr::Lambda(lambda.clone()), changed)? {
            Expr::Lambda(l) => Ok(l),
            other => Err(InterceptError::ChildVariantMismatch {
                slot,
                expected: ExprVariant::Lambda,
                found: other.variant(),
            }),
        }
    }

    fn child_new(&mut self, new: &Arc<NewExpr>, slot: &'static str, changed: &mut bool) -> Result<Arc<NewExpr>> {
        match self.child(&Expr::New(new.clone()), changed)? {
            Expr::New(n) => Ok(n),
            other => Err(InterceptError::ChildVariantMismatch {
                slot,
                expected: ExprVariant::New,
                found: other.variant(),
            }),
        }
    }

    fn aux_list<T>(
        &mut self,
        items: &Vector<Arc<T>, ArcK>,
        changed: &mut bool,
        visit: fn(&mut Self, &Arc<T>, &mut bool) -> Result<Arc<T>>,
    ) -> Result<Vector<Arc<T>, ArcK>> {
        let mut any = false;
        let mut visited = Vector::new_with_ptr_kind();
        for item in items.iter() {
            visited.push_back_mut(visit(self, item, &mut any)?);
        }
        if !any {
            return Ok(items.clone());
        }
        *changed = true;
        Ok(visited)
    }

    fn mark<T>(original: &Arc<T>, result: Arc<T>, changed: &mut bool) -> Arc<T> {
        if !Arc::ptr_eq(original, &result) {
            *changed = true;
        }
        result
    }

    fn visit_label(&mut self, label: &Arc<LabelTarget>, changed: &mut bool) -> Result<Arc<LabelTarget>> {
        let hooked = self.run_hooks(label.clone())?;
        Ok(Self::mark(label, hooked, changed))
    }

    fn visit_label_opt(
        &mut self,
        label: &Option<Arc<LabelTarget>>,
        changed: &mut bool,
    ) -> Result<Option<Arc<LabelTarget>>> {
        match label {
            Some(label) => Ok(Some(self.visit_label(label, changed)?)),
            None => Ok(None),
        }
    }

    fn visit_case(&mut self, case: &Arc<SwitchCase>, changed: &mut bool) -> Result<Arc<SwitchCase>> {
        let hooked = self.run_hooks(case.clone())?;
        let mut local = false;
        let test_values = self.child_list(&hooked.test_values, &mut local)?;
        let body = self.child(&hooked.body, &mut local)?;
        let result = if local { Arc::new(SwitchCase { test_values, body }) } else { hooked };
        Ok(Self::mark(case, result, changed))
    }

    fn visit_catch(&mut self, handler: &Arc<CatchBlock>, changed: &mut bool) -> Result<Arc<CatchBlock>> {
        let hooked = self.run_hooks(handler.clone())?;
        let mut local = false;
        let variable = match &hooked.variable {
            Some(v) => Some(self.child_param(v, "CatchBlock.variable", &mut local)?),
            None => None,
        };
        let filter = self.child_opt(&hooked.filter, &mut local)?;
        let body = self.child(&hooked.body, &mut local)?;
        let result = if local {
            Arc::new(CatchBlock {
                test: hooked.test.clone(),
                variable,
                body,
                filter,
            })
        } else {
            hooked
        };
        Ok(Self::mark(handler, result, changed))
    }

    fn visit_init(&mut self, init: &Arc<ElementInit>, changed: &mut bool) -> Result<Arc<ElementInit>> {
        let hooked = self.run_hooks(init.clone())?;
        let mut local = false;
        let arguments = self.child_list(&hooked.arguments, &mut local)?;
        let result = if local {
            Arc::new(ElementInit {
                add_method: hooked.add_method.clone(),
                arguments,
            })
        } else {
            hooked
        };
        Ok(Self::mark(init, result, changed))
    }

    fn visit_binding(&mut self, binding: &Arc<MemberBinding>, changed: &mut bool) -> Result<Arc<MemberBinding>> {
        let hooked = self.run_hooks(binding.clone())?;
        let mut local = false;
        let rebuilt = match &*hooked {
            MemberBinding::Assignment { member, expression } => MemberBinding::Assignment {
                member: member.clone(),
                expression: self.child(expression, &mut local)?,
            },
            MemberBinding::MemberBinding { member, bindings } => MemberBinding::MemberBinding {
                member: member.clone(),
                bindings: self.aux_list(bindings, &mut local, Self::visit_binding)?,
            },
            MemberBinding::ListBinding { member, initializers } => MemberBinding::ListBinding {
                member: member.clone(),
                initializers: self.aux_list(initializers, &mut local, Self::visit_init)?,
            },
        };
        let result = if local { Arc::new(rebuilt) } else { hooked };
        Ok(Self::mark(binding, result, changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::identity::{ConstantValue, MemberRef, MethodRef, TypeRef};

    fn record() -> TypeRef {
        TypeRef::named("Record")
    }

    /// `x => !x.B`
    fn not_b() -> Expr {
        let x = Expr::parameter(record(), "x");
        let b = MemberRef::property(record(), "B", TypeRef::bool());
        Expr::Lambda(Expr::lambda(
            Expr::not(Expr::property(Some(Expr::Parameter(x.clone())), b)),
            [x],
        ))
    }

    fn int(v: i64) -> Expr {
        Expr::constant_of(ConstantValue::Int(v))
    }

    #[test]
    fn test_no_observers_returns_same_instance() {
        let tree = not_b();
        let mut interceptor = Interceptor::new();
        let result = interceptor.visit(&tree).unwrap();
        assert!(Expr::ptr_eq(&result, &tree));
        assert!(interceptor.context().is_empty());
    }

    #[test]
    fn test_visit_absent_is_noop() {
        let mut interceptor = Interceptor::new();
        interceptor.subscribe::<Expr>(|_| anyhow::bail!("must not run"));
        assert!(interceptor.visit_opt(None).unwrap().is_none());
    }

    #[test]
    fn test_observers_chain_in_registration_order() {
        let mut interceptor = Interceptor::new();
        interceptor.subscribe::<Arc<ConstantExpr>>(|c| {
            let value = match &c.value {
                ConstantValue::Int(v) => ConstantValue::Int(v + 1),
                other => other.clone(),
            };
            Ok(Arc::new(ConstantExpr { ty: c.ty.clone(), value }))
        });
        interceptor.subscribe::<Arc<ConstantExpr>>(|c| {
            let value = match &c.value {
                ConstantValue::Int(v) => ConstantValue::Int(v * 10),
                other => other.clone(),
            };
            Ok(Arc::new(ConstantExpr { ty: c.ty.clone(), value }))
        });
        let result = interceptor.visit(&int(1)).unwrap();
        assert_eq!(result, int(20));
    }

    #[test]
    fn test_unchanged_siblings_are_shared() {
        let left = not_b();
        let right = int(3);
        let tree = Expr::call(
            None,
            MethodRef::static_method(TypeRef::named("Helpers"), "Pair", [record(), TypeRef::int32()], TypeRef::void()),
            [left.clone(), right.clone()],
        );
        let inserted = Arc::new(ConstantExpr {
            ty: TypeRef::int32(),
            value: ConstantValue::Int(4),
        });
        let replacement = Arc::clone(&inserted);
        let mut interceptor = Interceptor::new();
        let result = interceptor
            .visit_with_hook::<Arc<ConstantExpr>>(&tree, move |_| Ok(Arc::clone(&replacement)))
            .unwrap();
        let call = result.as_call().unwrap();
        assert!(Expr::ptr_eq(&call.arguments[0], &left));
        assert!(Expr::ptr_eq(&call.arguments[1], &Expr::Constant(inserted)));
        assert!(!Expr::ptr_eq(&result, &tree));
    }

    #[test]
    fn test_scoped_hook_is_removed() {
        let mut interceptor = Interceptor::new();
        interceptor
            .visit_with_hook::<Arc<UnaryExpr>>(&not_b(), |u| Ok(u))
            .unwrap();
        assert_eq!(interceptor.observer_count(), 0);
    }

    #[test]
    fn test_observer_failure_unwinds() {
        let mut interceptor = Interceptor::new();
        let err = interceptor
            .visit_with_hook::<Arc<MemberExpr>>(&not_b(), |_| anyhow::bail!("boom"))
            .unwrap_err();
        match err {
            InterceptError::Observer { slot, source } => {
                assert_eq!(slot, "Member");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(interceptor.context().is_empty());
        assert_eq!(interceptor.observer_count(), 0);

        let tree = not_b();
        assert!(Expr::ptr_eq(&interceptor.visit(&tree).unwrap(), &tree));
    }

    #[test]
    fn test_unsubscribe_twice() {
        let mut interceptor = Interceptor::new();
        let sub = interceptor.subscribe::<Expr>(Ok);
        assert_eq!(sub.slot(), "Expr");
        assert!(interceptor.unsubscribe(sub));
        assert!(!interceptor.unsubscribe(sub));
    }

    #[test]
    fn test_unsubscribe_ignores_other_interceptor() {
        let mut first = Interceptor::new();
        let mut second = Interceptor::new();
        let foreign = first.subscribe::<Expr>(Ok);
        let own = second.subscribe::<Expr>(Ok);
        assert!(!second.unsubscribe(foreign));
        assert_eq!(second.observer_count(), 1);
        assert!(second.unsubscribe(own));
        assert!(first.unsubscribe(foreign));
    }

    #[test]
    fn test_block_visits_locals_before_statements() {
        let local = Expr::parameter(TypeRef::int32(), "n");
        let statement = int(7);
        let tree = Expr::block([local.clone()], [statement.clone()]);
        let nodes = Interceptor::new().flatten(&tree).unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(Expr::ptr_eq(&nodes[0], &Expr::Parameter(local)));
        assert!(Expr::ptr_eq(&nodes[1], &statement));
        assert!(Expr::ptr_eq(&nodes[2], &tree));
    }

    #[test]
    fn test_context_inside_observer() {
        let mut interceptor = Interceptor::new();
        let context = interceptor.context().clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        interceptor.subscribe::<Arc<MemberExpr>>(move |m| {
            let current = context.current().map(|c| c.variant());
            let previous = context.previous().map(|p| p.variant());
            sink.lock().push((current, previous, context.depth()));
            Ok(m)
        });
        interceptor.visit(&not_b()).unwrap();
        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![(Some(ExprVariant::Member), Some(ExprVariant::Unary), 3)]
        );
    }

    #[test]
    fn test_generic_hook_cannot_retype_lambda_parameter() {
        let mut interceptor = Interceptor::new();
        let err = interceptor
            .visit_with_hook::<Expr>(&not_b(), |e| match e {
                Expr::Parameter(_) => Ok(Expr::default_value(record())),
                other => Ok(other),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            InterceptError::ChildVariantMismatch {
                expected: ExprVariant::Parameter,
                found: ExprVariant::Default,
                ..
            }
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut interceptor = Interceptor::with_config(InterceptorConfig::default().with_max_depth(2));
        let err = interceptor.visit(&not_b()).unwrap_err();
        assert!(matches!(err, InterceptError::DepthLimitExceeded { limit: 2 }));
        assert!(interceptor.context().is_empty());

        let shallow = Expr::not(Expr::constant_of(ConstantValue::Bool(true)));
        assert!(interceptor.visit(&shallow).is_ok());
    }

    #[test]
    fn test_switch_case_hook() {
        let cases = [
            SwitchCase::new([int(1)], Expr::constant_of(ConstantValue::str("one"))),
            SwitchCase::new([int(2)], Expr::constant_of(ConstantValue::str("two"))),
        ];
        let tree = Expr::switch(int(2), None, None, cases);
        let mut interceptor = Interceptor::new();
        let result = interceptor
            .visit_with_hook::<Arc<SwitchCase>>(&tree, |case| {
                Ok(SwitchCase::new(case.test_values.iter().cloned(), Expr::constant_of(ConstantValue::str("n"))))
            })
            .unwrap();
        match result {
            Expr::Switch(s) => {
                assert_eq!(s.cases.len(), 2);
                assert!(s.cases.iter().all(|c| c.body == Expr::constant_of(ConstantValue::str("n"))));
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn test_flatten_dedups_shared_instance() {
        let shared = not_b();
        let tree = Expr::block([], [shared.clone(), shared.clone(), not_b()]);
        let mut interceptor = Interceptor::new();
        let nodes = interceptor.flatten(&tree).unwrap();
        // Each `not_b` holds a lambda, a unary, a member and one parameter
        // instance referenced twice.
        assert_eq!(nodes.len(), 1 + 4 + 4);
        assert!(Expr::ptr_eq(nodes.last().unwrap(), &tree));
        assert_eq!(interceptor.observer_count(), 0);
    }
}
