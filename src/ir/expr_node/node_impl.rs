use std::fmt;
use std::sync::Arc;

use archery::ArcK;
use rpds::Vector;

use super::node_types::*;
use crate::ir::identity::{
    CallSiteBinder, ConstantValue, ConstructorRef, MemberRef, MethodRef, SymbolDocument, TypeRef,
};

macro_rules! impl_expr_from {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        $(
            impl From<$payload> for Expr {
                fn from(payload: $payload) -> Self {
                    Expr::$variant(Arc::new(payload))
                }
            }

            impl From<Arc<$payload>> for Expr {
                fn from(payload: Arc<$payload>) -> Self {
                    Expr::$variant(payload)
                }
            }
        )*
    };
}

impl_expr_from! {
    Unary => UnaryExpr,
    Binary => BinaryExpr,
    Block => BlockExpr,
    Call => CallExpr,
    Conditional => ConditionalExpr,
    Constant => ConstantExpr,
    DebugInfo => DebugInfoExpr,
    Default => DefaultExpr,
    Dynamic => DynamicExpr,
    Goto => GotoExpr,
    Index => IndexExpr,
    Invocation => InvocationExpr,
    Label => LabelExpr,
    Lambda => LambdaExpr,
    ListInit => ListInitExpr,
    Loop => LoopExpr,
    Member => MemberExpr,
    MemberInit => MemberInitExpr,
    New => NewExpr,
    NewArray => NewArrayExpr,
    Parameter => ParameterExpr,
    RuntimeVariables => RuntimeVariablesExpr,
    Switch => SwitchExpr,
    Try => TryExpr,
    TypeBinary => TypeBinaryExpr,
}

fn vector<T>(items: impl IntoIterator<Item = T>) -> Vector<T, ArcK> {
    items.into_iter().collect()
}

impl Expr {
    /// The type this sub-expression evaluates to.
    pub fn ty(&self) -> &TypeRef {
        match self {
            Expr::Unary(e) => &e.ty,
            Expr::Binary(e) => &e.ty,
            Expr::Block(e) => &e.ty,
            Expr::Call(e) => &e.ty,
            Expr::Conditional(e) => &e.ty,
            Expr::Constant(e) => &e.ty,
            Expr::DebugInfo(e) => &e.ty,
            Expr::Default(e) => &e.ty,
            Expr::Dynamic(e) => &e.ty,
            Expr::Goto(e) => &e.ty,
            Expr::Index(e) => &e.ty,
            Expr::Invocation(e) => &e.ty,
            Expr::Label(e) => &e.ty,
            Expr::Lambda(e) => &e.ty,
            Expr::ListInit(e) => &e.ty,
            Expr::Loop(e) => &e.ty,
            Expr::Member(e) => &e.ty,
            Expr::MemberInit(e) => &e.ty,
            Expr::New(e) => &e.ty,
            Expr::NewArray(e) => &e.ty,
            Expr::Parameter(e) => &e.ty,
            Expr::RuntimeVariables(e) => &e.ty,
            Expr::Switch(e) => &e.ty,
            Expr::Try(e) => &e.ty,
            Expr::TypeBinary(e) => &e.ty,
        }
    }

    pub fn variant(&self) -> ExprVariant {
        match self {
            Expr::Unary(_) => ExprVariant::Unary,
            Expr::Binary(_) => ExprVariant::Binary,
            Expr::Block(_) => ExprVariant::Block,
            Expr::Call(_) => ExprVariant::Call,
            Expr::Conditional(_) => ExprVariant::Conditional,
            Expr::Constant(_) => ExprVariant::Constant,
            Expr::DebugInfo(_) => ExprVariant::DebugInfo,
            Expr::Default(_) => ExprVariant::Default,
            Expr::Dynamic(_) => ExprVariant::Dynamic,
            Expr::Goto(_) => ExprVariant::Goto,
            Expr::Index(_) => ExprVariant::Index,
            Expr::Invocation(_) => ExprVariant::Invocation,
            Expr::Label(_) => ExprVariant::Label,
            Expr::Lambda(_) => ExprVariant::Lambda,
            Expr::ListInit(_) => ExprVariant::ListInit,
            Expr::Loop(_) => ExprVariant::Loop,
            Expr::Member(_) => ExprVariant::Member,
            Expr::MemberInit(_) => ExprVariant::MemberInit,
            Expr::New(_) => ExprVariant::New,
            Expr::NewArray(_) => ExprVariant::NewArray,
            Expr::Parameter(_) => ExprVariant::Parameter,
            Expr::RuntimeVariables(_) => ExprVariant::RuntimeVariables,
            Expr::Switch(_) => ExprVariant::Switch,
            Expr::Try(_) => ExprVariant::Try,
            Expr::TypeBinary(_) => ExprVariant::TypeBinary,
        }
    }

    /// The node-kind tag used by structural comparison and hashing.
    pub fn node_kind(&self) -> ExprKind {
        match self {
            Expr::Unary(e) => ExprKind::Unary(e.op),
            Expr::Binary(e) => ExprKind::Binary(e.op),
            Expr::Block(_) => ExprKind::Block,
            Expr::Call(_) => ExprKind::Call,
            Expr::Conditional(_) => ExprKind::Conditional,
            Expr::Constant(_) => ExprKind::Constant,
            Expr::DebugInfo(_) => ExprKind::DebugInfo,
            Expr::Default(_) => ExprKind::Default,
            Expr::Dynamic(_) => ExprKind::Dynamic,
            Expr::Goto(_) => ExprKind::Goto,
            Expr::Index(_) => ExprKind::Index,
            Expr::Invocation(_) => ExprKind::Invoke,
            Expr::Label(_) => ExprKind::Label,
            Expr::Lambda(_) => ExprKind::Lambda,
            Expr::ListInit(_) => ExprKind::ListInit,
            Expr::Loop(_) => ExprKind::Loop,
            Expr::Member(_) => ExprKind::MemberAccess,
            Expr::MemberInit(_) => ExprKind::MemberInit,
            Expr::New(_) => ExprKind::New,
            Expr::NewArray(e) => match e.kind {
                NewArrayKind::Init => ExprKind::NewArrayInit,
                NewArrayKind::Bounds => ExprKind::NewArrayBounds,
            },
            Expr::Parameter(_) => ExprKind::Parameter,
            Expr::RuntimeVariables(_) => ExprKind::RuntimeVariables,
            Expr::Switch(_) => ExprKind::Switch,
            Expr::Try(_) => ExprKind::Try,
            Expr::TypeBinary(e) => match e.kind {
                TypeBinaryKind::TypeIs => ExprKind::TypeIs,
                TypeBinaryKind::TypeEqual => ExprKind::TypeEqual,
            },
        }
    }

    /// Address of the payload, the identity of this node instance.
    pub fn address(&self) -> usize {
        match self {
            Expr::Unary(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Binary(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Block(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Call(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Conditional(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Constant(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::DebugInfo(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Default(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Dynamic(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Goto(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Index(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Invocation(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Label(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Lambda(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::ListInit(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Loop(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Member(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::MemberInit(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::New(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::NewArray(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Parameter(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::RuntimeVariables(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Switch(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::Try(e) => Arc::as_ptr(e) as *const () as usize,
            Expr::TypeBinary(e) => Arc::as_ptr(e) as *const () as usize,
        }
    }

    /// True when both handles point at the same node instance.
    pub fn ptr_eq(a: &Expr, b: &Expr) -> bool {
        a.variant() == b.variant() && a.address() == b.address()
    }

    pub fn ptr_eq_opt(a: &Option<Expr>, b: &Option<Expr>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => Expr::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_call(&self) -> Option<&Arc<CallExpr>> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&Arc<LambdaExpr>> {
        match self {
            Expr::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Arc<ConstantExpr>> {
        match self {
            Expr::Constant(constant) => Some(constant),
            _ => None,
        }
    }

    /// Direct child nodes in traversal order. Absent children are skipped;
    /// children held by auxiliary structures (cases, handlers, bindings,
    /// initializers) are included in their declared order.
    pub fn children(&self) -> Vec<Expr> {
        let mut out = Vec::new();
        match self {
            Expr::Unary(e) => out.push(e.operand.clone()),
            Expr::Binary(e) => {
                out.push(e.left.clone());
                out.push(e.right.clone());
                if let Some(conversion) = &e.conversion {
                    out.push(Expr::Lambda(conversion.clone()));
                }
            }
            Expr::Block(e) => {
                out.extend(e.variables.iter().cloned().map(Expr::Parameter));
                out.extend(e.expressions.iter().cloned());
            }
            Expr::Call(e) => {
                out.extend(e.object.iter().cloned());
                out.extend(e.arguments.iter().cloned());
            }
            Expr::Conditional(e) => {
                out.push(e.test.clone());
                out.push(e.if_true.clone());
                out.push(e.if_false.clone());
            }
            Expr::Constant(_) | Expr::DebugInfo(_) | Expr::Default(_) | Expr::Parameter(_) => {}
            Expr::Dynamic(e) => out.extend(e.arguments.iter().cloned()),
            Expr::Goto(e) => out.extend(e.value.iter().cloned()),
            Expr::Index(e) => {
                out.extend(e.object.iter().cloned());
                out.extend(e.arguments.iter().cloned());
            }
            Expr::Invocation(e) => {
                out.push(e.expression.clone());
                out.extend(e.arguments.iter().cloned());
            }
            Expr::Label(e) => out.extend(e.default_value.iter().cloned()),
            Expr::Lambda(e) => {
                out.push(e.body.clone());
                out.extend(e.parameters.iter().cloned().map(Expr::Parameter));
            }
            Expr::ListInit(e) => {
                out.push(Expr::New(e.new_expression.clone()));
                for init in e.initializers.iter() {
                    out.extend(init.arguments.iter().cloned());
                }
            }
            Expr::Loop(e) => out.push(e.body.clone()),
            Expr::Member(e) => out.extend(e.expression.iter().cloned()),
            Expr::MemberInit(e) => {
                out.push(Expr::New(e.new_expression.clone()));
                for binding in e.bindings.iter() {
                    collect_binding_children(binding, &mut out);
                }
            }
            Expr::New(e) => out.extend(e.arguments.iter().cloned()),
            Expr::NewArray(e) => out.extend(e.expressions.iter().cloned()),
            Expr::RuntimeVariables(e) => {
                out.extend(e.variables.iter().cloned().map(Expr::Parameter));
            }
            Expr::Switch(e) => {
                out.push(e.switch_value.clone());
                for case in e.cases.iter() {
                    out.extend(case.test_values.iter().cloned());
                    out.push(case.body.clone());
                }
                out.extend(e.default_body.iter().cloned());
            }
            Expr::Try(e) => {
                out.push(e.body.clone());
                for handler in e.handlers.iter() {
                    out.extend(handler.variable.iter().cloned().map(Expr::Parameter));
                    out.extend(handler.filter.iter().cloned());
                    out.push(handler.body.clone());
                }
                out.extend(e.finally.iter().cloned());
                out.extend(e.fault.iter().cloned());
            }
            Expr::TypeBinary(e) => out.push(e.expression.clone()),
        }
        out
    }

    // ------------------------------------------------------------------
    // Construction. Result types follow what a query producer would infer.
    // ------------------------------------------------------------------

    pub fn make_unary(op: UnaryOp, operand: Expr, ty: TypeRef) -> Expr {
        Expr::from(UnaryExpr {
            op,
            ty,
            operand,
            method: None,
            is_lifted: false,
            is_lifted_to_null: false,
        })
    }

    pub fn not(operand: Expr) -> Expr {
        let ty = operand.ty().clone();
        Expr::make_unary(UnaryOp::Not, operand, ty)
    }

    pub fn negate(operand: Expr) -> Expr {
        let ty = operand.ty().clone();
        Expr::make_unary(UnaryOp::Negate, operand, ty)
    }

    pub fn convert(operand: Expr, ty: TypeRef) -> Expr {
        Expr::make_unary(UnaryOp::Convert, operand, ty)
    }

    /// Quotes a lambda so it is passed to a query operator as a tree.
    pub fn quote(lambda: Arc<LambdaExpr>) -> Expr {
        let ty = TypeRef::expression(lambda.ty.clone());
        Expr::make_unary(UnaryOp::Quote, Expr::Lambda(lambda), ty)
    }

    pub fn make_binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let ty = if op.is_predicate() { TypeRef::bool() } else { left.ty().clone() };
        Expr::from(BinaryExpr {
            op,
            ty,
            left,
            right,
            method: None,
            conversion: None,
            is_lifted: false,
            is_lifted_to_null: false,
        })
    }

    pub fn equal(left: Expr, right: Expr) -> Expr {
        Expr::make_binary(BinaryOp::Equal, left, right)
    }

    pub fn not_equal(left: Expr, right: Expr) -> Expr {
        Expr::make_binary(BinaryOp::NotEqual, left, right)
    }

    pub fn and_also(left: Expr, right: Expr) -> Expr {
        Expr::make_binary(BinaryOp::AndAlso, left, right)
    }

    pub fn or_else(left: Expr, right: Expr) -> Expr {
        Expr::make_binary(BinaryOp::OrElse, left, right)
    }

    pub fn add(left: Expr, right: Expr) -> Expr {
        Expr::make_binary(BinaryOp::Add, left, right)
    }

    pub fn modulo(left: Expr, right: Expr) -> Expr {
        Expr::make_binary(BinaryOp::Modulo, left, right)
    }

    pub fn call(object: Option<Expr>, method: MethodRef, arguments: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::from(CallExpr {
            ty: method.return_type().clone(),
            method,
            object,
            arguments: vector(arguments),
        })
    }

    pub fn condition(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
        Expr::from(ConditionalExpr {
            ty: if_true.ty().clone(),
            test,
            if_true,
            if_false,
        })
    }

    pub fn constant(value: ConstantValue, ty: TypeRef) -> Expr {
        Expr::from(ConstantExpr { ty, value })
    }

    /// A constant whose type is inferred from the value.
    pub fn constant_of(value: ConstantValue) -> Expr {
        let ty = match &value {
            ConstantValue::Null => TypeRef::object(),
            ConstantValue::Bool(_) => TypeRef::bool(),
            ConstantValue::Int(_) => TypeRef::int32(),
            ConstantValue::Double(_) => TypeRef::double(),
            ConstantValue::Char(_) => TypeRef::char(),
            ConstantValue::Str(_) => TypeRef::string(),
            ConstantValue::Type(_) => TypeRef::type_type(),
            ConstantValue::Array(_) => TypeRef::array(TypeRef::object()),
            ConstantValue::Source(source) => TypeRef::queryable(source.element_type.clone()),
        };
        Expr::constant(value, ty)
    }

    pub fn debug_info(
        document: SymbolDocument,
        start: (u32, u32),
        end: (u32, u32),
    ) -> Expr {
        Expr::from(DebugInfoExpr {
            ty: TypeRef::void(),
            document,
            start_line: start.0,
            start_column: start.1,
            end_line: end.0,
            end_column: end.1,
            is_clear: false,
        })
    }

    pub fn default_value(ty: TypeRef) -> Expr {
        Expr::from(DefaultExpr { ty })
    }

    pub fn dynamic(
        binder: CallSiteBinder,
        ty: TypeRef,
        delegate_type: TypeRef,
        arguments: impl IntoIterator<Item = Expr>,
    ) -> Expr {
        Expr::from(DynamicExpr {
            ty,
            binder,
            delegate_type,
            arguments: vector(arguments),
        })
    }

    pub fn make_goto(kind: GotoKind, target: Arc<LabelTarget>, value: Option<Expr>) -> Expr {
        Expr::from(GotoExpr {
            ty: TypeRef::void(),
            kind,
            target,
            value,
        })
    }

    pub fn index(
        object: Option<Expr>,
        indexer: Option<MemberRef>,
        ty: TypeRef,
        arguments: impl IntoIterator<Item = Expr>,
    ) -> Expr {
        Expr::from(IndexExpr {
            ty,
            object,
            indexer,
            arguments: vector(arguments),
        })
    }

    pub fn invoke(expression: Expr, arguments: impl IntoIterator<Item = Expr>) -> Expr {
        let ty = expression
            .ty()
            .delegate_return()
            .cloned()
            .unwrap_or_else(TypeRef::object);
        Expr::from(InvocationExpr {
            ty,
            expression,
            arguments: vector(arguments),
        })
    }

    pub fn label(target: Arc<LabelTarget>, default_value: Option<Expr>) -> Expr {
        Expr::from(LabelExpr {
            ty: target.ty.clone(),
            target,
            default_value,
        })
    }

    /// Builds a lambda typed `Func<parameter types.., body type>`.
    pub fn lambda(body: Expr, parameters: impl IntoIterator<Item = Arc<ParameterExpr>>) -> Arc<LambdaExpr> {
        let parameters: ParameterVector = vector(parameters);
        let ty = TypeRef::func(parameters.iter().map(|p| p.ty.clone()), body.ty().clone());
        Arc::new(LambdaExpr {
            ty,
            name: None,
            body,
            parameters,
            tail_call: false,
        })
    }

    pub fn list_init(new_expression: Arc<NewExpr>, initializers: impl IntoIterator<Item = Arc<ElementInit>>) -> Expr {
        Expr::from(ListInitExpr {
            ty: new_expression.ty.clone(),
            new_expression,
            initializers: vector(initializers),
        })
    }

    pub fn make_loop(
        body: Expr,
        break_label: Option<Arc<LabelTarget>>,
        continue_label: Option<Arc<LabelTarget>>,
    ) -> Expr {
        let ty = break_label.as_ref().map(|l| l.ty.clone()).unwrap_or_else(TypeRef::void);
        Expr::from(LoopExpr {
            ty,
            body,
            break_label,
            continue_label,
        })
    }

    pub fn property(expression: Option<Expr>, member: MemberRef) -> Expr {
        Expr::from(MemberExpr {
            ty: member.member_type.clone(),
            member,
            expression,
        })
    }

    pub fn member_init(new_expression: Arc<NewExpr>, bindings: impl IntoIterator<Item = Arc<MemberBinding>>) -> Expr {
        Expr::from(MemberInitExpr {
            ty: new_expression.ty.clone(),
            new_expression,
            bindings: vector(bindings),
        })
    }

    pub fn new_object(
        constructor: ConstructorRef,
        arguments: impl IntoIterator<Item = Expr>,
        members: Option<Vec<MemberRef>>,
    ) -> Arc<NewExpr> {
        Arc::new(NewExpr {
            ty: constructor.declaring_type.clone(),
            constructor: Some(constructor),
            arguments: vector(arguments),
            members: members.map(|m| m.into_iter().collect()),
        })
    }

    pub fn new_array_init(element_type: TypeRef, expressions: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::from(NewArrayExpr {
            ty: TypeRef::array(element_type),
            kind: NewArrayKind::Init,
            expressions: vector(expressions),
        })
    }

    pub fn new_array_bounds(element_type: TypeRef, bounds: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::from(NewArrayExpr {
            ty: TypeRef::array(element_type),
            kind: NewArrayKind::Bounds,
            expressions: vector(bounds),
        })
    }

    pub fn parameter(ty: TypeRef, name: &str) -> Arc<ParameterExpr> {
        Arc::new(ParameterExpr {
            ty,
            name: Some(Arc::from(name)),
            is_by_ref: false,
        })
    }

    pub fn block(variables: impl IntoIterator<Item = Arc<ParameterExpr>>, expressions: impl IntoIterator<Item = Expr>) -> Expr {
        let expressions: ExprVector = vector(expressions);
        let ty = expressions.last().map(|e| e.ty().clone()).unwrap_or_else(TypeRef::void);
        Expr::from(BlockExpr {
            ty,
            variables: vector(variables),
            expressions,
        })
    }

    pub fn runtime_variables(variables: impl IntoIterator<Item = Arc<ParameterExpr>>) -> Expr {
        Expr::from(RuntimeVariablesExpr {
            ty: TypeRef::named("IRuntimeVariables"),
            variables: vector(variables),
        })
    }

    pub fn switch(
        switch_value: Expr,
        default_body: Option<Expr>,
        comparison: Option<MethodRef>,
        cases: impl IntoIterator<Item = Arc<SwitchCase>>,
    ) -> Expr {
        let cases: SwitchCaseVector = vector(cases);
        let ty = cases
            .first()
            .map(|c| c.body.ty().clone())
            .or_else(|| default_body.as_ref().map(|d| d.ty().clone()))
            .unwrap_or_else(TypeRef::void);
        Expr::from(SwitchExpr {
            ty,
            switch_value,
            cases,
            default_body,
            comparison,
        })
    }

    pub fn make_try(
        body: Expr,
        handlers: impl IntoIterator<Item = Arc<CatchBlock>>,
        finally: Option<Expr>,
        fault: Option<Expr>,
    ) -> Expr {
        Expr::from(TryExpr {
            ty: body.ty().clone(),
            body,
            handlers: vector(handlers),
            finally,
            fault,
        })
    }

    pub fn type_is(expression: Expr, type_operand: TypeRef) -> Expr {
        Expr::from(TypeBinaryExpr {
            ty: TypeRef::bool(),
            kind: TypeBinaryKind::TypeIs,
            expression,
            type_operand,
        })
    }

    pub fn type_equal(expression: Expr, type_operand: TypeRef) -> Expr {
        Expr::from(TypeBinaryExpr {
            ty: TypeRef::bool(),
            kind: TypeBinaryKind::TypeEqual,
            expression,
            type_operand,
        })
    }
}

fn collect_binding_children(binding: &MemberBinding, out: &mut Vec<Expr>) {
    match binding {
        MemberBinding::Assignment { expression, .. } => out.push(expression.clone()),
        MemberBinding::MemberBinding { bindings, .. } => {
            for nested in bindings.iter() {
                collect_binding_children(nested, out);
            }
        }
        MemberBinding::ListBinding { initializers, .. } => {
            for init in initializers.iter() {
                out.extend(init.arguments.iter().cloned());
            }
        }
    }
}

impl SwitchCase {
    pub fn new(test_values: impl IntoIterator<Item = Expr>, body: Expr) -> Arc<SwitchCase> {
        Arc::new(SwitchCase {
            test_values: vector(test_values),
            body,
        })
    }
}

impl CatchBlock {
    pub fn new(test: TypeRef, variable: Option<Arc<ParameterExpr>>, body: Expr, filter: Option<Expr>) -> Arc<CatchBlock> {
        Arc::new(CatchBlock {
            test,
            variable,
            body,
            filter,
        })
    }
}

impl ElementInit {
    pub fn new(add_method: MethodRef, arguments: impl IntoIterator<Item = Expr>) -> Arc<ElementInit> {
        Arc::new(ElementInit {
            add_method,
            arguments: vector(arguments),
        })
    }
}

impl LabelTarget {
    pub fn new(name: Option<&str>, ty: TypeRef) -> Arc<LabelTarget> {
        Arc::new(LabelTarget {
            name: name.map(Arc::from),
            ty,
        })
    }
}

impl MemberBinding {
    pub fn assign(member: MemberRef, expression: Expr) -> Arc<MemberBinding> {
        Arc::new(MemberBinding::Assignment { member, expression })
    }

    pub fn nested(member: MemberRef, bindings: impl IntoIterator<Item = Arc<MemberBinding>>) -> Arc<MemberBinding> {
        Arc::new(MemberBinding::MemberBinding {
            member,
            bindings: vector(bindings),
        })
    }

    pub fn list(member: MemberRef, initializers: impl IntoIterator<Item = Arc<ElementInit>>) -> Arc<MemberBinding> {
        Arc::new(MemberBinding::ListBinding {
            member,
            initializers: vector(initializers),
        })
    }
}

fn write_list<'a>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = &'a Expr>) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn param_name(p: &ParameterExpr) -> &str {
    p.name.as_deref().unwrap_or("_")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Unary(e) => match e.op {
                UnaryOp::Quote => write!(f, "{}", e.operand),
                UnaryOp::Convert | UnaryOp::ConvertChecked => write!(f, "Convert({}, {})", e.operand, e.ty),
                op => write!(f, "{:?}({})", op, e.operand),
            },
            Expr::Binary(e) => {
                let symbol = match e.op {
                    BinaryOp::Add | BinaryOp::AddChecked => "+",
                    BinaryOp::And => "&",
                    BinaryOp::AndAlso => "&&",
                    BinaryOp::Coalesce => "??",
                    BinaryOp::Divide => "/",
                    BinaryOp::Equal => "==",
                    BinaryOp::ExclusiveOr => "^",
                    BinaryOp::GreaterThan => ">",
                    BinaryOp::GreaterThanOrEqual => ">=",
                    BinaryOp::LeftShift => "<<",
                    BinaryOp::LessThan => "<",
                    BinaryOp::LessThanOrEqual => "<=",
                    BinaryOp::Modulo => "%",
                    BinaryOp::Multiply | BinaryOp::MultiplyChecked => "*",
                    BinaryOp::NotEqual => "!=",
                    BinaryOp::Or => "|",
                    BinaryOp::OrElse => "||",
                    BinaryOp::Power => "**",
                    BinaryOp::RightShift => ">>",
                    BinaryOp::Subtract | BinaryOp::SubtractChecked => "-",
                    BinaryOp::Assign => "=",
                    BinaryOp::ArrayIndex => return write!(f, "{}[{}]", e.left, e.right),
                };
                write!(f, "({} {} {})", e.left, symbol, e.right)
            }
            Expr::Block(e) => {
                write!(f, "{{ ")?;
                for (i, stmt) in e.expressions.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", stmt)?;
                }
                write!(f, " }}")
            }
            Expr::Call(e) => {
                match &e.object {
                    Some(object) => write!(f, "{}.{}(", object, e.method.name())?,
                    None => write!(f, "{}(", e.method.name())?,
                }
                write_list(f, e.arguments.iter())?;
                write!(f, ")")
            }
            Expr::Conditional(e) => write!(f, "IIF({}, {}, {})", e.test, e.if_true, e.if_false),
            Expr::Constant(e) => write!(f, "{}", e.value),
            Expr::DebugInfo(e) => write!(
                f,
                "<DebugInfo({}: {}, {}, {}, {})>",
                e.document.file_name, e.start_line, e.start_column, e.end_line, e.end_column
            ),
            Expr::Default(e) => write!(f, "default({})", e.ty),
            Expr::Dynamic(e) => {
                write!(f, "Dynamic {}(", e.binder.operation)?;
                write_list(f, e.arguments.iter())?;
                write!(f, ")")
            }
            Expr::Goto(e) => {
                let name = e.target.name.as_deref().unwrap_or("UnamedLabel");
                match &e.value {
                    Some(value) => write!(f, "{:?} {} {}", e.kind, name, value),
                    None => write!(f, "{:?} {}", e.kind, name),
                }
            }
            Expr::Index(e) => {
                if let Some(object) = &e.object {
                    write!(f, "{}", object)?;
                }
                write!(f, "[")?;
                write_list(f, e.arguments.iter())?;
                write!(f, "]")
            }
            Expr::Invocation(e) => {
                write!(f, "Invoke({}", e.expression)?;
                for arg in e.arguments.iter() {
                    write!(f, ", {}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Label(e) => write!(f, "{}:", e.target.name.as_deref().unwrap_or("UnamedLabel")),
            Expr::Lambda(e) => {
                if e.parameters.len() == 1 {
                    write!(f, "{}", param_name(&e.parameters[0]))?;
                } else {
                    write!(f, "(")?;
                    for (i, p) in e.parameters.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", param_name(p))?;
                    }
                    write!(f, ")")?;
                }
                write!(f, " => {}", e.body)
            }
            Expr::ListInit(e) => {
                write!(f, "{} {{", Expr::New(e.new_expression.clone()))?;
                for (i, init) in e.initializers.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}(", init.add_method.name())?;
                    write_list(f, init.arguments.iter())?;
                    write!(f, ")")?;
                }
                write!(f, " }}")
            }
            Expr::Loop(e) => write!(f, "loop {{ {} }}", e.body),
            Expr::Member(e) => match &e.expression {
                Some(expression) => write!(f, "{}.{}", expression, e.member.name()),
                None => write!(f, "{}.{}", e.member.declaring_type.name(), e.member.name()),
            },
            Expr::MemberInit(e) => {
                write!(f, "{} {{", Expr::New(e.new_expression.clone()))?;
                for (i, binding) in e.bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {} = ..", binding.member().name())?;
                }
                write!(f, " }}")
            }
            Expr::New(e) => {
                write!(f, "new {}(", e.ty)?;
                write_list(f, e.arguments.iter())?;
                write!(f, ")")
            }
            Expr::NewArray(e) => match e.kind {
                NewArrayKind::Init => {
                    write!(f, "new [] {{")?;
                    write_list(f, e.expressions.iter())?;
                    write!(f, "}}")
                }
                NewArrayKind::Bounds => {
                    write!(f, "new {}[", e.ty.element_type().map(|t| t.to_string()).unwrap_or_default())?;
                    write_list(f, e.expressions.iter())?;
                    write!(f, "]")
                }
            },
            Expr::Parameter(e) => write!(f, "{}", param_name(e)),
            Expr::RuntimeVariables(e) => {
                write!(f, "(")?;
                for (i, p) in e.variables.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param_name(p))?;
                }
                write!(f, ")")
            }
            Expr::Switch(e) => write!(f, "switch ({}) {{ {} cases }}", e.switch_value, e.cases.len()),
            Expr::Try(e) => write!(f, "try {{ {} }}", e.body),
            Expr::TypeBinary(e) => match e.kind {
                TypeBinaryKind::TypeIs => write!(f, "({} Is {})", e.expression, e.type_operand),
                TypeBinaryKind::TypeEqual => write!(f, "({} TypeEqual {})", e.expression, e.type_operand),
            },
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}: {}]", self.node_kind(), self.ty(), self)
    }
}
