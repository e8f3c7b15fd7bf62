//! Module for generating random expression trees for property-based testing.
//!
//! Trees are well typed over the record type of [`super::fixtures`]: integer,
//! boolean and string sub-expressions are generated by separate functions, and
//! lambdas bind an `x` parameter that member accesses refer to. Besides query
//! pipelines the generator emits the statement-shaped cases (blocks, switches,
//! try/catch, loops with labels, member initialisers) so that every traversal
//! path of the interceptor gets exercised.
//!
//! Generation functions use a depth parameter to limit recursion and prevent
//! excessive tree size.

use std::sync::Arc;

use quickcheck::{Arbitrary, Gen};

use expression_interceptor::ir::expr_node::{
    BinaryOp, CatchBlock, ElementInit, Expr, GotoKind, LabelTarget, LambdaExpr, MemberBinding,
    ParameterExpr, SwitchCase,
};
use expression_interceptor::ir::identity::{
    CallSiteBinder, ConstantValue, ConstructorRef, MemberRef, MethodRef, SymbolDocument, TypeRef,
};
use expression_interceptor::ir::operators::{
    order_by_call, order_by_descending_call, query_source, select_call, skip_call, take_call, then_by_call,
    then_by_descending_call, to_lower_call, to_upper_call, where_call,
};
use expression_interceptor::Interceptor;

use super::fixtures::{member_a, member_b, member_c, record_param, record_type, RECORDS};

/// Maximum depth for generated trees to prevent excessive recursion.
const MAX_DEPTH: usize = 6;

/// A randomly generated expression tree.
#[derive(Clone, Debug)]
pub struct ArbitraryExpr(pub Expr);

/// Generates a random number in the range [min, max].
fn gen_range(g: &mut Gen, min: u32, max: u32) -> u32 {
    min + (u32::arbitrary(g) % (max - min + 1))
}

fn gen_word(g: &mut Gen) -> String {
    let letters: Vec<char> = "abcABC".chars().collect();
    (0..gen_range(g, 0, 3)).map(|_| *g.choose(&letters).unwrap()).collect()
}

fn int_constant(g: &mut Gen, min: u32, max: u32) -> Expr {
    Expr::constant_of(ConstantValue::Int(gen_range(g, min, max) as i64))
}

fn access(scope: &Arc<ParameterExpr>, member: MemberRef) -> Expr {
    Expr::property(Some(Expr::Parameter(scope.clone())), member)
}

/// Generates an integer-typed expression.
fn gen_int(g: &mut Gen, depth: usize, scope: Option<&Arc<ParameterExpr>>) -> Expr {
    if depth == 0 {
        return match scope {
            Some(x) if bool::arbitrary(g) => access(x, member_a()),
            _ => int_constant(g, 0, 9),
        };
    }
    const CHOICES: &[&str] = &["constant", "member", "add", "subtract", "modulo", "negate", "conditional"];
    match *g.choose(CHOICES).unwrap() {
        "constant" => int_constant(g, 0, 9),
        "member" => match scope {
            Some(x) => access(x, member_a()),
            None => int_constant(g, 0, 9),
        },
        "add" => Expr::add(gen_int(g, depth - 1, scope), gen_int(g, depth - 1, scope)),
        "subtract" => Expr::make_binary(
            BinaryOp::Subtract,
            gen_int(g, depth - 1, scope),
            gen_int(g, depth - 1, scope),
        ),
        "modulo" => Expr::modulo(gen_int(g, depth - 1, scope), int_constant(g, 1, 5)),
        "negate" => Expr::negate(gen_int(g, depth - 1, scope)),
        "conditional" => Expr::condition(
            gen_bool(g, depth - 1, scope),
            gen_int(g, depth - 1, scope),
            gen_int(g, depth - 1, scope),
        ),
        _ => unreachable!(),
    }
}

/// Generates a boolean-typed expression.
fn gen_bool(g: &mut Gen, depth: usize, scope: Option<&Arc<ParameterExpr>>) -> Expr {
    if depth == 0 {
        return match scope {
            Some(x) if bool::arbitrary(g) => access(x, member_b()),
            _ => Expr::constant_of(ConstantValue::Bool(bool::arbitrary(g))),
        };
    }
    const CHOICES: &[&str] = &[
        "constant", "member", "not", "equal", "not_equal", "less_than", "and_also", "or_else", "type_is",
    ];
    match *g.choose(CHOICES).unwrap() {
        "constant" => Expr::constant_of(ConstantValue::Bool(bool::arbitrary(g))),
        "member" => match scope {
            Some(x) => access(x, member_b()),
            None => Expr::constant_of(ConstantValue::Bool(bool::arbitrary(g))),
        },
        "not" => Expr::not(gen_bool(g, depth - 1, scope)),
        "equal" => Expr::equal(gen_int(g, depth - 1, scope), gen_int(g, depth - 1, scope)),
        "not_equal" => Expr::not_equal(gen_string(g, depth - 1, scope), gen_string(g, depth - 1, scope)),
        "less_than" => Expr::make_binary(
            BinaryOp::LessThan,
            gen_int(g, depth - 1, scope),
            gen_int(g, depth - 1, scope),
        ),
        "and_also" => Expr::and_also(gen_bool(g, depth - 1, scope), gen_bool(g, depth - 1, scope)),
        "or_else" => Expr::or_else(gen_bool(g, depth - 1, scope), gen_bool(g, depth - 1, scope)),
        "type_is" => match scope {
            Some(x) => Expr::type_is(Expr::Parameter(x.clone()), record_type()),
            None => Expr::type_equal(gen_string(g, depth - 1, scope), TypeRef::string()),
        },
        _ => unreachable!(),
    }
}

/// Generates a string-typed expression.
fn gen_string(g: &mut Gen, depth: usize, scope: Option<&Arc<ParameterExpr>>) -> Expr {
    if depth == 0 {
        return match scope {
            Some(x) if bool::arbitrary(g) => access(x, member_c()),
            _ => Expr::constant_of(ConstantValue::str(&gen_word(g))),
        };
    }
    const CHOICES: &[&str] = &["constant", "member", "upper", "lower", "concat", "conditional"];
    match *g.choose(CHOICES).unwrap() {
        "constant" => Expr::constant_of(ConstantValue::str(&gen_word(g))),
        "member" => match scope {
            Some(x) => access(x, member_c()),
            None => Expr::constant_of(ConstantValue::str(&gen_word(g))),
        },
        "upper" => to_upper_call(gen_string(g, depth - 1, scope)),
        "lower" => to_lower_call(gen_string(g, depth - 1, scope)),
        "concat" => Expr::add(gen_string(g, depth - 1, scope), gen_string(g, depth - 1, scope)),
        "conditional" => Expr::condition(
            gen_bool(g, depth - 1, scope),
            gen_string(g, depth - 1, scope),
            gen_string(g, depth - 1, scope),
        ),
        _ => unreachable!(),
    }
}

/// `x => <bool>` over a record.
fn gen_predicate(g: &mut Gen, depth: usize) -> Arc<LambdaExpr> {
    let x = record_param();
    Expr::lambda(gen_bool(g, depth, Some(&x)), [x])
}

/// `x => <int or string>` over a record.
fn gen_key(g: &mut Gen, depth: usize) -> Arc<LambdaExpr> {
    let x = record_param();
    let body = if bool::arbitrary(g) {
        gen_int(g, depth, Some(&x))
    } else {
        gen_string(g, depth, Some(&x))
    };
    Expr::lambda(body, [x])
}

/// Generates an operator pipeline over the records source.
fn gen_query(g: &mut Gen, depth: usize) -> Expr {
    let mut query = query_source(RECORDS, record_type());
    let mut ordered = false;
    for _ in 0..gen_range(g, 1, 3) {
        const CHOICES: &[&str] = &["where", "order_by", "order_by_descending", "then_by", "take", "skip"];
        query = match *g.choose(CHOICES).unwrap() {
            "where" => where_call(query, gen_predicate(g, depth)),
            "order_by" => order_by_call(query, gen_key(g, depth)),
            "order_by_descending" => order_by_descending_call(query, gen_key(g, depth)),
            "then_by" if ordered => {
                if bool::arbitrary(g) {
                    then_by_call(query, gen_key(g, depth))
                } else {
                    then_by_descending_call(query, gen_key(g, depth))
                }
            }
            "then_by" => order_by_call(query, gen_key(g, depth)),
            "take" => take_call(query, int_constant(g, 0, 10)),
            "skip" => skip_call(query, int_constant(g, 0, 10)),
            _ => unreachable!(),
        };
        ordered = query.as_call().is_some_and(|c| c.ty.name() == "IOrderedQueryable");
    }
    if bool::arbitrary(g) {
        query = select_call(query, gen_key(g, depth));
    }
    query
}

/// Generates one of the statement-shaped or rarely produced cases.
fn gen_statement(g: &mut Gen, depth: usize) -> Expr {
    let d = depth.saturating_sub(1);
    const CHOICES: &[&str] = &[
        "block", "switch", "try", "loop", "member_init", "list_init", "invoke", "index", "array", "dynamic",
        "debug_info", "default", "runtime_variables",
    ];
    match *g.choose(CHOICES).unwrap() {
        "block" => {
            let v = Expr::parameter(TypeRef::int32(), "v");
            let assign = Expr::make_binary(BinaryOp::Assign, Expr::Parameter(v.clone()), gen_int(g, d, None));
            Expr::block([v.clone()], [assign, Expr::add(Expr::Parameter(v), gen_int(g, d, None))])
        }
        "switch" => {
            let cases: Vec<Arc<SwitchCase>> = (0..gen_range(g, 1, 2))
                .map(|_| {
                    let tests: Vec<Expr> = (0..gen_range(g, 1, 2)).map(|_| int_constant(g, 0, 9)).collect();
                    SwitchCase::new(tests, gen_string(g, d, None))
                })
                .collect();
            let default_body = if bool::arbitrary(g) { Some(gen_string(g, d, None)) } else { None };
            Expr::switch(gen_int(g, d, None), default_body, None, cases)
        }
        "try" => {
            let e = Expr::parameter(TypeRef::named("Exception"), "e");
            let filter = if bool::arbitrary(g) { Some(gen_bool(g, d, None)) } else { None };
            let handler = CatchBlock::new(TypeRef::named("Exception"), Some(e), gen_int(g, d, None), filter);
            let finally = if bool::arbitrary(g) { Some(Expr::default_value(TypeRef::void())) } else { None };
            Expr::make_try(gen_int(g, d, None), [handler], finally, None)
        }
        "loop" => {
            let done = LabelTarget::new(Some("done"), TypeRef::int32());
            let next = LabelTarget::new(Some("next"), TypeRef::void());
            let exit = Expr::make_goto(GotoKind::Break, done.clone(), Some(gen_int(g, d, None)));
            let body = Expr::condition(
                gen_bool(g, d, None),
                exit,
                Expr::make_goto(GotoKind::Continue, next.clone(), None),
            );
            let continue_label = if bool::arbitrary(g) { Some(next) } else { None };
            Expr::block([], [Expr::make_loop(body, Some(done.clone()), continue_label), Expr::label(done, None)])
        }
        "member_init" => {
            let ctor = ConstructorRef::new(record_type(), []);
            let new_record = Expr::new_object(ctor, [], None);
            let mut bindings = vec![
                MemberBinding::assign(member_a(), gen_int(g, d, None)),
                MemberBinding::assign(member_c(), gen_string(g, d, None)),
            ];
            if bool::arbitrary(g) {
                let tags = MemberRef::property(record_type(), "Tags", TypeRef::generic("List", [TypeRef::string()]));
                bindings.push(MemberBinding::list(tags, [ElementInit::new(list_add(), [gen_string(g, d, None)])]));
            }
            Expr::member_init(new_record, bindings)
        }
        "list_init" => {
            let list = TypeRef::generic("List", [TypeRef::string()]);
            let new_list = Expr::new_object(ConstructorRef::new(list, []), [], None);
            let inits: Vec<Arc<ElementInit>> = (0..gen_range(g, 1, 3))
                .map(|_| ElementInit::new(list_add(), [gen_string(g, d, None)]))
                .collect();
            Expr::list_init(new_list, inits)
        }
        "invoke" => {
            let predicate = gen_predicate(g, d);
            let ctor = ConstructorRef::new(record_type(), []);
            let arg = Expr::member_init(
                Expr::new_object(ctor, [], None),
                [
                    MemberBinding::assign(member_a(), gen_int(g, d, None)),
                    MemberBinding::assign(member_b(), gen_bool(g, d, None)),
                    MemberBinding::assign(member_c(), gen_string(g, d, None)),
                ],
            );
            Expr::invoke(Expr::Lambda(predicate), [arg])
        }
        "index" => {
            let items: Vec<Expr> = (0..gen_range(g, 1, 3)).map(|_| gen_int(g, d, None)).collect();
            let array = Expr::new_array_init(TypeRef::int32(), items);
            if bool::arbitrary(g) {
                Expr::index(Some(array), None, TypeRef::int32(), [int_constant(g, 0, 0)])
            } else {
                Expr::make_binary(BinaryOp::ArrayIndex, array, int_constant(g, 0, 0))
            }
        }
        "array" => {
            if bool::arbitrary(g) {
                Expr::new_array_bounds(TypeRef::string(), [int_constant(g, 1, 4)])
            } else {
                let items: Vec<Expr> = (0..gen_range(g, 0, 3)).map(|_| gen_string(g, d, None)).collect();
                Expr::new_array_init(TypeRef::string(), items)
            }
        }
        "dynamic" => Expr::dynamic(
            CallSiteBinder::new("GetMember"),
            TypeRef::object(),
            TypeRef::func([TypeRef::object()], TypeRef::object()),
            [gen_int(g, d, None)],
        ),
        "debug_info" => {
            let line = gen_range(g, 1, 50);
            Expr::block(
                [],
                [
                    Expr::debug_info(SymbolDocument::new("query.cs"), (line, 1), (line, 20)),
                    gen_bool(g, d, None),
                ],
            )
        }
        "default" => Expr::default_value(TypeRef::string()),
        "runtime_variables" => Expr::runtime_variables([
            Expr::parameter(TypeRef::int32(), "a"),
            Expr::parameter(TypeRef::string(), "b"),
        ]),
        _ => unreachable!(),
    }
}

fn list_add() -> MethodRef {
    MethodRef::instance(TypeRef::generic("List", [TypeRef::string()]), "Add", [TypeRef::string()], TypeRef::void())
}

/// Generates a random tree with limited depth.
fn gen_expr(g: &mut Gen, depth: usize) -> Expr {
    let depth = depth.min(MAX_DEPTH);
    const CHOICES: &[&str] = &["bool", "int", "string", "query", "lambda", "statement"];
    match *g.choose(CHOICES).unwrap() {
        "bool" => gen_bool(g, depth, None),
        "int" => gen_int(g, depth, None),
        "string" => gen_string(g, depth, None),
        "query" => gen_query(g, depth.saturating_sub(2)),
        "lambda" => Expr::Lambda(gen_predicate(g, depth.saturating_sub(1))),
        "statement" => gen_statement(g, depth),
        _ => unreachable!(),
    }
}

impl Arbitrary for ArbitraryExpr {
    fn arbitrary(g: &mut Gen) -> Self {
        ArbitraryExpr(gen_expr(g, g.size().min(MAX_DEPTH)))
    }
}

/// Returns a structurally identical tree in which every node is a new
/// instance, so that no node of the copy is identity-equal to one of `expr`.
pub fn deep_copy(expr: &Expr) -> anyhow::Result<Expr> {
    let mut interceptor = Interceptor::new();
    Ok(interceptor.visit_with_hook::<Expr>(expr, |node: Expr| Ok(fresh(&node)))?)
}

/// A new instance holding the same payload as `node`.
fn fresh(node: &Expr) -> Expr {
    match node {
        Expr::Unary(e) => Expr::Unary(Arc::new((**e).clone())),
        Expr::Binary(e) => Expr::Binary(Arc::new((**e).clone())),
        Expr::Block(e) => Expr::Block(Arc::new((**e).clone())),
        Expr::Call(e) => Expr::Call(Arc::new((**e).clone())),
        Expr::Conditional(e) => Expr::Conditional(Arc::new((**e).clone())),
        Expr::Constant(e) => Expr::Constant(Arc::new((**e).clone())),
        Expr::DebugInfo(e) => Expr::DebugInfo(Arc::new((**e).clone())),
        Expr::Default(e) => Expr::Default(Arc::new((**e).clone())),
        Expr::Dynamic(e) => Expr::Dynamic(Arc::new((**e).clone())),
        Expr::Goto(e) => Expr::Goto(Arc::new((**e).clone())),
        Expr::Index(e) => Expr::Index(Arc::new((**e).clone())),
        Expr::Invocation(e) => Expr::Invocation(Arc::new((**e).clone())),
        Expr::Label(e) => Expr::Label(Arc::new((**e).clone())),
        Expr::Lambda(e) => Expr::Lambda(Arc::new((**e).clone())),
        Expr::ListInit(e) => Expr::ListInit(Arc::new((**e).clone())),
        Expr::Loop(e) => Expr::Loop(Arc::new((**e).clone())),
        Expr::Member(e) => Expr::Member(Arc::new((**e).clone())),
        Expr::MemberInit(e) => Expr::MemberInit(Arc::new((**e).clone())),
        Expr::New(e) => Expr::New(Arc::new((**e).clone())),
        Expr::NewArray(e) => Expr::NewArray(Arc::new((**e).clone())),
        Expr::Parameter(e) => Expr::Parameter(Arc::new((**e).clone())),
        Expr::RuntimeVariables(e) => Expr::RuntimeVariables(Arc::new((**e).clone())),
        Expr::Switch(e) => Expr::Switch(Arc::new((**e).clone())),
        Expr::Try(e) => Expr::Try(Arc::new((**e).clone())),
        Expr::TypeBinary(e) => Expr::TypeBinary(Arc::new((**e).clone())),
    }
}

