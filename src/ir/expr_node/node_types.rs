use std::fmt;
use std::sync::Arc;

use archery::ArcK;
use rpds::Vector;

use crate::ir::identity::{
    CallSiteBinder, ConstantValue, ConstructorRef, MemberRef, MethodRef, SymbolDocument, TypeRef,
};

pub type ExprVector = Vector<Expr, ArcK>;
pub type ParameterVector = Vector<Arc<ParameterExpr>, ArcK>;
pub type SwitchCaseVector = Vector<Arc<SwitchCase>, ArcK>;
pub type CatchBlockVector = Vector<Arc<CatchBlock>, ArcK>;
pub type MemberBindingVector = Vector<Arc<MemberBinding>, ArcK>;
pub type ElementInitVector = Vector<Arc<ElementInit>, ArcK>;
pub type MemberRefVector = Vector<MemberRef, ArcK>;

/// A node of an immutable query expression tree.
///
/// Each case owns its payload through an `Arc`, so cloning an `Expr` is cheap
/// and two `Expr`s are the same node instance iff their payload pointers are
/// equal (see [`Expr::ptr_eq`]).
#[derive(Clone)]
pub enum Expr {
    Unary(Arc<UnaryExpr>),
    Binary(Arc<BinaryExpr>),
    Block(Arc<BlockExpr>),
    Call(Arc<CallExpr>),
    Conditional(Arc<ConditionalExpr>),
    Constant(Arc<ConstantExpr>),
    DebugInfo(Arc<DebugInfoExpr>),
    Default(Arc<DefaultExpr>),
    Dynamic(Arc<DynamicExpr>),
    Goto(Arc<GotoExpr>),
    Index(Arc<IndexExpr>),
    Invocation(Arc<InvocationExpr>),
    Label(Arc<LabelExpr>),
    Lambda(Arc<LambdaExpr>),
    ListInit(Arc<ListInitExpr>),
    Loop(Arc<LoopExpr>),
    Member(Arc<MemberExpr>),
    MemberInit(Arc<MemberInitExpr>),
    New(Arc<NewExpr>),
    NewArray(Arc<NewArrayExpr>),
    Parameter(Arc<ParameterExpr>),
    RuntimeVariables(Arc<RuntimeVariablesExpr>),
    Switch(Arc<SwitchExpr>),
    Try(Arc<TryExpr>),
    TypeBinary(Arc<TypeBinaryExpr>),
}

/// Plain tag naming each case of [`Expr`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ExprVariant {
    Unary,
    Binary,
    Block,
    Call,
    Conditional,
    Constant,
    DebugInfo,
    Default,
    Dynamic,
    Goto,
    Index,
    Invocation,
    Label,
    Lambda,
    ListInit,
    Loop,
    Member,
    MemberInit,
    New,
    NewArray,
    Parameter,
    RuntimeVariables,
    Switch,
    Try,
    TypeBinary,
}

impl fmt::Display for ExprVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    ArrayLength,
    Convert,
    ConvertChecked,
    Negate,
    NegateChecked,
    UnaryPlus,
    Not,
    OnesComplement,
    Quote,
    TypeAs,
    Throw,
    Unbox,
    Increment,
    Decrement,
    IsTrue,
    IsFalse,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    AddChecked,
    And,
    AndAlso,
    ArrayIndex,
    Assign,
    Coalesce,
    Divide,
    Equal,
    ExclusiveOr,
    GreaterThan,
    GreaterThanOrEqual,
    LeftShift,
    LessThan,
    LessThanOrEqual,
    Modulo,
    Multiply,
    MultiplyChecked,
    NotEqual,
    Or,
    OrElse,
    Power,
    RightShift,
    Subtract,
    SubtractChecked,
}

impl BinaryOp {
    /// Comparison and logical operators produce a boolean unless lifted to null.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::AndAlso
                | BinaryOp::OrElse
        )
    }
}

/// Node-kind tag used for dispatch. Finer than [`ExprVariant`]: unary and
/// binary nodes carry their operator, array creation and type tests their form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ExprKind {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Block,
    Call,
    Conditional,
    Constant,
    DebugInfo,
    Default,
    Dynamic,
    Goto,
    Index,
    Invoke,
    Label,
    Lambda,
    ListInit,
    Loop,
    MemberAccess,
    MemberInit,
    New,
    NewArrayInit,
    NewArrayBounds,
    Parameter,
    RuntimeVariables,
    Switch,
    Try,
    TypeIs,
    TypeEqual,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NewArrayKind {
    /// `new T[] { a, b, c }`
    Init,
    /// `new T[n, m]`
    Bounds,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TypeBinaryKind {
    TypeIs,
    TypeEqual,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GotoKind {
    Goto,
    Return,
    Break,
    Continue,
}

/// Unary operation (e.g. `!x`, `(int)x`, a quoted lambda).
#[derive(Clone, Debug)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub ty: TypeRef,
    pub operand: Expr,
    pub method: Option<MethodRef>,
    pub is_lifted: bool,
    pub is_lifted_to_null: bool,
}

/// Binary operation (e.g. `x == "A"`, `a ?? b`).
#[derive(Clone, Debug)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub ty: TypeRef,
    pub left: Expr,
    pub right: Expr,
    pub method: Option<MethodRef>,
    /// Conversion lambda applied by coalescing and compound assignment.
    pub conversion: Option<Arc<LambdaExpr>>,
    pub is_lifted: bool,
    pub is_lifted_to_null: bool,
}

/// Sequence of statements with scoped locals; the value is the last statement.
#[derive(Clone, Debug)]
pub struct BlockExpr {
    pub ty: TypeRef,
    pub variables: ParameterVector,
    pub expressions: ExprVector,
}

impl BlockExpr {
    /// The statement whose value the block yields.
    pub fn result(&self) -> Option<&Expr> {
        self.expressions.last()
    }
}

/// Method call; `object` is absent for static methods.
#[derive(Clone, Debug)]
pub struct CallExpr {
    pub ty: TypeRef,
    pub method: MethodRef,
    pub object: Option<Expr>,
    pub arguments: ExprVector,
}

/// `test ? if_true : if_false`
#[derive(Clone, Debug)]
pub struct ConditionalExpr {
    pub ty: TypeRef,
    pub test: Expr,
    pub if_true: Expr,
    pub if_false: Expr,
}

#[derive(Clone, Debug)]
pub struct ConstantExpr {
    pub ty: TypeRef,
    pub value: ConstantValue,
}

/// Sequence point marker.
#[derive(Clone, Debug)]
pub struct DebugInfoExpr {
    pub ty: TypeRef,
    pub document: SymbolDocument,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub is_clear: bool,
}

/// The default value of `ty`.
#[derive(Clone, Debug)]
pub struct DefaultExpr {
    pub ty: TypeRef,
}

/// Late-bound operation dispatched through a call-site binder.
#[derive(Clone, Debug)]
pub struct DynamicExpr {
    pub ty: TypeRef,
    pub binder: CallSiteBinder,
    pub delegate_type: TypeRef,
    pub arguments: ExprVector,
}

/// Jump to a label (goto, return, break or continue).
#[derive(Clone, Debug)]
pub struct GotoExpr {
    pub ty: TypeRef,
    pub kind: GotoKind,
    pub target: Arc<LabelTarget>,
    pub value: Option<Expr>,
}

/// Indexed property or array access.
#[derive(Clone, Debug)]
pub struct IndexExpr {
    pub ty: TypeRef,
    pub object: Option<Expr>,
    pub indexer: Option<MemberRef>,
    pub arguments: ExprVector,
}

/// Invocation of a delegate or lambda expression.
#[derive(Clone, Debug)]
pub struct InvocationExpr {
    pub ty: TypeRef,
    pub expression: Expr,
    pub arguments: ExprVector,
}

/// A jump target with the value it yields when reached by fall-through.
#[derive(Clone, Debug)]
pub struct LabelExpr {
    pub ty: TypeRef,
    pub target: Arc<LabelTarget>,
    pub default_value: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct LambdaExpr {
    /// Delegate type, e.g. `Func<Record, Boolean>`.
    pub ty: TypeRef,
    pub name: Option<Arc<str>>,
    pub body: Expr,
    pub parameters: ParameterVector,
    pub tail_call: bool,
}

impl LambdaExpr {
    pub fn return_type(&self) -> &TypeRef {
        self.body.ty()
    }
}

/// Collection construction followed by `Add` calls.
#[derive(Clone, Debug)]
pub struct ListInitExpr {
    pub ty: TypeRef,
    pub new_expression: Arc<NewExpr>,
    pub initializers: ElementInitVector,
}

#[derive(Clone, Debug)]
pub struct LoopExpr {
    pub ty: TypeRef,
    pub body: Expr,
    pub break_label: Option<Arc<LabelTarget>>,
    pub continue_label: Option<Arc<LabelTarget>>,
}

/// Field or property access; `expression` is absent for static members.
#[derive(Clone, Debug)]
pub struct MemberExpr {
    pub ty: TypeRef,
    pub member: MemberRef,
    pub expression: Option<Expr>,
}

/// Object construction followed by member bindings.
#[derive(Clone, Debug)]
pub struct MemberInitExpr {
    pub ty: TypeRef,
    pub new_expression: Arc<NewExpr>,
    pub bindings: MemberBindingVector,
}

/// Constructor call. `members` names the members the arguments initialise
/// (anonymous types).
#[derive(Clone, Debug)]
pub struct NewExpr {
    pub ty: TypeRef,
    pub constructor: Option<ConstructorRef>,
    pub arguments: ExprVector,
    pub members: Option<MemberRefVector>,
}

#[derive(Clone, Debug)]
pub struct NewArrayExpr {
    pub ty: TypeRef,
    pub kind: NewArrayKind,
    pub expressions: ExprVector,
}

/// Named parameter or block variable.
#[derive(Clone, Debug)]
pub struct ParameterExpr {
    pub ty: TypeRef,
    pub name: Option<Arc<str>>,
    pub is_by_ref: bool,
}

/// Exposes a set of variables as a runtime-readable list.
#[derive(Clone, Debug)]
pub struct RuntimeVariablesExpr {
    pub ty: TypeRef,
    pub variables: ParameterVector,
}

#[derive(Clone, Debug)]
pub struct SwitchExpr {
    pub ty: TypeRef,
    pub switch_value: Expr,
    pub cases: SwitchCaseVector,
    pub default_body: Option<Expr>,
    pub comparison: Option<MethodRef>,
}

#[derive(Clone, Debug)]
pub struct TryExpr {
    pub ty: TypeRef,
    pub body: Expr,
    pub handlers: CatchBlockVector,
    pub finally: Option<Expr>,
    pub fault: Option<Expr>,
}

/// `expression is type_operand` or an exact type test.
#[derive(Clone, Debug)]
pub struct TypeBinaryExpr {
    pub ty: TypeRef,
    pub kind: TypeBinaryKind,
    pub expression: Expr,
    pub type_operand: TypeRef,
}

/// One `case` of a switch: ordered test values sharing one body.
#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub test_values: ExprVector,
    pub body: Expr,
}

/// One `catch` clause of a try node.
#[derive(Clone, Debug)]
pub struct CatchBlock {
    pub test: TypeRef,
    pub variable: Option<Arc<ParameterExpr>>,
    pub body: Expr,
    pub filter: Option<Expr>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MemberBindingKind {
    Assignment,
    MemberBinding,
    ListBinding,
}

/// Initialisation of one member inside a member-init node.
#[derive(Clone, Debug)]
pub enum MemberBinding {
    /// `Member = expression`
    Assignment { member: MemberRef, expression: Expr },
    /// `Member = { nested bindings }`
    MemberBinding { member: MemberRef, bindings: MemberBindingVector },
    /// `Member = { list initializers }`
    ListBinding { member: MemberRef, initializers: ElementInitVector },
}

impl MemberBinding {
    pub fn member(&self) -> &MemberRef {
        match self {
            MemberBinding::Assignment { member, .. }
            | MemberBinding::MemberBinding { member, .. }
            | MemberBinding::ListBinding { member, .. } => member,
        }
    }

    pub fn binding_kind(&self) -> MemberBindingKind {
        match self {
            MemberBinding::Assignment { .. } => MemberBindingKind::Assignment,
            MemberBinding::MemberBinding { .. } => MemberBindingKind::MemberBinding,
            MemberBinding::ListBinding { .. } => MemberBindingKind::ListBinding,
        }
    }
}

/// One `Add(..)` call of a collection initializer.
#[derive(Clone, Debug)]
pub struct ElementInit {
    pub add_method: MethodRef,
    pub arguments: ExprVector,
}

/// Jump destination shared by goto, label and loop nodes.
#[derive(Clone, Debug)]
pub struct LabelTarget {
    pub name: Option<Arc<str>>,
    pub ty: TypeRef,
}
