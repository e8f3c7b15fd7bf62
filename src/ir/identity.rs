//! Identities embedded in expression nodes: types, methods, constructors,
//! members, dynamic binders and constant values.
//!
//! The producer of a tree hands these out once and reuses them, so equality
//! on an identity is equality on its signature. Two `MethodRef`s built for the
//! same declaring type, name, generic arguments and parameter list denote the
//! same method.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use archery::ArcK;
use rpds::Vector;

/// Descriptor of the semantic type a sub-expression evaluates to.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeRef(Arc<TypeInfo>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct TypeInfo {
    name: Arc<str>,
    args: Vector<TypeRef, ArcK>,
    by_ref: bool,
}

impl TypeRef {
    /// A non-generic named type (`Record`, `System.String`, ...).
    pub fn named(name: &str) -> Self {
        Self::generic(name, [])
    }

    /// A constructed generic type such as `IQueryable<Record>`.
    pub fn generic(name: &str, args: impl IntoIterator<Item = TypeRef>) -> Self {
        TypeRef(Arc::new(TypeInfo {
            name: Arc::from(name),
            args: args.into_iter().collect(),
            by_ref: false,
        }))
    }

    pub fn bool() -> Self {
        Self::named("Boolean")
    }

    pub fn int32() -> Self {
        Self::named("Int32")
    }

    pub fn int64() -> Self {
        Self::named("Int64")
    }

    pub fn double() -> Self {
        Self::named("Double")
    }

    pub fn char() -> Self {
        Self::named("Char")
    }

    pub fn string() -> Self {
        Self::named("String")
    }

    pub fn object() -> Self {
        Self::named("Object")
    }

    pub fn void() -> Self {
        Self::named("Void")
    }

    /// The runtime type of a type descriptor value (`typeof(T)`).
    pub fn type_type() -> Self {
        Self::named("Type")
    }

    pub fn queryable(element: TypeRef) -> Self {
        Self::generic("IQueryable", [element])
    }

    pub fn enumerable(element: TypeRef) -> Self {
        Self::generic("IEnumerable", [element])
    }

    pub fn nullable(inner: TypeRef) -> Self {
        Self::generic("Nullable", [inner])
    }

    pub fn array(element: TypeRef) -> Self {
        Self::generic("Array", [element])
    }

    /// Delegate type `Func<args.., ret>`.
    pub fn func(params: impl IntoIterator<Item = TypeRef>, ret: TypeRef) -> Self {
        let mut args: Vec<TypeRef> = params.into_iter().collect();
        args.push(ret);
        Self::generic("Func", args)
    }

    /// Quoted lambda type `Expression<TDelegate>`.
    pub fn expression(delegate: TypeRef) -> Self {
        Self::generic("Expression", [delegate])
    }

    /// The by-reference form of this type.
    pub fn by_ref(&self) -> Self {
        TypeRef(Arc::new(TypeInfo {
            name: self.0.name.clone(),
            args: self.0.args.clone(),
            by_ref: true,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn args(&self) -> impl Iterator<Item = &TypeRef> {
        self.0.args.iter()
    }

    pub fn is_by_ref(&self) -> bool {
        self.0.by_ref
    }

    pub fn is_bool(&self) -> bool {
        self.0.name.as_ref() == "Boolean" && self.0.args.is_empty() && !self.0.by_ref
    }

    /// First generic argument, e.g. the element type of `IQueryable<T>`.
    pub fn element_type(&self) -> Option<&TypeRef> {
        self.0.args.first()
    }

    /// Return type of a `Func<..>` or `Expression<Func<..>>`.
    pub fn delegate_return(&self) -> Option<&TypeRef> {
        match self.0.name.as_ref() {
            "Expression" => self.element_type().and_then(|d| d.delegate_return()),
            "Func" => self.0.args.last(),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)?;
        if !self.0.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.0.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        if self.0.by_ref {
            write!(f, "&")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self)
    }
}

/// Identity of a method, possibly a generic instantiation.
#[derive(Clone)]
pub struct MethodRef(Arc<MethodInfo>);

#[derive(Debug)]
pub struct MethodInfo {
    pub declaring_type: TypeRef,
    pub name: Arc<str>,
    pub params: Vector<TypeRef, ArcK>,
    pub return_type: TypeRef,
    pub is_static: bool,
    /// Declared as an extension method (static helper with a receiver-like first parameter).
    pub is_extension: bool,
    /// Number of generic parameters on the definition.
    pub generic_arity: usize,
    /// Generic arguments when this is an instantiation, empty otherwise.
    pub generic_args: Vector<TypeRef, ArcK>,
    /// The open definition this instantiation was built from.
    pub definition: Option<MethodRef>,
}

impl MethodRef {
    pub fn new(info: MethodInfo) -> Self {
        MethodRef(Arc::new(info))
    }

    /// An instance method on `declaring_type`.
    pub fn instance(
        declaring_type: TypeRef,
        name: &str,
        params: impl IntoIterator<Item = TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        Self::new(MethodInfo {
            declaring_type,
            name: Arc::from(name),
            params: params.into_iter().collect(),
            return_type,
            is_static: false,
            is_extension: false,
            generic_arity: 0,
            generic_args: Vector::new_with_ptr_kind(),
            definition: None,
        })
    }

    /// A static, non-generic method on `declaring_type`.
    pub fn static_method(
        declaring_type: TypeRef,
        name: &str,
        params: impl IntoIterator<Item = TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        Self::new(MethodInfo {
            declaring_type,
            name: Arc::from(name),
            params: params.into_iter().collect(),
            return_type,
            is_static: true,
            is_extension: false,
            generic_arity: 0,
            generic_args: Vector::new_with_ptr_kind(),
            definition: None,
        })
    }

    /// A static extension method. `generic_arity` is zero for non-generic helpers.
    pub fn extension(
        declaring_type: TypeRef,
        name: &str,
        generic_arity: usize,
        params: impl IntoIterator<Item = TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        Self::new(MethodInfo {
            declaring_type,
            name: Arc::from(name),
            params: params.into_iter().collect(),
            return_type,
            is_static: true,
            is_extension: true,
            generic_arity,
            generic_args: Vector::new_with_ptr_kind(),
            definition: None,
        })
    }

    /// Closes a generic definition over concrete arguments.
    ///
    /// `params` and `return_type` are the instantiated signature; the open
    /// definition is remembered so classification can strip the instantiation.
    pub fn instantiate(
        &self,
        generic_args: impl IntoIterator<Item = TypeRef>,
        params: impl IntoIterator<Item = TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        let definition = self.generic_definition().cloned().unwrap_or_else(|| self.clone());
        Self::new(MethodInfo {
            declaring_type: self.0.declaring_type.clone(),
            name: self.0.name.clone(),
            params: params.into_iter().collect(),
            return_type,
            is_static: self.0.is_static,
            is_extension: self.0.is_extension,
            generic_arity: self.0.generic_arity,
            generic_args: generic_args.into_iter().collect(),
            definition: Some(definition),
        })
    }

    pub fn info(&self) -> &MethodInfo {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn declaring_type(&self) -> &TypeRef {
        &self.0.declaring_type
    }

    pub fn return_type(&self) -> &TypeRef {
        &self.0.return_type
    }

    pub fn is_static(&self) -> bool {
        self.0.is_static
    }

    pub fn is_extension(&self) -> bool {
        self.0.is_extension
    }

    pub fn is_generic(&self) -> bool {
        self.0.generic_arity > 0
    }

    /// True for a closed instantiation of a generic definition.
    pub fn is_generic_instantiation(&self) -> bool {
        self.0.definition.is_some()
    }

    /// The open generic definition, `None` for non-generic methods and for
    /// definitions themselves.
    pub fn generic_definition(&self) -> Option<&MethodRef> {
        self.0.definition.as_ref()
    }
}

impl PartialEq for MethodRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.declaring_type == other.0.declaring_type
                && self.0.name == other.0.name
                && self.0.is_static == other.0.is_static
                && self.0.generic_arity == other.0.generic_arity
                && self.0.generic_args == other.0.generic_args
                && self.0.params == other.0.params)
    }
}

impl Eq for MethodRef {}

impl Hash for MethodRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.declaring_type.hash(state);
        self.0.name.hash(state);
        self.0.is_static.hash(state);
        self.0.generic_arity.hash(state);
        self.0.generic_args.hash(state);
        self.0.params.hash(state);
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.declaring_type.name(), self.0.name)
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodRef({}", self)?;
        if !self.0.generic_args.is_empty() {
            let args: Vec<String> = self.0.generic_args.iter().map(|a| a.to_string()).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        write!(f, ")")
    }
}

/// Identity of a constructor.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ConstructorRef {
    pub declaring_type: TypeRef,
    pub params: Vector<TypeRef, ArcK>,
}

impl ConstructorRef {
    pub fn new(declaring_type: TypeRef, params: impl IntoIterator<Item = TypeRef>) -> Self {
        ConstructorRef {
            declaring_type,
            params: params.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MemberKind {
    Field,
    Property,
}

/// Identity of a field or property.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MemberRef {
    pub declaring_type: TypeRef,
    pub name: Arc<str>,
    pub member_type: TypeRef,
    pub kind: MemberKind,
    pub is_static: bool,
}

impl MemberRef {
    pub fn property(declaring_type: TypeRef, name: &str, member_type: TypeRef) -> Self {
        MemberRef {
            declaring_type,
            name: Arc::from(name),
            member_type,
            kind: MemberKind::Property,
            is_static: false,
        }
    }

    pub fn field(declaring_type: TypeRef, name: &str, member_type: TypeRef) -> Self {
        MemberRef {
            declaring_type,
            name: Arc::from(name),
            member_type,
            kind: MemberKind::Field,
            is_static: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Late-bound operation description carried by dynamic nodes.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CallSiteBinder {
    pub operation: Arc<str>,
}

impl CallSiteBinder {
    pub fn new(operation: &str) -> Self {
        CallSiteBinder { operation: Arc::from(operation) }
    }
}

/// Source document referenced by debug info nodes.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SymbolDocument {
    pub file_name: Arc<str>,
    pub language: Option<Arc<str>>,
}

impl SymbolDocument {
    pub fn new(file_name: &str) -> Self {
        SymbolDocument { file_name: Arc::from(file_name), language: None }
    }
}

/// A named data source at the root of a query pipeline.
///
/// The core never materialises it; whoever executes the tree binds the name.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct QuerySource {
    pub name: Arc<str>,
    pub element_type: TypeRef,
}

impl QuerySource {
    pub fn new(name: &str, element_type: TypeRef) -> Self {
        QuerySource { name: Arc::from(name), element_type }
    }
}

/// Boxed value of a constant node. Compared by value.
#[derive(Clone, Debug)]
pub enum ConstantValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Char(char),
    Str(Arc<str>),
    Type(TypeRef),
    Array(Vector<ConstantValue, ArcK>),
    Source(QuerySource),
}

impl ConstantValue {
    pub fn str(value: &str) -> Self {
        ConstantValue::Str(Arc::from(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConstantValue::Null)
    }
}

impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstantValue::Null, ConstantValue::Null) => true,
            (ConstantValue::Bool(a), ConstantValue::Bool(b)) => a == b,
            (ConstantValue::Int(a), ConstantValue::Int(b)) => a == b,
            // Bitwise so that equality stays reflexive for NaN and agrees with `hash`.
            (ConstantValue::Double(a), ConstantValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ConstantValue::Char(a), ConstantValue::Char(b)) => a == b,
            (ConstantValue::Str(a), ConstantValue::Str(b)) => a == b,
            (ConstantValue::Type(a), ConstantValue::Type(b)) => a == b,
            (ConstantValue::Array(a), ConstantValue::Array(b)) => a == b,
            (ConstantValue::Source(a), ConstantValue::Source(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstantValue {}

impl Hash for ConstantValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ConstantValue::Null => {}
            ConstantValue::Bool(v) => v.hash(state),
            ConstantValue::Int(v) => v.hash(state),
            ConstantValue::Double(v) => v.to_bits().hash(state),
            ConstantValue::Char(v) => v.hash(state),
            ConstantValue::Str(v) => v.hash(state),
            ConstantValue::Type(v) => v.hash(state),
            ConstantValue::Array(v) => v.hash(state),
            ConstantValue::Source(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Null => write!(f, "null"),
            ConstantValue::Bool(v) => write!(f, "{}", v),
            ConstantValue::Int(v) => write!(f, "{}", v),
            ConstantValue::Double(v) => write!(f, "{}", v),
            ConstantValue::Char(v) => write!(f, "'{}'", v),
            ConstantValue::Str(v) => write!(f, "\"{}\"", v),
            ConstantValue::Type(t) => write!(f, "typeof({})", t),
            ConstantValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ConstantValue::Source(s) => write!(f, "{}", s.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_value_equality() {
        let a = TypeRef::queryable(TypeRef::named("Record"));
        let b = TypeRef::queryable(TypeRef::named("Record"));
        assert_eq!(a, b);
        assert_ne!(a, TypeRef::queryable(TypeRef::string()));
        assert_eq!(a.to_string(), "IQueryable<Record>");
        assert_ne!(TypeRef::int32(), TypeRef::int32().by_ref());
    }

    #[test]
    fn test_delegate_return() {
        let pred = TypeRef::expression(TypeRef::func([TypeRef::string()], TypeRef::bool()));
        assert_eq!(pred.delegate_return(), Some(&TypeRef::bool()));
        assert_eq!(TypeRef::string().delegate_return(), None);
    }

    #[test]
    fn test_method_instantiation_keeps_definition() {
        let t = TypeRef::named("T");
        let def = MethodRef::extension(
            TypeRef::named("Queryable"),
            "Take",
            1,
            [TypeRef::queryable(t.clone()), TypeRef::int32()],
            TypeRef::queryable(t),
        );
        let rec = TypeRef::named("Record");
        let closed = def.instantiate(
            [rec.clone()],
            [TypeRef::queryable(rec.clone()), TypeRef::int32()],
            TypeRef::queryable(rec),
        );
        assert!(closed.is_generic_instantiation());
        assert_eq!(closed.generic_definition(), Some(&def));
        assert_ne!(closed, def);
        assert!(def.generic_definition().is_none());
    }

    #[test]
    fn test_double_constant_equality_is_bitwise() {
        assert_eq!(ConstantValue::Double(f64::NAN), ConstantValue::Double(f64::NAN));
        assert_ne!(ConstantValue::Double(0.0), ConstantValue::Double(-0.0));
        assert_ne!(ConstantValue::Int(1), ConstantValue::Double(1.0));
    }
}
