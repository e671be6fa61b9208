//! The type lattice for binding expansion.
//!
//! Expanded types form a closed set of tagged shapes describing what the
//! engine can prove about a source-level term: singleton atoms and integers,
//! tuples of known arity, maps and structs with statically known atom keys,
//! unions and intersections, and unresolved references (variables, module
//! attributes, calls, tuple projections) that only exist as *inputs* to the
//! expander.
//!
//! ## Lattice sentinels
//!
//! Two sentinels carry the lattice structure:
//!
//! - **`Never`**: the bottom element — the type is proven impossible (wrong
//!   argument shapes, out-of-range projections). Absorbing under
//!   intersection and inside containers.
//!
//! - **`Any`**: unknown but plausible — a missing spec, an opaque source, an
//!   uninferrable argument. Identity element under intersection.
//!
//! Both are value-level facts, not errors: the engine never raises during
//! expansion and encodes every failure mode in the lattice itself.
//!
//! ## Field associations
//!
//! Map and struct fields use [`IndexMap`], which gives exactly the semantics
//! the lattice needs: iteration in insertion order, order-insensitive
//! equality, and last-write-wins on insert when overlaying.

use indexmap::IndexMap;
use std::fmt;

/// Ordered association from atom keys to lattice values.
pub type Fields = IndexMap<String, Type>;

/// An element of the type lattice.
///
/// `Call`, `LocalCall`, `Variable`, `Attribute`, and `TupleNth` are symbolic
/// references produced by the binding extractor; they never survive a full
/// expansion. Everything else can appear in expanded output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// The singleton atom value is known.
    Atom(String),
    /// The singleton integer value is known.
    Integer(i64),
    /// Tuple of known arity; each position carries a lattice value.
    Tuple(usize, Vec<Type>),
    /// Map whose statically known keys are atoms. The second slot is an
    /// optional base expression still to be merged; `None` after expansion.
    Map(Fields, Option<Box<Type>>),
    /// Named record over atoms. The module slot holds an expression before
    /// expansion (a literal atom, an attribute reference, or absent) and a
    /// literal `Atom` afterwards. A struct with a known module always
    /// exposes a `__struct__` field once expanded.
    Struct(Fields, Option<Box<Type>>, Option<Box<Type>>),
    /// Disjunction of variants.
    Union(Vec<Type>),
    /// Conjunction of constraints; eliminated by the combiner during
    /// expansion.
    Intersection(Vec<Type>),
    /// Reference to a local variable slot.
    Variable(String),
    /// Reference to a module attribute.
    Attribute(String),
    /// Remote call; the target is itself a lattice value.
    Call(Box<Type>, String, Vec<Type>),
    /// Unqualified call, resolved through the current module, then imports,
    /// then the host's built-in modules.
    LocalCall(String, Vec<Type>),
    /// Zero-based tuple projection.
    TupleNth(Box<Type>, usize),
    /// Bottom element: proven impossible. Absorbing.
    Never,
    /// Unknown but plausible. Identity under intersection.
    Any,
}

impl Type {
    pub fn atom(name: impl Into<String>) -> Self {
        Type::Atom(name.into())
    }

    pub fn integer(value: i64) -> Self {
        Type::Integer(value)
    }

    /// Create a tuple type; the arity is taken from the element count.
    pub fn tuple(elements: Vec<Type>) -> Self {
        Type::Tuple(elements.len(), elements)
    }

    /// Create a tuple projection at a zero-based index.
    pub fn tuple_nth(tuple: Type, index: usize) -> Self {
        Type::TupleNth(Box::new(tuple), index)
    }

    /// Create a map type with no pending base expression.
    pub fn map<K: Into<String>>(fields: impl IntoIterator<Item = (K, Type)>) -> Self {
        Type::Map(collect_fields(fields), None)
    }

    /// Create a map type whose base expression is still to be merged.
    pub fn map_update<K: Into<String>>(
        fields: impl IntoIterator<Item = (K, Type)>,
        base: Type,
    ) -> Self {
        Type::Map(collect_fields(fields), Some(Box::new(base)))
    }

    /// Create a struct literal tagged with a known module atom.
    pub fn struct_for<K: Into<String>>(
        module: impl Into<String>,
        fields: impl IntoIterator<Item = (K, Type)>,
    ) -> Self {
        Type::Struct(
            collect_fields(fields),
            Some(Box::new(Type::Atom(module.into()))),
            None,
        )
    }

    /// Create a remote call expression.
    pub fn call(target: Type, fun: impl Into<String>, args: Vec<Type>) -> Self {
        Type::Call(Box::new(target), fun.into(), args)
    }

    /// Create an unqualified call expression.
    pub fn local_call(fun: impl Into<String>, args: Vec<Type>) -> Self {
        Type::LocalCall(fun.into(), args)
    }

    /// Create a union, collapsing the all-equal case to its single member.
    ///
    /// No further normalization is performed: unions are kept syntactic, in
    /// member order, so callers can render them the way they were declared.
    pub fn union(variants: Vec<Type>) -> Self {
        if variants.is_empty() {
            return Type::Never;
        }
        if variants.windows(2).all(|pair| pair[0] == pair[1]) {
            return variants.into_iter().next().unwrap_or(Type::Never);
        }
        Type::Union(variants)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Type::Never)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// Field association of a map or struct, if this is one.
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            Type::Map(fields, _) | Type::Struct(fields, _, _) => Some(fields),
            _ => None,
        }
    }
}

/// Collect an iterator of pairs into a field association, last write wins.
pub fn collect_fields<K: Into<String>>(fields: impl IntoIterator<Item = (K, Type)>) -> Fields {
    fields
        .into_iter()
        .map(|(key, value)| (key.into(), value))
        .collect()
}

/// Overlay `over` onto `base`: keys of `over` win, keys only in `base` keep
/// their position and value.
pub fn overlay(base: &Fields, over: &Fields) -> Fields {
    let mut merged = base.clone();
    for (key, value) in over {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Atom(name) if matches!(name.as_str(), "true" | "false" | "nil") => {
                write!(f, "{name}")
            }
            Type::Atom(name) if name.starts_with(|ch: char| ch.is_uppercase()) => {
                write!(f, "{name}")
            }
            Type::Atom(name) => write!(f, ":{name}"),
            Type::Integer(value) => write!(f, "{value}"),
            Type::Tuple(_, elements) => write!(f, "{{{}}}", join(elements, ", ")),
            Type::Map(fields, _) => write!(f, "%{{{}}}", join_fields(fields)),
            Type::Struct(fields, module, _) => {
                let tag = match module.as_deref() {
                    Some(Type::Atom(name)) => name.clone(),
                    Some(other) => other.to_string(),
                    None => "_".to_string(),
                };
                let visible: Fields = fields
                    .iter()
                    .filter(|(key, _)| key.as_str() != "__struct__")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                write!(f, "%{tag}{{{}}}", join_fields(&visible))
            }
            Type::Union(variants) => write!(f, "{}", join(variants, " | ")),
            Type::Intersection(variants) => write!(f, "{}", join(variants, " and ")),
            Type::Variable(name) => write!(f, "{name}"),
            Type::Attribute(name) => write!(f, "@{name}"),
            Type::Call(target, fun, args) => {
                write!(f, "{target}.{fun}({})", join(args, ", "))
            }
            Type::LocalCall(fun, args) => write!(f, "{fun}({})", join(args, ", ")),
            Type::TupleNth(tuple, index) => write!(f, "elem({tuple}, {index})"),
            Type::Never => write!(f, "none()"),
            Type::Any => write!(f, "term()"),
        }
    }
}

fn join(types: &[Type], separator: &str) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

fn join_fields(fields: &Fields) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join(", ")
}
