//! The read-only environment an expansion runs against.
//!
//! An [`Environment`] bundles everything the expander may consult: locally
//! observed variables and module attributes, user-declared specs, types and
//! function definitions keyed by module, the struct registry, and the host
//! introspection provider. It is immutable for the duration of a single
//! expansion; distinct environments can be used concurrently from distinct
//! threads.

use lodestar_core::Type;
use rustc_hash::FxHashMap;

/// Kind of a user type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDefKind {
    /// `@type` — public.
    Type,
    /// `@opaque` — public name, private structure.
    Opaque,
    /// `@typep` — private.
    Private,
}

/// How a function was defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunKind {
    Def,
    Defp,
    Defmacro,
    Defmacrop,
    Defguard,
    Defguardp,
    Defdelegate,
}

impl FunKind {
    /// Whether the definition is callable from outside its module.
    pub fn is_public(self) -> bool {
        matches!(
            self,
            FunKind::Def | FunKind::Defmacro | FunKind::Defguard | FunKind::Defdelegate
        )
    }
}

/// A locally observed variable; the first record with a matching name wins.
#[derive(Debug, Clone)]
pub struct VariableRecord {
    pub name: String,
    pub ty: Type,
}

/// A module attribute with its observed type.
#[derive(Debug, Clone)]
pub struct AttributeRecord {
    pub name: String,
    pub ty: Type,
}

/// Spec variants for one `(module, fun, arity)`, as stored source text.
#[derive(Debug, Clone)]
pub struct SpecInfo {
    pub specs: Vec<String>,
}

/// A user type declaration, as stored source text.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub kind: TypeDefKind,
    pub spec: String,
}

/// Definition facts for one `(module, fun)` across all arities.
#[derive(Debug, Clone)]
pub struct ModFunInfo {
    pub kind: FunKind,
    /// `(declared arity, number of defaulted parameters)` per head.
    pub arities: Vec<(usize, usize)>,
}

/// One documentation entry of a compiled module.
#[derive(Debug, Clone)]
pub struct DocEntry {
    pub fun: String,
    pub arity: usize,
    /// Defaulted parameters recorded in the entry metadata.
    pub defaults: usize,
}

/// Registry of known structs and their declared fields.
pub trait StructRegistry {
    fn is_struct(&self, module: &str) -> bool;
    /// Declared field names, including `__struct__`.
    fn fields(&self, module: &str) -> Option<Vec<String>>;
}

/// Knowledge about compiled host modules.
///
/// Spec text returned here goes through the same typespec parser as user
/// metadata; providers are expected to hand back canonical declarations
/// (`@spec f(…) :: …`, `@type t :: …`).
pub trait Introspection {
    fn docs(&self, module: &str) -> Option<Vec<DocEntry>>;
    fn function_exported(&self, module: &str, fun: &str, arity: usize) -> bool;
    /// Spec variants for an exported function, if any.
    fn get_spec(&self, module: &str, fun: &str, arity: usize) -> Option<Vec<String>>;
    /// A compiled type declaration with its kind.
    fn get_type_spec(&self, module: &str, name: &str, arity: usize)
    -> Option<(TypeDefKind, String)>;
}

/// Struct registry that knows no structs.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyStructRegistry;

impl StructRegistry for EmptyStructRegistry {
    fn is_struct(&self, _module: &str) -> bool {
        false
    }

    fn fields(&self, _module: &str) -> Option<Vec<String>> {
        None
    }
}

/// Introspection provider for hosts without a compiled image.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIntrospection;

impl Introspection for NoIntrospection {
    fn docs(&self, _module: &str) -> Option<Vec<DocEntry>> {
        None
    }

    fn function_exported(&self, _module: &str, _fun: &str, _arity: usize) -> bool {
        false
    }

    fn get_spec(&self, _module: &str, _fun: &str, _arity: usize) -> Option<Vec<String>> {
        None
    }

    fn get_type_spec(
        &self,
        _module: &str,
        _name: &str,
        _arity: usize,
    ) -> Option<(TypeDefKind, String)> {
        None
    }
}

static EMPTY_STRUCTS: EmptyStructRegistry = EmptyStructRegistry;
static NO_INTROSPECTION: NoIntrospection = NoIntrospection;

/// Everything one expansion may consult. Read-only.
pub struct Environment<'a> {
    pub structs: &'a dyn StructRegistry,
    pub introspection: &'a dyn Introspection,
    pub variables: Vec<VariableRecord>,
    pub attributes: Vec<AttributeRecord>,
    pub current_module: Option<String>,
    pub imports: Vec<String>,
    pub specs: FxHashMap<(String, String, usize), SpecInfo>,
    pub types: FxHashMap<(String, String, usize), TypeInfo>,
    pub mods_funs: FxHashMap<(String, String), ModFunInfo>,
}

impl<'a> Environment<'a> {
    pub fn new(structs: &'a dyn StructRegistry, introspection: &'a dyn Introspection) -> Self {
        Self {
            structs,
            introspection,
            variables: Vec::new(),
            attributes: Vec::new(),
            current_module: None,
            imports: Vec::new(),
            specs: FxHashMap::default(),
            types: FxHashMap::default(),
            mods_funs: FxHashMap::default(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.variables.push(VariableRecord {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.attributes.push(AttributeRecord {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn with_current_module(mut self, module: impl Into<String>) -> Self {
        self.current_module = Some(module.into());
        self
    }

    pub fn with_import(mut self, module: impl Into<String>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn with_spec(
        mut self,
        module: impl Into<String>,
        fun: impl Into<String>,
        arity: usize,
        variants: &[&str],
    ) -> Self {
        self.specs.insert(
            (module.into(), fun.into(), arity),
            SpecInfo {
                specs: variants.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_type(
        mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        arity: usize,
        kind: TypeDefKind,
        spec: impl Into<String>,
    ) -> Self {
        self.types.insert(
            (module.into(), name.into(), arity),
            TypeInfo {
                kind,
                spec: spec.into(),
            },
        );
        self
    }

    pub fn with_fun(
        mut self,
        module: impl Into<String>,
        fun: impl Into<String>,
        kind: FunKind,
        arities: Vec<(usize, usize)>,
    ) -> Self {
        self.mods_funs
            .insert((module.into(), fun.into()), ModFunInfo { kind, arities });
        self
    }

    /// First variable record matching `name`.
    pub(crate) fn variable(&self, name: &str) -> Option<&VariableRecord> {
        self.variables.iter().find(|record| record.name == name)
    }

    pub(crate) fn attribute(&self, name: &str) -> Option<&AttributeRecord> {
        self.attributes.iter().find(|record| record.name == name)
    }
}

impl Environment<'static> {
    /// An environment with no providers attached; useful for expanding
    /// self-contained expressions and in tests.
    pub fn detached() -> Self {
        Self::new(&EMPTY_STRUCTS, &NO_INTROSPECTION)
    }
}
