//! The expansion driver.
//!
//! [`expand`] takes a binding expression — a lattice value that may still
//! contain variables, attributes, calls and projections — and reduces it to
//! the most precise expanded type the environment can prove. Expansion is
//! purely functional: no mutation of the environment, no I/O, and every
//! failure mode is a lattice value (`Never` for proven-impossible, `Any` for
//! unknown).
//!
//! Termination is guaranteed by a visitation stack of the expressions
//! currently being expanded (structural equality; a revisit short-circuits
//! to `Any`), a parallel stack over the finite `(module, type, arity)` key
//! space for named-type resolution, and a defensive depth bound on top.

use crate::call_resolver::CallOutcome;
use crate::env::Environment;
use lodestar_core::types::{Fields, overlay};
use lodestar_core::{Combiner, Type};

/// Defensive bound on expansion depth; deeper nesting degrades to unknown.
const MAX_DEPTH: usize = 128;

const STRUCT_TAG: &str = "__struct__";

/// Expand a binding expression against an environment.
pub fn expand(env: &Environment<'_>, expr: &Type) -> Type {
    Expander::new(env).expand(expr)
}

pub(crate) struct Expander<'e> {
    pub(crate) env: &'e Environment<'e>,
    /// Expressions currently being expanded, outermost first.
    stack: Vec<Type>,
    /// Named types currently being resolved.
    pub(crate) type_stack: Vec<(String, String, usize)>,
}

impl<'e> Expander<'e> {
    pub(crate) fn new(env: &'e Environment<'e>) -> Self {
        Self {
            env,
            stack: Vec::new(),
            type_stack: Vec::new(),
        }
    }

    pub(crate) fn expand(&mut self, expr: &Type) -> Type {
        match expr {
            Type::Atom(_) | Type::Integer(_) | Type::Never | Type::Any => return expr.clone(),
            _ => {}
        }
        if self.stack.len() >= MAX_DEPTH || self.stack.contains(expr) {
            return Type::Any;
        }
        self.stack.push(expr.clone());
        let expanded = self.dispatch(expr);
        self.stack.pop();
        expanded
    }

    fn expand_opt(&mut self, expr: Option<&Type>) -> Type {
        match expr {
            Some(expr) => self.expand(expr),
            None => Type::Any,
        }
    }

    fn dispatch(&mut self, expr: &Type) -> Type {
        match expr {
            Type::Variable(name) => self.expand_variable(name),
            Type::Attribute(name) => self.expand_attribute(name),
            Type::Struct(fields, module, updated) => {
                self.expand_struct(fields, module.as_deref(), updated.as_deref())
            }
            Type::Map(fields, updated) => self.expand_map(fields, updated.as_deref()),
            Type::TupleNth(tuple, index) => self.expand_tuple_nth(tuple, *index),
            Type::Tuple(size, elements) => self.expand_tuple(*size, elements),
            Type::Union(variants) => self.expand_union(variants),
            Type::Intersection(variants) => self.expand_intersection(variants),
            Type::Call(target, fun, args) => self.expand_remote_call(target, fun, args),
            Type::LocalCall(fun, args) => self.expand_local_call(fun, args),
            _ => Type::Any,
        }
    }

    fn expand_variable(&mut self, name: &str) -> Type {
        if name.starts_with('_') {
            return Type::Never;
        }
        let env = self.env;
        match env.variable(name) {
            Some(record) => self.expand(&record.ty),
            // an unbound name in expression position is a zero-arity local call
            None => self.expand(&Type::LocalCall(name.to_string(), Vec::new())),
        }
    }

    fn expand_attribute(&mut self, name: &str) -> Type {
        let env = self.env;
        match env.attribute(name) {
            Some(record) => self.expand(&record.ty),
            None => Type::Never,
        }
    }

    fn expand_struct(
        &mut self,
        fields: &Fields,
        module: Option<&Type>,
        updated: Option<&Type>,
    ) -> Type {
        // an already-tagged literal is expanded output; return it as-is
        if let Some(Type::Atom(_)) = module
            && updated.is_none()
            && fields.contains_key(STRUCT_TAG)
        {
            return Type::Struct(fields.clone(), module.cloned().map(Box::new), None);
        }

        let module_name = match module {
            None => None,
            Some(Type::Atom(name)) => Some(name.clone()),
            Some(attribute @ Type::Attribute(_)) => match self.expand(attribute) {
                Type::Atom(name) => Some(name),
                Type::Any => None,
                _ => return Type::Never,
            },
            Some(_) => return Type::Never,
        };

        let Some(module_name) = module_name else {
            return Type::Struct(fields.clone(), None, None);
        };

        if !self.env.structs.is_struct(&module_name) {
            let mut tagged = fields.clone();
            if !tagged.contains_key(STRUCT_TAG) {
                tagged.insert(STRUCT_TAG.to_string(), Type::Atom(module_name.clone()));
            }
            return Type::Struct(tagged, Some(Box::new(Type::Atom(module_name))), None);
        }

        let base = match self.expand_opt(updated) {
            Type::Map(base_fields, _) | Type::Struct(base_fields, _, _) => base_fields,
            Type::Any => Fields::new(),
            _ => return Type::Never,
        };
        let merged = overlay(&base, fields);

        let declared = self.env.structs.fields(&module_name).unwrap_or_default();
        let tag = fields
            .get(STRUCT_TAG)
            .cloned()
            .unwrap_or_else(|| Type::Atom(module_name.clone()));

        let mut projected = Fields::new();
        projected.insert(STRUCT_TAG.to_string(), tag);
        for key in declared {
            if key != STRUCT_TAG {
                let value = merged.get(&key).cloned().unwrap_or(Type::Any);
                projected.insert(key, value);
            }
        }

        Type::Struct(projected, Some(Box::new(Type::Atom(module_name))), None)
    }

    fn expand_map(&mut self, fields: &Fields, updated: Option<&Type>) -> Type {
        match self.expand_opt(updated) {
            Type::Map(base, _) => Type::Map(overlay(&base, fields), None),
            // overlaying a struct preserves struct-ness
            Type::Struct(base, module, _) => Type::Struct(overlay(&base, fields), module, None),
            Type::Any => Type::Map(fields.clone(), None),
            _ => Type::Never,
        }
    }

    fn expand_tuple_nth(&mut self, tuple: &Type, index: usize) -> Type {
        match self.expand(tuple) {
            Type::Tuple(size, elements) if size > index => {
                elements.into_iter().nth(index).unwrap_or(Type::Never)
            }
            Type::Any => Type::Any,
            _ => Type::Never,
        }
    }

    fn expand_tuple(&mut self, size: usize, elements: &[Type]) -> Type {
        let mut expanded = Vec::with_capacity(elements.len());
        for element in elements {
            let value = self.expand(element);
            if value.is_never() {
                return Type::Never;
            }
            expanded.push(value);
        }
        Type::Tuple(size, expanded)
    }

    fn expand_union(&mut self, variants: &[Type]) -> Type {
        let expanded = variants.iter().map(|v| self.expand(v)).collect();
        Type::union(expanded)
    }

    fn expand_intersection(&mut self, variants: &[Type]) -> Type {
        let mut combined = Type::Any;
        for variant in variants {
            let expanded = self.expand(variant);
            combined = Combiner::combine(&combined, &expanded);
        }
        combined
    }

    fn expand_remote_call(&mut self, target: &Type, fun: &str, args: &[Type]) -> Type {
        if self.any_arg_never(args) {
            return Type::Never;
        }
        let expanded_target = self.expand(target);
        match self.resolve_call(&expanded_target, fun, args, false) {
            CallOutcome::Resolved(ty) => ty,
            CallOutcome::NoSpec | CallOutcome::NotFound => Type::Any,
        }
    }

    fn expand_local_call(&mut self, fun: &str, args: &[Type]) -> Type {
        if self.any_arg_never(args) {
            return Type::Never;
        }

        let mut candidates: Vec<String> = Vec::new();
        if let Some(module) = &self.env.current_module {
            candidates.push(module.clone());
        }
        candidates.extend(self.env.imports.iter().cloned());
        candidates.push("Kernel".to_string());
        candidates.push("Kernel.SpecialForms".to_string());

        for candidate in candidates {
            let include_private = self.env.current_module.as_deref() == Some(candidate.as_str());
            let target = Type::Atom(candidate);
            match self.resolve_call(&target, fun, args, include_private) {
                CallOutcome::NotFound => continue,
                CallOutcome::NoSpec => return Type::Any,
                CallOutcome::Resolved(ty) => return ty,
            }
        }
        Type::Any
    }

    fn any_arg_never(&mut self, args: &[Type]) -> bool {
        args.iter().any(|arg| self.expand(arg).is_never())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Environment, StructRegistry, TypeDefKind};
    use lodestar_core::types::collect_fields;

    struct TwoFieldRegistry;

    impl StructRegistry for TwoFieldRegistry {
        fn is_struct(&self, module: &str) -> bool {
            module == "MyApp.User"
        }

        fn fields(&self, module: &str) -> Option<Vec<String>> {
            (module == "MyApp.User").then(|| {
                vec![
                    "__struct__".to_string(),
                    "name".to_string(),
                    "age".to_string(),
                ]
            })
        }
    }

    fn user_env() -> Environment<'static> {
        static REGISTRY: TwoFieldRegistry = TwoFieldRegistry;
        static NO_INTROSPECTION: crate::env::NoIntrospection = crate::env::NoIntrospection;
        Environment::new(&REGISTRY, &NO_INTROSPECTION)
    }

    #[test]
    fn test_variable_expands_through_environment() {
        let env = Environment::detached().with_variable("x", Type::atom("ok"));
        assert_eq!(expand(&env, &Type::Variable("x".into())), Type::atom("ok"));
    }

    #[test]
    fn test_underscored_variable_is_never() {
        let env = Environment::detached().with_variable("_y", Type::atom("ok"));
        assert_eq!(expand(&env, &Type::Variable("_y".into())), Type::Never);
    }

    #[test]
    fn test_unbound_variable_falls_back_to_local_call() {
        let env = Environment::detached()
            .with_current_module("MyApp.Server")
            .with_fun("MyApp.Server", "state", crate::env::FunKind::Defp, vec![(0, 0)])
            .with_spec("MyApp.Server", "state", 0, &["@spec state() :: :idle"]);

        assert_eq!(expand(&env, &Type::Variable("state".into())), Type::atom("idle"));
    }

    #[test]
    fn test_attribute_expands_or_is_never() {
        let env = Environment::detached().with_attribute("default", Type::integer(3));
        assert_eq!(expand(&env, &Type::Attribute("default".into())), Type::integer(3));
        assert_eq!(expand(&env, &Type::Attribute("missing".into())), Type::Never);
    }

    #[test]
    fn test_variable_chain_expands_transitively() {
        let env = Environment::detached()
            .with_variable("a", Type::Variable("b".into()))
            .with_variable("b", Type::atom("deep"));
        assert_eq!(expand(&env, &Type::Variable("a".into())), Type::atom("deep"));
    }

    #[test]
    fn test_self_referential_variable_terminates_unknown() {
        let env = Environment::detached().with_variable("x", Type::Variable("x".into()));
        assert_eq!(expand(&env, &Type::Variable("x".into())), Type::Any);
    }

    #[test]
    fn test_mutually_referential_variables_terminate() {
        let env = Environment::detached()
            .with_variable("a", Type::Variable("b".into()))
            .with_variable("b", Type::Variable("a".into()));
        assert_eq!(expand(&env, &Type::Variable("a".into())), Type::Any);
    }

    #[test]
    fn test_tuple_projection() {
        let tuple = Type::tuple(vec![Type::atom("a"), Type::atom("b"), Type::atom("c")]);
        let env = Environment::detached();
        assert_eq!(
            expand(&env, &Type::tuple_nth(tuple.clone(), 1)),
            Type::atom("b")
        );
        assert_eq!(expand(&env, &Type::tuple_nth(tuple, 5)), Type::Never);
        assert_eq!(expand(&env, &Type::tuple_nth(Type::Any, 0)), Type::Any);
        assert_eq!(
            expand(&env, &Type::tuple_nth(Type::atom("nope"), 0)),
            Type::Never
        );
    }

    #[test]
    fn test_tuple_with_never_element_collapses() {
        let env = Environment::detached();
        let tuple = Type::tuple(vec![Type::atom("ok"), Type::Variable("_ignored".into())]);
        assert_eq!(expand(&env, &tuple), Type::Never);
    }

    #[test]
    fn test_map_overlay_on_expanded_base() {
        let env = Environment::detached()
            .with_variable("base", Type::map([("a", Type::atom("x")), ("b", Type::atom("y"))]));
        let updated = Type::map_update([("b", Type::atom("z"))], Type::Variable("base".into()));

        assert_eq!(
            expand(&env, &updated),
            Type::map([("a", Type::atom("x")), ("b", Type::atom("z"))])
        );
    }

    #[test]
    fn test_map_update_on_unknown_base_keeps_literal_fields() {
        let env = Environment::detached();
        let updated = Type::map_update([("k", Type::integer(1))], Type::Variable("unknown".into()));
        assert_eq!(expand(&env, &updated), Type::map([("k", Type::integer(1))]));
    }

    #[test]
    fn test_map_update_on_non_map_base_is_never() {
        let env = Environment::detached();
        let updated = Type::map_update([("k", Type::integer(1))], Type::atom("nope"));
        assert_eq!(expand(&env, &updated), Type::Never);
    }

    #[test]
    fn test_map_update_preserves_struct_shape() {
        let env = user_env().with_variable(
            "user",
            Type::struct_for("MyApp.User", [("name", Type::atom("ada"))]),
        );
        let updated = Type::map_update([("age", Type::integer(36))], Type::Variable("user".into()));

        let expanded = expand(&env, &updated);
        let Type::Struct(fields, Some(module), None) = expanded else {
            panic!("expected struct, got {expanded:?}");
        };
        assert_eq!(*module, Type::atom("MyApp.User"));
        assert_eq!(fields.get("age"), Some(&Type::integer(36)));
        assert_eq!(fields.get("name"), Some(&Type::atom("ada")));
    }

    #[test]
    fn test_struct_literal_projects_declared_fields() {
        let env = user_env();
        let literal = Type::struct_for("MyApp.User", [("name", Type::atom("ada"))]);

        let expanded = expand(&env, &literal);
        assert_eq!(
            expanded,
            Type::Struct(
                collect_fields([
                    ("__struct__", Type::atom("MyApp.User")),
                    ("name", Type::atom("ada")),
                    ("age", Type::Any),
                ]),
                Some(Box::new(Type::atom("MyApp.User"))),
                None,
            )
        );

        // expanded output is a fixed point
        assert_eq!(expand(&env, &expanded), expanded);
    }

    #[test]
    fn test_struct_literal_drops_undeclared_fields() {
        let env = user_env();
        let literal = Type::struct_for("MyApp.User", [("bogus", Type::atom("x"))]);

        let expanded = expand(&env, &literal);
        let fields = expanded.fields().expect("struct fields");
        assert!(!fields.contains_key("bogus"));
        assert_eq!(fields.get("name"), Some(&Type::Any));
    }

    #[test]
    fn test_struct_module_through_attribute() {
        let env = user_env().with_attribute("impl", Type::atom("MyApp.User"));
        let literal = Type::Struct(
            collect_fields([("name", Type::atom("ada"))]),
            Some(Box::new(Type::Attribute("impl".into()))),
            None,
        );

        let expanded = expand(&env, &literal);
        let Type::Struct(fields, Some(module), None) = expanded else {
            panic!("expected struct, got {expanded:?}");
        };
        assert_eq!(*module, Type::atom("MyApp.User"));
        assert_eq!(fields.get("__struct__"), Some(&Type::atom("MyApp.User")));
    }

    #[test]
    fn test_struct_with_invalid_module_expression_is_never() {
        let env = user_env();
        let literal = Type::Struct(
            Fields::new(),
            Some(Box::new(Type::integer(3))),
            None,
        );
        assert_eq!(expand(&env, &literal), Type::Never);
    }

    #[test]
    fn test_struct_without_module_keeps_fields() {
        let env = user_env();
        let literal = Type::Struct(collect_fields([("a", Type::atom("x"))]), None, None);
        assert_eq!(
            expand(&env, &literal),
            Type::Struct(collect_fields([("a", Type::atom("x"))]), None, None)
        );
    }

    #[test]
    fn test_struct_update_merges_base_fields() {
        let env = user_env()
            .with_variable(
                "user",
                Type::struct_for(
                    "MyApp.User",
                    [("name", Type::atom("ada")), ("age", Type::integer(36))],
                ),
            );
        let literal = Type::Struct(
            collect_fields([("name", Type::atom("grace"))]),
            Some(Box::new(Type::atom("MyApp.User"))),
            Some(Box::new(Type::Variable("user".into()))),
        );

        let expanded = expand(&env, &literal);
        let fields = expanded.fields().expect("struct fields");
        assert_eq!(fields.get("name"), Some(&Type::atom("grace")));
        assert_eq!(fields.get("age"), Some(&Type::integer(36)));
    }

    #[test]
    fn test_unregistered_struct_is_tagged_not_projected() {
        let env = Environment::detached();
        let literal = Type::struct_for("Unknown.Mod", [("a", Type::atom("x"))]);

        let expanded = expand(&env, &literal);
        let Type::Struct(fields, Some(module), None) = expanded else {
            panic!("expected struct, got {expanded:?}");
        };
        assert_eq!(*module, Type::atom("Unknown.Mod"));
        assert_eq!(fields.get("__struct__"), Some(&Type::atom("Unknown.Mod")));
        assert_eq!(fields.get("a"), Some(&Type::atom("x")));
    }

    #[test]
    fn test_union_collapse_after_member_expansion() {
        let env = Environment::detached()
            .with_variable("a", Type::atom("same"))
            .with_variable("b", Type::atom("same"));
        let union = Type::Union(vec![
            Type::Variable("a".into()),
            Type::Variable("b".into()),
        ]);
        assert_eq!(expand(&env, &union), Type::atom("same"));
    }

    #[test]
    fn test_intersection_folds_with_combiner() {
        let env = Environment::detached();
        let intersection = Type::Intersection(vec![
            Type::map([("a", Type::Any)]),
            Type::map([("a", Type::integer(1)), ("b", Type::atom("x"))]),
        ]);
        assert_eq!(
            expand(&env, &intersection),
            Type::map([("a", Type::integer(1)), ("b", Type::atom("x"))])
        );
    }

    #[test]
    fn test_intersection_with_never_member_is_never() {
        let env = Environment::detached();
        let intersection = Type::Intersection(vec![
            Type::map([("a", Type::Any)]),
            Type::Variable("_dead".into()),
        ]);
        assert_eq!(expand(&env, &intersection), Type::Never);
    }

    #[test]
    fn test_call_with_never_argument_is_never() {
        let env = Environment::detached();
        let call = Type::call(
            Type::atom("Map"),
            "get",
            vec![Type::Variable("_m".into()), Type::atom("k")],
        );
        assert_eq!(expand(&env, &call), Type::Never);
    }

    #[test]
    fn test_field_access_on_map_target() {
        let env = Environment::detached()
            .with_variable("conn", Type::map([("status", Type::integer(200))]));
        let call = Type::call(Type::Variable("conn".into()), "status", vec![]);
        assert_eq!(expand(&env, &call), Type::integer(200));

        let missing = Type::call(Type::Variable("conn".into()), "body", vec![]);
        assert_eq!(expand(&env, &missing), Type::Any);

        let with_args = Type::call(
            Type::Variable("conn".into()),
            "status",
            vec![Type::integer(1)],
        );
        assert_eq!(expand(&env, &with_args), Type::Never);
    }

    #[test]
    fn test_local_call_prefers_current_module_then_imports() {
        let env = Environment::detached()
            .with_current_module("MyApp.A")
            .with_import("MyApp.B")
            .with_fun("MyApp.B", "status", crate::env::FunKind::Def, vec![(0, 0)])
            .with_spec("MyApp.B", "status", 0, &["@spec status() :: :imported"]);

        assert_eq!(
            expand(&env, &Type::local_call("status", vec![])),
            Type::atom("imported")
        );

        let shadowing = Environment::detached()
            .with_current_module("MyApp.A")
            .with_import("MyApp.B")
            .with_fun("MyApp.A", "status", crate::env::FunKind::Defp, vec![(0, 0)])
            .with_spec("MyApp.A", "status", 0, &["@spec status() :: :local"])
            .with_fun("MyApp.B", "status", crate::env::FunKind::Def, vec![(0, 0)])
            .with_spec("MyApp.B", "status", 0, &["@spec status() :: :imported"]);

        assert_eq!(
            expand(&shadowing, &Type::local_call("status", vec![])),
            Type::atom("local")
        );
    }

    #[test]
    fn test_local_call_unknown_everywhere_is_unknown() {
        let env = Environment::detached();
        assert_eq!(expand(&env, &Type::local_call("mystery", vec![])), Type::Any);
    }

    #[test]
    fn test_remote_call_through_user_type() {
        let env = user_env()
            .with_fun("MyApp.User", "load", crate::env::FunKind::Def, vec![(0, 0)])
            .with_spec("MyApp.User", "load", 0, &["@spec load() :: t()"])
            .with_type(
                "MyApp.User",
                "t",
                0,
                TypeDefKind::Type,
                "@type t :: %MyApp.User{name: atom(), age: integer()}",
            );

        let call = Type::call(Type::atom("MyApp.User"), "load", vec![]);
        let expanded = expand(&env, &call);
        let Type::Struct(fields, Some(module), None) = expanded else {
            panic!("expected struct, got {expanded:?}");
        };
        assert_eq!(*module, Type::atom("MyApp.User"));
        assert_eq!(fields.get("__struct__"), Some(&Type::atom("MyApp.User")));
        // the `integer()` *type* carries no singleton value
        assert_eq!(fields.get("age"), Some(&Type::Any));
    }

    #[test]
    fn test_idempotence_on_composite_expansion() {
        let env = Environment::detached()
            .with_variable("pair", Type::tuple(vec![Type::atom("ok"), Type::integer(1)]));
        let expr = Type::tuple(vec![
            Type::tuple_nth(Type::Variable("pair".into()), 0),
            Type::Variable("pair".into()),
        ]);

        let once = expand(&env, &expr);
        let twice = expand(&env, &once);
        assert_eq!(once, twice);
    }
}
