//! Resolution of named types.
//!
//! A named type `(module, name, arity)` resolves through two tiers: the
//! user's declared metadata first, the compiled image second. User
//! declarations shadow host types of the same name — including an
//! existing-but-private declaration, which stops the search rather than
//! leaking through to a same-named compiled type. Recursive declarations
//! terminate through a stack over the finite key space.

use crate::env::TypeDefKind;
use crate::expander::Expander;
use lodestar_core::{SpecAst, Type, parse_spec};

impl<'e> Expander<'e> {
    /// Resolve a named type application to a lattice value.
    ///
    /// `include_private` grants access to `@typep`/`@opaque` internals; it
    /// holds only within the module under analysis and never crosses a
    /// remote boundary.
    pub(crate) fn expand_type(
        &mut self,
        module: &str,
        name: &str,
        args: &[SpecAst],
        include_private: bool,
    ) -> Type {
        let key = (module.to_string(), name.to_string(), args.len());
        if self.type_stack.contains(&key) {
            return Type::Any;
        }
        self.type_stack.push(key);
        let resolved = self.expand_type_inner(module, name, args, include_private);
        self.type_stack.pop();
        resolved
    }

    fn expand_type_inner(
        &mut self,
        module: &str,
        name: &str,
        args: &[SpecAst],
        include_private: bool,
    ) -> Type {
        let env = self.env;
        let key = (module.to_string(), name.to_string(), args.len());

        if let Some(info) = env.types.get(&key) {
            if info.kind == TypeDefKind::Type || include_private {
                let spec = info.spec.clone();
                return self.typedef_to_type(&spec, module, args, include_private);
            }
            // declared but private: the declaration still shadows any
            // compiled type of the same name
            return Type::Any;
        }

        match env.introspection.get_type_spec(module, name, args.len()) {
            Some((kind, spec)) if kind == TypeDefKind::Type || include_private => {
                self.typedef_to_type(&spec, module, args, include_private)
            }
            Some(_) => Type::Any,
            None => {
                tracing::trace!(module, name, "named type unknown to metadata and image");
                Type::Any
            }
        }
    }

    fn typedef_to_type(
        &mut self,
        text: &str,
        module: &str,
        args: &[SpecAst],
        include_private: bool,
    ) -> Type {
        match parse_spec(text) {
            Ok(def) => self.convert_def(&def, module, args, include_private),
            Err(error) => {
                tracing::trace!(module, %error, "stored type declaration failed to parse");
                Type::Any
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::env::{Environment, TypeDefKind};
    use crate::expander::expand;
    use lodestar_core::Type;

    fn call(module: &str, fun: &str) -> Type {
        Type::call(Type::atom(module), fun, vec![])
    }

    fn env_with_fun(module: &str, fun: &str, ret: &str) -> Environment<'static> {
        let spec = format!("@spec {fun}() :: {ret}");
        Environment::detached()
            .with_fun(module, fun, crate::env::FunKind::Def, vec![(0, 0)])
            .with_spec(module, fun, 0, &[spec.as_str()])
    }

    #[test]
    fn test_public_type_resolves_through_spec() {
        let env = env_with_fun("M", "status", "status()").with_type(
            "M",
            "status",
            0,
            TypeDefKind::Type,
            "@type status :: :up | :down",
        );

        assert_eq!(
            expand(&env, &call("M", "status")),
            Type::Union(vec![Type::atom("up"), Type::atom("down")])
        );
    }

    #[test]
    fn test_private_type_invisible_across_modules() {
        let env = Environment::detached()
            .with_fun("Other", "peek", crate::env::FunKind::Def, vec![(0, 0)])
            .with_spec("Other", "peek", 0, &["@spec peek() :: M.secret()"])
            .with_type("M", "secret", 0, TypeDefKind::Private, "@typep secret :: :hidden");

        assert_eq!(expand(&env, &call("Other", "peek")), Type::Any);
    }

    #[test]
    fn test_private_type_visible_within_module() {
        let env = Environment::detached()
            .with_current_module("M")
            .with_fun("M", "peek", crate::env::FunKind::Defp, vec![(0, 0)])
            .with_spec("M", "peek", 0, &["@spec peek() :: secret()"])
            .with_type("M", "secret", 0, TypeDefKind::Private, "@typep secret :: :hidden");

        assert_eq!(
            expand(&env, &Type::local_call("peek", vec![])),
            Type::atom("hidden")
        );
    }

    #[test]
    fn test_opaque_type_hides_structure_across_modules() {
        let env = env_with_fun("M", "make", "t()").with_type(
            "M",
            "t",
            0,
            TypeDefKind::Opaque,
            "@opaque t :: {:internal, integer()}",
        );

        // the remote call resolves, the opaque internals do not
        assert_eq!(expand(&env, &call("M", "make")), Type::Any);
    }

    #[test]
    fn test_parameterized_type_substitution() {
        let env = env_with_fun("M", "pair", "pair(:ok)").with_type(
            "M",
            "pair",
            1,
            TypeDefKind::Type,
            "@type pair(a) :: {a, a}",
        );

        assert_eq!(
            expand(&env, &call("M", "pair")),
            Type::tuple(vec![Type::atom("ok"), Type::atom("ok")])
        );
    }

    #[test]
    fn test_metadata_shadows_introspection() {
        use crate::env::{DocEntry, Introspection};

        struct HostWithT;
        impl Introspection for HostWithT {
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
                module: &str,
                name: &str,
                _arity: usize,
            ) -> Option<(TypeDefKind, String)> {
                (module == "M" && name == "t")
                    .then(|| (TypeDefKind::Type, "@type t :: :compiled".to_string()))
            }
        }

        static REGISTRY: crate::env::EmptyStructRegistry = crate::env::EmptyStructRegistry;
        static HOST: HostWithT = HostWithT;

        let shadowed = Environment::new(&REGISTRY, &HOST)
            .with_fun("M", "get", crate::env::FunKind::Def, vec![(0, 0)])
            .with_spec("M", "get", 0, &["@spec get() :: t()"])
            .with_type("M", "t", 0, TypeDefKind::Type, "@type t :: :edited");
        assert_eq!(expand(&shadowed, &call("M", "get")), Type::atom("edited"));

        let compiled_only = Environment::new(&REGISTRY, &HOST)
            .with_fun("M", "get", crate::env::FunKind::Def, vec![(0, 0)])
            .with_spec("M", "get", 0, &["@spec get() :: t()"]);
        assert_eq!(
            expand(&compiled_only, &call("M", "get")),
            Type::atom("compiled")
        );
    }

    #[test]
    fn test_recursive_type_terminates_unknown_at_loop() {
        let env = env_with_fun("M", "tree", "t()").with_type(
            "M",
            "t",
            0,
            TypeDefKind::Type,
            "@type t :: {:node, t()} | :leaf",
        );

        assert_eq!(
            expand(&env, &call("M", "tree")),
            Type::Union(vec![
                Type::tuple(vec![Type::atom("node"), Type::Any]),
                Type::atom("leaf"),
            ])
        );
    }

    #[test]
    fn test_malformed_stored_type_degrades_to_unknown() {
        let env = env_with_fun("M", "broken", "t()").with_type(
            "M",
            "t",
            0,
            TypeDefKind::Type,
            "@type t :: %{oops",
        );

        assert_eq!(expand(&env, &call("M", "broken")), Type::Any);
    }
}
