//! Return-type resolution for remote and local calls.
//!
//! A call resolves against the expanded type of its target: field access for
//! maps and structs, the structural built-in catalog for the host's map and
//! tuple manipulators, and otherwise a two-tier lookup — user metadata
//! first, compiled-module introspection second — so edited-but-not-compiled
//! source always shadows the host image.

use crate::env::SpecInfo;
use crate::expander::Expander;
use lodestar_core::types::Fields;
use lodestar_core::{Type, parse_spec};

/// Outcome of one resolution attempt.
///
/// `NotFound` means the target module does not know the function (the next
/// knowledge source or import candidate may). `NoSpec` means the function
/// exists but carries no usable spec; it stops the search and the expander
/// flattens it to unknown, never letting the sentinel escape.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CallOutcome {
    NotFound,
    NoSpec,
    Resolved(Type),
}

impl<'e> Expander<'e> {
    pub(crate) fn resolve_call(
        &mut self,
        target: &Type,
        fun: &str,
        args: &[Type],
        include_private: bool,
    ) -> CallOutcome {
        match target {
            Type::Any => CallOutcome::Resolved(Type::Any),
            Type::Never => CallOutcome::Resolved(Type::Never),
            Type::Map(fields, _) => self.resolve_field_access(fields, fun, args),
            Type::Struct(fields, _, _) => self.resolve_field_access(fields, fun, args),
            Type::Atom(module) => {
                if let Some(outcome) = self.resolve_builtin(module, fun, args) {
                    return outcome;
                }
                if matches!(module.as_str(), "nil" | "true" | "false")
                    || matches!(fun, "nil" | "true" | "false")
                {
                    return CallOutcome::Resolved(Type::Never);
                }
                let arity = args.len();
                match self.call_from_metadata(module, fun, arity, include_private) {
                    // nothing known, or the metadata proved nothing usable:
                    // fall through to the compiled image
                    CallOutcome::NotFound | CallOutcome::Resolved(Type::Never) => {
                        self.call_from_introspection(module, fun, arity)
                    }
                    outcome => outcome,
                }
            }
            _ => CallOutcome::Resolved(Type::Never),
        }
    }

    /// Zero-arity access reads a field; anything else is not callable.
    fn resolve_field_access(&mut self, fields: &Fields, fun: &str, args: &[Type]) -> CallOutcome {
        if !args.is_empty() {
            return CallOutcome::Resolved(Type::Never);
        }
        let value = fields.get(fun).cloned();
        CallOutcome::Resolved(match value {
            Some(value) => self.expand(&value),
            None => Type::Any,
        })
    }

    fn call_from_metadata(
        &mut self,
        module: &str,
        fun: &str,
        arity: usize,
        include_private: bool,
    ) -> CallOutcome {
        let env = self.env;
        let Some(info) = env
            .mods_funs
            .get(&(module.to_string(), fun.to_string()))
        else {
            return CallOutcome::NotFound;
        };
        if !include_private && !info.kind.is_public() {
            return CallOutcome::NotFound;
        }
        let Some(resolved_arity) = resolve_arity(&info.arities, arity) else {
            return CallOutcome::NotFound;
        };

        let key = (module.to_string(), fun.to_string(), resolved_arity);
        match env.specs.get(&key) {
            Some(SpecInfo { specs }) => {
                let variants: Vec<String> = specs.clone();
                self.spec_variants_to_type(module, &variants, include_private)
            }
            None => CallOutcome::NoSpec,
        }
    }

    fn call_from_introspection(&mut self, module: &str, fun: &str, arity: usize) -> CallOutcome {
        let env = self.env;
        let resolved_arity = match env.introspection.docs(module) {
            Some(entries) => entries
                .iter()
                .find(|entry| {
                    entry.fun == fun
                        && entry.arity.saturating_sub(entry.defaults) <= arity
                        && arity <= entry.arity
                })
                .map(|entry| entry.arity),
            None => env
                .introspection
                .function_exported(module, fun, arity)
                .then_some(arity),
        };
        let Some(resolved_arity) = resolved_arity else {
            return CallOutcome::NotFound;
        };

        match env.introspection.get_spec(module, fun, resolved_arity) {
            Some(variants) => self.spec_variants_to_type(module, &variants, false),
            None => CallOutcome::NoSpec,
        }
    }

    /// Parse each stored spec variant and union the return types. Several
    /// overloads are approximated as the union of their returns rather than
    /// selected by argument types.
    fn spec_variants_to_type(
        &mut self,
        home: &str,
        variants: &[String],
        include_private: bool,
    ) -> CallOutcome {
        let mut returns = Vec::new();
        for text in variants {
            match parse_spec(text) {
                Ok(def) => returns.push(self.convert_def(&def, home, &[], include_private)),
                Err(error) => {
                    tracing::trace!(module = home, %error, "skipping unparsable spec variant");
                }
            }
        }
        if returns.is_empty() {
            return CallOutcome::NoSpec;
        }
        CallOutcome::Resolved(Type::union(returns))
    }
}

/// Accept a declared head whose defaults cover the called arity:
/// `declared − defaults ≤ called ≤ declared`, lowest declared arity first.
fn resolve_arity(arities: &[(usize, usize)], called: usize) -> Option<usize> {
    let mut candidates = arities.to_vec();
    candidates.sort_unstable();
    candidates
        .iter()
        .find(|(declared, defaults)| {
            declared.saturating_sub(*defaults) <= called && called <= *declared
        })
        .map(|(declared, _)| *declared)
}
