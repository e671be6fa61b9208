//! Embedded specs for the host's core modules.
//!
//! Hosts without a live compiled image (tests, offline indexing, the zero
//! configuration path) can still resolve calls into the standard modules:
//! a small table of canonical spec text is bundled with the crate and served
//! through the regular [`Introspection`] interface, so it flows through the
//! same parser and conversion as everything else.

use crate::env::{DocEntry, Introspection, TypeDefKind};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

type FunKey = (&'static str, &'static str, usize);

/// `(module, fun, declared arity) -> (defaults, spec variants)`
static HOST_FUNS: Lazy<FxHashMap<FunKey, (usize, &'static [&'static str])>> = Lazy::new(|| {
    let entries: &[(FunKey, (usize, &'static [&'static str]))] = &[
        (("Map", "new", 0), (0, &["@spec new() :: map()"])),
        (("Map", "keys", 1), (0, &["@spec keys(map()) :: [atom()]"])),
        (("Map", "values", 1), (0, &["@spec values(map()) :: [term()]"])),
        (("Map", "to_list", 1), (0, &["@spec to_list(map()) :: [{atom(), term()}]"])),
        (("Map", "equal?", 2), (0, &["@spec equal?(map(), map()) :: boolean()"])),
        (("Map", "has_key?", 2), (0, &["@spec has_key?(map(), atom()) :: boolean()"])),
        (("Kernel", "map_size", 1), (0, &["@spec map_size(map()) :: non_neg_integer()"])),
        (("Kernel", "tuple_size", 1), (0, &["@spec tuple_size(tuple()) :: non_neg_integer()"])),
        (("Kernel", "is_map", 1), (0, &["@spec is_map(term()) :: boolean()"])),
        (("Kernel", "is_atom", 1), (0, &["@spec is_atom(term()) :: boolean()"])),
        (("Kernel", "self", 0), (0, &["@spec self() :: pid()"])),
        (("Kernel", "node", 0), (0, &["@spec node() :: node()"])),
        (("String", "length", 1), (0, &["@spec length(t()) :: non_neg_integer()"])),
        (("String", "split", 2), (0, &["@spec split(t(), t()) :: [t()]"])),
        (("Enum", "count", 1), (0, &["@spec count(t()) :: non_neg_integer()"])),
        (("Enum", "empty?", 1), (0, &["@spec empty?(t()) :: boolean()"])),
    ];
    entries.iter().cloned().collect()
});

type TypeKey = (&'static str, &'static str, usize);

static HOST_TYPES: Lazy<FxHashMap<TypeKey, (TypeDefKind, &'static str)>> = Lazy::new(|| {
    let entries: &[(TypeKey, (TypeDefKind, &'static str))] = &[
        (("Map", "key", 0), (TypeDefKind::Type, "@type key :: term()")),
        (("Map", "value", 0), (TypeDefKind::Type, "@type value :: term()")),
        (("String", "t", 0), (TypeDefKind::Type, "@type t :: binary()")),
        (("Enum", "t", 0), (TypeDefKind::Type, "@type t :: Enumerable.t()")),
        (
            ("MapSet", "t", 0),
            (TypeDefKind::Opaque, "@opaque t :: %MapSet{map: map()}"),
        ),
        (
            ("Range", "t", 0),
            (
                TypeDefKind::Type,
                "@type t :: %Range{first: integer(), last: integer(), step: integer()}",
            ),
        ),
    ];
    entries.iter().cloned().collect()
});

/// Introspection over the bundled host-module table.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedIntrospection;

impl Introspection for EmbeddedIntrospection {
    fn docs(&self, module: &str) -> Option<Vec<DocEntry>> {
        let entries: Vec<DocEntry> = HOST_FUNS
            .iter()
            .filter(|((m, _, _), _)| *m == module)
            .map(|((_, fun, arity), (defaults, _))| DocEntry {
                fun: fun.to_string(),
                arity: *arity,
                defaults: *defaults,
            })
            .collect();
        if entries.is_empty() { None } else { Some(entries) }
    }

    fn function_exported(&self, module: &str, fun: &str, arity: usize) -> bool {
        HOST_FUNS.contains_key(&(module, fun, arity))
    }

    fn get_spec(&self, module: &str, fun: &str, arity: usize) -> Option<Vec<String>> {
        HOST_FUNS
            .get(&(module, fun, arity))
            .map(|(_, variants)| variants.iter().map(|s| s.to_string()).collect())
    }

    fn get_type_spec(
        &self,
        module: &str,
        name: &str,
        arity: usize,
    ) -> Option<(TypeDefKind, String)> {
        HOST_TYPES
            .get(&(module, name, arity))
            .map(|(kind, spec)| (*kind, spec.to_string()))
    }
}
