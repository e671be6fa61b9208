//! Conversion from typespec syntax trees into lattice values.
//!
//! The converter walks a [`SpecAst`] and produces the most precise lattice
//! value the vocabulary allows. Named types route through the type resolver:
//! remote applications always resolve publicly, local applications resolve
//! against the module the spec text came from, with the caller's privacy
//! access. Shapes the lattice cannot express (lists, funs, the builtin
//! primitive types) become unknown — a `integer()` *type* carries no
//! singleton value, unlike an integer literal.

use crate::expander::Expander;
use lodestar_core::types::Fields;
use lodestar_core::{SpecAst, SpecDef, Type};
use rustc_hash::FxHashMap;

/// Builtin type names that carry no structure the lattice can track.
const OPAQUE_BUILTIN_TYPES: &[&str] = &[
    "any",
    "arity",
    "as_boolean",
    "atom",
    "binary",
    "bitstring",
    "boolean",
    "byte",
    "char",
    "charlist",
    "float",
    "fun",
    "function",
    "identifier",
    "integer",
    "iodata",
    "iolist",
    "keyword",
    "list",
    "maybe_improper_list",
    "mfa",
    "module",
    "neg_integer",
    "node",
    "non_neg_integer",
    "nonempty_charlist",
    "nonempty_list",
    "number",
    "pid",
    "port",
    "pos_integer",
    "reference",
    "string",
    "struct",
    "term",
    "timeout",
    "tuple",
    "var",
];

impl<'e> Expander<'e> {
    /// Convert a parsed declaration body: substitute parameters and `when`
    /// constraints into the result, convert, and expand.
    pub(crate) fn convert_def(
        &mut self,
        def: &SpecDef,
        home: &str,
        args: &[SpecAst],
        include_private: bool,
    ) -> Type {
        let mut bindings: FxHashMap<String, SpecAst> = FxHashMap::default();
        for (param, arg) in def.params.iter().zip(args) {
            if !param.is_empty() {
                bindings.insert(param.clone(), arg.clone());
            }
        }
        for (name, bound) in &def.constraints {
            bindings.insert(name.clone(), bound.clone());
        }

        let body = if bindings.is_empty() {
            def.result.clone()
        } else {
            substitute(&def.result, &bindings)
        };
        let converted = self.convert_spec(&body, Some(home), include_private);
        self.expand(&converted)
    }

    /// Convert a typespec syntax tree into a lattice value.
    pub(crate) fn convert_spec(
        &mut self,
        ast: &SpecAst,
        home: Option<&str>,
        include_private: bool,
    ) -> Type {
        match ast {
            SpecAst::Atom(name) => Type::Atom(name.clone()),
            SpecAst::Integer(value) => Type::Integer(*value),
            SpecAst::Union(variants) => Type::union(
                variants
                    .iter()
                    .map(|variant| self.convert_spec(variant, home, include_private))
                    .collect(),
            ),
            SpecAst::Tuple(elements) => Type::Tuple(
                elements.len(),
                elements
                    .iter()
                    .map(|element| self.convert_spec(element, home, include_private))
                    .collect(),
            ),
            SpecAst::Struct(module, fields) => {
                let converted: Fields = fields
                    .iter()
                    .map(|(key, value)| {
                        (key.clone(), self.convert_spec(value, home, include_private))
                    })
                    .collect();
                Type::Struct(converted, Some(Box::new(Type::Atom(module.clone()))), None)
            }
            SpecAst::Map(entries) => {
                let converted: Fields = entries
                    .iter()
                    .map(|(key, value)| {
                        (key.clone(), self.convert_spec(value, home, include_private))
                    })
                    .collect();
                Type::Map(converted, None)
            }
            // privacy never crosses a remote boundary
            SpecAst::Remote(module, name, args) => self.expand_type(module, name, args, false),
            SpecAst::Apply(name, args) => match (name.as_str(), args.len()) {
                ("no_return", _) | ("none", _) => Type::Never,
                ("map", 0) => Type::Map(Fields::new(), None),
                (name, _) if OPAQUE_BUILTIN_TYPES.contains(&name) => Type::Any,
                _ => match home {
                    Some(module) => self.expand_type(module, name, args, include_private),
                    None => Type::Any,
                },
            },
            SpecAst::List(_) | SpecAst::Unsupported => Type::Any,
        }
    }
}

/// Replace nullary applications whose name is bound with the bound subtree.
pub(crate) fn substitute(ast: &SpecAst, bindings: &FxHashMap<String, SpecAst>) -> SpecAst {
    match ast {
        SpecAst::Apply(name, args) if args.is_empty() => match bindings.get(name) {
            Some(bound) => bound.clone(),
            None => ast.clone(),
        },
        SpecAst::Apply(name, args) => SpecAst::Apply(
            name.clone(),
            args.iter().map(|arg| substitute(arg, bindings)).collect(),
        ),
        SpecAst::Remote(module, name, args) => SpecAst::Remote(
            module.clone(),
            name.clone(),
            args.iter().map(|arg| substitute(arg, bindings)).collect(),
        ),
        SpecAst::Union(variants) => SpecAst::Union(
            variants
                .iter()
                .map(|variant| substitute(variant, bindings))
                .collect(),
        ),
        SpecAst::Tuple(elements) => SpecAst::Tuple(
            elements
                .iter()
                .map(|element| substitute(element, bindings))
                .collect(),
        ),
        SpecAst::List(elements) => SpecAst::List(
            elements
                .iter()
                .map(|element| substitute(element, bindings))
                .collect(),
        ),
        SpecAst::Map(entries) => SpecAst::Map(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), substitute(value, bindings)))
                .collect(),
        ),
        SpecAst::Struct(module, fields) => SpecAst::Struct(
            module.clone(),
            fields
                .iter()
                .map(|(key, value)| (key.clone(), substitute(value, bindings)))
                .collect(),
        ),
        SpecAst::Atom(_) | SpecAst::Integer(_) | SpecAst::Unsupported => ast.clone(),
    }
}
