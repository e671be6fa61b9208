//! Structural contracts for the host's map and tuple manipulators.
//!
//! Calls like `Map.put/3` or `Kernel.elem/2` do not need specs: their effect
//! on the lattice is structural and exact, so they are evaluated directly
//! against the expanded shapes of their arguments. Anything not in the
//! catalog falls through to spec-based resolution.

use crate::call_resolver::CallOutcome;
use crate::expander::Expander;
use lodestar_core::Type;
use lodestar_core::types::{Fields, overlay};

/// Expanded shape of a map-like argument.
enum MapShape {
    Known(Fields),
    /// Not provably a map or struct: the whole call is absurd.
    Invalid,
}

impl<'e> Expander<'e> {
    /// Dispatch a call against the structural built-in catalog. `None`
    /// means the call is not a built-in and resolution should continue.
    pub(crate) fn resolve_builtin(
        &mut self,
        module: &str,
        fun: &str,
        args: &[Type],
    ) -> Option<CallOutcome> {
        match (module, fun, args.len()) {
            ("Kernel", "elem", 2) => Some(self.builtin_elem(&args[0], &args[1])),
            ("Map", _, _) => self.map_builtin(fun, args),
            _ => None,
        }
    }

    fn builtin_elem(&mut self, tuple: &Type, index: &Type) -> CallOutcome {
        CallOutcome::Resolved(match self.expand(index) {
            Type::Integer(n) if n >= 0 => {
                let projection = Type::tuple_nth(tuple.clone(), n as usize);
                self.expand(&projection)
            }
            Type::Any => Type::Any,
            _ => Type::Never,
        })
    }

    fn map_builtin(&mut self, fun: &str, args: &[Type]) -> Option<CallOutcome> {
        let outcome = match (fun, args.len()) {
            ("get", 2) | ("fetch", 2) | ("fetch!", 2) => self.map_get(&args[0], &args[1], None),
            ("get", 3) => self.map_get(&args[0], &args[1], Some(&args[2])),
            ("get_lazy", 3) => self.map_get(&args[0], &args[1], None),
            ("put", 3) | ("replace!", 3) => self.map_put(&args[0], &args[1], Some(&args[2])),
            ("put_new", 3) => self.map_put_new(&args[0], &args[1], Some(&args[2])),
            ("put_new_lazy", 3) => self.map_put_new(&args[0], &args[1], None),
            ("delete", 2) => self.map_delete(&args[0], &args[1]),
            ("merge", 2) => self.map_merge(&args[0], &args[1]),
            ("merge", 3) => self.map_merge_conflicts_unknown(&args[0], &args[1]),
            ("update", 4) | ("update!", 3) => self.map_put(&args[0], &args[1], None),
            ("from_struct", 1) => self.map_from_struct(&args[0]),
            _ => return None,
        };
        Some(outcome)
    }

    fn shape_of(&mut self, expr: &Type) -> MapShape {
        match self.expand(expr) {
            Type::Map(fields, _) => MapShape::Known(fields),
            Type::Struct(fields, _, _) => MapShape::Known(fields),
            Type::Any => MapShape::Known(Fields::new()),
            _ => MapShape::Invalid,
        }
    }

    fn map_get(&mut self, map: &Type, key: &Type, default: Option<&Type>) -> CallOutcome {
        let MapShape::Known(fields) = self.shape_of(map) else {
            return CallOutcome::Resolved(Type::Never);
        };
        CallOutcome::Resolved(match self.expand(key) {
            Type::Atom(key) => match fields.get(&key).cloned() {
                Some(value) => self.expand(&value),
                None => match default {
                    Some(default) => self.expand(default),
                    None => Type::Any,
                },
            },
            Type::Any => Type::Any,
            _ => Type::Never,
        })
    }

    /// `value = None` writes an unknown (lazily computed) value.
    fn map_put(&mut self, map: &Type, key: &Type, value: Option<&Type>) -> CallOutcome {
        let MapShape::Known(mut fields) = self.shape_of(map) else {
            return CallOutcome::Resolved(Type::Never);
        };
        CallOutcome::Resolved(match self.expand(key) {
            Type::Atom(key) => {
                // the written value stays unexpanded so lazy fields survive
                fields.insert(key, value.cloned().unwrap_or(Type::Any));
                Type::Map(fields, None)
            }
            Type::Any => Type::Map(fields, None),
            _ => Type::Never,
        })
    }

    fn map_put_new(&mut self, map: &Type, key: &Type, value: Option<&Type>) -> CallOutcome {
        let MapShape::Known(mut fields) = self.shape_of(map) else {
            return CallOutcome::Resolved(Type::Never);
        };
        CallOutcome::Resolved(match self.expand(key) {
            Type::Atom(key) => {
                if !fields.contains_key(&key) {
                    fields.insert(key, value.cloned().unwrap_or(Type::Any));
                }
                Type::Map(fields, None)
            }
            Type::Any => Type::Map(fields, None),
            _ => Type::Never,
        })
    }

    fn map_delete(&mut self, map: &Type, key: &Type) -> CallOutcome {
        let MapShape::Known(mut fields) = self.shape_of(map) else {
            return CallOutcome::Resolved(Type::Never);
        };
        CallOutcome::Resolved(match self.expand(key) {
            Type::Atom(key) => {
                fields.shift_remove(&key);
                Type::Map(fields, None)
            }
            Type::Any => Type::Map(fields, None),
            _ => Type::Never,
        })
    }

    fn map_merge(&mut self, left: &Type, right: &Type) -> CallOutcome {
        let MapShape::Known(base) = self.shape_of(left) else {
            return CallOutcome::Resolved(Type::Never);
        };
        let MapShape::Known(over) = self.shape_of(right) else {
            return CallOutcome::Resolved(Type::Never);
        };
        CallOutcome::Resolved(Type::Map(overlay(&base, &over), None))
    }

    /// `merge/3` resolves conflicts through an opaque combiner function, so
    /// keys present on both sides become unknown.
    fn map_merge_conflicts_unknown(&mut self, left: &Type, right: &Type) -> CallOutcome {
        let MapShape::Known(base) = self.shape_of(left) else {
            return CallOutcome::Resolved(Type::Never);
        };
        let MapShape::Known(over) = self.shape_of(right) else {
            return CallOutcome::Resolved(Type::Never);
        };
        let mut merged = base.clone();
        for (key, value) in &over {
            if base.contains_key(key) {
                merged.insert(key.clone(), Type::Any);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        CallOutcome::Resolved(Type::Map(merged, None))
    }

    fn map_from_struct(&mut self, arg: &Type) -> CallOutcome {
        CallOutcome::Resolved(match self.expand(arg) {
            Type::Struct(mut fields, _, _) => {
                fields.shift_remove("__struct__");
                Type::Map(fields, None)
            }
            Type::Atom(module) => {
                let synthesized = Type::struct_for::<String>(module, []);
                match self.expand(&synthesized) {
                    Type::Struct(mut fields, _, _) => {
                        fields.shift_remove("__struct__");
                        Type::Map(fields, None)
                    }
                    _ => Type::Never,
                }
            }
            Type::Any => Type::Any,
            _ => Type::Never,
        })
    }
}
