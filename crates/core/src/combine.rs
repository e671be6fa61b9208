//! Intersection combination over the type lattice.
//!
//! When several independent constraints are known for the same expression,
//! the expander folds them with the pairwise meet implemented here. The meet
//! is structural: maps and structs combine key by key, tuples element by
//! element, unions by the first surviving variant. `Never` absorbs, `Any` is
//! the identity, and incompatible shapes meet at `Never`.

use crate::types::{Fields, Type};

/// Pairwise meet of two expanded lattice values.
pub struct Combiner;

impl Combiner {
    pub fn combine(left: &Type, right: &Type) -> Type {
        match (left, right) {
            (Type::Never, _) | (_, Type::Never) => Type::Never,
            (Type::Any, other) | (other, Type::Any) => other.clone(),
            (a, b) if a == b => a.clone(),
            (Type::Struct(f1, None, None), Type::Struct(f2, None, None)) => {
                match Self::combine_all_keys(f1, f2) {
                    Some(fields) => Type::Struct(fields, None, None),
                    None => Type::Never,
                }
            }
            (Type::Struct(f1, Some(m1), None), Type::Struct(f2, m2, None)) => {
                if let Some(m2) = m2
                    && m1 != m2
                {
                    return Type::Never;
                }
                // the typed side dictates the key set
                match Self::combine_narrowing(f1, f2) {
                    Some(fields) => Type::Struct(fields, Some(m1.clone()), None),
                    None => Type::Never,
                }
            }
            (Type::Struct(_, None, None), Type::Struct(_, Some(_), None)) => {
                Self::combine(right, left)
            }
            (Type::Map(f1, None), Type::Map(f2, None)) => match Self::combine_all_keys(f1, f2) {
                Some(fields) => Type::Map(fields, None),
                None => Type::Never,
            },
            (Type::Struct(f1, module, None), Type::Map(f2, None)) => {
                // a map constraint narrows a typed struct's values but cannot
                // widen its key set; an untyped struct takes the union
                let combined = match module {
                    Some(_) => Self::combine_narrowing(f1, f2),
                    None => Self::combine_all_keys(f1, f2),
                };
                match combined {
                    Some(fields) => Type::Struct(fields, module.clone(), None),
                    None => Type::Never,
                }
            }
            (Type::Map(_, None), Type::Struct(_, _, None)) => Self::combine(right, left),
            (Type::Tuple(n1, e1), Type::Tuple(n2, e2)) if n1 == n2 => {
                let mut elements = Vec::with_capacity(e1.len());
                for (a, b) in e1.iter().zip(e2.iter()) {
                    let merged = Self::combine(a, b);
                    if merged.is_never() {
                        return Type::Never;
                    }
                    elements.push(merged);
                }
                Type::Tuple(*n1, elements)
            }
            (Type::Union(variants), other) => Self::combine_union(variants, other),
            (other, Type::Union(variants)) => Self::combine_union(variants, other),
            _ => Type::Never,
        }
    }

    /// Union of both key sets; `None` when any per-key meet is absurd.
    fn combine_all_keys(f1: &Fields, f2: &Fields) -> Option<Fields> {
        let mut merged = Fields::new();
        for (key, v1) in f1 {
            let value = match f2.get(key) {
                Some(v2) => Self::combine(v1, v2),
                None => v1.clone(),
            };
            if value.is_never() {
                return None;
            }
            merged.insert(key.clone(), value);
        }
        for (key, v2) in f2 {
            if !f1.contains_key(key) {
                merged.insert(key.clone(), v2.clone());
            }
        }
        Some(merged)
    }

    /// Keep the key set of `keyed`, narrowing each value by `other` where it
    /// constrains the same key.
    fn combine_narrowing(keyed: &Fields, other: &Fields) -> Option<Fields> {
        let mut merged = Fields::new();
        for (key, v1) in keyed {
            let value = match other.get(key) {
                Some(v2) => Self::combine(v1, v2),
                None => v1.clone(),
            };
            if value.is_never() {
                return None;
            }
            merged.insert(key.clone(), value);
        }
        Some(merged)
    }

    fn combine_union(variants: &[Type], other: &Type) -> Type {
        for variant in variants {
            let merged = Self::combine(variant, other);
            if !merged.is_never() {
                return merged;
            }
        }
        Type::Never
    }
}
