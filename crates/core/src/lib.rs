//! Lodestar core — the type algebra of the expansion engine.
//!
//! This crate holds the environment-free parts of the engine:
//! - the closed type lattice ([`types::Type`]),
//! - the intersection combiner ([`combine::Combiner`]),
//! - the typespec text parser ([`typespec`]),
//! - the error taxonomy.
//!
//! Resolution against an environment (variables, attributes, specs, struct
//! registries, host introspection) lives in the `lodestar-expand` crate.

pub mod combine;
pub mod errors;
pub mod types;
pub mod typespec;

pub use combine::Combiner;
pub use errors::TypespecParseError;
pub use types::{Fields, Type, collect_fields, overlay};
pub use typespec::{SpecAst, SpecDef, parse_spec, parse_type};
