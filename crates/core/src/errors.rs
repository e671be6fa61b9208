use crate::typespec::Token;

/// Errors raised while parsing stored typespec text.
///
/// These never cross the expansion boundary: the resolvers treat a failed
/// parse as "no usable spec" and degrade to the unknown lattice element.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TypespecParseError {
    #[error("unexpected character '{0}' in typespec")]
    UnexpectedChar(char),

    #[error("integer literal out of range: {0}")]
    IntegerOutOfRange(String),

    #[error("expected {expected}, found {found:?}")]
    UnexpectedToken { expected: String, found: Token },

    #[error("unexpected end of typespec")]
    UnexpectedEnd,

    #[error("trailing tokens after typespec")]
    TrailingTokens,
}
