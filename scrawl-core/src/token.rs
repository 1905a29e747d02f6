//! Token types for the Scrawl scanner.
//!
//! The scanner produces a flat stream of:
//! - **Numbers**: integer or float literals, optional exponent, never
//!   negative (`-` is the binary operator)
//! - **Operators**: one reserved punctuation character each
//! - **`$`-tokens**: `$3` is a direct argument-slot reference, `$name` a
//!   function reference resolved against the symbol table later
//! - **Separators**: collapsed whitespace runs, marking statement bounds
//! - **Declarations**: the `=` marker that binds a name to a function body
//!
//! The stream always begins and ends with a separator so the resolver can
//! look one token back and forward without bounds checks.

use scrawl_graphics::types::Scalar;

// ---------------------------------------------------------------------------
// Source location
// ---------------------------------------------------------------------------

/// A byte-offset span in the source input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A zero-length span at the given position.
    #[must_use]
    pub const fn at(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A lexical token produced by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind and value of the token.
    pub kind: TokenKind,
    /// Source location.
    pub span: Span,
}

/// The kind and payload of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A non-negative numeric constant. String literals also lex to one
    /// `Number` per byte — the mechanism programs use to compile in
    /// character-code tables read back with the `@` operator.
    Number(Scalar),

    /// A single-character operator or punctuation.
    Op(char),

    /// A direct argument-slot reference: `$3`. Slot 0 is the innermost
    /// loop's iteration counter.
    Arg(usize),

    /// A function reference: `$name`. Resolved to an instruction address
    /// once the whole program has been scanned.
    FuncRef(String),

    /// The `=` declaration marker.
    Decl,

    /// A statement/space boundary.
    Sep,
}

impl TokenKind {
    /// Returns `true` if this is a separator.
    #[must_use]
    pub const fn is_sep(&self) -> bool {
        matches!(self, Self::Sep)
    }

    /// Returns `true` if this is a numeric token.
    #[must_use]
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_kind_predicates() {
        assert!(TokenKind::Sep.is_sep());
        assert!(!TokenKind::Op('+').is_sep());
        assert!(TokenKind::Number(3.5).is_number());
        assert!(!TokenKind::Arg(1).is_number());
    }
}
