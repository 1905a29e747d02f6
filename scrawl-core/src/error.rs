//! Error types for compilation and execution.

use std::fmt;

use crate::token::Span;

// ---------------------------------------------------------------------------
// Compile errors
// ---------------------------------------------------------------------------

/// What went wrong while turning source text into a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// A byte outside the accepted character set.
    InvalidCharacter,
    /// A string literal without a closing quote on the same line.
    UnterminatedString,
    /// A conditional with no statement end inside balanced brackets.
    UnbalancedDelimiter,
    /// A `$name` reference with no matching declaration.
    UndefinedFunction,
    /// A malformed `=` declaration.
    BadDeclaration,
    /// The same name declared twice.
    Redefinition,
}

/// An error produced by the scanner or resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    /// The category of error.
    pub kind: CompileErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Source location, when one is known.
    pub span: Option<Span>,
}

impl CompileError {
    /// Create a new compile error with a source location.
    #[must_use]
    pub fn new(kind: CompileErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }

    /// Create a compile error without a source location.
    #[must_use]
    pub fn unlocated(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{} at byte {}", self.message, span.start),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Convenience alias for compiler results.
pub type CompileResult<T> = Result<T, CompileError>;

// ---------------------------------------------------------------------------
// Runtime errors
// ---------------------------------------------------------------------------

/// What went wrong while executing a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// An operation needed more stack values than were present.
    StackUnderflow,
    /// An internal consistency check failed (bad peek target, corner
    /// rounding without enough vertices, negative argument slot).
    Assertion,
    /// Call or block nesting exceeded the configured limit.
    RecursionLimit,
    /// `run` was asked for an entry point that was never declared.
    UnknownFunction,
    /// A computed address does not land on an instruction.
    BadAddress,
}

/// An error raised during interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// The category of error.
    pub kind: RuntimeErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Instruction index at which the error was raised.
    pub ip: usize,
}

impl RuntimeError {
    /// Create a new runtime error.
    #[must_use]
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>, ip: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            ip,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at instruction {}", self.message, self.ip)
    }
}

impl std::error::Error for RuntimeError {}

/// Convenience alias for interpreter results.
pub type RunResult<T> = Result<T, RuntimeError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display_includes_location() {
        let err = CompileError::new(
            CompileErrorKind::InvalidCharacter,
            "unexpected character '&'",
            Span::new(4, 5),
        );
        assert_eq!(err.to_string(), "unexpected character '&' at byte 4");
    }

    #[test]
    fn runtime_error_display_includes_ip() {
        let err = RuntimeError::new(RuntimeErrorKind::StackUnderflow, "stack is empty", 7);
        assert_eq!(err.to_string(), "stack is empty at instruction 7");
    }
}
