//! Compile-time diagnostics.
//!
//! The analyzer never returns errors - it reports into a shared
//! [`ErrorReporter`] and leaves the offending call's type unresolved.
//! Compilation yields no executable artifact if any diagnostic was emitted.

use super::ast::Pos;
use std::fmt;

/// How many arguments a contract wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiagnosticKind {
    #[error("call to '{callee}' expects {expected} argument(s), got {got}")]
    MismatchedArgCount {
        callee: String,
        expected: Arity,
        got: usize,
    },

    #[error("argument {index} to '{callee}' has type {actual}, expected {expected}")]
    BadArgType {
        callee: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("unknown builtin '{callee}'")]
    UnknownBuiltin { callee: String },

    #[error("argument {index} to '{callee}' is not a SQL value (got {actual})")]
    NotASqlValue {
        callee: String,
        index: usize,
        actual: String,
    },

    #[error("argument {index} to '{callee}' is not a pointer to an aggregator (got {actual})")]
    NotAnAggregator {
        callee: String,
        index: usize,
        actual: String,
    },

    #[error("argument {index} to '{callee}' must be a {expected} function, got {actual}")]
    BadFunctionShape {
        callee: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("invalid pointer cast from {from} to {to}")]
    BadPointerCast { from: String, to: String },

    #[error("parallel scan function has shape {actual}, expected (*state, *state, *TableVectorIterator)")]
    BadParallelScanFunction { actual: String },

    #[error("undefined name '{name}'")]
    UndefinedName { name: String },

    #[error("operator '{op}' cannot be applied to {actual}")]
    BadOperandType { op: String, actual: String },

    #[error("condition has type {actual}, expected bool")]
    NonBoolCondition { actual: String },
}

/// One reported problem, keyed by the offending node's position.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub pos: Pos,
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.pos.0, self.kind)
    }
}

/// Accumulates diagnostics across one analysis pass.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    diags: Vec<Diagnostic>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        ErrorReporter::default()
    }

    pub fn report(&mut self, pos: Pos, kind: DiagnosticKind) {
        self.diags.push(Diagnostic { pos, kind });
    }

    pub fn has_errors(&self) -> bool {
        !self.diags.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    pub fn len(&self) -> usize {
        self.diags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_accumulates() {
        let mut r = ErrorReporter::new();
        assert!(!r.has_errors());
        r.report(Pos(3), DiagnosticKind::UnknownBuiltin { callee: "nope".into() });
        assert!(r.has_errors());
        assert_eq!(r.len(), 1);
        assert_eq!(r.diagnostics()[0].pos, Pos(3));
    }

    #[test]
    fn test_display_carries_position_and_reason() {
        let d = Diagnostic {
            pos: Pos(7),
            kind: DiagnosticKind::MismatchedArgCount {
                callee: "sorterInit".into(),
                expected: Arity::Exact(4),
                got: 2,
            },
        };
        let s = d.to_string();
        assert!(s.contains("sorterInit"));
        assert!(s.contains('4'));
        assert!(s.contains('2'));
    }
}
