use crate::exp::{Identifier, Position};
use std::process::ExitCode;
use thiserror::Error;

/// Infrastructural failures: everything that is reported *before*
/// exploration starts and terminates the process with a nonzero exit code.
/// Contrast with [`SemanticError`], which flows through the state graph as
/// data.
#[derive(Debug, Error)]
pub enum KontourError {
    #[error("parse error at {position}: {message}")]
    Parse { position: Position, message: String },
    #[error("cannot read program: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

impl KontourError {
    pub fn parse(position: Position, message: impl Into<String>) -> Self {
        KontourError::Parse {
            position,
            message: message.into(),
        }
    }

    /// Process exit code for this error. Analysis completion is 0 and
    /// deadline expiry is 2; both are produced by the driver, not here.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            KontourError::Parse { .. } | KontourError::Io(_) => ExitCode::from(1),
            KontourError::UnsupportedConfiguration(_) => ExitCode::from(3),
        }
    }
}

/// Exit code for a run that hit the wall-clock deadline.
pub const TIMEOUT_EXIT_CODE: u8 = 2;

/// A structured semantic failure. Semantic errors are first-class values on
/// the state graph: they become states with no successors while sibling
/// non-deterministic branches keep exploring. They are therefore ordinary
/// data: orderable, hashable, and storable inside lattice cells.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Error)]
pub enum SemanticError {
    #[error("operator not applicable: ({operator} {operands})")]
    OperatorNotApplicable {
        operator: Identifier,
        operands: String,
    },
    #[error("{operator} expects {expected} arguments, got {got}")]
    ArityError {
        operator: Identifier,
        expected: usize,
        got: usize,
    },
    #[error("{operator} expects at least {min} arguments, got {got}")]
    VariadicArityError {
        operator: Identifier,
        min: usize,
        got: usize,
    },
    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: &'static str, got: String },
    #[error("user error at {position}: {message}")]
    UserError { position: Position, message: String },
    #[error("unbound variable {0}")]
    UnboundVariable(Identifier),
    #[error("unbound address {0}")]
    UnboundAddress(String),
    #[error("message {tag} not supported by behavior {behavior}")]
    MessageNotSupported {
        behavior: Identifier,
        tag: Identifier,
    },
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl SemanticError {
    /// Source position, when the error carries one.
    pub fn position(&self) -> Option<Position> {
        match self {
            SemanticError::UserError { position, .. } => Some(*position),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_errors_are_orderable_data() {
        let a = SemanticError::UnboundVariable(Identifier::new("x"));
        let b = SemanticError::UnboundVariable(Identifier::new("x"));
        assert_eq!(a, b);
        let mut set = std::collections::BTreeSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn user_error_carries_position() {
        let e = SemanticError::UserError {
            position: Position::new(2, 1),
            message: "boom".into(),
        };
        assert_eq!(e.position(), Some(Position::new(2, 1)));
        assert_eq!(e.to_string(), "user error at 2:1: boom");
    }
}
