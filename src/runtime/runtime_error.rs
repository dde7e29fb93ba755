use crate::lang::Value;
use crate::runtime::native::NativeError;
use thiserror::Error;

/// Failure that stops a running macro.
///
/// Every variant is terminal for the execution context that raised it; the
/// message is what the host shows the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("macro stack overflow")]
    StackOverflow,

    #[error("macro stack underflow")]
    StackUnderflow,

    #[error("{0}")]
    TypeMismatch(String),

    #[error("variable not set: {name}")]
    UndefinedVariable { name: String },

    #[error("referenced undefined argument: {name}")]
    UndefinedArgument { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo by zero")]
    ModuloByZero,

    #[error("{name} is not a function or subroutine")]
    NotASubroutine { name: String },

    #[error("{0}")]
    NotAnLvalue(String),

    #[error("{0}")]
    NotAnArray(String),

    #[error("referenced array value not in array: {key}")]
    KeyNotFound { key: String },

    #[error("array insertion failure")]
    ArrayInsertionFailure,

    #[error("array member allocation failure")]
    ArrayAssignFailure,

    #[error("array deletion failure")]
    ArrayDeletionFailure,

    #[error("{name}: {source}")]
    NativeSubroutine {
        name: String,
        #[source]
        source: NativeError,
    },

    #[error("{name} does not return a value")]
    NoReturnValue { name: String },

    #[error("using return value of {name} which does not return a value")]
    ReturnValueMissing { name: String },

    #[error("array iterator invalidated: entry {key:?} was deleted")]
    IteratorInvalidated { key: String },

    #[error("bad temporary iterator: {name}")]
    BadIterator { name: String },

    #[error("empty operator []")]
    EmptyIndex,

    #[error("{operation} result out of range")]
    OutOfRange { operation: &'static str },

    #[error("internal error: {0}")]
    MalformedProgram(String),
}

impl ExecError {
    /// Type mismatch for a value that is not of the `wanted` variant.
    pub fn expected(wanted: &str, got: &Value) -> Self {
        ExecError::TypeMismatch(format!("expected {}, got {}", wanted, got.type_name()))
    }

    pub fn malformed(what: impl Into<String>) -> Self {
        ExecError::MalformedProgram(what.into())
    }
}
