mod arith;
mod arrays;
pub mod context;
mod control;
pub mod native;
pub mod runtime_error;
mod variables;
pub mod vm;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{DocumentHandle, ExecutionContext};
pub use native::{NativeCall, NativeError, NativeSubroutine};
pub use runtime_error::ExecError;
pub use vm::{Continuation, Interpreter, MacroStatus, PreemptReason, VmConfig};
