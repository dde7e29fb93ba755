//! Bytecode interpreter for editor macros.
//!
//! Macros are assembled into [`Program`]s and run by an [`Interpreter`] in
//! budgeted slices, so a long-running macro can be suspended and resumed by
//! the host's event loop.

pub mod bytecode;
pub mod lang;
pub mod runtime;

pub use bytecode::{Assembler, OpCode, Program};
pub use lang::{SymbolTable, Value};
pub use runtime::{Continuation, ExecError, Interpreter, MacroStatus, NativeSubroutine};
