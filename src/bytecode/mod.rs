pub mod assemble_error;
pub mod assembler;
pub mod disasm;
pub mod ir;
pub mod op;

pub use assemble_error::AssembleError;
pub use assembler::{Assembler, AssemblerConfig};
pub use ir::{ImageError, Instruction, Program};
pub use op::OpCode;
