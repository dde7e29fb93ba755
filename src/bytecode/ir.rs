use crate::bytecode::OpCode;
use crate::lang::SymbolId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One slot of program code. Operands occupy their own slots after the
/// opcode they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Op(OpCode),
    /// Integer operand: argument count, dimension count, flag, or a branch
    /// offset relative to this slot.
    Immediate(i64),
    Symbol(SymbolId),
}

/// A compiled macro program.
///
/// Immutable once built. `locals` lists the frame-resident symbols in
/// declaration order; their frame offsets are their positions in that list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    code: Vec<Instruction>,
    locals: Vec<SymbolId>,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("program image encoding failed: {0}")]
    Encode(#[source] postcard::Error),

    #[error("program image decoding failed: {0}")]
    Decode(#[source] postcard::Error),
}

impl Program {
    pub fn new(code: Vec<Instruction>, locals: Vec<SymbolId>) -> Self {
        Self { code, locals }
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn locals(&self) -> &[SymbolId] {
        &self.locals
    }

    /// Encode the program so a host can cache it. Symbol ids are only
    /// meaningful against the table that produced them.
    pub fn to_image(&self) -> Result<Vec<u8>, ImageError> {
        postcard::to_allocvec(self).map_err(ImageError::Encode)
    }

    pub fn from_image(bytes: &[u8]) -> Result<Self, ImageError> {
        postcard::from_bytes(bytes).map_err(ImageError::Decode)
    }
}
