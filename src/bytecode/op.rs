use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - Bytecode instructions
// =============================================================================
//
// Operands are stored in the slots that follow the opcode, one slot each.
// Stack effects are written ( before -- after ), top of stack rightmost.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    // ==========================================================================
    // Returns
    // ==========================================================================
    /// Return from the current frame without a value.
    ReturnNoVal,
    /// ( value -- ) Return from the current frame with a value.
    Return,

    // ==========================================================================
    // Variables
    // ==========================================================================
    /// `sym` ( -- value )
    PushSym,
    /// ( a -- a a )
    Dup,
    /// `sym` ( value -- ) Arrays are copied one level deep.
    Assign,

    // ==========================================================================
    // Arithmetic (operands coerced to integers; arrays for Add/Sub/BitAnd/BitOr)
    // ==========================================================================
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    Incr,
    Decr,
    Power,

    // ==========================================================================
    // Comparison and logic (results are 0 or 1)
    // ==========================================================================
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    And,
    Or,
    Not,

    /// ( a b -- "ab" )
    Concat,

    // ==========================================================================
    // Calls
    // ==========================================================================
    /// `sym nArgs` ( args.. -- ) Call a native or macro function.
    SubrCall,
    /// Marker after `SubrCall`: the caller wants the return value pushed.
    /// Never dispatched on its own.
    FetchRetVal,

    // ==========================================================================
    // Branches (operand is relative to the operand slot itself)
    // ==========================================================================
    /// `off`
    Branch,
    /// `off` ( cond -- )
    BranchTrue,
    /// `off` ( cond -- )
    BranchFalse,
    /// `off` Never taken; reserves a patchable slot.
    BranchNever,

    // ==========================================================================
    // Arrays
    // ==========================================================================
    /// `nDim` ( array keys.. -- value ), or ( array -- size ) when nDim is 0.
    ArrayRef,
    /// `nDim` ( array keys.. value -- )
    ArrayAssign,
    /// `iterSym` ( array -- )
    BeginArrayIter,
    /// `itemSym iterSym endOff` Bind the next key or branch out of the loop.
    ArrayIter,
    /// ( key array -- bool ) or ( keys-array array -- bool )
    InArray,
    /// `nDim` ( array keys.. -- ), clears the array when nDim is 0.
    ArrayDelete,
    /// `sym makeEmpty` ( -- array )
    PushArraySym,
    /// `binOp nDim` ( array keys.. [rhs] -- array keys.. value [rhs] )
    ArrayRefAssignSetup,

    // ==========================================================================
    // Arguments
    // ==========================================================================
    /// ( n -- arg ) 1-based.
    PushArg,
    /// ( -- count )
    PushArgCount,
    /// ( -- array ) Arguments keyed "1".."n".
    PushArgArray,
}

/// Kind of operand slot an opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Symbol,
    Immediate,
    BranchOffset,
}

impl OpCode {
    pub const ALL: [OpCode; 43] = [
        OpCode::ReturnNoVal,
        OpCode::Return,
        OpCode::PushSym,
        OpCode::Dup,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Negate,
        OpCode::Incr,
        OpCode::Decr,
        OpCode::Gt,
        OpCode::Lt,
        OpCode::Ge,
        OpCode::Le,
        OpCode::Eq,
        OpCode::Ne,
        OpCode::BitAnd,
        OpCode::BitOr,
        OpCode::And,
        OpCode::Or,
        OpCode::Not,
        OpCode::Power,
        OpCode::Concat,
        OpCode::Assign,
        OpCode::SubrCall,
        OpCode::FetchRetVal,
        OpCode::Branch,
        OpCode::BranchTrue,
        OpCode::BranchFalse,
        OpCode::BranchNever,
        OpCode::ArrayRef,
        OpCode::ArrayAssign,
        OpCode::BeginArrayIter,
        OpCode::ArrayIter,
        OpCode::InArray,
        OpCode::ArrayDelete,
        OpCode::PushArraySym,
        OpCode::ArrayRefAssignSetup,
        OpCode::PushArg,
        OpCode::PushArgCount,
        OpCode::PushArgArray,
    ];

    /// Mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::ReturnNoVal => "RETURN_NO_VAL",
            OpCode::Return => "RETURN",
            OpCode::PushSym => "PUSH_SYM",
            OpCode::Dup => "DUP",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Negate => "NEGATE",
            OpCode::Incr => "INCR",
            OpCode::Decr => "DECR",
            OpCode::Gt => "GT",
            OpCode::Lt => "LT",
            OpCode::Ge => "GE",
            OpCode::Le => "LE",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::BitAnd => "BIT_AND",
            OpCode::BitOr => "BIT_OR",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Not => "NOT",
            OpCode::Power => "POWER",
            OpCode::Concat => "CONCAT",
            OpCode::Assign => "ASSIGN",
            OpCode::SubrCall => "SUBR_CALL",
            OpCode::FetchRetVal => "FETCH_RET_VAL",
            OpCode::Branch => "BRANCH",
            OpCode::BranchTrue => "BRANCH_TRUE",
            OpCode::BranchFalse => "BRANCH_FALSE",
            OpCode::BranchNever => "BRANCH_NEVER",
            OpCode::ArrayRef => "ARRAY_REF",
            OpCode::ArrayAssign => "ARRAY_ASSIGN",
            OpCode::BeginArrayIter => "BEGIN_ARRAY_ITER",
            OpCode::ArrayIter => "ARRAY_ITER",
            OpCode::InArray => "IN_ARRAY",
            OpCode::ArrayDelete => "ARRAY_DELETE",
            OpCode::PushArraySym => "PUSH_ARRAY_SYM",
            OpCode::ArrayRefAssignSetup => "ARRAY_REF_ASSIGN_SETUP",
            OpCode::PushArg => "PUSH_ARG",
            OpCode::PushArgCount => "PUSH_ARG_COUNT",
            OpCode::PushArgArray => "PUSH_ARG_ARRAY",
        }
    }

    /// Operand slots that follow this opcode, in order.
    pub fn operands(self) -> &'static [OperandKind] {
        use OperandKind::*;

        match self {
            OpCode::PushSym | OpCode::Assign | OpCode::BeginArrayIter => &[Symbol],
            OpCode::SubrCall | OpCode::PushArraySym => &[Symbol, Immediate],
            OpCode::Branch | OpCode::BranchTrue | OpCode::BranchFalse | OpCode::BranchNever => {
                &[BranchOffset]
            }
            OpCode::ArrayRef | OpCode::ArrayAssign | OpCode::ArrayDelete => &[Immediate],
            OpCode::ArrayRefAssignSetup => &[Immediate, Immediate],
            OpCode::ArrayIter => &[Symbol, Symbol, BranchOffset],
            _ => &[],
        }
    }

    pub fn operand_count(self) -> usize {
        self.operands().len()
    }
}
