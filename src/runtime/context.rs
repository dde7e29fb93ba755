use crate::bytecode::{Instruction, OpCode, Program};
use crate::lang::{CodeAddress, SymbolId, Value};
use crate::runtime::runtime_error::ExecError;
use std::rc::Rc;

// Call frame layout, as distances below the frame pointer. Locals start at
// the frame pointer and grow upward; arguments sit below the saved return
// address, first argument deepest.
//
//   fp + i        local i
//   fp - 1        arguments-array cache
//   fp - 2        argument count
//   fp - 3        saved frame pointer
//   fp - 4        saved return address
//   fp - 4 - n    argument 0 (of n)
pub const FP_ARG_ARRAY_CACHE: usize = 1;
pub const FP_ARG_COUNT: usize = 2;
pub const FP_OLD_FP: usize = 3;
pub const FP_RET_PC: usize = 4;
pub const FP_TO_ARGS_DIST: usize = 4;

/// Opaque handle naming a document window. The interpreter only passes it
/// through to native subroutines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(pub u64);

/// Mutable state of one macro execution: the value stack, frame pointer,
/// program counter and the documents natives act on.
#[derive(Debug)]
pub struct ExecutionContext {
    stack: Vec<Value>,
    stack_limit: usize,
    fp: usize,
    pc: CodeAddress,
    run_target: Option<DocumentHandle>,
    focus_target: Option<DocumentHandle>,
}

/// Read-only view of the current call frame.
pub struct Frame<'a> {
    stack: &'a [Value],
    fp: usize,
}

impl ExecutionContext {
    /// Context ready to run `program` as a top-level call with `args`.
    pub fn new(
        program: &Rc<Program>,
        args: &[Value],
        stack_limit: usize,
        target: Option<DocumentHandle>,
    ) -> Result<Self, ExecError> {
        let mut context = Self {
            stack: Vec::with_capacity(stack_limit.min(1024)),
            stack_limit,
            fp: 0,
            pc: CodeAddress::new(program.clone(), 0),
            run_target: target,
            focus_target: target,
        };

        for arg in args {
            context.push(arg.clone())?;
        }
        context.push_frame(None, None, args.len(), program)?;
        Ok(context)
    }

    // =========================================================================
    // Stack
    // =========================================================================

    pub fn push(&mut self, value: Value) -> Result<(), ExecError> {
        if self.stack.len() >= self.stack_limit {
            return Err(ExecError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, ExecError> {
        self.stack.pop().ok_or(ExecError::StackUnderflow)
    }

    /// Value `depth` slots below the top, without removing it.
    pub fn peek(&self, depth: usize) -> Result<&Value, ExecError> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or(ExecError::StackUnderflow)
    }

    pub fn drop_top(&mut self, n: usize) -> Result<(), ExecError> {
        let len = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or(ExecError::StackUnderflow)?;
        self.stack.truncate(len);
        Ok(())
    }

    /// Remove the top `n` values, deepest first.
    pub fn split_args(&mut self, n: usize) -> Result<Vec<Value>, ExecError> {
        let at = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or(ExecError::StackUnderflow)?;
        Ok(self.stack.split_off(at))
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    // =========================================================================
    // Code fetch
    // =========================================================================

    pub fn pc(&self) -> &CodeAddress {
        &self.pc
    }

    pub fn fp(&self) -> usize {
        self.fp
    }

    /// Fetch the opcode at the program counter and advance past it. Running
    /// off the end of the code reads as a return without value.
    pub fn fetch_op(&mut self) -> Result<OpCode, ExecError> {
        match self.pc.instruction() {
            None => Ok(OpCode::ReturnNoVal),
            Some(Instruction::Op(op)) => {
                self.pc.index += 1;
                Ok(op)
            }
            Some(other) => Err(ExecError::malformed(format!(
                "operand {:?} where an instruction was expected at {}",
                other, self.pc.index
            ))),
        }
    }

    pub fn fetch_symbol(&mut self) -> Result<SymbolId, ExecError> {
        match self.pc.instruction() {
            Some(Instruction::Symbol(id)) => {
                self.pc.index += 1;
                Ok(id)
            }
            other => Err(ExecError::malformed(format!(
                "expected symbol operand at {}, found {:?}",
                self.pc.index, other
            ))),
        }
    }

    pub fn fetch_immediate(&mut self) -> Result<i64, ExecError> {
        match self.pc.instruction() {
            Some(Instruction::Immediate(n)) => {
                self.pc.index += 1;
                Ok(n)
            }
            other => Err(ExecError::malformed(format!(
                "expected immediate operand at {}, found {:?}",
                self.pc.index, other
            ))),
        }
    }

    /// Fetch an immediate that counts something (arguments, dimensions).
    pub fn fetch_count(&mut self) -> Result<usize, ExecError> {
        let n = self.fetch_immediate()?;
        usize::try_from(n).map_err(|_| ExecError::malformed(format!("negative count {}", n)))
    }

    /// Fetch a branch operand, returning its absolute target.
    pub fn fetch_branch(&mut self) -> Result<usize, ExecError> {
        let site = self.pc.index;
        let offset = self.fetch_immediate()?;
        let target = site as i64 + offset;

        if target < 0 || target as usize > self.pc.program.code().len() {
            return Err(ExecError::malformed(format!(
                "branch from {} out of range",
                site
            )));
        }
        Ok(target as usize)
    }

    pub fn jump(&mut self, target: usize) {
        self.pc.index = target;
    }

    /// True if the slot at the program counter is the opcode `op`.
    pub fn next_is(&self, op: OpCode) -> bool {
        self.pc.instruction() == Some(Instruction::Op(op))
    }

    pub fn skip(&mut self) {
        self.pc.index += 1;
    }

    // =========================================================================
    // Frames
    // =========================================================================

    pub fn frame(&self) -> Frame<'_> {
        Frame {
            stack: &self.stack,
            fp: self.fp,
        }
    }

    pub fn local_mut(&mut self, offset: usize) -> Result<&mut Value, ExecError> {
        let index = self.fp + offset;
        self.stack
            .get_mut(index)
            .ok_or_else(|| ExecError::malformed(format!("local slot {} outside frame", offset)))
    }

    pub fn args_cache_mut(&mut self) -> Result<&mut Value, ExecError> {
        let index = self
            .fp
            .checked_sub(FP_ARG_ARRAY_CACHE)
            .ok_or_else(|| ExecError::malformed("no call frame"))?;
        self.stack
            .get_mut(index)
            .ok_or_else(|| ExecError::malformed("no call frame"))
    }

    /// Push the bookkeeping slots of a call whose `n_args` arguments are
    /// already on the stack, then enter `program` with its locals unset.
    pub fn push_frame(
        &mut self,
        return_pc: Option<CodeAddress>,
        old_fp: Option<usize>,
        n_args: usize,
        program: &Rc<Program>,
    ) -> Result<(), ExecError> {
        if n_args > self.stack.len() {
            return Err(ExecError::StackUnderflow);
        }

        let needed = FP_TO_ARGS_DIST + program.locals().len();
        if self.stack.len() + needed > self.stack_limit {
            return Err(ExecError::StackOverflow);
        }

        self.stack.push(Value::InstructionAddress(return_pc));
        self.stack.push(Value::FrameSlot(old_fp));
        self.stack.push(Value::Int(n_args as i32));
        self.stack.push(Value::Unset);

        self.fp = self.stack.len();
        self.pc = CodeAddress::new(program.clone(), 0);

        for _ in program.locals() {
            self.stack.push(Value::Unset);
        }
        Ok(())
    }

    /// Discard the current frame with its locals and arguments, restoring
    /// the caller's frame pointer and program counter. Returns the saved
    /// return address, `None` for the outermost frame.
    pub fn pop_frame(&mut self) -> Result<Option<CodeAddress>, ExecError> {
        let frame = self.frame();
        let n_args = frame.arg_count()?;
        let old_fp = frame.saved_fp()?;
        let return_pc = frame.saved_pc()?;

        let base = self
            .fp
            .checked_sub(FP_TO_ARGS_DIST + n_args)
            .ok_or_else(|| ExecError::malformed("call frame below stack base"))?;
        self.stack.truncate(base);
        self.fp = old_fp.unwrap_or(0);

        if let Some(pc) = &return_pc {
            self.pc = pc.clone();
        }
        Ok(return_pc)
    }

    // =========================================================================
    // Targets
    // =========================================================================

    pub fn run_target(&self) -> Option<DocumentHandle> {
        self.run_target
    }

    pub fn focus_target(&self) -> Option<DocumentHandle> {
        self.focus_target
    }

    pub fn set_focus_target(&mut self, target: Option<DocumentHandle>) {
        self.focus_target = target;
    }

    /// Replace the value on top of the stack if the instruction just
    /// executed was a fetch-return-value marker.
    pub fn modify_returned_value(&mut self, value: Value) {
        if self.pc.instruction_before(1) == Some(Instruction::Op(OpCode::FetchRetVal)) {
            if let Some(top) = self.stack.last_mut() {
                *top = value;
            }
        }
    }
}

impl Frame<'_> {
    fn below(&self, dist: usize) -> Result<&Value, ExecError> {
        self.fp
            .checked_sub(dist)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| ExecError::malformed("no call frame"))
    }

    pub fn arg_count(&self) -> Result<usize, ExecError> {
        match self.below(FP_ARG_COUNT)? {
            Value::Int(n) if *n >= 0 => Ok(*n as usize),
            other => Err(ExecError::malformed(format!(
                "corrupt argument count slot: {:?}",
                other
            ))),
        }
    }

    pub fn saved_fp(&self) -> Result<Option<usize>, ExecError> {
        match self.below(FP_OLD_FP)? {
            Value::FrameSlot(fp) => Ok(*fp),
            other => Err(ExecError::malformed(format!(
                "corrupt frame pointer slot: {:?}",
                other
            ))),
        }
    }

    pub fn saved_pc(&self) -> Result<Option<CodeAddress>, ExecError> {
        match self.below(FP_RET_PC)? {
            Value::InstructionAddress(pc) => Ok(pc.clone()),
            other => Err(ExecError::malformed(format!(
                "corrupt return address slot: {:?}",
                other
            ))),
        }
    }

    pub fn args_cache(&self) -> Result<&Value, ExecError> {
        self.below(FP_ARG_ARRAY_CACHE)
    }

    /// Argument `i`, zero-based.
    pub fn arg(&self, i: usize) -> Result<&Value, ExecError> {
        let n_args = self.arg_count()?;
        if i >= n_args {
            return Err(ExecError::malformed(format!(
                "argument {} of {} out of frame",
                i, n_args
            )));
        }
        self.below(FP_TO_ARGS_DIST + n_args - i)
    }

    pub fn local(&self, offset: usize) -> Result<&Value, ExecError> {
        self.stack
            .get(self.fp + offset)
            .ok_or_else(|| ExecError::malformed(format!("local slot {} outside frame", offset)))
    }

    pub fn args(&self) -> Result<&[Value], ExecError> {
        let n_args = self.arg_count()?;
        let start = self
            .fp
            .checked_sub(FP_TO_ARGS_DIST + n_args)
            .ok_or_else(|| ExecError::malformed("call frame below stack base"))?;
        Ok(&self.stack[start..self.fp - FP_TO_ARGS_DIST])
    }
}
