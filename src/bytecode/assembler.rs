use crate::bytecode::assemble_error::AssembleError;
use crate::bytecode::disasm::disassemble;
use crate::bytecode::{Instruction, OpCode, Program};
use crate::lang::{SymbolId, SymbolTable, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Maximum number of code slots in one program.
    pub program_size: usize,
    /// Maximum number of pending loop entries (markers plus patch sites).
    pub loop_stack_size: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        AssemblerConfig {
            program_size: 4096,
            loop_stack_size: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEntry {
    /// Start of a loop's entries.
    Marker,
    /// Branch site that must jump past the loop.
    Break(usize),
    /// Branch site that must jump to the loop's continue point.
    Continue(usize),
}

/// Staging buffer that a compiler fills one slot at a time.
///
/// Branch operands are relative: a branch stored at slot `s` with offset `o`
/// transfers control to slot `s + o`.
pub struct Assembler {
    config: AssemblerConfig,
    code: Vec<Instruction>,
    /// Branch sites emitted with no target yet. Any still unpatched when the
    /// program is finished branch to the end of the program.
    pending: Vec<usize>,
    loop_stack: Vec<LoopEntry>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self::with_config(AssemblerConfig::default())
    }

    pub fn with_config(config: AssemblerConfig) -> Self {
        Self {
            config,
            code: Vec::new(),
            pending: Vec::new(),
            loop_stack: Vec::new(),
        }
    }

    /// Start a new program, discarding anything staged and the symbol
    /// table's local scope.
    pub fn begin_program(&mut self, symbols: &mut SymbolTable) {
        symbols.clear_locals();
        self.code.clear();
        self.pending.clear();
        self.loop_stack.clear();
    }

    /// Index of the next slot to be written.
    pub fn pc(&self) -> usize {
        self.code.len()
    }

    fn push(&mut self, inst: Instruction) -> Result<usize, AssembleError> {
        if self.code.len() >= self.config.program_size {
            return Err(AssembleError::ProgramTooLarge);
        }
        self.code.push(inst);
        Ok(self.code.len() - 1)
    }

    pub fn add_op(&mut self, op: OpCode) -> Result<usize, AssembleError> {
        self.push(Instruction::Op(op))
    }

    pub fn add_symbol(&mut self, sym: SymbolId) -> Result<usize, AssembleError> {
        self.push(Instruction::Symbol(sym))
    }

    pub fn add_immediate(&mut self, value: i64) -> Result<usize, AssembleError> {
        self.push(Instruction::Immediate(value))
    }

    /// Emit a branch operand. `None` leaves the target open; patch it later
    /// with [`Assembler::set_branch_offset`] or a loop fill, or it resolves
    /// to the end of the program. Returns the operand's slot index.
    pub fn add_branch_offset(&mut self, target: Option<usize>) -> Result<usize, AssembleError> {
        let site = self.pc();
        let offset = match target {
            Some(target) => relative(site, target),
            None => 0,
        };
        self.push(Instruction::Immediate(offset))?;

        if target.is_none() {
            self.pending.push(site);
        }
        Ok(site)
    }

    /// Point the branch operand at `site` to `target`.
    pub fn set_branch_offset(&mut self, site: usize, target: usize) -> Result<(), AssembleError> {
        match self.code.get_mut(site) {
            Some(slot @ Instruction::Immediate(_)) => {
                *slot = Instruction::Immediate(relative(site, target));
                self.pending.retain(|p| *p != site);
                Ok(())
            }
            _ => Err(AssembleError::BranchSiteInvalid { site }),
        }
    }

    /// Exchange the adjacent blocks `start..boundary` and `boundary..end`.
    ///
    /// Relative offsets inside the moved code are not adjusted; branches that
    /// cross the boundary must be patched afterwards or computed with the
    /// move in mind.
    pub fn swap_code(&mut self, start: usize, boundary: usize, end: usize) {
        if !(start <= boundary && boundary <= end && end <= self.code.len()) {
            warn!(start, boundary, end, "swap_code: invalid block bounds");
            return;
        }

        self.code[start..end].rotate_left(boundary - start);

        let relocate = |site: usize| {
            if (start..boundary).contains(&site) {
                site + (end - boundary)
            } else if (boundary..end).contains(&site) {
                site - (boundary - start)
            } else {
                site
            }
        };

        for site in &mut self.pending {
            *site = relocate(*site);
        }
        for entry in &mut self.loop_stack {
            match entry {
                LoopEntry::Break(site) | LoopEntry::Continue(site) => *site = relocate(*site),
                LoopEntry::Marker => {}
            }
        }
    }

    // =========================================================================
    // Loop patch list
    // =========================================================================

    fn push_loop_entry(&mut self, entry: LoopEntry) -> Result<(), AssembleError> {
        if self.loop_stack.len() >= self.config.loop_stack_size {
            warn!("loop stack overflow in macro assembler");
            return Err(AssembleError::LoopStackOverflow);
        }
        self.loop_stack.push(entry);
        Ok(())
    }

    fn in_loop(&self) -> bool {
        !self.loop_stack.is_empty()
    }

    pub fn start_loop(&mut self) -> Result<(), AssembleError> {
        self.push_loop_entry(LoopEntry::Marker)
    }

    /// Register the branch operand at `site` as a `break` of the innermost
    /// loop.
    pub fn add_break_addr(&mut self, site: usize) -> Result<(), AssembleError> {
        if !self.in_loop() {
            return Err(AssembleError::BreakOutsideLoop);
        }
        self.check_branch_site(site)?;
        self.push_loop_entry(LoopEntry::Break(site))
    }

    /// Register the branch operand at `site` as a `continue` of the innermost
    /// loop.
    pub fn add_continue_addr(&mut self, site: usize) -> Result<(), AssembleError> {
        if !self.in_loop() {
            return Err(AssembleError::ContinueOutsideLoop);
        }
        self.check_branch_site(site)?;
        self.push_loop_entry(LoopEntry::Continue(site))
    }

    /// Close the innermost loop, patching its break and continue sites.
    pub fn fill_loop_addrs(
        &mut self,
        break_target: usize,
        continue_target: usize,
    ) -> Result<(), AssembleError> {
        loop {
            let entry = match self.loop_stack.pop() {
                Some(entry) => entry,
                None => {
                    warn!("loop stack underflow in macro assembler");
                    return Err(AssembleError::LoopStackUnderflow);
                }
            };

            match entry {
                LoopEntry::Marker => return Ok(()),
                LoopEntry::Break(site) => self.set_branch_offset(site, break_target)?,
                LoopEntry::Continue(site) => self.set_branch_offset(site, continue_target)?,
            }
        }
    }

    fn check_branch_site(&self, site: usize) -> Result<(), AssembleError> {
        match self.code.get(site) {
            Some(Instruction::Immediate(_)) => Ok(()),
            _ => Err(AssembleError::BranchSiteInvalid { site }),
        }
    }

    // =========================================================================
    // Finish
    // =========================================================================

    /// Snapshot the staged code into a [`Program`].
    ///
    /// The local scope becomes the program's frame layout: each local symbol
    /// gets its zero-based offset as its value, in declaration order.
    pub fn finish_program(&mut self, symbols: &mut SymbolTable) -> Program {
        let end = self.code.len();
        for site in std::mem::take(&mut self.pending) {
            self.code[site] = Instruction::Immediate(relative(site, end));
        }

        if !self.loop_stack.is_empty() {
            warn!(
                entries = self.loop_stack.len(),
                "finishing program with open loops"
            );
            self.loop_stack.clear();
        }

        let locals = symbols.take_locals();
        for (offset, id) in locals.iter().enumerate() {
            if let Some(sym) = symbols.get_mut(*id) {
                sym.value = Value::Int(offset as i32);
            }
        }

        let program = Program::new(std::mem::take(&mut self.code), locals);

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                slots = program.code().len(),
                locals = program.locals().len(),
                "finished program\n{}",
                disassemble(&program, symbols)
            );
        }

        program
    }
}

fn relative(site: usize, target: usize) -> i64 {
    target as i64 - site as i64
}
