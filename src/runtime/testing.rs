//! Helpers for hand-assembling macros in unit tests.

use crate::bytecode::{Assembler, OpCode, Program};
use crate::lang::{SymbolId, SymbolKind, SymbolTable, Value};
use crate::runtime::runtime_error::ExecError;
use crate::runtime::vm::{Interpreter, MacroStatus, VmConfig};
use std::rc::Rc;

/// Chainable front end over [`Assembler`] that interns symbols as it goes.
pub(crate) struct Builder<'a> {
    asm: Assembler,
    symbols: &'a mut SymbolTable,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(symbols: &'a mut SymbolTable) -> Self {
        let mut asm = Assembler::new();
        asm.begin_program(symbols);
        Self { asm, symbols }
    }

    pub(crate) fn op(&mut self, op: OpCode) -> &mut Self {
        self.asm.add_op(op).expect("program too large");
        self
    }

    pub(crate) fn imm(&mut self, value: i64) -> &mut Self {
        self.asm.add_immediate(value).expect("program too large");
        self
    }

    pub(crate) fn sym(&mut self, id: SymbolId) -> &mut Self {
        self.asm.add_symbol(id).expect("program too large");
        self
    }

    /// Existing non-local symbol `name`, or a new global.
    pub(crate) fn global(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.symbols.lookup(name) {
            if self.symbols.get(id).map(|s| s.kind) != Some(SymbolKind::Local) {
                return id;
            }
        }
        self.symbols.install(name, SymbolKind::Global, Value::Unset)
    }

    pub(crate) fn local(&mut self, name: &str) -> SymbolId {
        let existing = self
            .symbols
            .locals()
            .iter()
            .copied()
            .find(|id| self.symbols.name(*id) == name);
        existing.unwrap_or_else(|| self.symbols.install(name, SymbolKind::Local, Value::Unset))
    }

    pub(crate) fn iterator(&mut self) -> SymbolId {
        self.symbols.install_iterator_symbol()
    }

    pub(crate) fn push_int(&mut self, n: i32) -> &mut Self {
        let name = n.to_string();
        let id = match self.symbols.lookup(&name) {
            Some(id) if self.symbols.get(id).map(|s| s.kind) == Some(SymbolKind::Const) => id,
            _ => self.symbols.install(name, SymbolKind::Const, Value::Int(n)),
        };
        self.op(OpCode::PushSym).sym(id)
    }

    pub(crate) fn push_str(&mut self, text: &str) -> &mut Self {
        let id = self.symbols.install_string_const(text);
        self.op(OpCode::PushSym).sym(id)
    }

    pub(crate) fn push_var(&mut self, id: SymbolId) -> &mut Self {
        self.op(OpCode::PushSym).sym(id)
    }

    pub(crate) fn assign(&mut self, id: SymbolId) -> &mut Self {
        self.op(OpCode::Assign).sym(id)
    }

    pub(crate) fn push_array(&mut self, id: SymbolId, make_empty: bool) -> &mut Self {
        self.op(OpCode::PushArraySym).sym(id).imm(make_empty as i64)
    }

    pub(crate) fn call(&mut self, id: SymbolId, n_args: i64) -> &mut Self {
        self.op(OpCode::SubrCall).sym(id).imm(n_args)
    }

    pub(crate) fn call_for_value(&mut self, id: SymbolId, n_args: i64) -> &mut Self {
        self.call(id, n_args).op(OpCode::FetchRetVal)
    }

    pub(crate) fn pc(&self) -> usize {
        self.asm.pc()
    }

    /// Emit `op` with an open branch operand; returns the operand's site.
    pub(crate) fn branch_placeholder(&mut self, op: OpCode) -> usize {
        self.op(op);
        self.branch_operand()
    }

    /// Open branch operand for an instruction already emitted.
    pub(crate) fn branch_operand(&mut self) -> usize {
        self.asm.add_branch_offset(None).expect("program too large")
    }

    pub(crate) fn branch_to(&mut self, op: OpCode, target: usize) -> &mut Self {
        self.op(op);
        self.asm.add_branch_offset(Some(target)).expect("program too large");
        self
    }

    pub(crate) fn patch(&mut self, site: usize, target: usize) -> &mut Self {
        self.asm.set_branch_offset(site, target).expect("not a branch site");
        self
    }

    pub(crate) fn finish(mut self) -> Rc<Program> {
        Rc::new(self.asm.finish_program(self.symbols))
    }
}

/// Run `program` to completion, resuming through every preemption. Returns
/// the outcome and the number of slices it took.
pub(crate) fn run_to_completion(
    interp: &mut Interpreter,
    program: &Rc<Program>,
    args: &[Value],
) -> (Result<Value, ExecError>, usize) {
    let mut slices = 1;
    let mut status = interp.execute_macro(program, args, None);
    loop {
        match status {
            MacroStatus::Done(value) => return (Ok(value), slices),
            MacroStatus::Error(e) => return (Err(e), slices),
            MacroStatus::Preempted { continuation, .. } => {
                slices += 1;
                status = interp.continue_macro(continuation);
            }
        }
    }
}

/// Push `values` in order, apply `ops`, and return whatever is on top.
pub(crate) fn eval_ops(values: &[Value], ops: &[OpCode]) -> Result<Value, ExecError> {
    let mut interp = Interpreter::with_config(VmConfig {
        instruction_limit: None,
        ..VmConfig::default()
    });

    let program = {
        let mut b = Builder::new(interp.symbols_mut());
        for (i, value) in values.iter().enumerate() {
            let id = b
                .symbols
                .install(format!("operand {}", i), SymbolKind::Const, value.clone());
            b.push_var(id);
        }
        for op in ops {
            b.op(*op);
        }
        b.op(OpCode::Return);
        b.finish()
    };

    run_to_completion(&mut interp, &program, &[]).0
}
