use crate::bytecode::{OpCode, Program};
use crate::lang::{SymbolTable, Value};
use crate::runtime::context::{DocumentHandle, ExecutionContext};
use crate::runtime::runtime_error::ExecError;
use std::rc::Rc;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Maximum number of values on one context's stack.
    pub stack_size: usize,
    /// Instructions run per slice before the macro is preempted; `None`
    /// runs every macro to completion in one slice.
    pub instruction_limit: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 1024,
            instruction_limit: Some(100),
        }
    }
}

/// Outcome of a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpStatus {
    Ok,
    /// The outermost frame returned; its value is on top of the stack.
    Done,
    /// A native subroutine asked to suspend.
    Preempt,
}

pub(crate) type OpResult = Result<OpStatus, ExecError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreemptReason {
    /// The slice's instruction budget ran out.
    InstructionLimit,
    /// A native subroutine requested it.
    Requested,
}

/// Suspended macro, resumed with [`Interpreter::continue_macro`].
#[derive(Debug)]
pub struct Continuation {
    context: Box<ExecutionContext>,
}

impl Continuation {
    /// Replace the result of the native call the macro was suspended in.
    ///
    /// Only has an effect if that call's result is being used, i.e. the
    /// suspended macro is sitting just past a fetch-return-value marker.
    pub fn modify_returned_value(&mut self, value: Value) {
        self.context.modify_returned_value(value);
    }

    pub fn run_target(&self) -> Option<DocumentHandle> {
        self.context.run_target()
    }

    pub fn focus_target(&self) -> Option<DocumentHandle> {
        self.context.focus_target()
    }
}

#[derive(Debug)]
pub enum MacroStatus {
    /// The macro returned; `Value::Unset` if it returned nothing.
    Done(Value),
    Preempted {
        continuation: Continuation,
        reason: PreemptReason,
    },
    Error(ExecError),
}

/// Runs compiled macros against a global symbol table.
pub struct Interpreter {
    pub(crate) symbols: SymbolTable,
    config: VmConfig,
    /// Number of dispatch loops currently on the host stack.
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            symbols: SymbolTable::with_macro_globals(),
            config,
            depth: 0,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Start `program` with `args` and run its first slice.
    pub fn execute_macro(
        &mut self,
        program: &Rc<Program>,
        args: &[Value],
        target: Option<DocumentHandle>,
    ) -> MacroStatus {
        let context = match ExecutionContext::new(program, args, self.config.stack_size, target) {
            Ok(context) => context,
            Err(e) => return MacroStatus::Error(e),
        };

        debug!(
            args = args.len(),
            locals = program.locals().len(),
            depth = self.depth,
            "created execution context"
        );

        self.continue_macro(Continuation {
            context: Box::new(context),
        })
    }

    /// Run the next slice of a suspended macro.
    pub fn continue_macro(&mut self, continuation: Continuation) -> MacroStatus {
        self.depth += 1;
        let status = self.run(continuation.context);
        self.depth -= 1;
        status
    }

    fn run(&mut self, mut context: Box<ExecutionContext>) -> MacroStatus {
        let mut executed = 0usize;

        loop {
            let status = match self.step(&mut context) {
                Ok(status) => status,
                Err(e) => {
                    debug!(error = %e, depth = self.depth, "macro failed");
                    return MacroStatus::Error(e);
                }
            };

            match status {
                OpStatus::Ok => {
                    executed += 1;
                    if let Some(limit) = self.config.instruction_limit {
                        if executed >= limit {
                            let reason = PreemptReason::InstructionLimit;
                            return self.preempt(context, reason, executed);
                        }
                    }
                }
                OpStatus::Preempt => {
                    return self.preempt(context, PreemptReason::Requested, executed);
                }
                OpStatus::Done => {
                    return match context.pop() {
                        Ok(value) => {
                            debug!(depth = self.depth, result = ?value, "macro done");
                            MacroStatus::Done(value)
                        }
                        Err(e) => MacroStatus::Error(e),
                    };
                }
            }
        }
    }

    fn preempt(
        &self,
        context: Box<ExecutionContext>,
        reason: PreemptReason,
        executed: usize,
    ) -> MacroStatus {
        debug!(?reason, executed, depth = self.depth, "macro preempted");
        MacroStatus::Preempted {
            continuation: Continuation { context },
            reason,
        }
    }

    /// Fetch and execute one instruction.
    pub(crate) fn step(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let pc = ctx.pc().index;
        let op = ctx.fetch_op()?;
        trace!(op = op.name(), pc, stack = ctx.stack_len(), "dispatch");

        match op {
            OpCode::ReturnNoVal => self.return_from_call(ctx, false),
            OpCode::Return => self.return_from_call(ctx, true),

            OpCode::PushSym => self.push_symbol(ctx),
            OpCode::Dup => {
                let top = ctx.peek(0)?.clone();
                ctx.push(top)?;
                Ok(OpStatus::Ok)
            }
            OpCode::Assign => self.assign(ctx),

            OpCode::Add => self.add(ctx),
            OpCode::Sub => self.subtract(ctx),
            OpCode::Mul => self.binary_int(ctx, |a, b| Ok(a.wrapping_mul(b))),
            OpCode::Div => self.binary_int(ctx, |a, b| {
                if b == 0 {
                    return Err(ExecError::DivisionByZero);
                }
                Ok(a.wrapping_div(b))
            }),
            OpCode::Mod => self.binary_int(ctx, |a, b| {
                if b == 0 {
                    return Err(ExecError::ModuloByZero);
                }
                Ok(a.wrapping_rem(b))
            }),
            OpCode::Negate => self.unary_int(ctx, i32::wrapping_neg),
            OpCode::Incr => self.unary_int(ctx, |n| n.wrapping_add(1)),
            OpCode::Decr => self.unary_int(ctx, |n| n.wrapping_sub(1)),
            OpCode::Power => self.binary_int(ctx, power),

            OpCode::Gt => self.binary_int(ctx, |a, b| Ok((a > b) as i32)),
            OpCode::Lt => self.binary_int(ctx, |a, b| Ok((a < b) as i32)),
            OpCode::Ge => self.binary_int(ctx, |a, b| Ok((a >= b) as i32)),
            OpCode::Le => self.binary_int(ctx, |a, b| Ok((a <= b) as i32)),
            OpCode::Eq => self.equality(ctx, true),
            OpCode::Ne => self.equality(ctx, false),
            OpCode::BitAnd => self.bit_and(ctx),
            OpCode::BitOr => self.bit_or(ctx),
            OpCode::And => self.binary_int(ctx, |a, b| Ok((a != 0 && b != 0) as i32)),
            OpCode::Or => self.binary_int(ctx, |a, b| Ok((a != 0 || b != 0) as i32)),
            OpCode::Not => self.unary_int(ctx, |n| (n == 0) as i32),
            OpCode::Concat => self.concat(ctx),

            OpCode::SubrCall => self.call_subroutine(ctx),
            OpCode::FetchRetVal => Err(ExecError::malformed("stray fetch-return-value marker")),

            OpCode::Branch => {
                let target = ctx.fetch_branch()?;
                ctx.jump(target);
                Ok(OpStatus::Ok)
            }
            OpCode::BranchTrue => self.branch_if(ctx, true),
            OpCode::BranchFalse => self.branch_if(ctx, false),
            OpCode::BranchNever => {
                ctx.skip();
                Ok(OpStatus::Ok)
            }

            OpCode::ArrayRef => self.array_ref(ctx),
            OpCode::ArrayAssign => self.array_assign(ctx),
            OpCode::BeginArrayIter => self.begin_array_iter(ctx),
            OpCode::ArrayIter => self.array_iter(ctx),
            OpCode::InArray => self.in_array(ctx),
            OpCode::ArrayDelete => self.array_delete(ctx),
            OpCode::PushArraySym => self.push_array_symbol(ctx),
            OpCode::ArrayRefAssignSetup => self.array_ref_assign_setup(ctx),

            OpCode::PushArg => self.push_arg(ctx),
            OpCode::PushArgCount => {
                let n_args = ctx.frame().arg_count()?;
                ctx.push(Value::Int(n_args as i32))?;
                Ok(OpStatus::Ok)
            }
            OpCode::PushArgArray => self.push_arg_array(ctx),
        }
    }

    fn branch_if(&mut self, ctx: &mut ExecutionContext, when: bool) -> OpResult {
        let target = ctx.fetch_branch()?;
        let cond = ctx.pop()?.to_int()?;
        if (cond != 0) == when {
            ctx.jump(target);
        }
        Ok(OpStatus::Ok)
    }
}

/// Integer power. Negative exponents truncate to 0 except for bases 1 and
/// -1; zero to a negative power is out of range.
pub(crate) fn power(base: i32, exp: i32) -> Result<i32, ExecError> {
    let out_of_range = ExecError::OutOfRange {
        operation: "exponentiation",
    };

    if exp < 0 && base != 1 && base != -1 {
        return if base != 0 { Ok(0) } else { Err(out_of_range) };
    }

    let result = f64::from(base).powf(f64::from(exp)).round();
    if result < f64::from(i32::MIN) || result > f64::from(i32::MAX) {
        return Err(out_of_range);
    }
    Ok(result as i32)
}
