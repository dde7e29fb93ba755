use crate::bytecode::{Instruction, OpCode};
use crate::lang::{SymbolId, SymbolKind, Value};
use crate::runtime::context::ExecutionContext;
use crate::runtime::native::{NativeCall, NativeSubroutine};
use crate::runtime::runtime_error::ExecError;
use crate::runtime::vm::{Interpreter, OpResult, OpStatus};

impl Interpreter {
    /// `SubrCall sym nArgs`
    ///
    /// A native runs immediately on the popped arguments. A macro function
    /// gets a new frame over the arguments and starts at its first
    /// instruction. Either way a following `FetchRetVal` marker asks for the
    /// result to be pushed.
    pub(crate) fn call_subroutine(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let id = ctx.fetch_symbol()?;
        let n_args = ctx.fetch_count()?;

        let (kind, value) = {
            let sym = self.symbol(id)?;
            (sym.kind, sym.value.clone())
        };

        match (kind, value) {
            (SymbolKind::NativeFunction, Value::NativeSubroutine(routine)) => {
                let args = ctx.split_args(n_args)?;
                let (result, preempt) = self.invoke_native(ctx, id, &routine, &args)?;

                if ctx.next_is(OpCode::FetchRetVal) {
                    if result.is_unset() {
                        return Err(ExecError::NoReturnValue {
                            name: self.symbols.name(id).to_string(),
                        });
                    }
                    ctx.push(result)?;
                    ctx.skip();
                }

                Ok(if preempt {
                    OpStatus::Preempt
                } else {
                    OpStatus::Ok
                })
            }
            (SymbolKind::MacroFunction, Value::Program(program)) => {
                let return_pc = Some(ctx.pc().clone());
                let old_fp = Some(ctx.fp());
                ctx.push_frame(return_pc, old_fp, n_args, &program)?;
                Ok(OpStatus::Ok)
            }
            _ => Err(ExecError::NotASubroutine {
                name: self.symbols.name(id).to_string(),
            }),
        }
    }

    /// Run a native with a handle on this interpreter and context. Returns
    /// its result and whether it asked for preemption.
    pub(crate) fn invoke_native(
        &mut self,
        ctx: &mut ExecutionContext,
        id: SymbolId,
        routine: &NativeSubroutine,
        args: &[Value],
    ) -> Result<(Value, bool), ExecError> {
        let mut call = NativeCall::new(self, ctx);
        let result = routine.call(&mut call, args);
        let preempt = call.preemption_requested();

        match result {
            Ok(value) => Ok((value, preempt)),
            Err(source) => Err(ExecError::NativeSubroutine {
                name: self.symbols.name(id).to_string(),
                source,
            }),
        }
    }

    /// `Return` / `ReturnNoVal`
    ///
    /// Pops the frame. Returning from the outermost frame finishes the macro
    /// with the value (or unset) on the stack. Otherwise the value is pushed
    /// only if the caller asked for it.
    pub(crate) fn return_from_call(
        &mut self,
        ctx: &mut ExecutionContext,
        with_value: bool,
    ) -> OpResult {
        let value = if with_value { Some(ctx.pop()?) } else { None };

        let Some(_) = ctx.pop_frame()? else {
            ctx.push(value.unwrap_or_default())?;
            return Ok(OpStatus::Done);
        };

        if ctx.next_is(OpCode::FetchRetVal) {
            match value {
                Some(value) => {
                    ctx.push(value)?;
                    ctx.skip();
                }
                None => {
                    // The call site reads SubrCall, sym, nArgs, FetchRetVal.
                    let name = match ctx.pc().instruction_before(2) {
                        Some(Instruction::Symbol(callee)) => self.symbols.name(callee),
                        _ => "<unknown>",
                    };
                    return Err(ExecError::ReturnValueMissing {
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(OpStatus::Ok)
    }
}
