use crate::lang::symbol::N_ARGS_ARG_SYM;
use crate::lang::{Array, Symbol, SymbolId, SymbolKind, Value};
use crate::runtime::context::ExecutionContext;
use crate::runtime::runtime_error::ExecError;
use crate::runtime::vm::{Interpreter, OpResult, OpStatus};

/// Storage location of an assignable variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Offset from the frame pointer.
    Local(usize),
    Global(SymbolId),
}

impl Interpreter {
    pub(crate) fn symbol(&self, id: SymbolId) -> Result<&Symbol, ExecError> {
        self.symbols
            .get(id)
            .ok_or_else(|| ExecError::malformed(format!("unknown symbol {:?}", id)))
    }

    /// Where a local or global variable lives, `None` for any other kind.
    pub(crate) fn variable_slot(&self, id: SymbolId) -> Result<Option<Slot>, ExecError> {
        let sym = self.symbol(id)?;
        Ok(match sym.kind {
            SymbolKind::Local => Some(Slot::Local(local_offset(sym)?)),
            SymbolKind::Global => Some(Slot::Global(id)),
            _ => None,
        })
    }

    pub(crate) fn read_slot(&self, ctx: &ExecutionContext, slot: Slot) -> Result<Value, ExecError> {
        match slot {
            Slot::Local(offset) => ctx.frame().local(offset).cloned(),
            Slot::Global(id) => Ok(self.symbol(id)?.value.clone()),
        }
    }

    pub(crate) fn write_slot(
        &mut self,
        ctx: &mut ExecutionContext,
        slot: Slot,
        value: Value,
    ) -> Result<(), ExecError> {
        match slot {
            Slot::Local(offset) => *ctx.local_mut(offset)? = value,
            Slot::Global(id) => {
                let sym = self
                    .symbols
                    .get_mut(id)
                    .ok_or_else(|| ExecError::malformed(format!("unknown symbol {:?}", id)))?;
                sym.value = value;
            }
        }
        Ok(())
    }

    /// `PushSym sym`
    pub(crate) fn push_symbol(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let id = ctx.fetch_symbol()?;
        let (kind, stored) = {
            let sym = self.symbol(id)?;
            (sym.kind, sym.value.clone())
        };

        let value = match kind {
            SymbolKind::Local => {
                let offset = local_offset(self.symbol(id)?)?;
                ctx.frame().local(offset)?.clone()
            }
            SymbolKind::Global | SymbolKind::Const => stored,
            SymbolKind::Argument => {
                let index = stored.as_int()?;
                let n_args = ctx.frame().arg_count()?;
                if index == N_ARGS_ARG_SYM {
                    Value::Int(n_args as i32)
                } else if index < 0 || index as usize >= n_args {
                    return Err(ExecError::UndefinedArgument {
                        name: self.symbols.name(id).to_string(),
                    });
                } else {
                    ctx.frame().arg(index as usize)?.clone()
                }
            }
            SymbolKind::ComputedProperty => {
                let Value::NativeSubroutine(routine) = stored else {
                    return Err(ExecError::malformed(format!(
                        "property {} has no accessor",
                        self.symbols.name(id)
                    )));
                };
                // A property read can't suspend the macro.
                let (value, _) = self.invoke_native(ctx, id, &routine, &[])?;
                value
            }
            SymbolKind::NativeFunction | SymbolKind::MacroFunction => {
                return Err(ExecError::TypeMismatch(format!(
                    "reading non-variable: {}",
                    self.symbols.name(id)
                )));
            }
        };

        if value.is_unset() {
            return Err(ExecError::UndefinedVariable {
                name: self.symbols.name(id).to_string(),
            });
        }
        ctx.push(value)?;
        Ok(OpStatus::Ok)
    }

    /// `Assign sym`
    ///
    /// Arrays are copied one level deep, so the target never aliases the
    /// source's entries.
    pub(crate) fn assign(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let id = ctx.fetch_symbol()?;
        let Some(slot) = self.variable_slot(id)? else {
            let name = self.symbols.name(id);
            let message = match self.symbol(id)?.kind {
                SymbolKind::Argument => format!("assignment to function argument: {}", name),
                SymbolKind::ComputedProperty => format!("assignment to read-only variable: {}", name),
                _ => format!("assignment to non-variable: {}", name),
            };
            return Err(ExecError::NotAnLvalue(message));
        };

        let value = copy_for_assignment(ctx.pop()?);
        self.write_slot(ctx, slot, value)?;
        Ok(OpStatus::Ok)
    }

    /// `PushArg`: ( n -- $args[n] )
    pub(crate) fn push_arg(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let n = ctx.pop()?.to_int()?;
        let frame = ctx.frame();
        let n_args = frame.arg_count()?;

        if n < 1 || n as usize > n_args {
            return Err(ExecError::UndefinedArgument {
                name: format!("$args[{}]", n),
            });
        }
        let value = frame.arg(n as usize - 1)?.clone();
        ctx.push(value)?;
        Ok(OpStatus::Ok)
    }

    /// `PushArgArray`: the frame's arguments as an array keyed `"0"`..`"n-1"`.
    /// Built on first use and cached in the frame.
    pub(crate) fn push_arg_array(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let cached = ctx.frame().args_cache()?.clone();
        if cached.is_array() {
            ctx.push(cached)?;
            return Ok(OpStatus::Ok);
        }

        let array = Array::new();
        for (i, arg) in ctx.frame().args()?.iter().enumerate() {
            array.insert(i.to_string(), arg.clone())?;
        }

        let value = Value::Array(array);
        *ctx.args_cache_mut()? = value.clone();
        ctx.push(value)?;
        Ok(OpStatus::Ok)
    }
}

fn local_offset(sym: &Symbol) -> Result<usize, ExecError> {
    match sym.value {
        Value::Int(offset) if offset >= 0 => Ok(offset as usize),
        _ => Err(ExecError::malformed(format!(
            "local {} has no frame offset",
            sym.name
        ))),
    }
}

pub(crate) fn copy_for_assignment(value: Value) -> Value {
    match value {
        Value::Array(array) => Value::Array(array.shallow_copy()),
        other => other,
    }
}
