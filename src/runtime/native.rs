use crate::bytecode::Program;
use crate::lang::{Array, SymbolTable, Value};
use crate::runtime::context::{DocumentHandle, ExecutionContext};
use crate::runtime::runtime_error::ExecError;
use crate::runtime::vm::{Interpreter, MacroStatus};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Failure reported by a native subroutine. The interpreter prefixes the
/// message with the subroutine's name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("too many arguments")]
    TooManyArguments,

    #[error("wrong number of arguments")]
    WrongArgumentCount,

    #[error("argument is not an integer")]
    NotAnInteger,

    #[error("argument is not a string")]
    NotAString,

    #[error("argument is not an array")]
    NotAnArray,

    #[error("{0}")]
    Message(String),
}

type NativeFn = dyn Fn(&mut NativeCall<'_>, &[Value]) -> Result<Value, NativeError>;

/// Host routine callable from macro code.
///
/// Arguments are borrowed for the duration of the call. Returning
/// [`Value::Unset`] means "no value"; using that result in an expression is
/// an error at the call site.
#[derive(Clone)]
pub struct NativeSubroutine(Rc<NativeFn>);

impl NativeSubroutine {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut NativeCall<'_>, &[Value]) -> Result<Value, NativeError> + 'static,
    {
        NativeSubroutine(Rc::new(f))
    }

    pub fn call(&self, call: &mut NativeCall<'_>, args: &[Value]) -> Result<Value, NativeError> {
        (self.0)(call, args)
    }

    pub fn ptr_eq(&self, other: &NativeSubroutine) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NativeSubroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeSubroutine({:p})", Rc::as_ptr(&self.0))
    }
}

/// What a native subroutine can reach while it runs: the calling context's
/// document targets, the interpreter, and the preemption flag.
pub struct NativeCall<'a> {
    interpreter: &'a mut Interpreter,
    context: &'a mut ExecutionContext,
    preempt: bool,
}

impl<'a> NativeCall<'a> {
    pub(crate) fn new(interpreter: &'a mut Interpreter, context: &'a mut ExecutionContext) -> Self {
        Self {
            interpreter,
            context,
            preempt: false,
        }
    }

    pub fn run_target(&self) -> Option<DocumentHandle> {
        self.context.run_target()
    }

    pub fn focus_target(&self) -> Option<DocumentHandle> {
        self.context.focus_target()
    }

    pub fn set_focus_target(&mut self, target: Option<DocumentHandle>) {
        self.context.set_focus_target(target);
    }

    /// Suspend the calling macro once this call returns.
    pub fn request_preemption(&mut self) {
        self.preempt = true;
    }

    pub fn preemption_requested(&self) -> bool {
        self.preempt
    }

    /// Enter `program` as if the calling macro had called it with no
    /// arguments. It starts running after this native returns, and control
    /// comes back to the caller when it returns.
    pub fn run_as_subroutine(&mut self, program: &Rc<Program>) -> Result<(), ExecError> {
        let return_pc = Some(self.context.pc().clone());
        let old_fp = Some(self.context.fp());
        self.context.push_frame(return_pc, old_fp, 0, program)
    }

    /// Run another macro to completion or preemption in a context of its
    /// own, targeting this call's focus document.
    pub fn execute_macro(&mut self, program: &Rc<Program>, args: &[Value]) -> MacroStatus {
        let target = self.context.focus_target();
        self.interpreter.execute_macro(program, args, target)
    }

    pub fn symbols(&self) -> &SymbolTable {
        self.interpreter.symbols()
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        self.interpreter.symbols_mut()
    }
}

// Argument helpers for native implementations.

pub fn expect_args(args: &[Value], n: usize) -> Result<(), NativeError> {
    if args.len() > n {
        return Err(NativeError::TooManyArguments);
    }
    if args.len() != n {
        return Err(NativeError::WrongArgumentCount);
    }
    Ok(())
}

pub fn int_arg(value: &Value) -> Result<i32, NativeError> {
    value.to_int().map_err(|_| NativeError::NotAnInteger)
}

pub fn string_arg(value: &Value) -> Result<String, NativeError> {
    value.to_text().map_err(|_| NativeError::NotAString)
}

pub fn array_arg(value: &Value) -> Result<Array, NativeError> {
    value.as_array().cloned().map_err(|_| NativeError::NotAnArray)
}
