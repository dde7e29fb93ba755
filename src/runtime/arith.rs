use crate::lang::convert::string_to_int;
use crate::lang::{Array, Value};
use crate::runtime::context::ExecutionContext;
use crate::runtime::runtime_error::ExecError;
use crate::runtime::vm::{Interpreter, OpResult, OpStatus};

// Operators. Scalars are coerced through `to_int`/`to_text`; Add, Sub,
// BitAnd and BitOr switch to set operations when both operands are arrays.

impl Interpreter {
    /// ( a b -- f(a, b) )
    pub(crate) fn binary_int<F>(&mut self, ctx: &mut ExecutionContext, f: F) -> OpResult
    where
        F: FnOnce(i32, i32) -> Result<i32, ExecError>,
    {
        let right = ctx.pop()?.to_int()?;
        let left = ctx.pop()?.to_int()?;
        ctx.push(Value::Int(f(left, right)?))?;
        Ok(OpStatus::Ok)
    }

    /// ( a -- f(a) )
    pub(crate) fn unary_int<F>(&mut self, ctx: &mut ExecutionContext, f: F) -> OpResult
    where
        F: FnOnce(i32) -> i32,
    {
        let n = ctx.pop()?.to_int()?;
        ctx.push(Value::Int(f(n)))?;
        Ok(OpStatus::Ok)
    }

    /// Apply `set_op` if the right operand is an array, `int_op` otherwise.
    fn array_or_int<S, F>(
        &mut self,
        ctx: &mut ExecutionContext,
        set_op: S,
        int_op: F,
    ) -> OpResult
    where
        S: FnOnce(&Array, &Array) -> Result<Array, ExecError>,
        F: FnOnce(i32, i32) -> Result<i32, ExecError>,
    {
        if !ctx.peek(0)?.is_array() {
            return self.binary_int(ctx, int_op);
        }
        if !ctx.peek(1)?.is_array() {
            return Err(ExecError::TypeMismatch(
                "can't mix math with arrays and non-arrays".to_string(),
            ));
        }

        let right = ctx.pop()?;
        let left = ctx.pop()?;
        let result = set_op(left.as_array()?, right.as_array()?)?;
        ctx.push(Value::Array(result))?;
        Ok(OpStatus::Ok)
    }

    pub(crate) fn add(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        self.array_or_int(ctx, Array::union, |a, b| Ok(a.wrapping_add(b)))
    }

    pub(crate) fn subtract(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        self.array_or_int(ctx, Array::difference, |a, b| Ok(a.wrapping_sub(b)))
    }

    pub(crate) fn bit_and(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        self.array_or_int(ctx, Array::intersection, |a, b| Ok(a & b))
    }

    pub(crate) fn bit_or(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        self.array_or_int(ctx, Array::union, |a, b| Ok(a | b))
    }

    /// Eq when `equal` is set, Ne otherwise.
    pub(crate) fn equality(&mut self, ctx: &mut ExecutionContext, equal: bool) -> OpResult {
        let right = ctx.pop()?;
        let left = ctx.pop()?;
        let same = values_equal(&left, &right)?;
        ctx.push(Value::from_bool(same == equal))?;
        Ok(OpStatus::Ok)
    }

    /// ( a b -- "ab" )
    pub(crate) fn concat(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let right = ctx.pop()?.to_text()?;
        let mut left = ctx.pop()?.to_text()?;
        left.push_str(&right);
        ctx.push(Value::String(left))?;
        Ok(OpStatus::Ok)
    }
}

/// A string compared with an integer is converted first; one that does not
/// convert is unequal to every integer.
fn values_equal(left: &Value, right: &Value) -> Result<bool, ExecError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::String(s), Value::Int(n)) | (Value::Int(n), Value::String(s)) => {
            Ok(string_to_int(s) == Some(*n))
        }
        _ => Err(ExecError::TypeMismatch(
            "incompatible types to compare".to_string(),
        )),
    }
}
