use crate::lang::{ARRAY_DIM_SEP, Array, SymbolId, SymbolKind, Value};
use crate::runtime::context::ExecutionContext;
use crate::runtime::runtime_error::ExecError;
use crate::runtime::variables::{Slot, copy_for_assignment};
use crate::runtime::vm::{Interpreter, OpResult, OpStatus};

// Array operators. Index operands are on the stack above the array, first
// dimension deepest; multi-dimensional keys join the parts with
// ARRAY_DIM_SEP.

/// Build the key from the top `n` stack values, popping them if `pop` is set.
fn make_array_key(ctx: &mut ExecutionContext, n: usize, pop: bool) -> Result<String, ExecError> {
    let mut parts = Vec::with_capacity(n);
    for depth in (0..n).rev() {
        match ctx.peek(depth)? {
            Value::Int(i) => parts.push(i.to_string()),
            Value::String(s) => parts.push(s.clone()),
            _ => {
                return Err(ExecError::TypeMismatch(
                    "can only index array with string or int.".to_string(),
                ));
            }
        }
    }
    if pop {
        ctx.drop_top(n)?;
    }
    Ok(parts.join(ARRAY_DIM_SEP))
}

impl Interpreter {
    /// `ArrayRef nDim`: ( a k1..kn -- a[k] ), or ( a -- size ) for zero
    /// dimensions.
    pub(crate) fn array_ref(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let n_dim = ctx.fetch_count()?;

        if n_dim == 0 {
            let value = ctx.pop()?;
            let Value::Array(array) = value else {
                return Err(ExecError::NotAnArray("operator [] on non-array".to_string()));
            };
            ctx.push(Value::Int(array.size() as i32))?;
            return Ok(OpStatus::Ok);
        }

        let key = make_array_key(ctx, n_dim, true)?;
        let Value::Array(array) = ctx.pop()? else {
            return Err(ExecError::NotAnArray("operator [] on non-array".to_string()));
        };
        let element = array.get(&key).ok_or(ExecError::KeyNotFound { key })?;
        ctx.push(element)?;
        Ok(OpStatus::Ok)
    }

    /// `ArrayAssign nDim`: ( a k1..kn v -- ), storing `a[k] = v`
    pub(crate) fn array_assign(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let n_dim = ctx.fetch_count()?;
        let value = ctx.pop()?;
        if n_dim == 0 {
            return Err(ExecError::EmptyIndex);
        }

        let key = make_array_key(ctx, n_dim, true)?;
        let Value::Array(array) = ctx.pop()? else {
            return Err(ExecError::NotAnArray(
                "cannot assign array element of non-array".to_string(),
            ));
        };
        array
            .insert(key, copy_for_assignment(value))
            .map_err(|_| ExecError::ArrayAssignFailure)?;
        Ok(OpStatus::Ok)
    }

    /// `ArrayRefAssignSetup binOp nDim`
    ///
    /// Prepares `a[k] op= v` and `a[k]++`: leaves the array and index in
    /// place, pushes the current element, then the right operand again if
    /// there is one. ( a k1..kn [v] -- a k1..kn a[k] [v] )
    pub(crate) fn array_ref_assign_setup(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let bin_op = ctx.fetch_immediate()? != 0;
        let n_dim = ctx.fetch_count()?;

        let moved = if bin_op { Some(ctx.pop()?) } else { None };
        if n_dim == 0 {
            return Err(ExecError::NotAnLvalue("array[] not an lvalue".to_string()));
        }

        let key = make_array_key(ctx, n_dim, false)?;
        let Value::Array(array) = ctx.peek(n_dim)? else {
            return Err(ExecError::NotAnArray("operator [] on non-array".to_string()));
        };
        let element = array.get(&key).ok_or(ExecError::KeyNotFound { key })?;

        ctx.push(element)?;
        if let Some(moved) = moved {
            ctx.push(moved)?;
        }
        Ok(OpStatus::Ok)
    }

    /// `BeginArrayIter iter`: ( a -- ), pointing the hidden iterator local
    /// at the first key of `a`.
    pub(crate) fn begin_array_iter(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let iter_id = ctx.fetch_symbol()?;
        let slot = self.iterator_slot(iter_id)?;

        let Value::Array(array) = ctx.pop()? else {
            return Err(ExecError::NotAnArray("can't iterate non-array".to_string()));
        };
        self.write_slot(ctx, slot, Value::ArrayIter(array.iterate_first()))?;
        Ok(OpStatus::Ok)
    }

    /// `ArrayIter item iter branch`
    ///
    /// Stores the next key in `item` and falls through, or branches once the
    /// iterator is exhausted.
    pub(crate) fn array_iter(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let item_id = ctx.fetch_symbol()?;
        let iter_id = ctx.fetch_symbol()?;
        let exit = ctx.fetch_branch()?;

        let Some(item) = self.variable_slot(item_id)? else {
            return Err(ExecError::NotAnLvalue(format!(
                "can't assign to: {}",
                self.symbols.name(item_id)
            )));
        };
        let iter_slot = self.iterator_slot(iter_id)?;

        let Value::ArrayIter(mut iter) = self.read_slot(ctx, iter_slot)? else {
            return Err(ExecError::BadIterator {
                name: self.symbols.name(iter_id).to_string(),
            });
        };

        self.write_slot(ctx, item, Value::Unset)?;
        let next = iter.iterate_next()?;
        self.write_slot(ctx, iter_slot, Value::ArrayIter(iter))?;

        match next {
            Some(key) => self.write_slot(ctx, item, Value::String(key))?,
            None => ctx.jump(exit),
        }
        Ok(OpStatus::Ok)
    }

    fn iterator_slot(&self, id: SymbolId) -> Result<Slot, ExecError> {
        match self.symbol(id)?.kind {
            SymbolKind::Local => self
                .variable_slot(id)?
                .ok_or_else(|| ExecError::malformed("iterator local has no slot")),
            _ => Err(ExecError::BadIterator {
                name: self.symbols.name(id).to_string(),
            }),
        }
    }

    /// `InArray`: ( k a -- bool ). An array on the left tests that all of
    /// its keys are present.
    pub(crate) fn in_array(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let Value::Array(array) = ctx.pop()? else {
            return Err(ExecError::NotAnArray("operator in on non-array".to_string()));
        };
        let left = ctx.pop()?;

        let found = match &left {
            Value::Array(keys) => keys.keys().iter().all(|k| array.contains_key(k)),
            scalar => array.contains_key(&scalar.to_text()?),
        };
        ctx.push(Value::from_bool(found))?;
        Ok(OpStatus::Ok)
    }

    /// `ArrayDelete nDim`: ( a k1..kn -- ). Zero dimensions empty the array.
    pub(crate) fn array_delete(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let n_dim = ctx.fetch_count()?;
        let key = if n_dim > 0 {
            Some(make_array_key(ctx, n_dim, true)?)
        } else {
            None
        };

        let Value::Array(array) = ctx.pop()? else {
            return Err(ExecError::NotAnArray(
                "attempt to delete from non-array".to_string(),
            ));
        };
        match key {
            Some(key) => array.delete(&key)?,
            None => array.delete_all()?,
        }
        Ok(OpStatus::Ok)
    }

    /// `PushArraySym sym makeEmpty`
    ///
    /// Pushes the array held by a variable. With `makeEmpty` set an unset
    /// variable first gets a new empty array, which is how `a[k] = v` creates
    /// `a`.
    pub(crate) fn push_array_symbol(&mut self, ctx: &mut ExecutionContext) -> OpResult {
        let id = ctx.fetch_symbol()?;
        let make_empty = ctx.fetch_immediate()? != 0;

        let Some(slot) = self.variable_slot(id)? else {
            return Err(ExecError::NotAnLvalue(format!(
                "assigning to non-lvalue array or non-array: {}",
                self.symbols.name(id)
            )));
        };

        let mut value = self.read_slot(ctx, slot)?;
        if value.is_unset() && make_empty {
            value = Value::Array(Array::new());
            self.write_slot(ctx, slot, value.clone())?;
        }
        if value.is_unset() {
            return Err(ExecError::UndefinedVariable {
                name: self.symbols.name(id).to_string(),
            });
        }
        ctx.push(value)?;
        Ok(OpStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::OpCode;
    use crate::runtime::testing::{Builder, run_to_completion};
    use crate::runtime::vm::VmConfig;
    use pretty_assertions::assert_eq;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn unbounded() -> Interpreter {
        Interpreter::with_config(VmConfig {
            instruction_limit: None,
            ..VmConfig::default()
        })
    }

    fn run_with<F>(interp: &mut Interpreter, build: F) -> Result<Value, ExecError>
    where
        F: FnOnce(&mut Builder<'_>),
    {
        let program = {
            let mut b = Builder::new(interp.symbols_mut());
            build(&mut b);
            b.finish()
        };
        run_to_completion(interp, &program, &[]).0
    }

    /// `a[key] = value`
    fn store(b: &mut Builder<'_>, a: SymbolId, key: &str, value: i32) {
        b.push_array(a, true).push_str(key).push_int(value);
        b.op(OpCode::ArrayAssign).imm(1);
    }

    /// `for (k in a) body`
    fn for_in<F>(b: &mut Builder<'_>, k: SymbolId, a: SymbolId, body: F)
    where
        F: FnOnce(&mut Builder<'_>),
    {
        let iter = b.iterator();
        b.push_var(a).op(OpCode::BeginArrayIter).sym(iter);
        let top = b.pc();
        b.op(OpCode::ArrayIter).sym(k).sym(iter);
        let exit = b.branch_operand();
        body(b);
        b.branch_to(OpCode::Branch, top);
        let end = b.pc();
        b.patch(exit, end);
    }

    // ============================================================
    // Reference and assignment
    // ============================================================

    #[test]
    fn test_zero_dimensions_gives_size() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            store(b, a, "x", 1);
            store(b, a, "y", 2);
            store(b, a, "x", 3);
            b.push_array(a, false).op(OpCode::ArrayRef).imm(0);
            b.op(OpCode::Return);
        });
        assert_eq!(result, Ok(Value::Int(2)));
    }

    #[test]
    fn test_missing_key() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            store(b, a, "x", 1);
            b.push_array(a, false).push_str("nope").op(OpCode::ArrayRef).imm(1);
            b.op(OpCode::Return);
        });
        assert_eq!(
            result,
            Err(ExecError::KeyNotFound {
                key: "nope".to_string()
            })
        );
    }

    #[test]
    fn test_index_non_array() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            b.push_int(3).push_int(0).op(OpCode::ArrayRef).imm(1);
        });
        assert_eq!(
            result,
            Err(ExecError::NotAnArray("operator [] on non-array".to_string()))
        );
    }

    #[test]
    fn test_multi_dimensional_key() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.global("grid");
            b.push_array(a, true).push_int(1).push_str("b").push_int(9);
            b.op(OpCode::ArrayAssign).imm(2);
        });
        assert_eq!(result, Ok(Value::Unset));

        let grid = interp.symbols().lookup("grid").unwrap();
        let value = interp.symbols().get(grid).unwrap().value.clone();
        let key = format!("1{}b", ARRAY_DIM_SEP);
        assert_eq!(value.as_array().unwrap().get(&key), Some(Value::Int(9)));
    }

    #[test]
    fn test_bad_index_type() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            let other = b.local("other");
            store(b, a, "x", 1);
            store(b, other, "y", 1);
            b.push_array(a, false).push_var(other).op(OpCode::ArrayRef).imm(1);
        });
        assert_eq!(
            result,
            Err(ExecError::TypeMismatch(
                "can only index array with string or int.".to_string()
            ))
        );
    }

    #[test]
    fn test_empty_index_assignment() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            b.push_array(a, true).push_int(1).op(OpCode::ArrayAssign).imm(0);
        });
        assert_eq!(result, Err(ExecError::EmptyIndex));
    }

    #[test]
    fn test_stored_array_is_a_copy() {
        // inner["k"] = 1; outer["i"] = inner; inner["k"] = 2;
        // return outer["i"]["k"]
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let inner = b.local("inner");
            let outer = b.local("outer");
            store(b, inner, "k", 1);
            b.push_array(outer, true).push_str("i").push_var(inner);
            b.op(OpCode::ArrayAssign).imm(1);
            store(b, inner, "k", 2);
            b.push_array(outer, false).push_str("i").op(OpCode::ArrayRef).imm(1);
            b.push_str("k").op(OpCode::ArrayRef).imm(1);
            b.op(OpCode::Return);
        });
        assert_eq!(result, Ok(Value::Int(1)));
    }

    #[test]
    fn test_compound_assignment_setup() {
        // a["n"] = 5; a["n"] += 3; a["n"]++; return a["n"]
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            store(b, a, "n", 5);

            b.push_array(a, true).push_str("n").push_int(3);
            b.op(OpCode::ArrayRefAssignSetup).imm(1).imm(1);
            b.op(OpCode::Add).op(OpCode::ArrayAssign).imm(1);

            b.push_array(a, true).push_str("n");
            b.op(OpCode::ArrayRefAssignSetup).imm(0).imm(1);
            b.op(OpCode::Incr).op(OpCode::ArrayAssign).imm(1);

            b.push_array(a, false).push_str("n").op(OpCode::ArrayRef).imm(1);
            b.op(OpCode::Return);
        });
        assert_eq!(result, Ok(Value::Int(9)));
    }

    #[test]
    fn test_setup_without_index() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            b.push_array(a, true).op(OpCode::ArrayRefAssignSetup).imm(0).imm(0);
        });
        assert_eq!(
            result,
            Err(ExecError::NotAnLvalue("array[] not an lvalue".to_string()))
        );
    }

    #[test]
    fn test_unset_array_without_make_empty() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            b.push_array(a, false).op(OpCode::ArrayRef).imm(0);
        });
        assert_eq!(
            result,
            Err(ExecError::UndefinedVariable {
                name: "a".to_string()
            })
        );
    }

    // ============================================================
    // Iteration
    // ============================================================

    #[test]
    fn test_iteration_visits_keys_in_order() {
        // for (k in a) s = s k; return s
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            let s = b.local("s");
            let k = b.local("k");
            store(b, a, "b", 0);
            store(b, a, "c", 0);
            store(b, a, "a", 0);
            b.push_str("").assign(s);
            for_in(b, k, a, |b| {
                b.push_var(s).push_var(k).op(OpCode::Concat).assign(s);
            });
            b.push_var(s).op(OpCode::Return);
        });
        assert_eq!(result, Ok(Value::from("abc")));
    }

    #[test]
    fn test_deleting_visited_keys_while_iterating() {
        // for (k in a) delete a[k]; return a[]
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            let k = b.local("k");
            store(b, a, "x", 1);
            store(b, a, "y", 2);
            store(b, a, "z", 3);
            for_in(b, k, a, |b| {
                b.push_array(a, false).push_var(k).op(OpCode::ArrayDelete).imm(1);
            });
            b.push_array(a, false).op(OpCode::ArrayRef).imm(0);
            b.op(OpCode::Return);
        });
        assert_eq!(result, Ok(Value::Int(0)));
    }

    #[test]
    fn test_deleting_next_key_invalidates_iterator() {
        // for (k in a) delete a["y"]
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            let k = b.local("k");
            store(b, a, "x", 1);
            store(b, a, "y", 2);
            for_in(b, k, a, |b| {
                b.push_array(a, false).push_str("y").op(OpCode::ArrayDelete).imm(1);
            });
        });
        assert_eq!(
            result,
            Err(ExecError::IteratorInvalidated {
                key: "y".to_string()
            })
        );
    }

    #[test]
    fn test_iterate_non_array() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let x = b.local("x");
            let k = b.local("k");
            b.push_int(1).assign(x);
            for_in(b, k, x, |_| {});
        });
        assert_eq!(
            result,
            Err(ExecError::NotAnArray("can't iterate non-array".to_string()))
        );
    }

    #[test]
    fn test_iterator_must_be_local() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            let bogus = b.global("bogus");
            store(b, a, "x", 1);
            b.push_var(a).op(OpCode::BeginArrayIter).sym(bogus);
        });
        assert_eq!(
            result,
            Err(ExecError::BadIterator {
                name: "bogus".to_string()
            })
        );
    }

    // ============================================================
    // in and delete
    // ============================================================

    #[test]
    fn test_in_operator() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            let keys = b.local("keys");
            store(b, a, "1", 0);
            store(b, a, "2", 0);
            store(b, keys, "2", 0);

            b.push_int(1).push_var(a).op(OpCode::InArray);
            b.push_str("3").push_var(a).op(OpCode::InArray);
            b.push_var(keys).push_var(a).op(OpCode::InArray);
            // 1, 0, 1 -> "101"
            b.op(OpCode::Concat).op(OpCode::Concat).op(OpCode::Return);
        });
        assert_eq!(result, Ok(Value::from("101")));
    }

    #[test]
    fn test_in_non_array() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            b.push_int(1).push_int(2).op(OpCode::InArray);
        });
        assert_eq!(
            result,
            Err(ExecError::NotAnArray("operator in on non-array".to_string()))
        );
    }

    #[test]
    fn test_delete_all() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            store(b, a, "x", 1);
            store(b, a, "y", 1);
            b.push_array(a, false).op(OpCode::ArrayDelete).imm(0);
            b.push_array(a, false).op(OpCode::ArrayRef).imm(0);
            b.op(OpCode::Return);
        });
        assert_eq!(result, Ok(Value::Int(0)));
    }

    #[test]
    fn test_delete_missing_key_is_silent() {
        let mut interp = unbounded();
        let result = run_with(&mut interp, |b| {
            let a = b.local("a");
            store(b, a, "x", 1);
            b.push_array(a, false).push_str("nope").op(OpCode::ArrayDelete).imm(1);
            b.push_array(a, false).op(OpCode::ArrayRef).imm(0);
            b.op(OpCode::Return);
        });
        assert_eq!(result, Ok(Value::Int(1)));
    }
}
