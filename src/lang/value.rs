use std::fmt;
use std::rc::Rc;

use super::array::{Array, ArrayIter};
use super::convert::string_to_int;
use crate::bytecode::{Instruction, Program};
use crate::runtime::native::NativeSubroutine;
use crate::runtime::runtime_error::ExecError;

/// A position inside a compiled program's code.
#[derive(Clone)]
pub struct CodeAddress {
    pub program: Rc<Program>,
    pub index: usize,
}

impl CodeAddress {
    pub fn new(program: Rc<Program>, index: usize) -> Self {
        Self { program, index }
    }

    /// The instruction slot at this address, `None` past the end of the code.
    pub fn instruction(&self) -> Option<Instruction> {
        self.program.code().get(self.index).copied()
    }

    /// The slot `back` positions before this address.
    pub fn instruction_before(&self, back: usize) -> Option<Instruction> {
        let index = self.index.checked_sub(back)?;
        self.program.code().get(index).copied()
    }
}

impl PartialEq for CodeAddress {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.program, &other.program) && self.index == other.index
    }
}

impl fmt::Debug for CodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeAddress({:p}+{})", Rc::as_ptr(&self.program), self.index)
    }
}

/// Runtime value of the macro language.
///
/// Only `Unset`, `Int`, `String` and `Array` are visible to macro code; the
/// remaining variants are bookkeeping the interpreter keeps on its stack
/// (call frames, iterators) or in symbols (subroutines).
#[derive(Clone, Default)]
pub enum Value {
    /// No value. Reading an unset variable is an error.
    #[default]
    Unset,

    /// 32-bit signed integer, the only numeric type.
    Int(i32),

    /// Byte string.
    String(String),

    /// Shared associative array.
    Array(Array),

    /// Live cursor into an array, used by `for (k in a)` loops.
    ArrayIter(ArrayIter),

    /// Built-in routine implemented by the host.
    NativeSubroutine(NativeSubroutine),

    /// User-defined macro function.
    Program(Rc<Program>),

    /// Saved return address; `None` marks the outermost frame.
    InstructionAddress(Option<CodeAddress>),

    /// Saved frame pointer; `None` marks the outermost frame.
    FrameSlot(Option<usize>),
}

impl Value {
    pub fn from_bool(b: bool) -> Self {
        Value::Int(if b { 1 } else { 0 })
    }

    pub fn string(text: impl Into<String>) -> Self {
        Value::String(text.into())
    }

    pub fn new_array() -> Self {
        Value::Array(Array::new())
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unset => "unset",
            Value::Int(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::ArrayIter(_) => "array iterator",
            Value::NativeSubroutine(_) => "native subroutine",
            Value::Program(_) => "macro function",
            Value::InstructionAddress(_) => "return address",
            Value::FrameSlot(_) => "frame pointer",
        }
    }

    // Narrowing accessors: no coercion, wrong variant is a type mismatch.

    pub fn as_int(&self) -> Result<i32, ExecError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(ExecError::expected("integer", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, ExecError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(ExecError::expected("string", other)),
        }
    }

    pub fn as_array(&self) -> Result<&Array, ExecError> {
        match self {
            Value::Array(a) => Ok(a),
            other => Err(ExecError::expected("array", other)),
        }
    }

    // Coercions applied by operators.

    /// Numeric view of a scalar; strings go through [`string_to_int`].
    pub fn to_int(&self) -> Result<i32, ExecError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::String(s) => string_to_int(s).ok_or_else(|| {
                ExecError::TypeMismatch("string could not be converted to number".to_string())
            }),
            Value::Array(_) => Err(ExecError::TypeMismatch(
                "can't convert array to integer".to_string(),
            )),
            other => Err(ExecError::TypeMismatch(format!(
                "can't convert {} to integer",
                other.type_name()
            ))),
        }
    }

    /// Text view of a scalar; integers render in decimal.
    pub fn to_text(&self) -> Result<String, ExecError> {
        match self {
            Value::Int(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            Value::Array(_) => Err(ExecError::TypeMismatch(
                "can't convert array to string".to_string(),
            )),
            other => Err(ExecError::TypeMismatch(format!(
                "can't convert {} to string",
                other.type_name()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unset, Value::Unset) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::ArrayIter(a), Value::ArrayIter(b)) => a == b,
            (Value::NativeSubroutine(a), Value::NativeSubroutine(b)) => a.ptr_eq(b),
            (Value::Program(a), Value::Program(b)) => Rc::ptr_eq(a, b),
            (Value::InstructionAddress(a), Value::InstructionAddress(b)) => a == b,
            (Value::FrameSlot(a), Value::FrameSlot(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unset => write!(f, "Unset"),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(a) => write!(f, "Array({:?})", a),
            Value::ArrayIter(it) => write!(f, "ArrayIter({:?})", it.current_key()),
            Value::NativeSubroutine(_) => write!(f, "NativeSubroutine"),
            Value::Program(p) => write!(f, "Program({} slots)", p.code().len()),
            Value::InstructionAddress(addr) => write!(f, "InstructionAddress({:?})", addr),
            Value::FrameSlot(fp) => write!(f, "FrameSlot({:?})", fp),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unset => write!(f, "<no value>"),
            Value::Int(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(_) => write!(f, "<array>"),
            other => write!(f, "<{}>", other.type_name()),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unset() {
        assert!(Value::default().is_unset());
    }

    #[test]
    fn test_predicates() {
        assert!(Value::Int(1).is_int());
        assert!(Value::from("x").is_string());
        assert!(Value::new_array().is_array());
        assert!(!Value::Int(1).is_string());
    }

    #[test]
    fn test_as_int_wrong_variant() {
        let err = Value::from("12").as_int().unwrap_err();
        assert!(matches!(err, ExecError::TypeMismatch(_)));
        assert!(err.to_string().contains("expected integer"));
    }

    #[test]
    fn test_as_array_wrong_variant() {
        assert!(Value::Int(3).as_array().is_err());
    }

    #[test]
    fn test_to_int_coerces_strings() {
        assert_eq!(Value::from(" 12 ").to_int(), Ok(12));
    }

    #[test]
    fn test_to_int_rejects_bad_string() {
        let err = Value::from("4a").to_int().unwrap_err();
        assert_eq!(err.to_string(), "string could not be converted to number");
    }

    #[test]
    fn test_to_int_rejects_array() {
        let err = Value::new_array().to_int().unwrap_err();
        assert_eq!(err.to_string(), "can't convert array to integer");
    }

    #[test]
    fn test_conversion_errors_name_the_actual_type() {
        assert_eq!(
            Value::Unset.to_int().unwrap_err().to_string(),
            "can't convert unset to integer"
        );
        assert_eq!(
            Value::FrameSlot(Some(3)).to_text().unwrap_err().to_string(),
            "can't convert frame pointer to string"
        );
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Int(-5).to_text(), Ok("-5".to_string()));
        assert_eq!(
            Value::new_array().to_text().unwrap_err().to_string(),
            "can't convert array to string"
        );
    }

    #[test]
    fn test_array_equality_is_structural() {
        let a = Array::new();
        let b = Array::new();
        a.insert("k", Value::Int(1)).unwrap();
        b.insert("k", Value::Int(1)).unwrap();
        assert_eq!(Value::Array(a), Value::Array(b));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert_eq!(Value::new_array().to_string(), "<array>");
        assert_eq!(Value::Unset.to_string(), "<no value>");
    }
}
