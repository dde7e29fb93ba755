pub mod array;
pub mod convert;
pub mod symbol;
pub mod value;

pub use array::{ARRAY_DIM_SEP, Array, ArrayIter};
pub use symbol::{Symbol, SymbolId, SymbolKind, SymbolTable};
pub use value::{CodeAddress, Value};
