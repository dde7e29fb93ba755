use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::value::Value;
use crate::bytecode::Program;
use crate::runtime::native::NativeSubroutine;

/// Argument index stored in the `$n_args` symbol.
pub const N_ARGS_ARG_SYM: i32 = -1;

/// Number of positional argument symbols (`$1`..`$9`).
const N_POSITIONAL_ARGS: i32 = 9;

/// Index of a symbol in its [`SymbolTable`].
///
/// Symbols are never removed from the table, so an id stays valid (and keeps
/// naming the same symbol) for the lifetime of the table, whichever scope
/// the symbol currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Literal; the value never changes.
    Const,
    Global,
    /// Frame-relative variable; the value holds its frame offset once the
    /// owning program is finished.
    Local,
    /// `$1`..`$9` and `$n_args`; the value holds the argument index.
    Argument,
    /// Read-only variable computed by a native function on each access.
    ComputedProperty,
    NativeFunction,
    MacroFunction,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub value: Value,
}

/// Interned named bindings, in two scopes.
///
/// The local scope only exists while a program is being assembled; the
/// assembler takes it over when the program is finished. The global scope
/// persists for the lifetime of the interpreter.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    globals: Vec<SymbolId>,
    locals: Vec<SymbolId>,
    string_const_count: usize,
    iterator_count: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with the argument symbols every macro can reference.
    pub fn with_macro_globals() -> Self {
        let mut table = Self::new();
        table.init_macro_globals();
        table
    }

    /// Install `$1`..`$9` and `$n_args`.
    pub fn init_macro_globals(&mut self) {
        for i in 0..N_POSITIONAL_ARGS {
            let name = format!("${}", i + 1);
            self.install(name, SymbolKind::Argument, Value::Int(i));
        }
        self.install("$n_args", SymbolKind::Argument, Value::Int(N_ARGS_ARG_SYM));
    }

    /// Add a symbol. Locals go to the local scope, everything else to the
    /// global scope. An existing symbol of the same name is shadowed, not
    /// replaced.
    pub fn install(&mut self, name: impl Into<String>, kind: SymbolKind, value: Value) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.into(),
            kind,
            value,
        });

        if kind == SymbolKind::Local {
            self.locals.push(id);
        } else {
            self.globals.push(id);
        }
        id
    }

    /// Find a symbol by name, local scope first. Within a scope the most
    /// recently installed symbol wins.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.locals
            .iter()
            .rev()
            .chain(self.globals.iter().rev())
            .copied()
            .find(|id| self.symbols[id.index()].name == name)
    }

    /// Global string constant whose text is `text`.
    pub fn lookup_string_const(&self, text: &str) -> Option<SymbolId> {
        self.globals.iter().rev().copied().find(|id| {
            let sym = &self.symbols[id.index()];
            sym.kind == SymbolKind::Const && matches!(&sym.value, Value::String(s) if s == text)
        })
    }

    /// Intern a string literal, reusing an existing constant with the same
    /// text.
    pub fn install_string_const(&mut self, text: &str) -> SymbolId {
        if let Some(id) = self.lookup_string_const(text) {
            return id;
        }

        let name = format!("string #{}", self.string_const_count);
        self.string_const_count += 1;
        self.install(name, SymbolKind::Const, Value::string(text))
    }

    /// Fresh hidden local holding the iterator of a `for (k in a)` loop.
    pub fn install_iterator_symbol(&mut self) -> SymbolId {
        let name = format!("aryiter {}", self.iterator_count);
        self.iterator_count += 1;
        self.install(name, SymbolKind::Local, Value::Unset)
    }

    /// Move a local into the global scope, keeping its id.
    ///
    /// Used for names that are called before the macro function they refer
    /// to has been defined. The promoted symbol shadows any older global of
    /// the same name.
    pub fn promote_to_global(&mut self, id: SymbolId) -> SymbolId {
        let Some(sym) = self.symbols.get_mut(id.index()) else {
            return id;
        };

        if sym.kind != SymbolKind::Local {
            info!(symbol = %sym.name, "promote_to_global: symbol is not local");
            return id;
        }

        sym.kind = SymbolKind::Global;
        let name = sym.name.clone();
        self.locals.retain(|l| *l != id);

        if self.globals.iter().any(|g| self.symbols[g.index()].name == name) {
            info!(symbol = %name, "promote_to_global: shadowing existing global");
        }
        self.globals.push(id);
        id
    }

    /// Bind `name` to a compiled macro function, reusing a forward-referenced
    /// global of that name if there is one.
    pub fn define_macro(&mut self, name: &str, program: Rc<Program>) -> SymbolId {
        let existing = self
            .globals
            .iter()
            .rev()
            .copied()
            .find(|g| self.symbols[g.index()].name == name);

        match existing {
            Some(id) => {
                let sym = &mut self.symbols[id.index()];
                sym.kind = SymbolKind::MacroFunction;
                sym.value = Value::Program(program);
                id
            }
            None => self.install(name, SymbolKind::MacroFunction, Value::Program(program)),
        }
    }

    pub fn define_native(&mut self, name: &str, routine: NativeSubroutine) -> SymbolId {
        self.install(name, SymbolKind::NativeFunction, Value::NativeSubroutine(routine))
    }

    pub fn define_property(&mut self, name: &str, routine: NativeSubroutine) -> SymbolId {
        self.install(name, SymbolKind::ComputedProperty, Value::NativeSubroutine(routine))
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    pub fn get_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.symbols.get_mut(id.index())
    }

    pub fn name(&self, id: SymbolId) -> &str {
        self.get(id).map(|s| s.name.as_str()).unwrap_or("<unknown symbol>")
    }

    /// Current local scope in declaration order.
    pub fn locals(&self) -> &[SymbolId] {
        &self.locals
    }

    pub fn clear_locals(&mut self) {
        self.locals.clear();
    }

    /// Empty the local scope, handing its symbols to the caller.
    pub fn take_locals(&mut self) -> Vec<SymbolId> {
        std::mem::take(&mut self.locals)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_globals() {
        let table = SymbolTable::with_macro_globals();

        let first = table.lookup("$1").unwrap();
        assert_eq!(table.get(first).unwrap().value, Value::Int(0));
        assert_eq!(table.get(first).unwrap().kind, SymbolKind::Argument);

        let ninth = table.lookup("$9").unwrap();
        assert_eq!(table.get(ninth).unwrap().value, Value::Int(8));

        let count = table.lookup("$n_args").unwrap();
        assert_eq!(table.get(count).unwrap().value, Value::Int(N_ARGS_ARG_SYM));

        assert!(table.lookup("$10").is_none());
    }

    #[test]
    fn test_local_shadows_global() {
        let mut table = SymbolTable::new();
        let global = table.install("x", SymbolKind::Global, Value::Unset);
        let local = table.install("x", SymbolKind::Local, Value::Unset);

        assert_ne!(global, local);
        assert_eq!(table.lookup("x"), Some(local));

        table.clear_locals();
        assert_eq!(table.lookup("x"), Some(global));
    }

    #[test]
    fn test_latest_local_wins() {
        let mut table = SymbolTable::new();
        table.install("x", SymbolKind::Local, Value::Unset);
        let second = table.install("x", SymbolKind::Local, Value::Unset);
        assert_eq!(table.lookup("x"), Some(second));
    }

    #[test]
    fn test_string_const_interned() {
        let mut table = SymbolTable::new();
        let a = table.install_string_const("hello");
        let b = table.install_string_const("hello");
        let c = table.install_string_const("world");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.name(a), "string #0");
        assert_eq!(table.name(c), "string #1");
        assert_eq!(table.get(c).unwrap().value, Value::from("world"));
    }

    #[test]
    fn test_string_const_not_confused_with_variable() {
        let mut table = SymbolTable::new();
        table.install("v", SymbolKind::Global, Value::from("hello"));
        let c = table.install_string_const("hello");
        assert_eq!(table.get(c).unwrap().kind, SymbolKind::Const);
    }

    #[test]
    fn test_iterator_symbols_are_fresh_locals() {
        let mut table = SymbolTable::new();
        let a = table.install_iterator_symbol();
        let b = table.install_iterator_symbol();

        assert_ne!(a, b);
        assert_eq!(table.name(a), "aryiter 0");
        assert_eq!(table.name(b), "aryiter 1");
        assert_eq!(table.locals(), &[a, b]);
    }

    #[test]
    fn test_promote_preserves_identity() {
        let mut table = SymbolTable::new();
        let id = table.install("later", SymbolKind::Local, Value::Unset);

        assert_eq!(table.promote_to_global(id), id);
        assert_eq!(table.get(id).unwrap().kind, SymbolKind::Global);
        assert!(table.locals().is_empty());

        table.clear_locals();
        assert_eq!(table.lookup("later"), Some(id));
    }

    #[test]
    fn test_promote_non_local_is_noop() {
        let mut table = SymbolTable::new();
        let id = table.install("g", SymbolKind::Global, Value::Unset);
        assert_eq!(table.promote_to_global(id), id);
        assert_eq!(table.get(id).unwrap().kind, SymbolKind::Global);
    }

    #[test]
    fn test_promote_shadows_existing_global() {
        let mut table = SymbolTable::new();
        let older = table.install("f", SymbolKind::Global, Value::Unset);
        let local = table.install("f", SymbolKind::Local, Value::Unset);

        let promoted = table.promote_to_global(local);
        assert_eq!(promoted, local);
        assert_ne!(promoted, older);
        assert_eq!(table.get(local).unwrap().kind, SymbolKind::Global);
        assert!(table.locals().is_empty());
        assert_eq!(table.lookup("f"), Some(local));
    }

    #[test]
    fn test_define_macro_binds_promoted_over_older_global() {
        let mut table = SymbolTable::new();
        table.install("f", SymbolKind::Global, Value::Unset);
        let local = table.install("f", SymbolKind::Local, Value::Unset);
        let promoted = table.promote_to_global(local);

        let program = Rc::new(Program::new(Vec::new(), Vec::new()));
        assert_eq!(table.define_macro("f", program), promoted);
        assert_eq!(table.get(local).unwrap().kind, SymbolKind::MacroFunction);
    }

    #[test]
    fn test_define_macro_fills_forward_reference() {
        let mut table = SymbolTable::new();
        let local = table.install("helper", SymbolKind::Local, Value::Unset);
        let promoted = table.promote_to_global(local);

        let program = Rc::new(Program::new(Vec::new(), Vec::new()));
        let defined = table.define_macro("helper", program.clone());

        assert_eq!(defined, promoted);
        let sym = table.get(defined).unwrap();
        assert_eq!(sym.kind, SymbolKind::MacroFunction);
        assert_eq!(sym.value, Value::Program(program));
    }

    #[test]
    fn test_take_locals() {
        let mut table = SymbolTable::new();
        let a = table.install("a", SymbolKind::Local, Value::Unset);
        let b = table.install("b", SymbolKind::Local, Value::Unset);

        assert_eq!(table.take_locals(), vec![a, b]);
        assert!(table.locals().is_empty());
        assert_eq!(table.name(a), "a");
    }
}
