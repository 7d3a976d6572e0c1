//! Lexical scope resolution for the bytecode compiler.
//!
//! A [`SymbolTable`] maps names to [`Symbol`]s within one compilation scope
//! and points at its enclosing scope. Tables form a chain that mirrors the
//! nesting of function literals during compilation.
//!
//! # Free variables
//!
//! Resolving a name that lives in an *enclosing function's* scope promotes
//! it to a [`SymbolScope::Free`] symbol in the current table and records the
//! original (parent-view) symbol in `free_symbols`. The order of first
//! reference fixes the closure's free-variable slot indices: slot `i` of
//! the closure holds the value the compiler loads for `free_symbols[i]`
//! just before emitting the closure instruction. Globals and builtins are
//! never captured — they stay reachable through their own opcodes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// ─────────────────────────────────────────────────────────────────────────────
// Symbols
// ─────────────────────────────────────────────────────────────────────────────

/// Where a resolved name lives, which decides the load/store opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Top-level binding; a slot in the VM's globals array.
    Global,
    /// A slot in the current call frame.
    Local,
    /// Captured from an enclosing function; a slot in the running closure.
    Free,
    /// One of the fixed host built-ins.
    Builtin,
    /// The name of the function currently being compiled (self-reference).
    Function,
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// SymbolTable
// ─────────────────────────────────────────────────────────────────────────────

/// One scope's name table. Created per function literal and linked to the
/// enclosing scope's table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Rc<RefCell<SymbolTable>>>,
    store: HashMap<String, Symbol>,
    /// Number of `define` calls; equals the frame slots the scope needs.
    pub num_definitions: usize,
    /// Captured originals, in order of first reference; index `i` is the
    /// closure's free slot `i`.
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Create an empty top-level table.
    pub fn new() -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable::default()))
    }

    /// Create a table nested inside `outer`.
    pub fn enclosed(outer: Rc<RefCell<SymbolTable>>) -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable {
            outer: Some(outer),
            ..SymbolTable::default()
        }))
    }

    /// The enclosing table, if any.
    pub fn outer(&self) -> Option<Rc<RefCell<SymbolTable>>> {
        self.outer.clone()
    }

    /// Define `name` in this scope: `Global` at top level, `Local` inside a
    /// function. The next free slot index is assigned.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_some() {
            SymbolScope::Local
        } else {
            SymbolScope::Global
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register a built-in under its fixed table index.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register the name of the function whose body this scope compiles, so
    /// the body can refer to its own (not-yet-stored) closure. The symbol
    /// occupies no local slot.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Promote `original` (as seen by the enclosing scope) to a `Free`
    /// symbol of this scope.
    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Resolve `name` in this scope or an enclosing one.
    ///
    /// A hit in an enclosing scope passes through unchanged when it is
    /// `Global` or `Builtin`; a `Local` or `Free` hit is promoted to a
    /// `Free` symbol of this scope (transitively, so a grandparent local is
    /// promoted through every scope in between).
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.clone()?;
        let symbol = outer.borrow_mut().resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.define_free(symbol)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define_global_then_local() {
        let global = SymbolTable::new();
        assert_eq!(
            global.borrow_mut().define("a"),
            sym("a", SymbolScope::Global, 0)
        );
        assert_eq!(
            global.borrow_mut().define("b"),
            sym("b", SymbolScope::Global, 1)
        );

        let first = SymbolTable::enclosed(global);
        assert_eq!(
            first.borrow_mut().define("c"),
            sym("c", SymbolScope::Local, 0)
        );
        assert_eq!(
            first.borrow_mut().define("d"),
            sym("d", SymbolScope::Local, 1)
        );

        let second = SymbolTable::enclosed(first);
        assert_eq!(
            second.borrow_mut().define("e"),
            sym("e", SymbolScope::Local, 0)
        );
    }

    #[test]
    fn test_resolve_global_passes_through() {
        let global = SymbolTable::new();
        global.borrow_mut().define("a");
        let nested = SymbolTable::enclosed(SymbolTable::enclosed(global));
        assert_eq!(
            nested.borrow_mut().resolve("a"),
            Some(sym("a", SymbolScope::Global, 0))
        );
        // No capture happened.
        assert!(nested.borrow().free_symbols.is_empty());
    }

    #[test]
    fn test_resolve_builtin_passes_through() {
        let global = SymbolTable::new();
        global.borrow_mut().define_builtin(0, "len");
        let nested = SymbolTable::enclosed(SymbolTable::enclosed(global));
        assert_eq!(
            nested.borrow_mut().resolve("len"),
            Some(sym("len", SymbolScope::Builtin, 0))
        );
        assert!(nested.borrow().free_symbols.is_empty());
    }

    #[test]
    fn test_resolve_local() {
        let global = SymbolTable::new();
        global.borrow_mut().define("a");
        let local = SymbolTable::enclosed(global);
        local.borrow_mut().define("c");
        assert_eq!(
            local.borrow_mut().resolve("a"),
            Some(sym("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            local.borrow_mut().resolve("c"),
            Some(sym("c", SymbolScope::Local, 0))
        );
    }

    #[test]
    fn test_resolve_free_promotion() {
        let global = SymbolTable::new();
        global.borrow_mut().define("a");
        global.borrow_mut().define("b");

        let first = SymbolTable::enclosed(global);
        first.borrow_mut().define("c");
        first.borrow_mut().define("d");

        let second = SymbolTable::enclosed(first.clone());
        second.borrow_mut().define("e");
        second.borrow_mut().define("f");

        // Inside `second`: globals pass through, own locals resolve
        // directly, and `first`'s locals are promoted to Free in the order
        // of first reference.
        assert_eq!(
            second.borrow_mut().resolve("a"),
            Some(sym("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            second.borrow_mut().resolve("c"),
            Some(sym("c", SymbolScope::Free, 0))
        );
        assert_eq!(
            second.borrow_mut().resolve("d"),
            Some(sym("d", SymbolScope::Free, 1))
        );
        assert_eq!(
            second.borrow_mut().resolve("e"),
            Some(sym("e", SymbolScope::Local, 0))
        );

        // free_symbols holds the parent's view of the captured names.
        let free: Vec<Symbol> = second.borrow().free_symbols.clone();
        assert_eq!(
            free,
            vec![
                sym("c", SymbolScope::Local, 0),
                sym("d", SymbolScope::Local, 1),
            ]
        );

        // The enclosing scope is untouched by the promotion.
        assert!(first.borrow().free_symbols.is_empty());
    }

    #[test]
    fn test_resolve_transitive_free() {
        // A grandparent local referenced two scopes down is promoted
        // through the intermediate scope as well.
        let global = SymbolTable::new();
        global.borrow_mut().define("a");

        let first = SymbolTable::enclosed(global);
        first.borrow_mut().define("b");

        let second = SymbolTable::enclosed(first.clone());
        let third = SymbolTable::enclosed(second.clone());

        assert_eq!(
            third.borrow_mut().resolve("b"),
            Some(sym("b", SymbolScope::Free, 0))
        );
        // `second` captured `b` as the parent's Local; `third` captured it
        // as `second`'s Free.
        assert_eq!(
            second.borrow().free_symbols,
            vec![sym("b", SymbolScope::Local, 0)]
        );
        assert_eq!(
            third.borrow().free_symbols,
            vec![sym("b", SymbolScope::Free, 0)]
        );
    }

    #[test]
    fn test_resolve_repeated_reference_reuses_slot() {
        let global = SymbolTable::new();
        let first = SymbolTable::enclosed(global);
        first.borrow_mut().define("x");
        let second = SymbolTable::enclosed(first);

        let once = second.borrow_mut().resolve("x").unwrap();
        let twice = second.borrow_mut().resolve("x").unwrap();
        assert_eq!(once, twice);
        assert_eq!(second.borrow().free_symbols.len(), 1);
    }

    #[test]
    fn test_define_function_name() {
        let global = SymbolTable::new();
        let fn_scope = SymbolTable::enclosed(global);
        fn_scope.borrow_mut().define_function_name("fib");
        assert_eq!(
            fn_scope.borrow_mut().resolve("fib"),
            Some(sym("fib", SymbolScope::Function, 0))
        );
        // The self-binding consumes no local slot.
        assert_eq!(fn_scope.borrow().num_definitions, 0);
    }

    #[test]
    fn test_parameter_shadows_function_name() {
        let global = SymbolTable::new();
        let fn_scope = SymbolTable::enclosed(global);
        fn_scope.borrow_mut().define_function_name("f");
        fn_scope.borrow_mut().define("f");
        assert_eq!(
            fn_scope.borrow_mut().resolve("f"),
            Some(sym("f", SymbolScope::Local, 0))
        );
    }

    #[test]
    fn test_unresolvable() {
        let global = SymbolTable::new();
        assert_eq!(global.borrow_mut().resolve("nope"), None);
        let nested = SymbolTable::enclosed(global);
        assert_eq!(nested.borrow_mut().resolve("nope"), None);
    }
}
