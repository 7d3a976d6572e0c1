//! Host built-in functions shared by both engines.
//!
//! Built-ins live in a fixed-order table: the compiler registers each name
//! under its table index and `OpGetBuiltin` pushes by index, so the order
//! below is part of the bytecode contract and must never change:
//!
//! | Index | Name |
//! |-------|-------|
//! | 0 | `len` |
//! | 1 | `puts` |
//! | 2 | `first` |
//! | 3 | `last` |
//! | 4 | `rest` |
//! | 5 | `push` |
//!
//! Each built-in is a plain Rust function `fn(&[Rc<Value>]) -> Rc<Value>`
//! that reports failures as in-band [`Value::Error`] values. The evaluator
//! propagates those as-is; the VM raises them as runtime errors.

use std::rc::Rc;

use crate::value::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Table
// ─────────────────────────────────────────────────────────────────────────────

/// The signature of a built-in function.
pub type BuiltinFn = fn(&[Rc<Value>]) -> Rc<Value>;

/// One entry of the built-in table.
#[derive(Debug)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// All built-ins, in their fixed index order.
pub static BUILTINS: [BuiltinDef; 6] = [
    BuiltinDef {
        name: "len",
        func: builtin_len,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
    },
    BuiltinDef {
        name: "rest",
        func: builtin_rest,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
    },
];

/// Look a built-in up by name (used by the evaluator's identifier fallback).
pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|def| def.name == name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn error(message: String) -> Rc<Value> {
    Rc::new(Value::Error(message))
}

fn arity_error(name: &str) -> Rc<Value> {
    error(format!("invalid number of arguments for '{name}'"))
}

fn type_error(arg: &Value, name: &str) -> Rc<Value> {
    error(format!(
        "argument {} to '{name}' not supported",
        arg.type_name()
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Implementations
// ─────────────────────────────────────────────────────────────────────────────

/// `len(x)` — character count of a string or element count of an array.
fn builtin_len(args: &[Rc<Value>]) -> Rc<Value> {
    if args.len() != 1 {
        return arity_error("len");
    }
    match &*args[0] {
        Value::Str(s) => Value::shared_int(s.chars().count() as i64),
        Value::Array(elements) => Value::shared_int(elements.len() as i64),
        other => type_error(other, "len"),
    }
}

/// `puts(...)` — write each argument's display form on its own line.
/// Returns the `Empty` sentinel so the REPL prints nothing.
fn builtin_puts(args: &[Rc<Value>]) -> Rc<Value> {
    for arg in args {
        println!("{arg}");
    }
    Value::empty()
}

/// `first(arr)` — the first element, or `null` for an empty array.
fn builtin_first(args: &[Rc<Value>]) -> Rc<Value> {
    if args.len() != 1 {
        return arity_error("first");
    }
    match &*args[0] {
        Value::Array(elements) => elements.first().cloned().unwrap_or_else(Value::null),
        other => type_error(other, "first"),
    }
}

/// `last(arr)` — the last element, or `null` for an empty array.
fn builtin_last(args: &[Rc<Value>]) -> Rc<Value> {
    if args.len() != 1 {
        return arity_error("last");
    }
    match &*args[0] {
        Value::Array(elements) => elements.last().cloned().unwrap_or_else(Value::null),
        other => type_error(other, "last"),
    }
}

/// `rest(arr)` — a new array holding everything but the first element, or
/// `null` for an empty array.
fn builtin_rest(args: &[Rc<Value>]) -> Rc<Value> {
    if args.len() != 1 {
        return arity_error("rest");
    }
    match &*args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                Value::null()
            } else {
                Rc::new(Value::Array(elements[1..].to_vec()))
            }
        }
        other => type_error(other, "rest"),
    }
}

/// `push(arr, x)` — a new array with `x` appended; the original is never
/// mutated.
fn builtin_push(args: &[Rc<Value>]) -> Rc<Value> {
    if args.len() != 2 {
        return arity_error("push");
    }
    match &*args[0] {
        Value::Array(elements) => {
            let mut next = elements.clone();
            next.push(args[1].clone());
            Rc::new(Value::Array(next))
        }
        other => type_error(other, "push"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn array(values: &[i64]) -> Rc<Value> {
        Rc::new(Value::Array(
            values.iter().map(|&n| Value::shared_int(n)).collect(),
        ))
    }

    #[test]
    fn test_table_order_is_fixed() {
        let names: Vec<&str> = BUILTINS.iter().map(|d| d.name).collect();
        assert_eq!(names, ["len", "puts", "first", "last", "rest", "push"]);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("len").unwrap().name, "len");
        assert!(lookup("print").is_none());
    }

    #[test]
    fn test_len() {
        assert_eq!(
            *builtin_len(&[Rc::new(Value::Str("hello".into()))]),
            Value::Integer(5)
        );
        assert_eq!(*builtin_len(&[array(&[1, 2, 3])]), Value::Integer(3));
        assert_eq!(
            *builtin_len(&[Value::shared_int(1)]),
            Value::Error("argument INTEGER to 'len' not supported".into())
        );
        assert_eq!(
            *builtin_len(&[
                Rc::new(Value::Str("one".into())),
                Rc::new(Value::Str("two".into()))
            ]),
            Value::Error("invalid number of arguments for 'len'".into())
        );
    }

    #[test]
    fn test_first_last() {
        assert_eq!(*builtin_first(&[array(&[1, 2, 3])]), Value::Integer(1));
        assert_eq!(*builtin_last(&[array(&[1, 2, 3])]), Value::Integer(3));
        assert_eq!(*builtin_first(&[array(&[])]), Value::Null);
        assert_eq!(*builtin_last(&[array(&[])]), Value::Null);
        assert_eq!(
            *builtin_first(&[Value::shared_int(1)]),
            Value::Error("argument INTEGER to 'first' not supported".into())
        );
    }

    #[test]
    fn test_rest() {
        let rest = builtin_rest(&[array(&[1, 2, 3])]);
        assert_eq!(*rest, *array(&[2, 3]));
        assert_eq!(*builtin_rest(&[array(&[])]), Value::Null);
    }

    #[test]
    fn test_push_never_mutates() {
        let original = array(&[1]);
        let pushed = builtin_push(&[original.clone(), Value::shared_int(2)]);
        assert_eq!(*pushed, *array(&[1, 2]));
        assert_eq!(*original, *array(&[1]));
        assert_eq!(
            *builtin_push(&[Value::shared_int(1), Value::shared_int(2)]),
            Value::Error("argument INTEGER to 'push' not supported".into())
        );
    }
}
