//! Runtime values shared by the Monkey VM and the tree-walking evaluator.
//!
//! The [`Value`] enum is the central representation of all data at runtime.
//! Values are handed around as `Rc<Value>`; there is no tracing collector —
//! reference counting by the host is the only memory management.
//!
//! # Canonical instances
//!
//! Small domains are **canonicalized**: `Value::shared_int`,
//! `Value::shared_bool` and `Value::null` return one shared allocation per
//! payload, so reference identity (`Rc::ptr_eq`) coincides with value
//! equality for integers, booleans and null. Both engines rely on this for
//! `==` / `!=` on non-integer operands. The integer pool is thread-local and
//! grows monotonically; entries live for the lifetime of the thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::BlockStatement;
use crate::builtins::BuiltinDef;
use crate::bytecode::Instructions;
use crate::environment::Environment;

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer. Arithmetic wraps on overflow.
    Integer(i64),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    Str(String),
    /// The null value.
    Null,
    /// An ordered sequence of values. Built-ins return new arrays rather
    /// than mutating (immutable update).
    Array(Vec<Rc<Value>>),
    /// A hash map. Keys are restricted to integers, booleans and strings;
    /// each entry keeps the original key value for display.
    Hash(HashMap<HashKey, HashPair>),
    /// A compiled function body (VM engine). Immutable once emitted.
    CompiledFunction(Rc<CompiledFunction>),
    /// A compiled function paired with its captured free variables.
    Closure(Rc<Closure>),
    /// A source-level function with its defining environment (evaluator
    /// engine only).
    Function(Rc<Function>),
    /// A host-implemented built-in function.
    Builtin(&'static BuiltinDef),
    /// A runtime error value. The evaluator propagates these in-band; the
    /// VM raises them.
    Error(String),
    /// Wraps the value of a `return` while it unwinds (evaluator internal).
    ReturnValue(Rc<Value>),
    /// Unwinds out of the innermost `while` loop (evaluator internal).
    Break,
    /// "No display" sentinel: the result of statements like `let` and of
    /// `puts`, suppressed by the REPL.
    Empty,
}

// ─────────────────────────────────────────────────────────────────────────────
// Canonical instances
// ─────────────────────────────────────────────────────────────────────────────

thread_local! {
    static TRUE: Rc<Value> = Rc::new(Value::Boolean(true));
    static FALSE: Rc<Value> = Rc::new(Value::Boolean(false));
    static NULL: Rc<Value> = Rc::new(Value::Null);
    static EMPTY: Rc<Value> = Rc::new(Value::Empty);
    static BREAK: Rc<Value> = Rc::new(Value::Break);
    static INT_POOL: RefCell<HashMap<i64, Rc<Value>>> = RefCell::new(HashMap::new());
}

impl Value {
    /// The canonical instance for the given integer payload.
    pub fn shared_int(value: i64) -> Rc<Value> {
        INT_POOL.with(|pool| {
            pool.borrow_mut()
                .entry(value)
                .or_insert_with(|| Rc::new(Value::Integer(value)))
                .clone()
        })
    }

    /// One of the two boolean singletons.
    pub fn shared_bool(value: bool) -> Rc<Value> {
        if value {
            TRUE.with(Rc::clone)
        } else {
            FALSE.with(Rc::clone)
        }
    }

    /// The null singleton.
    pub fn null() -> Rc<Value> {
        NULL.with(Rc::clone)
    }

    /// The `Empty` sentinel singleton.
    pub fn empty() -> Rc<Value> {
        EMPTY.with(Rc::clone)
    }

    /// The `Break` sentinel singleton.
    pub fn break_marker() -> Rc<Value> {
        BREAK.with(Rc::clone)
    }

    // ── Predicates ───────────────────────────────────────────────────────────

    /// A value is truthy unless it is the boolean `false` or `null`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// The type tag used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Str(_) => "STRING",
            Value::Null => "NULL",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Function(_) => "FUNCTION",
            Value::Builtin(_) => "BUILTIN",
            Value::Error(_) => "ERROR",
            Value::ReturnValue(_) => "RETURN_VALUE",
            Value::Break => "BREAK",
            Value::Empty => "EMPTY",
        }
    }

    // ── Hash keys ────────────────────────────────────────────────────────────

    /// The hash key for this value, or `None` if the kind is not hashable.
    /// Only integers, booleans and strings are hashable.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey {
                tag: "INTEGER",
                value: *n,
            }),
            Value::Boolean(b) => Some(HashKey {
                tag: "BOOLEAN",
                value: i64::from(*b),
            }),
            Value::Str(s) => Some(HashKey {
                tag: "STRING",
                value: i64::from(hash_str(s)),
            }),
            _ => None,
        }
    }
}

/// 32-bit polynomial rolling hash: `h = ((h << 5) - h + c) | 0` over the
/// string's code units, with wrap-around signed arithmetic. Equal contents
/// always produce equal hashes.
fn hash_str(s: &str) -> i32 {
    let mut h: i32 = 0;
    for c in s.chars() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32);
    }
    h
}

// ─────────────────────────────────────────────────────────────────────────────
// Hash keys and pairs
// ─────────────────────────────────────────────────────────────────────────────

/// The lookup key of a hash entry: the key's type tag plus its hashed
/// payload. Distinct types never collide because the tag participates in
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: &'static str,
    pub value: i64,
}

/// One hash entry. The original key value is retained for display.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Rc<Value>,
    pub value: Rc<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Function-shaped values
// ─────────────────────────────────────────────────────────────────────────────

/// The compiled body of a function: its instruction bytes plus the slot
/// bookkeeping the VM needs to reserve stack space.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    /// All locals defined in the body, parameters included.
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function paired with the values it captured at creation time.
/// Free variables are *copies* taken when `OpClosure` executes; there is no
/// mutable-cell indirection.
#[derive(Debug, Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Rc<Value>>,
}

/// A source-level function as the evaluator sees it: parameter names, the
/// body AST, and the environment it closes over.
#[derive(Debug)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: BlockStatement,
    pub env: Rc<RefCell<Environment>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Equality
// ─────────────────────────────────────────────────────────────────────────────

// Function-shaped values compare by identity; everything else by payload.
// Identity comparison keeps equality total without walking captured
// environments (which may contain reference cycles through recursive
// functions).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::ReturnValue(a), Value::ReturnValue(b)) => a == b,
            (Value::Break, Value::Break) => true,
            (Value::Empty, Value::Empty) => true,
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Display (the `inspect` form)
// ─────────────────────────────────────────────────────────────────────────────

// The REPL prints this form for every non-suppressed result.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(_) => write!(f, "<compiled fn>"),
            Value::Closure(_) => write!(f, "<closure>"),
            Value::Function(func) => {
                write!(f, "fn({}) {{\n{}\n}}", func.parameters.join(", "), func.body)
            }
            Value::Builtin(def) => write!(f, "<builtin {}>", def.name),
            Value::Error(msg) => write!(f, "ERROR: {msg}"),
            Value::ReturnValue(inner) => write!(f, "{inner}"),
            Value::Break => write!(f, "break"),
            Value::Empty => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_canonicalization() {
        let a = Value::shared_int(5);
        let b = Value::shared_int(5);
        let c = Value::shared_int(6);
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_boolean_singletons() {
        assert!(Rc::ptr_eq(&Value::shared_bool(true), &Value::shared_bool(true)));
        assert!(!Rc::ptr_eq(
            &Value::shared_bool(true),
            &Value::shared_bool(false)
        ));
        assert!(Rc::ptr_eq(&Value::null(), &Value::null()));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn test_string_hash_keys() {
        let hello1 = Value::Str("hello".into()).hash_key().unwrap();
        let hello2 = Value::Str("hello".into()).hash_key().unwrap();
        let world = Value::Str("world".into()).hash_key().unwrap();
        assert_eq!(hello1, hello2);
        assert_ne!(hello1, world);
    }

    #[test]
    fn test_scalar_hash_keys() {
        assert_eq!(
            Value::Integer(7).hash_key().unwrap(),
            HashKey {
                tag: "INTEGER",
                value: 7
            }
        );
        assert_eq!(
            Value::Boolean(true).hash_key().unwrap(),
            HashKey {
                tag: "BOOLEAN",
                value: 1
            }
        );
        assert_eq!(
            Value::Boolean(false).hash_key().unwrap(),
            HashKey {
                tag: "BOOLEAN",
                value: 0
            }
        );
    }

    #[test]
    fn test_key_tags_do_not_collide() {
        // INTEGER 1 and BOOLEAN true share the numeric value but not the tag.
        let int_key = Value::Integer(1).hash_key().unwrap();
        let bool_key = Value::Boolean(true).hash_key().unwrap();
        assert_ne!(int_key, bool_key);
    }

    #[test]
    fn test_unhashable_kinds() {
        assert!(Value::Null.hash_key().is_none());
        assert!(Value::Array(Vec::new()).hash_key().is_none());
        assert!(Value::Hash(HashMap::new()).hash_key().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Str("hi".into()).to_string(), "hi");
        let arr = Value::Array(vec![Value::shared_int(1), Value::shared_int(2)]);
        assert_eq!(arr.to_string(), "[1, 2]");
        assert_eq!(Value::Error("boom".into()).to_string(), "ERROR: boom");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Integer(1).type_name(), "INTEGER");
        assert_eq!(Value::Str(String::new()).type_name(), "STRING");
        assert_eq!(Value::Array(Vec::new()).type_name(), "ARRAY");
        assert_eq!(Value::Hash(HashMap::new()).type_name(), "HASH");
    }
}
