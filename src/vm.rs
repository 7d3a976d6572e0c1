//! The Monkey virtual machine.
//!
//! The VM is a **stack-based interpreter** executing the [`Bytecode`]
//! produced by the compiler. It owns a flat value stack shared by all call
//! frames, a globals array, and a frame stack; all three have fixed
//! capacities and overflowing any of them aborts the current run.
//!
//! # Execution model
//!
//! - Each [`Frame`] stores the closure being executed, its instruction
//!   pointer, and `base_pointer` — the stack index where the frame's local
//!   slots begin. Arguments already sit in the first slots when a frame is
//!   pushed (`base_pointer = sp - num_args`), and `sp` is bumped past
//!   `num_locals` to reserve the rest.
//! - `stack[sp]` always holds the most recently popped value; the REPL and
//!   the tests read results through [`Vm::last_popped_stack_element`].
//! - Equality on non-integer operands is reference identity, which the
//!   canonical instances in [`crate::value`] make equivalent to value
//!   equality for booleans and null.

use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::{BuiltinDef, BUILTINS};
use crate::bytecode::OpCode;
use crate::compiler::Bytecode;
use crate::value::{Closure, CompiledFunction, HashPair, Value};

/// Value stack capacity.
pub const STACK_SIZE: usize = 2048;
/// Globals array capacity.
pub const GLOBALS_SIZE: usize = 65536;
/// Call-frame stack capacity.
pub const MAX_FRAMES: usize = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Runtime error
// ─────────────────────────────────────────────────────────────────────────────

/// A runtime error raised by the VM. Aborts the current [`Vm::run`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    fn new(message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
        }
    }
}

type VmResult<T> = Result<T, RuntimeError>;

fn fail<T>(message: impl Into<String>) -> VmResult<T> {
    Err(RuntimeError::new(message))
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────────────────

/// One active call on the frame stack.
struct Frame {
    /// The closure being executed (the main program runs inside a synthetic
    /// zero-capture closure).
    closure: Rc<Closure>,
    /// Instruction pointer into `closure.func.instructions`.
    ip: usize,
    /// Stack index of this frame's local slot 0.
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    #[inline]
    fn instructions_len(&self) -> usize {
        self.closure.func.instructions.len()
    }

    #[inline]
    fn read_u8(&mut self) -> u8 {
        let byte = self.closure.func.instructions.0[self.ip];
        self.ip += 1;
        byte
    }

    #[inline]
    fn read_u16(&mut self) -> u16 {
        let ins = &self.closure.func.instructions.0;
        let value = u16::from_be_bytes([ins[self.ip], ins[self.ip + 1]]);
        self.ip += 2;
        value
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vm
// ─────────────────────────────────────────────────────────────────────────────

/// The Monkey virtual machine. One instance owns its stack, globals and
/// frames exclusively for the duration of [`Vm::run`].
pub struct Vm {
    constants: Vec<Rc<Value>>,
    stack: Vec<Rc<Value>>,
    /// Next free stack slot; `stack[sp]` is the last popped value.
    sp: usize,
    globals: Vec<Rc<Value>>,
    frames: Vec<Frame>,
}

impl Vm {
    /// Create a VM with a fresh globals array.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![Value::null(); GLOBALS_SIZE])
    }

    /// Create a VM reusing an existing globals array (REPL persistence).
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Rc<Value>>) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: Vec::new(),
        });
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Vm {
            constants: bytecode.constants,
            stack: vec![Value::null(); STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Recover the globals array for the next REPL line.
    pub fn into_globals(self) -> Vec<Rc<Value>> {
        self.globals
    }

    /// The value most recently popped off the stack — the observable result
    /// of a finished run.
    pub fn last_popped_stack_element(&self) -> Rc<Value> {
        self.stack[self.sp].clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Execute until the main frame runs off the end of its instructions.
    pub fn run(&mut self) -> VmResult<()> {
        while self.current_frame().ip < self.current_frame().instructions_len() {
            let byte = self.current_frame_mut().read_u8();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(b) => return fail(format!("unknown opcode {b}")),
            };

            match op {
                // ── Constants and singletons ─────────────────────────────────
                OpCode::Constant => {
                    let idx = self.read_u16_operand();
                    let constant = match self.constants.get(idx) {
                        Some(c) => c.clone(),
                        None => return fail(format!("constant index {idx} out of range")),
                    };
                    self.push(constant)?;
                }
                OpCode::True => self.push(Value::shared_bool(true))?,
                OpCode::False => self.push(Value::shared_bool(false))?,
                OpCode::Null => self.push(Value::null())?,

                // ── Stack ────────────────────────────────────────────────────
                OpCode::Pop => {
                    self.pop();
                }

                // ── Arithmetic / comparison / unary ──────────────────────────
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }
                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                OpCode::Bang => {
                    let operand = self.pop();
                    self.push(Value::shared_bool(!operand.is_truthy()))?;
                }
                OpCode::Minus => {
                    let operand = self.pop();
                    match &*operand {
                        Value::Integer(n) => self.push(Value::shared_int(n.wrapping_neg()))?,
                        other => {
                            return fail(format!(
                                "unsupported type for negation: {}",
                                other.type_name()
                            ))
                        }
                    }
                }

                // ── Jumps ────────────────────────────────────────────────────
                OpCode::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame_mut().ip = target;
                }
                OpCode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }

                // ── Bindings ─────────────────────────────────────────────────
                OpCode::SetGlobal => {
                    let idx = self.read_u16_operand();
                    let value = self.pop();
                    self.globals[idx] = value;
                }
                OpCode::GetGlobal => {
                    let idx = self.read_u16_operand();
                    let value = self.globals[idx].clone();
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let idx = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base + idx] = value;
                }
                OpCode::GetLocal => {
                    let idx = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + idx].clone();
                    self.push(value)?;
                }
                OpCode::GetBuiltin => {
                    let idx = self.read_u8_operand();
                    let def = match BUILTINS.get(idx) {
                        Some(def) => def,
                        None => return fail(format!("unknown builtin index {idx}")),
                    };
                    self.push(Rc::new(Value::Builtin(def)))?;
                }
                OpCode::GetFree => {
                    let idx = self.read_u8_operand();
                    let value = self.current_frame().closure.free[idx].clone();
                    self.push(value)?;
                }
                OpCode::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Rc::new(Value::Closure(closure)))?;
                }

                // ── Collections ──────────────────────────────────────────────
                OpCode::Array => {
                    let count = self.read_u16_operand();
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Rc::new(Value::Array(elements)))?;
                }
                OpCode::Hash => {
                    let count = self.read_u16_operand();
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    let mut pairs = HashMap::with_capacity(count / 2);
                    for entry in elements.chunks(2) {
                        let key = entry[0].clone();
                        let value = entry[1].clone();
                        let hash_key = match key.hash_key() {
                            Some(hk) => hk,
                            None => {
                                return fail(format!(
                                    "unusable as hash key: {}",
                                    key.type_name()
                                ))
                            }
                        };
                        pairs.insert(hash_key, HashPair { key, value });
                    }
                    self.push(Rc::new(Value::Hash(pairs)))?;
                }
                OpCode::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index(left, index)?;
                }

                // ── Calls and returns ────────────────────────────────────────
                OpCode::Call => {
                    let num_args = self.read_u8_operand();
                    self.call_value(num_args)?;
                }
                OpCode::ReturnValue => {
                    let return_value = self.pop();
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                OpCode::ReturnNull => {
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::null())?;
                }
                OpCode::Closure => {
                    let const_idx = self.read_u16_operand();
                    let num_free = self.read_u8_operand();
                    self.push_closure(const_idx, num_free)?;
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operation helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn execute_binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();
        match (&*left, &*right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match op {
                    OpCode::Add => l.wrapping_add(*r),
                    OpCode::Sub => l.wrapping_sub(*r),
                    OpCode::Mul => l.wrapping_mul(*r),
                    OpCode::Div => {
                        if *r == 0 {
                            return fail("division by zero");
                        }
                        l.wrapping_div(*r)
                    }
                    _ => unreachable!("non-arithmetic opcode {op:?}"),
                };
                self.push(Value::shared_int(result))
            }
            (Value::Str(l), Value::Str(r)) if op == OpCode::Add => {
                self.push(Rc::new(Value::Str(format!("{l}{r}"))))
            }
            _ => fail(format!(
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            )),
        }
    }

    fn execute_comparison(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        if let (Value::Integer(l), Value::Integer(r)) = (&*left, &*right) {
            let result = match op {
                OpCode::Equal => l == r,
                OpCode::NotEqual => l != r,
                OpCode::GreaterThan => l > r,
                _ => unreachable!("non-comparison opcode {op:?}"),
            };
            return self.push(Value::shared_bool(result));
        }

        // Identity comparison; integers, booleans and null are canonical.
        match op {
            OpCode::Equal => self.push(Value::shared_bool(Rc::ptr_eq(&left, &right))),
            OpCode::NotEqual => self.push(Value::shared_bool(!Rc::ptr_eq(&left, &right))),
            _ => fail(format!(
                "unknown operator: > ({} {})",
                left.type_name(),
                right.type_name()
            )),
        }
    }

    fn execute_index(&mut self, left: Rc<Value>, index: Rc<Value>) -> VmResult<()> {
        match (&*left, &*index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let max = elements.len() as i64 - 1;
                if *i < 0 || *i > max {
                    self.push(Value::null())
                } else {
                    self.push(elements[*i as usize].clone())
                }
            }
            (Value::Hash(pairs), _) => {
                let hash_key = match index.hash_key() {
                    Some(hk) => hk,
                    None => {
                        return fail(format!("unusable as hash key: {}", index.type_name()))
                    }
                };
                match pairs.get(&hash_key) {
                    Some(pair) => self.push(pair.value.clone()),
                    None => self.push(Value::null()),
                }
            }
            _ => fail(format!(
                "index operator not supported: {}[{}]",
                left.type_name(),
                index.type_name()
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Call protocol
    // ─────────────────────────────────────────────────────────────────────────

    fn call_value(&mut self, num_args: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match &*callee {
            Value::Closure(closure) => self.call_closure(closure.clone(), num_args),
            Value::Builtin(def) => self.call_builtin(def, num_args),
            other => fail(format!(
                "cannot call object of type {}",
                other.type_name()
            )),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> VmResult<()> {
        if num_args != closure.func.num_parameters {
            return fail(format!(
                "wrong number of arguments: expected {}, got {}",
                closure.func.num_parameters, num_args
            ));
        }
        let num_locals = closure.func.num_locals;
        let base_pointer = self.sp - num_args;
        if base_pointer + num_locals >= STACK_SIZE {
            return fail("stack overflow");
        }
        self.push_frame(Frame::new(closure, base_pointer))?;
        // Reserve the local slots; the arguments already occupy the first
        // num_args of them.
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(&mut self, def: &'static BuiltinDef, num_args: usize) -> VmResult<()> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (def.func)(&args);
        // Drop the arguments and the callee.
        self.sp -= num_args + 1;
        if let Value::Error(message) = &*result {
            return fail(message.clone());
        }
        self.push(result)
    }

    fn push_closure(&mut self, const_idx: usize, num_free: usize) -> VmResult<()> {
        let constant = match self.constants.get(const_idx) {
            Some(c) => c.clone(),
            None => return fail(format!("constant index {const_idx} out of range")),
        };
        let func = match &*constant {
            Value::CompiledFunction(func) => func.clone(),
            other => return fail(format!("not a function: {}", other.type_name())),
        };
        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;
        self.push(Rc::new(Value::Closure(Rc::new(Closure { func, free }))))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Frame and stack helpers
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    #[inline]
    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn push_frame(&mut self, frame: Frame) -> VmResult<()> {
        if self.frames.len() >= MAX_FRAMES {
            return fail("frame overflow");
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("frame stack underflow")
    }

    #[inline]
    fn read_u8_operand(&mut self) -> usize {
        self.current_frame_mut().read_u8() as usize
    }

    #[inline]
    fn read_u16_operand(&mut self) -> usize {
        self.current_frame_mut().read_u16() as usize
    }

    fn push(&mut self, value: Rc<Value>) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return fail("stack overflow");
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top of stack. The slot is left in place so
    /// [`Vm::last_popped_stack_element`] can observe it.
    fn pop(&mut self) -> Rc<Value> {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
