//! AST-to-bytecode compiler for the Monkey language.
//!
//! The compiler performs a single-pass walk of the [`Program`] AST and emits
//! [`Instructions`] plus a constant pool.
//!
//! # Scope model
//!
//! Each function literal compiles inside its own [`CompilationScope`]
//! (instruction buffer + last/previous instruction bookkeeping), paired with
//! a nested [`SymbolTable`]. `enter_scope` pushes both; `leave_scope` pops
//! the scope and returns its finished instructions. The outer (main) scope
//! is always index 0.
//!
//! # Free variables
//!
//! When a body references an enclosing function's local, the symbol table
//! promotes it to a `Free` symbol. After the body is compiled, the compiler
//! emits — *in the enclosing scope* — one load per captured symbol, in
//! capture order, and then the closure instruction. The VM pops those values
//! into the closure's free slots, so the capture is a copy made at closure
//! creation time.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::bytecode::{make, Instructions, OpCode};
use crate::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// A compile-time error. Fatal for the current compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// An identifier that no scope (or builtin) resolves.
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    /// An operator with no matching opcode.
    #[error("unknown operator {0}")]
    UnknownOperator(String),
    /// A construct only the tree-walking evaluator executes.
    #[error("{0} is not supported by the bytecode engine")]
    Unsupported(&'static str),
}

// ─────────────────────────────────────────────────────────────────────────────
// Compilation output
// ─────────────────────────────────────────────────────────────────────────────

/// The result of a compilation: instruction bytes plus the constant pool
/// they index into. This is what a [`Vm`](crate::vm::Vm) executes.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Rc<Value>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scopes
// ─────────────────────────────────────────────────────────────────────────────

/// The opcode and byte offset of an already-emitted instruction.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// The instruction buffer of one function being compiled, with enough
/// bookkeeping to strip or rewrite the most recent instruction.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiler
// ─────────────────────────────────────────────────────────────────────────────

/// The Monkey bytecode compiler.
///
/// Create one with [`Compiler::new`], call [`Compiler::compile`], then take
/// the result with [`Compiler::bytecode`]. A REPL keeps its symbol table and
/// constant pool alive across lines via [`Compiler::with_state`] /
/// [`Compiler::state`].
pub struct Compiler {
    constants: Rc<RefCell<Vec<Rc<Value>>>>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Create a compiler with a fresh symbol table (builtins pre-registered)
    /// and an empty constant pool.
    pub fn new() -> Self {
        let symbol_table = SymbolTable::new();
        for (index, def) in crate::builtins::BUILTINS.iter().enumerate() {
            symbol_table.borrow_mut().define_builtin(index, def.name);
        }
        Self::with_state(symbol_table, Rc::new(RefCell::new(Vec::new())))
    }

    /// Create a compiler that extends existing REPL state.
    pub fn with_state(
        symbol_table: Rc<RefCell<SymbolTable>>,
        constants: Rc<RefCell<Vec<Rc<Value>>>>,
    ) -> Self {
        Compiler {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Hand the persistent state back to the caller (for the next REPL line).
    pub fn state(&self) -> (Rc<RefCell<SymbolTable>>, Rc<RefCell<Vec<Rc<Value>>>>) {
        (self.symbol_table.clone(), self.constants.clone())
    }

    /// Compile a whole program into the main scope.
    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// The finished main-scope instructions plus a snapshot of the constant
    /// pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[self.scope_index].instructions.clone(),
            constants: self.constants.borrow().clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Let { name, value } => {
                // Define before compiling the value so a recursive function
                // body can resolve its own binding.
                let symbol = self.symbol_table.borrow_mut().define(name);
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(OpCode::SetGlobal, &[symbol.index]),
                    _ => self.emit(OpCode::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::ReturnValue, &[]);
                Ok(())
            }
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
                Ok(())
            }
            Statement::Assignment { .. } => Err(CompileError::Unsupported("assignment")),
            Statement::Break => Err(CompileError::Unsupported("break")),
        }
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Integer(n) => {
                let idx = self.add_constant(Value::shared_int(*n));
                self.emit(OpCode::Constant, &[idx]);
                Ok(())
            }
            Expression::Str(s) => {
                let idx = self.add_constant(Rc::new(Value::Str(s.clone())));
                self.emit(OpCode::Constant, &[idx]);
                Ok(())
            }
            Expression::Boolean(true) => {
                self.emit(OpCode::True, &[]);
                Ok(())
            }
            Expression::Boolean(false) => {
                self.emit(OpCode::False, &[]);
                Ok(())
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .borrow_mut()
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
                Ok(())
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "-" => self.emit(OpCode::Minus, &[]),
                    "!" => self.emit(OpCode::Bang, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
                Ok(())
            }
            Expression::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(operator, left, right),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref()),
            Expression::While { .. } => Err(CompileError::Unsupported("while loops")),
            Expression::Function {
                parameters,
                body,
                name,
            } => self.compile_function(parameters, body, name),
            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
                Ok(())
            }
            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
                Ok(())
            }
            Expression::Hash(pairs) => {
                // Sort by the key's printed form so the emitted bytecode is
                // deterministic; runtime hash equality ignores order.
                let mut pairs: Vec<&(Expression, Expression)> = pairs.iter().collect();
                pairs.sort_by_key(|(key, _)| key.to_string());
                let count = pairs.len() * 2;
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Hash, &[count]);
                Ok(())
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
                Ok(())
            }
        }
    }

    fn compile_infix(
        &mut self,
        operator: &str,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), CompileError> {
        // `<` has no opcode of its own: compile the operands swapped and
        // reuse OpGreaterThan.
        if operator == "<" {
            self.compile_expression(right)?;
            self.compile_expression(left)?;
            self.emit(OpCode::GreaterThan, &[]);
            return Ok(());
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        match operator {
            "+" => self.emit(OpCode::Add, &[]),
            "-" => self.emit(OpCode::Sub, &[]),
            "*" => self.emit(OpCode::Mul, &[]),
            "/" => self.emit(OpCode::Div, &[]),
            "==" => self.emit(OpCode::Equal, &[]),
            "!=" => self.emit(OpCode::NotEqual, &[]),
            ">" => self.emit(OpCode::GreaterThan, &[]),
            other => return Err(CompileError::UnknownOperator(other.to_string())),
        };
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &BlockStatement,
        alternative: Option<&BlockStatement>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;

        // Placeholder target, backpatched once the consequence is known.
        let jump_not_truthy_pos = self.emit(OpCode::JumpNotTruthy, &[0xFFFF]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(OpCode::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(OpCode::Jump, &[0xFFFF]);

        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_not_truthy_pos, after_consequence);

        match alternative {
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }
            }
            None => {
                self.emit(OpCode::Null, &[]);
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative);
        Ok(())
    }

    fn compile_function(
        &mut self,
        parameters: &[String],
        body: &BlockStatement,
        name: &str,
    ) -> Result<(), CompileError> {
        self.enter_scope();

        // The body resolves the function's own (let-bound) name to the
        // closure currently executing, not to a storage slot.
        if !name.is_empty() {
            self.symbol_table.borrow_mut().define_function_name(name);
        }
        for parameter in parameters {
            self.symbol_table.borrow_mut().define(parameter);
        }

        self.compile_block(body)?;

        // The body's value is its implicit return value; an empty body
        // returns null.
        if self.last_instruction_is(OpCode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(OpCode::ReturnValue) {
            self.emit(OpCode::ReturnNull, &[]);
        }

        let (free_symbols, num_locals) = {
            let table = self.symbol_table.borrow();
            (table.free_symbols.clone(), table.num_definitions)
        };
        let instructions = self.leave_scope();

        // Push the captured values in slot order; OpClosure pops them into
        // the new closure.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let func = Rc::new(CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        });
        let idx = self.add_constant(Rc::new(Value::CompiledFunction(func)));
        self.emit(OpCode::Closure, &[idx, free_symbols.len()]);
        Ok(())
    }

    /// Emit the load instruction matching a symbol's scope.
    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Emission bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an instruction to the current scope; returns its byte offset.
    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let bytes = make(op, operands);
        let scope = &mut self.scopes[self.scope_index];
        let position = scope.instructions.append(&bytes);
        scope.previous_instruction = scope.last_instruction.take();
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.scopes[self.scope_index]
            .last_instruction
            .is_some_and(|last| last.opcode == op)
    }

    /// Strip the trailing OpPop (used to keep an if-arm's value on the
    /// stack).
    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        let last = scope.last_instruction.take().expect("no instruction to remove");
        scope.instructions.0.truncate(last.position);
        scope.last_instruction = scope.previous_instruction.take();
    }

    /// Overwrite the instruction at `position` byte-for-byte. The
    /// replacement must have the same length.
    fn replace_instruction(&mut self, position: usize, bytes: &[u8]) {
        let ins = &mut self.scopes[self.scope_index].instructions.0;
        ins[position..position + bytes.len()].copy_from_slice(bytes);
    }

    /// Rewrite the operand of the (same-width) instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = OpCode::try_from(self.current_instructions().0[position])
            .expect("patch position does not hold an opcode");
        self.replace_instruction(position, &make(op, &[operand]));
    }

    /// Rewrite a trailing OpPop into OpReturnValue (implicit function
    /// return).
    fn replace_last_pop_with_return(&mut self) {
        let position = self.scopes[self.scope_index]
            .last_instruction
            .expect("no instruction to replace")
            .position;
        self.replace_instruction(position, &make(OpCode::ReturnValue, &[]));
        self.scopes[self.scope_index]
            .last_instruction
            .as_mut()
            .expect("just checked")
            .opcode = OpCode::ReturnValue;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;
        let enclosed = SymbolTable::enclosed(self.symbol_table.clone());
        self.symbol_table = enclosed;
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack underflow");
        self.scope_index -= 1;
        let outer = self
            .symbol_table
            .borrow()
            .outer()
            .expect("left the top-level scope");
        self.symbol_table = outer;
        scope.instructions
    }

    /// Append a constant and return its pool index.
    fn add_constant(&mut self, value: Rc<Value>) -> usize {
        let mut constants = self.constants.borrow_mut();
        constants.push(value);
        constants.len() - 1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
