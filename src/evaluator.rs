//! Tree-walking evaluator for the Monkey language.
//!
//! The evaluator is the second execution engine: it walks the AST directly
//! and produces the same observable results as the VM for the common
//! language subset, while additionally supporting assignment (`x = expr`),
//! `while` loops and `break`.
//!
//! # Control and error flow
//!
//! Everything is in-band: errors are [`Value::Error`] results that
//! short-circuit the surrounding evaluation eagerly, `return` travels as a
//! [`Value::ReturnValue`] wrapper that unwraps at function calls and at the
//! program boundary, and `break` travels as the [`Value::Break`] sentinel
//! until the nearest `while` absorbs it.
//!
//! # Scoping
//!
//! Environments form an [`Environment`] chain. `let` binds in the current
//! scope; assignment walks outward to the nearest existing binding. `if` and
//! `while` evaluate their blocks in a fresh enclosing environment per
//! evaluation, so a `let` inside a block shadows instead of mutating.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::builtins;
use crate::environment::Environment;
use crate::value::{Function, HashPair, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Evaluate a whole program in `env`. `ReturnValue` unwraps here; `Error`
/// and `Break` pass through to the caller.
pub fn eval_program(program: &Program, env: &Rc<RefCell<Environment>>) -> Rc<Value> {
    let mut result = Value::empty();
    for statement in &program.statements {
        result = eval_statement(statement, env);
        match &*result {
            Value::ReturnValue(inner) => return inner.clone(),
            Value::Error(_) | Value::Break => return result,
            _ => {}
        }
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

fn eval_statement(statement: &Statement, env: &Rc<RefCell<Environment>>) -> Rc<Value> {
    match statement {
        Statement::Let { name, value } => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            if let Some(err) = reject_unbindable(&value, name) {
                return err;
            }
            env.borrow_mut().define(name.clone(), value);
            Value::empty()
        }
        Statement::Assignment { name, value } => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            if let Some(err) = reject_unbindable(&value, name) {
                return err;
            }
            if !env.borrow_mut().assign(name, value) {
                return error(format!("cant assign to undefined identifier: '{name}'"));
            }
            Value::empty()
        }
        Statement::Return(value) => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            Rc::new(Value::ReturnValue(value))
        }
        Statement::Break => Value::break_marker(),
        Statement::Expression(expr) => eval_expression(expr, env),
    }
}

/// `let` and assignment refuse to bind the non-value sentinels.
fn reject_unbindable(value: &Rc<Value>, name: &str) -> Option<Rc<Value>> {
    match &**value {
        Value::Null | Value::Empty | Value::Break => {
            Some(error(format!("cant assign null to variable '{name}'")))
        }
        _ => None,
    }
}

/// Evaluate a block. Control carriers (`ReturnValue`, `Error`, `Break`)
/// propagate unchanged so outer constructs can react to them.
fn eval_block(block: &BlockStatement, env: &Rc<RefCell<Environment>>) -> Rc<Value> {
    let mut result = Value::null();
    for statement in &block.statements {
        result = eval_statement(statement, env);
        if matches!(
            &*result,
            Value::ReturnValue(_) | Value::Error(_) | Value::Break
        ) {
            return result;
        }
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────────────

fn eval_expression(expression: &Expression, env: &Rc<RefCell<Environment>>) -> Rc<Value> {
    match expression {
        Expression::Integer(n) => Value::shared_int(*n),
        Expression::Str(s) => Rc::new(Value::Str(s.clone())),
        Expression::Boolean(b) => Value::shared_bool(*b),
        Expression::Identifier(name) => match env.borrow().get(name) {
            Some(value) => value,
            None => match builtins::lookup(name) {
                Some(def) => Rc::new(Value::Builtin(def)),
                None => error(format!("identifier not found: {name}")),
            },
        },
        Expression::Prefix { operator, right } => {
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_prefix(operator, right)
        }
        Expression::Infix {
            operator,
            left,
            right,
        } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_infix(operator, left, right)
        }
        Expression::If {
            condition,
            consequence,
            alternative,
        } => {
            let condition = eval_expression(condition, env);
            if condition.is_error() {
                return condition;
            }
            if condition.is_truthy() {
                eval_block(consequence, &Environment::enclosed(env.clone()))
            } else if let Some(alternative) = alternative {
                eval_block(alternative, &Environment::enclosed(env.clone()))
            } else {
                Value::null()
            }
        }
        Expression::While { condition, body } => {
            loop {
                let condition = eval_expression(condition, env);
                if condition.is_error() {
                    return condition;
                }
                if !condition.is_truthy() {
                    break;
                }
                let result = eval_block(body, &Environment::enclosed(env.clone()));
                match &*result {
                    Value::Break => break,
                    Value::ReturnValue(_) | Value::Error(_) => return result,
                    _ => {}
                }
            }
            Value::empty()
        }
        Expression::Function {
            parameters, body, ..
        } => Rc::new(Value::Function(Rc::new(Function {
            parameters: parameters.clone(),
            body: body.clone(),
            env: env.clone(),
        }))),
        Expression::Call {
            function,
            arguments,
        } => {
            let function = eval_expression(function, env);
            if function.is_error() {
                return function;
            }
            let mut args = Vec::with_capacity(arguments.len());
            for argument in arguments {
                let arg = eval_expression(argument, env);
                if arg.is_error() {
                    return arg;
                }
                args.push(arg);
            }
            apply_function(function, args)
        }
        Expression::Array(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                let value = eval_expression(element, env);
                if value.is_error() {
                    return value;
                }
                values.push(value);
            }
            Rc::new(Value::Array(values))
        }
        Expression::Hash(pairs) => {
            let mut map = std::collections::HashMap::with_capacity(pairs.len());
            for (key_expr, value_expr) in pairs {
                let key = eval_expression(key_expr, env);
                if key.is_error() {
                    return key;
                }
                let value = eval_expression(value_expr, env);
                if value.is_error() {
                    return value;
                }
                let hash_key = match key.hash_key() {
                    Some(hk) => hk,
                    None => return error(format!("unusable as hash key: {}", key.type_name())),
                };
                map.insert(hash_key, HashPair { key, value });
            }
            Rc::new(Value::Hash(map))
        }
        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let index = eval_expression(index, env);
            if index.is_error() {
                return index;
            }
            eval_index(left, index)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────────────

fn eval_prefix(operator: &str, right: Rc<Value>) -> Rc<Value> {
    match operator {
        "!" => Value::shared_bool(!right.is_truthy()),
        "-" => match &*right {
            Value::Integer(n) => Value::shared_int(n.wrapping_neg()),
            other => error(format!("unsupported type for negation: {}", other.type_name())),
        },
        other => error(format!("unknown operator {other}")),
    }
}

fn eval_infix(operator: &str, left: Rc<Value>, right: Rc<Value>) -> Rc<Value> {
    if let (Value::Integer(l), Value::Integer(r)) = (&*left, &*right) {
        return eval_integer_infix(operator, *l, *r);
    }
    if let (Value::Str(l), Value::Str(r)) = (&*left, &*right) {
        if operator == "+" {
            return Rc::new(Value::Str(format!("{l}{r}")));
        }
    }
    match operator {
        // Identity comparison; integers, booleans and null are canonical.
        "==" => Value::shared_bool(Rc::ptr_eq(&left, &right)),
        "!=" => Value::shared_bool(!Rc::ptr_eq(&left, &right)),
        "<" | ">" => error(format!(
            "unknown operator: {operator} ({} {})",
            left.type_name(),
            right.type_name()
        )),
        _ => error(format!(
            "unsupported types for binary operation: {} {}",
            left.type_name(),
            right.type_name()
        )),
    }
}

fn eval_integer_infix(operator: &str, left: i64, right: i64) -> Rc<Value> {
    match operator {
        "+" => Value::shared_int(left.wrapping_add(right)),
        "-" => Value::shared_int(left.wrapping_sub(right)),
        "*" => Value::shared_int(left.wrapping_mul(right)),
        "/" => {
            if right == 0 {
                error("division by zero".to_string())
            } else {
                Value::shared_int(left.wrapping_div(right))
            }
        }
        "<" => Value::shared_bool(left < right),
        ">" => Value::shared_bool(left > right),
        "==" => Value::shared_bool(left == right),
        "!=" => Value::shared_bool(left != right),
        other => error(format!("unknown operator {other}")),
    }
}

fn eval_index(left: Rc<Value>, index: Rc<Value>) -> Rc<Value> {
    match (&*left, &*index) {
        (Value::Array(elements), Value::Integer(i)) => {
            let max = elements.len() as i64 - 1;
            if *i < 0 || *i > max {
                Value::null()
            } else {
                elements[*i as usize].clone()
            }
        }
        (Value::Hash(pairs), _) => match index.hash_key() {
            Some(hash_key) => pairs
                .get(&hash_key)
                .map(|pair| pair.value.clone())
                .unwrap_or_else(Value::null),
            None => error(format!("unusable as hash key: {}", index.type_name())),
        },
        _ => error(format!(
            "index operator not supported: {}[{}]",
            left.type_name(),
            index.type_name()
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Calls
// ─────────────────────────────────────────────────────────────────────────────

fn apply_function(function: Rc<Value>, args: Vec<Rc<Value>>) -> Rc<Value> {
    match &*function {
        Value::Function(func) => {
            if args.len() != func.parameters.len() {
                return error(format!(
                    "wrong number of arguments: expected {}, got {}",
                    func.parameters.len(),
                    args.len()
                ));
            }
            let scope = Environment::enclosed(func.env.clone());
            for (parameter, arg) in func.parameters.iter().zip(args) {
                scope.borrow_mut().define(parameter.clone(), arg);
            }
            let result = eval_block(&func.body, &scope);
            match &*result {
                Value::ReturnValue(inner) => inner.clone(),
                // A body ending in a non-value statement returns null, the
                // same as the VM's OpReturnNull path.
                Value::Empty => Value::null(),
                _ => result,
            }
        }
        Value::Builtin(def) => (def.func)(&args),
        other => error(format!("cannot call object of type {}", other.type_name())),
    }
}

fn error(message: String) -> Rc<Value> {
    Rc::new(Value::Error(message))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
