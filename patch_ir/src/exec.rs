use thiserror::Error;

use crate::image::Method;
use crate::inst::{Op, OverrideFn, PostfixFn};

/// Runtime value on the evaluator stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    F32(f32),
}

impl Value {
    pub fn as_f32(self) -> f32 {
        match self {
            Value::I32(v) => v as f32,
            Value::F32(v) => v,
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("method {0} has no executable body")]
    NoBody(String),
    #[error("stack underflow at op index {0}")]
    StackUnderflow(usize),
    #[error("integer division by zero at op index {0}")]
    DivideByZero(usize),
    #[error("read of unset local {local} at op index {index}")]
    UnsetLocal { index: usize, local: u8 },
    #[error("missing argument {arg} at op index {index}")]
    MissingArg { index: usize, arg: u8 },
    #[error("widening conversion applied to non-integer at op index {0}")]
    BadConversion(usize),
}

/// Execution-time services a rewritten stream calls back into.
///
/// The policy layer implements this; tests substitute scripted variants.
pub trait OverrideDispatch {
    /// Produce the value for a redirected literal.
    fn call_override(&self, f: OverrideFn) -> f32;

    /// Apply a whole-result adjustment to a method's return value.
    fn apply_postfix(&self, f: PostfixFn, total: f32) -> f32 {
        let _ = f;
        total
    }

    /// Whether an override reference can be bound at all. Checked eagerly at
    /// install time; an unsupported reference is fatal there.
    fn supports(&self, f: OverrideFn) -> bool {
        let _ = f;
        true
    }

    /// Entered the guarded operation's execution window.
    fn on_enter(&self) {}

    /// Left the guarded operation's execution window. Fires on every exit
    /// path, including evaluation failures.
    fn on_exit(&self) {}

    /// Opaque host call. The default returns a neutral floating zero.
    fn call_host(&self, id: u16, args: &[Value]) -> Value {
        let _ = (id, args);
        Value::F32(0.0)
    }
}

/// Execute a raw instruction stream.
///
/// Returns the top of stack at `Ret` (or at end of stream), if any. This is
/// deliberately a toy interpreter: just enough machinery to demonstrate that
/// a rewritten stream still produces one value where the original produced
/// one value.
pub fn run_stream(
    ops: &[Op],
    args: &[Value],
    dispatch: &dyn OverrideDispatch,
) -> Result<Option<Value>, EvalError> {
    let mut stack: Vec<Value> = Vec::new();
    let mut locals: Vec<Option<Value>> = Vec::new();

    for (index, op) in ops.iter().enumerate() {
        match *op {
            Op::PushF32(v) => stack.push(Value::F32(v)),
            Op::PushI32(v) => stack.push(Value::I32(v)),
            Op::PushI8(v) => stack.push(Value::I32(v as i32)),
            Op::IntToF32 => {
                let top = stack.pop().ok_or(EvalError::StackUnderflow(index))?;
                match top {
                    Value::I32(v) => stack.push(Value::F32(v as f32)),
                    Value::F32(_) => return Err(EvalError::BadConversion(index)),
                }
            }
            Op::CallOverride(f) => stack.push(Value::F32(dispatch.call_override(f))),
            Op::CallHost { id, argc, returns } => {
                let argc = argc as usize;
                if stack.len() < argc {
                    return Err(EvalError::StackUnderflow(index));
                }
                let call_args = stack.split_off(stack.len() - argc);
                let result = dispatch.call_host(id, &call_args);
                if returns {
                    stack.push(result);
                }
            }
            Op::LoadArg(a) => {
                let value = args
                    .get(a as usize)
                    .copied()
                    .ok_or(EvalError::MissingArg { index, arg: a })?;
                stack.push(value);
            }
            Op::LoadLocal(l) => {
                let value = locals
                    .get(l as usize)
                    .copied()
                    .flatten()
                    .ok_or(EvalError::UnsetLocal { index, local: l })?;
                stack.push(value);
            }
            Op::StoreLocal(l) => {
                let value = stack.pop().ok_or(EvalError::StackUnderflow(index))?;
                let slot = l as usize;
                if locals.len() <= slot {
                    locals.resize(slot + 1, None);
                }
                locals[slot] = Some(value);
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let rhs = stack.pop().ok_or(EvalError::StackUnderflow(index))?;
                let lhs = stack.pop().ok_or(EvalError::StackUnderflow(index))?;
                stack.push(apply_arith(*op, lhs, rhs, index)?);
            }
            Op::Ret => return Ok(stack.pop()),
            Op::Nop => {}
        }
    }

    Ok(stack.pop())
}

fn apply_arith(op: Op, lhs: Value, rhs: Value, index: usize) -> Result<Value, EvalError> {
    if let (Value::I32(a), Value::I32(b)) = (lhs, rhs) {
        let v = match op {
            Op::Add => a.wrapping_add(b),
            Op::Sub => a.wrapping_sub(b),
            Op::Mul => a.wrapping_mul(b),
            Op::Div => {
                if b == 0 {
                    return Err(EvalError::DivideByZero(index));
                }
                a.wrapping_div(b)
            }
            _ => unreachable!("apply_arith called with non-arithmetic op"),
        };
        return Ok(Value::I32(v));
    }

    let (a, b) = (lhs.as_f32(), rhs.as_f32());
    let v = match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        _ => unreachable!("apply_arith called with non-arithmetic op"),
    };
    Ok(Value::F32(v))
}

/// Execute one method, honouring its context hooks and postfix adjustment.
///
/// `on_exit` fires even when the body fails to evaluate, matching the
/// guarantee the installed hooks give around the real operation.
pub fn run_method(
    method: &Method,
    args: &[Value],
    dispatch: &dyn OverrideDispatch,
) -> Result<Option<Value>, EvalError> {
    if method.native {
        return Err(EvalError::NoBody(method.name.clone()));
    }

    if method.context_hooked {
        dispatch.on_enter();
    }
    let result = run_stream(&method.body.ops, args, dispatch);
    if method.context_hooked {
        dispatch.on_exit();
    }

    let mut out = result?;
    if let (Some(postfix), Some(value)) = (method.postfix, out) {
        out = Some(Value::F32(dispatch.apply_postfix(postfix, value.as_f32())));
    }
    Ok(out)
}
