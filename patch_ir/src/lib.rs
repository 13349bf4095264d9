//! Instruction-stream model and rewrite engine for the retrofit toolkit.
//!
//! The host ships no extension API for the values we need to change, so the
//! only lever is the compiled code itself: this crate models a loaded host
//! image (modules, types, methods), recognises a small fixed set of
//! literal-producing instruction shapes, and rewrites them into calls to
//! externally bound override functions. A minimal stack evaluator is included
//! so the value-passing contract of a rewritten stream can be verified.

mod exec;
mod image;
mod inst;
mod rewrite;

pub use exec::{run_method, run_stream, EvalError, OverrideDispatch, Value};
pub use image::{short_name, CodeModule, HostImage, Method, MethodBody, TypeDef};
pub use inst::{Op, OverrideFn, PostfixFn};
pub use rewrite::{
    rewrite_method, rewrite_stream, LiteralPattern, MethodPatch, PatchError, PatternTable,
    FLOAT_TOLERANCE,
};
