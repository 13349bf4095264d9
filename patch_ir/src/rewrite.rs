use thiserror::Error;
use tracing::debug;

use crate::image::Method;
use crate::inst::{Op, OverrideFn};

/// Absolute tolerance when comparing floating literals against a baseline.
pub const FLOAT_TOLERANCE: f32 = 1e-4;

/// One recognised literal shape and the override it redirects to.
///
/// A pattern always matches a direct floating literal. When `matches_int` is
/// set it additionally matches an integer literal of the same value that is
/// immediately followed by a widening conversion; the pair collapses into a
/// single override call.
#[derive(Debug, Clone, Copy)]
pub struct LiteralPattern {
    pub value: f32,
    pub matches_int: bool,
    pub target: OverrideFn,
}

impl LiteralPattern {
    pub fn float_only(value: f32, target: OverrideFn) -> Self {
        Self {
            value,
            matches_int: false,
            target,
        }
    }

    pub fn with_int_form(value: f32, target: OverrideFn) -> Self {
        Self {
            value,
            matches_int: true,
            target,
        }
    }

    fn matches_float(&self, v: f32) -> bool {
        (v - self.value).abs() < FLOAT_TOLERANCE
    }

    fn matches_int_value(&self, v: i32) -> bool {
        self.matches_int && v == self.value as i32
    }
}

/// Named collection of patterns applied in one rewrite pass.
///
/// The name doubles as the idempotence key: a method records which tables
/// have been applied to it, and re-applying the same table is a no-op.
#[derive(Debug, Clone)]
pub struct PatternTable {
    name: &'static str,
    patterns: Vec<LiteralPattern>,
}

impl PatternTable {
    pub fn new(name: &'static str, patterns: Vec<LiteralPattern>) -> Self {
        Self { name, patterns }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Every override referenced by this table, for eager binding checks.
    pub fn targets(&self) -> impl Iterator<Item = OverrideFn> + '_ {
        self.patterns.iter().map(|p| p.target)
    }
}

/// Why a single method could not be rewritten.
///
/// These are the recoverable per-method failures of a broad sweep; fatal
/// installation errors live with the installer.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("method {0} has no rewritable instruction stream")]
    NoBody(String),
}

/// Result of one method-level rewrite attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodPatch {
    Applied { replaced: usize },
    AlreadyPatched,
}

/// Rewrite a raw instruction stream against a pattern table.
///
/// Single pass, left to right. The only lookahead is one instruction, used to
/// recognise the integer-literal-plus-conversion form. Every match replaces a
/// shape that nets one value pushed with a call that nets one value pushed, so
/// the stack balance of the stream is unchanged; a two-instruction match
/// shrinks the stream by one.
pub fn rewrite_stream(ops: &[Op], table: &PatternTable) -> (Vec<Op>, usize) {
    let mut out = Vec::with_capacity(ops.len());
    let mut replaced = 0;
    let mut i = 0;

    while i < ops.len() {
        let op = ops[i];

        if let Op::PushF32(v) = op {
            if let Some(p) = table.patterns.iter().find(|p| p.matches_float(v)) {
                out.push(Op::CallOverride(p.target));
                replaced += 1;
                i += 1;
                continue;
            }
        }

        let int_value = match op {
            Op::PushI32(v) => Some(v),
            Op::PushI8(v) => Some(v as i32),
            _ => None,
        };
        if let Some(v) = int_value {
            if matches!(ops.get(i + 1), Some(Op::IntToF32)) {
                if let Some(p) = table.patterns.iter().find(|p| p.matches_int_value(v)) {
                    out.push(Op::CallOverride(p.target));
                    replaced += 1;
                    i += 2; // literal and its conversion collapse into the call
                    continue;
                }
            }
        }

        out.push(op);
        i += 1;
    }

    (out, replaced)
}

/// Apply a pattern table to one method, in place.
///
/// Methods without a body cannot be patched. A method that already carries
/// this table is left untouched, which keeps `rewrite_method` idempotent at
/// the handle level; the stream itself is also a fixed point, since override
/// calls never match a literal pattern.
pub fn rewrite_method(method: &mut Method, table: &PatternTable) -> Result<MethodPatch, PatchError> {
    if method.native {
        return Err(PatchError::NoBody(method.name.clone()));
    }
    if method.body.has_applied(table.name) {
        debug!(method = %method.name, table = table.name, "method already patched, skipping");
        return Ok(MethodPatch::AlreadyPatched);
    }

    let (ops, replaced) = rewrite_stream(&method.body.ops, table);
    method.body.ops = ops;
    method.body.mark_applied(table.name);
    if replaced > 0 {
        debug!(
            method = %method.name,
            table = table.name,
            replaced, "rewrote literal patterns"
        );
    }
    Ok(MethodPatch::Applied { replaced })
}
