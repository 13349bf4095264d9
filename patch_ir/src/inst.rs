use std::fmt;

/// Override providers that a rewritten literal can be redirected to.
///
/// Binding these to concrete policy functions happens at install time and is
/// eager: a sweep never starts with an unbound reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideFn {
    SignalRange,
    BasePrice,
    PricePerMeter,
}

impl fmt::Display for OverrideFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverrideFn::SignalRange => "signal_range",
            OverrideFn::BasePrice => "base_price",
            OverrideFn::PricePerMeter => "price_per_meter",
        };
        write!(f, "{}", name)
    }
}

/// Whole-result adjustments applied after a method returns.
///
/// Used instead of a literal rewrite where the interesting quantity is only
/// observable in the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixFn {
    AdjustTotal,
}

/// One low-level operation in a compiled routine.
///
/// This is not a general-purpose instruction set; it covers the shapes the
/// rewriter must recognise plus enough passthrough operations to express the
/// routines it walks. Anything unmatched is copied through untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// Direct floating literal.
    PushF32(f32),
    /// Integer literal (wide form).
    PushI32(i32),
    /// Integer literal (short form).
    PushI8(i8),
    /// Widening conversion of the integer on top of the stack to floating form.
    IntToF32,
    /// Call into a bound override provider; pushes one floating value.
    CallOverride(OverrideFn),
    /// Opaque call into host code. Consumes `argc` values, pushes `returns`.
    CallHost { id: u16, argc: u8, returns: bool },
    LoadArg(u8),
    LoadLocal(u8),
    StoreLocal(u8),
    Add,
    Sub,
    Mul,
    Div,
    Ret,
    Nop,
}
