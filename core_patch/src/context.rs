//! Thread-confined tracker for the guarded operation's execution window.
//!
//! Override policies must only fire while the host is actually inside the
//! guarded operation. The flag is per thread; there is no cross-thread
//! visibility and none is needed, since the host drives everything from one
//! cooperative loop.

use std::cell::Cell;

thread_local! {
    static IN_GUARDED_OP: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside the guarded operation.
pub fn is_active() -> bool {
    IN_GUARDED_OP.with(Cell::get)
}

/// Mark entry into the guarded operation.
///
/// Prefer [`scoped`] where the call boundary allows holding a guard; the raw
/// pair exists for hook installations that cannot.
pub fn enter() {
    IN_GUARDED_OP.with(|flag| flag.set(true));
}

/// Mark exit from the guarded operation.
///
/// Calling this without a matching [`enter`] just leaves the flag false.
pub fn exit() {
    IN_GUARDED_OP.with(|flag| flag.set(false));
}

/// RAII form of the enter/exit pair: the flag clears when the scope drops,
/// on every exit path including unwinds.
pub fn scoped() -> ContextScope {
    enter();
    ContextScope { _priv: () }
}

pub struct ContextScope {
    _priv: (),
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_sets_and_clears() {
        assert!(!is_active());
        {
            let _scope = scoped();
            assert!(is_active());
        }
        assert!(!is_active());
    }

    #[test]
    fn exit_without_enter_is_harmless() {
        exit();
        assert!(!is_active());
    }

    #[test]
    fn scope_clears_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let _scope = scoped();
            panic!("guarded operation failed");
        });
        assert!(result.is_err());
        assert!(!is_active());
    }

    #[test]
    fn flag_is_confined_to_the_thread() {
        let _scope = scoped();
        let other = std::thread::spawn(is_active).join().unwrap();
        assert!(!other);
        assert!(is_active());
    }
}
