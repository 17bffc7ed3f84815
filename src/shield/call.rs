/*!
 * Real Primitive Calls
 *
 * The shield forwards to caller-supplied lock/unlock operations. Extra
 * arguments travel as a tuple and are passed through verbatim, so primitives
 * shaped `op(handle)`, `op(handle, owner)` or `op(handle, a, b)` all fit.
 */

/// A real lock or unlock operation taking a handle plus extra arguments
///
/// Implemented for every `FnOnce(H, ..)` closure or function with zero to two
/// extra arguments, supplied as `()`, `(a,)` or `(a, b)`. Closure parameters
/// must be annotated; inference does not see through this trait.
///
/// # Example
///
/// ```
/// use lock_shield::shield::LockCall;
///
/// fn lock_with_owner(handle: &u32, owner: u8) {
///     assert_eq!((*handle, owner), (7, 1));
/// }
///
/// LockCall::call(lock_with_owner, &7u32, (1u8,));
/// LockCall::call(|handle: &u32| assert_eq!(*handle, 7), &7u32, ());
/// ```
pub trait LockCall<H, Args> {
    fn call(self, handle: H, args: Args);
}

impl<H, F> LockCall<H, ()> for F
where
    F: FnOnce(H),
{
    #[inline(always)]
    fn call(self, handle: H, _args: ()) {
        self(handle)
    }
}

impl<H, A, F> LockCall<H, (A,)> for F
where
    F: FnOnce(H, A),
{
    #[inline(always)]
    fn call(self, handle: H, (a,): (A,)) {
        self(handle, a)
    }
}

impl<H, A, B, F> LockCall<H, (A, B)> for F
where
    F: FnOnce(H, A, B),
{
    #[inline(always)]
    fn call(self, handle: H, (a, b): (A, B)) {
        self(handle, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn forward<H, A, F: LockCall<H, A>>(f: F, handle: H, args: A) {
        f.call(handle, args);
    }

    #[test]
    fn test_single_argument_shape() {
        let seen = Cell::new(0);
        forward(|h: u32| seen.set(h), 5, ());
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn test_owner_token_shape() {
        let seen = Cell::new((0, 0));
        forward(|h: u32, owner: u64| seen.set((h, owner)), 5, (9,));
        assert_eq!(seen.get(), (5, 9));
    }

    #[test]
    fn test_two_extra_arguments() {
        let seen = Cell::new(0);
        forward(|h: u32, a: u32, b: u32| seen.set(h + a + b), 1, (2, 3));
        assert_eq!(seen.get(), 6);
    }
}
