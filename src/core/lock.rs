//! Boolean add/remove locks with scope-bound release.
//!
//! Locks bracket sensitive sections (transition evaluation, event dispatch)
//! and must be released on every exit path, including early errors and
//! unwinding user callbacks, so a failed operation never leaves the machine
//! permanently locked. Releasing on `Drop` gives that guarantee for free.

use std::cell::Cell;

#[derive(Default)]
pub(crate) struct LockFlag {
    locked: Cell<bool>,
}

impl LockFlag {
    pub fn new() -> Self {
        LockFlag::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Engage the lock until the returned guard is dropped.
    pub fn lock(&self) -> LockGuard<'_> {
        let prior = self.locked.replace(true);
        LockGuard { flag: self, prior }
    }
}

pub(crate) struct LockGuard<'a> {
    flag: &'a LockFlag,
    prior: bool,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.flag.locked.set(self.prior);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_scoped() {
        let flag = LockFlag::new();
        assert!(!flag.is_locked());

        {
            let _guard = flag.lock();
            assert!(flag.is_locked());
        }

        assert!(!flag.is_locked());
    }

    #[test]
    fn nested_locks_restore_the_outer_state() {
        let flag = LockFlag::new();

        let outer = flag.lock();
        {
            let _inner = flag.lock();
            assert!(flag.is_locked());
        }
        assert!(flag.is_locked());

        drop(outer);
        assert!(!flag.is_locked());
    }

    #[test]
    fn lock_releases_on_unwind() {
        let flag = LockFlag::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flag.lock();
            panic!("callback blew up");
        }));

        assert!(result.is_err());
        assert!(!flag.is_locked());
    }
}
