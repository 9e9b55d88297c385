use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Unwrap a lock result, keeping the guard when another thread panicked while
/// holding it. Cache contents are advisory, so a poisoned store stays usable.
fn recover<G>(result: LockResult<G>, target: &'static str, op: &'static str, kind: &str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = kind,
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), target, op, "rwlock.read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), target, op, "rwlock.write")
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = RwLock::new(vec![1]);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut guard = lock.write().unwrap();
            guard.push(2);
            panic!("poison the lock");
        }));
        assert!(result.is_err());
        assert!(lock.is_poisoned());

        assert_eq!(*rw_read(&lock, "test", "read"), vec![1, 2]);
        rw_write(&lock, "test", "write").push(3);
        assert_eq!(rw_read(&lock, "test", "read").len(), 3);
    }
}
