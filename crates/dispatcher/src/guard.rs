//! Guard - mutual exclusion over the registry and the payload ring

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Serializes every mutation of shared dispatcher state
///
/// Handlers never run while the guard is held, so a poisoned lock can only
/// come from a panic inside the dispatcher's own bookkeeping; the data is
/// still structurally valid and is recovered.
#[derive(Debug, Default)]
pub(crate) struct Guard<T> {
    inner: Mutex<T>,
}

impl<T> Guard<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Block until the guard is free, then hold it for the returned scope
    #[inline]
    pub(crate) fn acquire(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_serializes_increments() {
        let guard = Arc::new(Guard::new(0u64));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let guard = Arc::clone(&guard);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *guard.acquire() += 1;
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*guard.acquire(), 4000);
    }

    #[test]
    fn test_guard_recovers_from_poison() {
        let guard = Arc::new(Guard::new(7u32));
        let poisoner = Arc::clone(&guard);
        let _ = thread::spawn(move || {
            let _held = poisoner.acquire();
            panic!("poison the lock");
        })
        .join();
        assert_eq!(*guard.acquire(), 7);
    }
}
