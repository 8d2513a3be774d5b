//! Opt-in thread safety: a mutex façade over a [`crate::reader::Reader`] or
//! [`crate::writer::Writer`] for callers who need to share one across
//! threads. Neither type is synchronized by default, matching the rest of
//! this crate's stance that concurrency is something a caller chooses, not
//! something imposed on single-threaded use.

use std::sync::{Mutex, MutexGuard};

pub struct Synchronized<T> {
    inner: Mutex<T>,
}

impl<T> Synchronized<T> {
    pub fn new(value: T) -> Synchronized<T> {
        Synchronized { inner: Mutex::new(value) }
    }

    /// Lock and run `f` with exclusive access. Panics if the lock is
    /// poisoned by a prior panicking access, matching `std::sync::Mutex`.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn serializes_concurrent_access() {
        let counter = Arc::new(Synchronized::new(0u32));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    c.with(|v| *v += 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(Arc::try_unwrap(counter).ok().unwrap().into_inner(), 8000);
    }
}
