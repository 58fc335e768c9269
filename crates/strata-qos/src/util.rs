use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering from poison (prior panic in another thread).
///
/// The guarded state (free lists, writer tokens) stays consistent across a
/// panic in an unrelated caller, so the data path keeps running.
pub(crate) fn lock_or_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
