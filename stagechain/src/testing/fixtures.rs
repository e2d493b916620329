//! Test fixtures for stage functions.

use crate::errors::{TaskError, TaskResult};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Error kind produced by [`fail_on`].
pub const INJECTED_FAILURE_KIND: &str = "InjectedFailure";

/// Fixed-size, index-addressed storage shared between stage functions.
///
/// Stages in a chain each see every index, so a test can have the first
/// stage write slot `i` and later stages transform it.
#[derive(Debug)]
pub struct SharedSlots<T> {
    slots: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for SharedSlots<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T: Clone + Default> SharedSlots<T> {
    /// Creates `len` slots holding `T::default()`.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(vec![T::default(); len])),
        }
    }

    /// Overwrites slot `index`.
    pub fn set(&self, index: usize, value: T) {
        self.slots.lock()[index] = value;
    }

    /// Applies `f` to slot `index`.
    pub fn update(&self, index: usize, f: impl FnOnce(&mut T)) {
        f(&mut self.slots.lock()[index]);
    }

    /// Copy of slot `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> T {
        self.slots.lock()[index].clone()
    }

    /// Copy of every slot.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.slots.lock().clone()
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Wraps a stage function so it fails for the given indices.
///
/// Listed indices return an [`INJECTED_FAILURE_KIND`] error without calling
/// `inner`; every other index is delegated.
pub fn fail_on<F>(
    indices: impl IntoIterator<Item = usize>,
    inner: F,
) -> impl Fn(usize) -> TaskResult + Send + Sync + 'static
where
    F: Fn(usize) -> TaskResult + Send + Sync + 'static,
{
    let failing: BTreeSet<usize> = indices.into_iter().collect();
    move |index| {
        if failing.contains(&index) {
            return Err(TaskError::new(
                INJECTED_FAILURE_KIND,
                format!("injected failure at index {index}"),
            ));
        }
        inner(index)
    }
}

/// Records which thread handled each index.
#[derive(Debug, Clone, Default)]
pub struct ThreadLog {
    entries: Arc<Mutex<Vec<(usize, ThreadId)>>>,
}

impl ThreadLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current thread for `index`.
    pub fn record(&self, index: usize) {
        self.entries.lock().push((index, thread::current().id()));
    }

    /// Entries in recording order.
    #[must_use]
    pub fn entries(&self) -> Vec<(usize, ThreadId)> {
        self.entries.lock().clone()
    }

    /// Distinct threads seen.
    #[must_use]
    pub fn thread_ids(&self) -> HashSet<ThreadId> {
        self.entries.lock().iter().map(|(_, id)| *id).collect()
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
